use {
    crate::types::{MeshElement, MeshRow},
    bytemuck::{Pod, Zeroable},
    glam::{Vec2, Vec3, Vec4},
    half::f16,
    serde::{Deserialize, Serialize},
};

/// Two half-precision floats, typically a texture coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct HalfVec2 {
    pub x: f16,
    pub y: f16,
}

impl HalfVec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: f16::from_f32(x),
            y: f16::from_f32(y),
        }
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x.to_f32(), self.y.to_f32())
    }
}

impl From<Vec2> for HalfVec2 {
    fn from(value: Vec2) -> Self {
        Self::new(value.x, value.y)
    }
}

/// An 8-bit per channel color, in RGBA order.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Pod, Serialize, Zeroable,
)]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Self = Self::new(0, 0, 0, u8::MAX);
    pub const WHITE: Self = Self::new(u8::MAX, u8::MAX, u8::MAX, u8::MAX);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_linear(value: Vec4) -> Self {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;

        Self::new(
            quantize(value.x),
            quantize(value.y),
            quantize(value.z),
            quantize(value.w),
        )
    }

    pub fn to_linear(self) -> Vec4 {
        Vec4::new(
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }
}

/// A unit vector quantized to four signed 8-bit components mapped onto `[-1, 1]`.
///
/// The `w` component is used by tangents to carry the binormal sign.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PackedNormal {
    pub x: i8,
    pub y: i8,
    pub z: i8,
    pub w: i8,
}

impl PackedNormal {
    pub const X: Self = Self::from_raw([i8::MAX, 0, 0, i8::MAX]);
    pub const Z: Self = Self::from_raw([0, 0, i8::MAX, i8::MAX]);

    pub const fn from_raw(value: [i8; 4]) -> Self {
        Self {
            x: value[0],
            y: value[1],
            z: value[2],
            w: value[3],
        }
    }

    pub fn from_vec4(value: Vec4) -> Self {
        let quantize = |v: f32| (v.clamp(-1.0, 1.0) * i8::MAX as f32).round() as i8;

        Self::from_raw([
            quantize(value.x),
            quantize(value.y),
            quantize(value.z),
            quantize(value.w),
        ])
    }

    pub fn to_vec4(self) -> Vec4 {
        let unquantize = |v: i8| (v as f32 / i8::MAX as f32).max(-1.0);

        Vec4::new(
            unquantize(self.x),
            unquantize(self.y),
            unquantize(self.z),
            unquantize(self.w),
        )
    }

    pub fn to_vec3(self) -> Vec3 {
        self.to_vec4().truncate()
    }
}

/// A unit vector quantized to four signed 16-bit components mapped onto `[-1, 1]`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PackedRgba16N {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub w: i16,
}

impl PackedRgba16N {
    pub const X: Self = Self::from_raw([i16::MAX, 0, 0, i16::MAX]);
    pub const Z: Self = Self::from_raw([0, 0, i16::MAX, i16::MAX]);

    pub const fn from_raw(value: [i16; 4]) -> Self {
        Self {
            x: value[0],
            y: value[1],
            z: value[2],
            w: value[3],
        }
    }

    pub fn from_vec4(value: Vec4) -> Self {
        let quantize = |v: f32| (v.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;

        Self::from_raw([
            quantize(value.x),
            quantize(value.y),
            quantize(value.z),
            quantize(value.w),
        ])
    }

    pub fn to_vec4(self) -> Vec4 {
        let unquantize = |v: i16| (v as f32 / i16::MAX as f32).max(-1.0);

        Vec4::new(
            unquantize(self.x),
            unquantize(self.y),
            unquantize(self.z),
            unquantize(self.w),
        )
    }

    pub fn to_vec3(self) -> Vec3 {
        self.to_vec4().truncate()
    }
}

/// A tangent-basis row: the tangent (X) followed by the normal (Z).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Tangents<E> {
    pub tangent: E,
    pub normal: E,
}

impl<E> Tangents<E> {
    pub fn new(tangent: E, normal: E) -> Self {
        Self { tangent, normal }
    }
}

// SAFETY: Two fields of the same `Pod` type under `repr(C)` can not contain padding
unsafe impl<E> Zeroable for Tangents<E> where E: Zeroable {}
unsafe impl<E> Pod for Tangents<E> where E: Pod {}

impl<E> MeshRow for Tangents<E>
where
    E: MeshElement,
{
    type Element = E;

    const NUM_ELEMENTS: u32 = 2;
}

#[cfg(test)]
mod tests {
    use {super::*, bytemuck::bytes_of};

    #[test]
    fn packed_normal_axes() {
        assert_eq!(PackedNormal::from_vec4(Vec4::new(0.0, 0.0, 1.0, 1.0)), PackedNormal::Z);
        assert_eq!(PackedNormal::Z.to_vec3(), Vec3::Z);
        assert_eq!(PackedRgba16N::X.to_vec3(), Vec3::X);
        assert_eq!(PackedNormal::from_raw([i8::MIN, 0, 0, 0]).to_vec4().x, -1.0);
    }

    #[test]
    fn color_linear() {
        assert_eq!(Color::from_linear(Vec4::ONE), Color::WHITE);
        assert_eq!(Color::WHITE.to_linear(), Vec4::ONE);
        assert_eq!(
            Color::from_linear(Vec4::new(2.0, -1.0, 0.0, 1.0)),
            Color::new(255, 0, 0, 255)
        );
    }

    #[test]
    fn tangents_are_tightly_packed() {
        let row = Tangents::new(PackedNormal::X, PackedNormal::Z);

        assert_eq!(bytes_of(&row), [127u8, 0, 0, 127, 0, 0, 127, 127].as_slice());
        assert_eq!(row.element(1), PackedNormal::Z);
    }
}
