use {
    bytemuck::{Pod, bytes_of, bytes_of_mut, pod_read_unaligned},
    glam::{Vec2, Vec3, Vec4},
    half::f16,
    serde::{Deserialize, Serialize},
    std::{fmt::Debug, hash::Hash, mem::size_of},
};

/// The scalar kind of a single datum within an element.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum DatumType {
    #[default]
    Unknown,
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Half,
    Float,
    Double,

    /// Reserved slot for 10:10:10:2 packed data; one datum covers the whole 32-bit word.
    Rgb10A2,
}

impl DatumType {
    /// Size in bytes of one datum of this kind.
    pub const fn size(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 | Self::Half => 2,
            Self::UInt32 | Self::Int32 | Self::Float | Self::Rgb10A2 => 4,
            Self::Double => 8,
        }
    }
}

/// Describes the wire format of one logical element, such as a `Vec3` or a packed normal.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct ElementType {
    datum: DatumType,
    num_datums: u8,
    normalized: bool,
    float_on_read: bool,
}

impl ElementType {
    pub const INVALID: Self = Self {
        datum: DatumType::Unknown,
        num_datums: 0,
        normalized: false,
        float_on_read: false,
    };

    pub const fn new(
        datum: DatumType,
        num_datums: u8,
        normalized: bool,
        float_on_read: bool,
    ) -> Self {
        assert!(num_datums >= 1 && num_datums <= 4);

        Self {
            datum,
            num_datums,
            normalized,
            float_on_read,
        }
    }

    pub const fn datum(&self) -> DatumType {
        self.datum
    }

    /// `true` when the datums use fixed-point semantics (e.g. `[-1, 1]` for signed types).
    pub const fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// `true` when the GPU should see this element as floating point values.
    pub const fn is_float_on_read(&self) -> bool {
        self.float_on_read
    }

    pub const fn is_valid(&self) -> bool {
        !matches!(self.datum, DatumType::Unknown) && self.num_datums > 0
    }

    /// `true` for [`Self::INVALID`] and for every element type [`Self::new`] accepts.
    pub const fn is_well_formed(&self) -> bool {
        match self.datum {
            DatumType::Unknown => self.num_datums == 0,
            _ => self.num_datums >= 1 && self.num_datums <= 4,
        }
    }

    pub const fn num_datums(&self) -> usize {
        self.num_datums as usize
    }

    /// Size in bytes of one element.
    pub const fn size(&self) -> usize {
        self.datum.size() * self.num_datums as usize
    }
}

/// An element type plus the number of elements which make up one row of a stream.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct BufferLayout {
    element_type: ElementType,
    num_elements: u32,
}

impl BufferLayout {
    pub const INVALID: Self = Self {
        element_type: ElementType::INVALID,
        num_elements: 0,
    };

    pub const fn new(element_type: ElementType, num_elements: u32) -> Self {
        Self {
            element_type,
            num_elements,
        }
    }

    pub const fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub const fn num_elements(&self) -> usize {
        self.num_elements as usize
    }

    pub const fn is_valid(&self) -> bool {
        self.element_type.is_valid() && self.num_elements > 0
    }

    /// Size in bytes of one row.
    pub const fn stride(&self) -> usize {
        self.element_type.size() * self.num_elements as usize
    }

    /// Returns this layout with a different element type but the same element count.
    pub const fn with_element_type(self, element_type: ElementType) -> Self {
        Self {
            element_type,
            num_elements: self.num_elements,
        }
    }
}

/// A plain-data value that is stored as one element of a stream row.
pub trait MeshElement: Pod + Debug {
    const ELEMENT_TYPE: ElementType;
}

/// A plain-data value that makes up one whole row of a stream: one or more elements of the same
/// type laid out contiguously.
pub trait MeshRow: Pod {
    type Element: MeshElement;

    const NUM_ELEMENTS: u32;

    const LAYOUT: BufferLayout = BufferLayout::new(
        <Self::Element as MeshElement>::ELEMENT_TYPE,
        Self::NUM_ELEMENTS,
    );

    fn element(&self, idx: usize) -> Self::Element {
        debug_assert!(idx < Self::NUM_ELEMENTS as usize);

        let size = size_of::<Self::Element>();
        pod_read_unaligned(&bytes_of(self)[idx * size..(idx + 1) * size])
    }

    fn set_element(&mut self, idx: usize, value: Self::Element) {
        debug_assert!(idx < Self::NUM_ELEMENTS as usize);

        let size = size_of::<Self::Element>();
        bytes_of_mut(self)[idx * size..(idx + 1) * size].copy_from_slice(bytes_of(&value));
    }
}

impl<E, const N: usize> MeshRow for [E; N]
where
    E: MeshElement,
{
    type Element = E;

    const NUM_ELEMENTS: u32 = N as u32;
}

/// Declares `MeshElement` + single-element `MeshRow` for a type along with the matching
/// `ElementType` constant.
macro_rules! mesh_element {
    (@new $datum:ident, $count:literal) => {
        ElementType::new(DatumType::$datum, $count, false, false)
    };
    (@new $datum:ident, $count:literal, normalized) => {
        ElementType::new(DatumType::$datum, $count, true, true)
    };
    ($($ty:ty => $name:ident($datum:ident, $count:literal $(, $flag:ident)*)),* $(,)?) => {
        $(
            impl ElementType {
                pub const $name: Self = mesh_element!(@new $datum, $count $(, $flag)*);
            }

            impl MeshElement for $ty {
                const ELEMENT_TYPE: ElementType = ElementType::$name;
            }

            impl MeshRow for $ty {
                type Element = $ty;

                const NUM_ELEMENTS: u32 = 1;
            }
        )*
    };
}

mesh_element! {
    u8 => U8(UInt8, 1),
    i8 => I8(Int8, 1),
    u16 => U16(UInt16, 1),
    i16 => I16(Int16, 1),
    u32 => U32(UInt32, 1),
    i32 => I32(Int32, 1),
    f16 => F16(Half, 1),
    f32 => F32(Float, 1),
    f64 => F64(Double, 1),
    Vec2 => VEC2(Float, 2),
    Vec3 => VEC3(Float, 3),
    Vec4 => VEC4(Float, 4),
    crate::HalfVec2 => HALF_VEC2(Half, 2),
    crate::Color => COLOR(UInt8, 4, normalized),
    crate::PackedNormal => PACKED_NORMAL(Int8, 4, normalized),
    crate::PackedRgba16N => PACKED_RGBA16N(Int16, 4, normalized),
}

/// The closed set of integer types which may hold vertex indices or polygon group ids.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IndexKind {
    UInt16,
    Int16,
    UInt32,
    Int32,
}

impl IndexKind {
    /// Returns the index kind stored by a stream with this element type, if it is one.
    pub fn of(element_type: ElementType) -> Option<Self> {
        match element_type {
            ElementType::U16 => Some(Self::UInt16),
            ElementType::I16 => Some(Self::Int16),
            ElementType::U32 => Some(Self::UInt32),
            ElementType::I32 => Some(Self::Int32),
            _ => None,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Integer element types usable for triangle indices and polygon group ids.
pub trait IndexType: MeshElement + Ord + Hash + sealed::Sealed {
    const KIND: IndexKind;

    fn from_i64(value: i64) -> Self;

    fn to_i64(self) -> i64;
}

macro_rules! index_type {
    ($($ty:ty => $kind:ident),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl IndexType for $ty {
                const KIND: IndexKind = IndexKind::$kind;

                fn from_i64(value: i64) -> Self {
                    debug_assert!(
                        <$ty>::try_from(value).is_ok(),
                        "{value} out of range for {}",
                        stringify!($ty)
                    );

                    value as _
                }

                fn to_i64(self) -> i64 {
                    self as _
                }
            }
        )*
    };
}

index_type!(u16 => UInt16, i16 => Int16, u32 => UInt32, i32 => Int32);

/// Calls `$body` with `$ty` aliased to the concrete `IndexType` matching `$kind`.
macro_rules! dispatch_index_kind {
    ($kind:expr, $ty:ident => $body:expr) => {
        match $kind {
            $crate::types::IndexKind::UInt16 => {
                type $ty = u16;
                $body
            }
            $crate::types::IndexKind::Int16 => {
                type $ty = i16;
                $body
            }
            $crate::types::IndexKind::UInt32 => {
                type $ty = u32;
                $body
            }
            $crate::types::IndexKind::Int32 => {
                type $ty = i32;
                $body
            }
        }
    };
}

pub(crate) use dispatch_index_kind;
