//! Element type conversion.
//!
//! Conversions exist at two levels: [`ConvertType`] is the statically-resolved per-pair function
//! used when both types are known at compile time, and the [`ConverterRegistry`] maps run-time
//! `(from, to)` element type pairs onto type-erased byte converters. The registry is built once,
//! pre-populated with every [`ConvertType`] pair this crate defines, and may be extended at run
//! time with [`register_converter`].

use {
    crate::{
        packed::{Color, HalfVec2, PackedNormal, PackedRgba16N},
        types::{ElementType, IndexType, MeshElement},
    },
    bytemuck::{bytes_of, pod_read_unaligned},
    glam::{Vec2, Vec3, Vec4},
    half::f16,
    log::trace,
    parking_lot::RwLock,
    std::{collections::HashMap, mem::size_of, sync::LazyLock},
};

/// Statically-resolved conversion between two element types.
pub trait ConvertType<T> {
    fn convert_type(self) -> T;
}

impl<T> ConvertType<T> for T {
    fn convert_type(self) -> T {
        self
    }
}

/// Converts exactly one element: `src` and `dst` are sized to one source/destination element.
pub type ConvertFn = fn(&[u8], &mut [u8]);

/// Converts `count` consecutive elements.
pub type ConvertContiguousFn = fn(&[u8], &mut [u8], usize);

/// A pair of type-erased functions converting raw element bytes from one element type to
/// another.
#[derive(Clone, Copy, Debug)]
pub struct Converter {
    single: ConvertFn,
    contiguous: ConvertContiguousFn,
}

impl Converter {
    pub fn new(single: ConvertFn, contiguous: ConvertContiguousFn) -> Self {
        Self { single, contiguous }
    }

    /// Builds the converter for a statically-known pair of element types.
    pub fn of<F, T>() -> Self
    where
        F: MeshElement + ConvertType<T>,
        T: MeshElement,
    {
        Self {
            single: convert_single::<F, T>,
            contiguous: convert_contiguous::<F, T>,
        }
    }

    /// A byte-for-byte copy, used when source and destination types match exactly.
    pub fn identity() -> Self {
        Self {
            single: copy_single,
            contiguous: copy_contiguous,
        }
    }

    pub fn convert(&self, src: &[u8], dst: &mut [u8]) {
        (self.single)(src, dst)
    }

    pub fn convert_contiguous(&self, src: &[u8], dst: &mut [u8], count: usize) {
        (self.contiguous)(src, dst, count)
    }
}

fn convert_single<F, T>(src: &[u8], dst: &mut [u8])
where
    F: MeshElement + ConvertType<T>,
    T: MeshElement,
{
    let value: F = pod_read_unaligned(&src[..size_of::<F>()]);
    dst[..size_of::<T>()].copy_from_slice(bytes_of(&value.convert_type()));
}

fn convert_contiguous<F, T>(src: &[u8], dst: &mut [u8], count: usize)
where
    F: MeshElement + ConvertType<T>,
    T: MeshElement,
{
    debug_assert!(src.len() >= count * size_of::<F>());
    debug_assert!(dst.len() >= count * size_of::<T>());

    for (src, dst) in src
        .chunks_exact(size_of::<F>())
        .zip(dst.chunks_exact_mut(size_of::<T>()))
        .take(count)
    {
        let value: F = pod_read_unaligned(src);
        dst.copy_from_slice(bytes_of(&value.convert_type()));
    }
}

fn copy_single(src: &[u8], dst: &mut [u8]) {
    let len = dst.len().min(src.len());
    dst[..len].copy_from_slice(&src[..len]);
}

// Without a type the element count can not be turned into a byte count
fn copy_contiguous(src: &[u8], dst: &mut [u8], _count: usize) {
    copy_single(src, dst);
}

/// A table of run-time converters keyed by `(from, to)` element type.
///
/// Converters are directional: registering `A -> B` says nothing about `B -> A`.
#[derive(Debug, Default)]
pub struct ConverterRegistry {
    converters: HashMap<(ElementType, ElementType), Converter>,
}

impl ConverterRegistry {
    /// Creates a registry holding no converters; exact matches still convert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in conversion.
    pub fn with_defaults() -> Self {
        let mut res = Self::new();
        register_defaults(&mut res);

        trace!("Registered {} default converters", res.converters.len());

        res
    }

    pub fn can_convert(&self, from: ElementType, to: ElementType) -> bool {
        from == to || self.converters.contains_key(&(from, to))
    }

    pub fn converter(&self, from: ElementType, to: ElementType) -> Option<Converter> {
        if from == to {
            Some(Converter::identity())
        } else {
            self.converters.get(&(from, to)).copied()
        }
    }

    /// Registers a converter, returning the previous one for this pair if there was one.
    pub fn register(
        &mut self,
        from: ElementType,
        to: ElementType,
        converter: Converter,
    ) -> Option<Converter> {
        debug_assert!(from.is_valid() && to.is_valid());

        self.converters.insert((from, to), converter)
    }

    pub fn register_type<F, T>(&mut self) -> Option<Converter>
    where
        F: MeshElement + ConvertType<T>,
        T: MeshElement,
    {
        self.register(F::ELEMENT_TYPE, T::ELEMENT_TYPE, Converter::of::<F, T>())
    }

    /// The registered `(from, to)` pairs, in no particular order.
    pub fn pairs(&self) -> impl Iterator<Item = (ElementType, ElementType)> + '_ {
        self.converters.keys().copied()
    }

    /// Returns `true` if a converter was registered for this pair.
    pub fn unregister(&mut self, from: ElementType, to: ElementType) -> bool {
        self.converters.remove(&(from, to)).is_some()
    }
}

static CONVERTERS: LazyLock<RwLock<ConverterRegistry>> =
    LazyLock::new(|| RwLock::new(ConverterRegistry::with_defaults()));

/// Builds the process-wide registry now instead of on first use.
pub fn init_converters() {
    LazyLock::force(&CONVERTERS);
}

/// Returns `true` if `from` is exactly `to` or a converter is registered for the pair.
pub fn can_convert(from: ElementType, to: ElementType) -> bool {
    CONVERTERS.read().can_convert(from, to)
}

pub fn find_converter(from: ElementType, to: ElementType) -> Option<Converter> {
    CONVERTERS.read().converter(from, to)
}

/// Gets the converter for a pair which the caller has already checked with [`can_convert`].
///
/// # Panics
///
/// Panics if no converter is registered.
pub fn get_converter(from: ElementType, to: ElementType) -> Converter {
    find_converter(from, to)
        .unwrap_or_else(|| panic!("No converter registered from {from:?} to {to:?}"))
}

pub fn register_converter(
    from: ElementType,
    to: ElementType,
    converter: Converter,
) -> Option<Converter> {
    CONVERTERS.write().register(from, to, converter)
}

pub fn unregister_converter(from: ElementType, to: ElementType) -> bool {
    CONVERTERS.write().unregister(from, to)
}

/// Implements `ConvertType` for each pair and registers all of them as defaults.
macro_rules! conversions {
    ($($from:ty => $to:ty: |$value:ident| $body:expr;)*) => {
        $(
            impl ConvertType<$to> for $from {
                fn convert_type(self) -> $to {
                    let $value = self;
                    $body
                }
            }
        )*

        fn register_defaults(registry: &mut ConverterRegistry) {
            $(
                registry.register_type::<$from, $to>();
            )*
        }
    };
}

conversions! {
    u16 => i16: |v| IndexType::from_i64(v.to_i64());
    u16 => u32: |v| v as _;
    u16 => i32: |v| v as _;
    i16 => u16: |v| IndexType::from_i64(v.to_i64());
    i16 => u32: |v| IndexType::from_i64(v.to_i64());
    i16 => i32: |v| v as _;
    u32 => u16: |v| IndexType::from_i64(v.to_i64());
    u32 => i16: |v| IndexType::from_i64(v.to_i64());
    u32 => i32: |v| IndexType::from_i64(v.to_i64());
    i32 => u16: |v| IndexType::from_i64(v.to_i64());
    i32 => i16: |v| IndexType::from_i64(v.to_i64());
    i32 => u32: |v| IndexType::from_i64(v.to_i64());

    f16 => f32: |v| v.to_f32();
    f32 => f16: |v| f16::from_f32(v);
    f32 => f64: |v| v as _;
    f64 => f32: |v| v as _;

    HalfVec2 => Vec2: |v| v.to_vec2();
    Vec2 => HalfVec2: |v| HalfVec2::from(v);

    Vec3 => Vec4: |v| v.extend(1.0);
    Vec4 => Vec3: |v| v.truncate();

    Vec3 => PackedNormal: |v| PackedNormal::from_vec4(v.extend(1.0));
    Vec4 => PackedNormal: |v| PackedNormal::from_vec4(v);
    PackedNormal => Vec3: |v| v.to_vec3();
    PackedNormal => Vec4: |v| v.to_vec4();

    Vec3 => PackedRgba16N: |v| PackedRgba16N::from_vec4(v.extend(1.0));
    Vec4 => PackedRgba16N: |v| PackedRgba16N::from_vec4(v);
    PackedRgba16N => Vec3: |v| v.to_vec3();
    PackedRgba16N => Vec4: |v| v.to_vec4();

    PackedNormal => PackedRgba16N: |v| PackedRgba16N::from_vec4(v.to_vec4());
    PackedRgba16N => PackedNormal: |v| PackedNormal::from_vec4(v.to_vec4());

    Color => Vec4: |v| v.to_linear();
    Vec4 => Color: |v| Color::from_linear(v);
}
