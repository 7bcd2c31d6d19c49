//! Typed views over the raw rows of a [`Stream`].
//!
//! A [`StreamAccessor`] reads and writes rows of type `T` through an [`ElementAccess`] strategy:
//!
//! - [`DirectAccess`]: the stream stores exactly `T::Element`; values are copied bit for bit.
//! - [`StaticAccess<S>`]: the stream stores `S`, converted through [`ConvertType`] resolved at
//!   compile time.
//! - [`DynamicAccess`]: the stored element type is only known at run time; the registered
//!   converters for the pair are looked up once when the accessor is built.
//!
//! An accessor may address a window of a wider row through its element offset, so that for
//! example the second UV channel of a four-channel texture coordinate stream reads as a plain
//! `Vec2` stream.
//!
//! A [`StreamBuilder`] pairs an accessor with the stream itself and adds array-like editing. The
//! write half of its API only exists when the builder holds the stream mutably.

use {
    crate::{
        convert::{ConvertType, Converter, find_converter},
        stream::Stream,
        types::{ElementType, MeshElement, MeshRow},
    },
    bytemuck::{bytes_of, bytes_of_mut, pod_read_unaligned},
    paste::paste,
    std::{
        cmp::Ordering,
        fmt::{Debug, Formatter},
        marker::PhantomData,
        mem::size_of,
        ops::{Add, AddAssign, Deref, DerefMut, Div, DivAssign, Mul, MulAssign, Sub, SubAssign},
    },
};

/// Reads and writes single elements of type `E` from the raw bytes of some stored element type.
pub trait ElementAccess<E>: Sized
where
    E: MeshElement,
{
    /// Builds the strategy for streams storing `element_type`, or `None` if this strategy can not
    /// handle it.
    fn for_element_type(element_type: ElementType) -> Option<Self>;

    /// Size in bytes of one stored element.
    fn stored_size(&self) -> usize;

    fn read(&self, src: &[u8]) -> E;

    fn write(&self, value: E, dst: &mut [u8]);
}

/// Access to elements stored exactly as the requested type.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectAccess;

impl<E> ElementAccess<E> for DirectAccess
where
    E: MeshElement,
{
    fn for_element_type(element_type: ElementType) -> Option<Self> {
        (element_type == E::ELEMENT_TYPE).then_some(Self)
    }

    fn stored_size(&self) -> usize {
        size_of::<E>()
    }

    fn read(&self, src: &[u8]) -> E {
        pod_read_unaligned(&src[..size_of::<E>()])
    }

    fn write(&self, value: E, dst: &mut [u8]) {
        dst[..size_of::<E>()].copy_from_slice(bytes_of(&value));
    }
}

/// Access to elements stored as `S`, converted with [`ConvertType`] in both directions.
pub struct StaticAccess<S>(PhantomData<fn() -> S>);

impl<S> Clone for StaticAccess<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for StaticAccess<S> {}

impl<S> Debug for StaticAccess<S>
where
    S: MeshElement,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticAccess")
            .field(&S::ELEMENT_TYPE)
            .finish()
    }
}

impl<E, S> ElementAccess<E> for StaticAccess<S>
where
    E: MeshElement + ConvertType<S>,
    S: MeshElement + ConvertType<E>,
{
    fn for_element_type(element_type: ElementType) -> Option<Self> {
        (element_type == S::ELEMENT_TYPE).then_some(Self(PhantomData))
    }

    fn stored_size(&self) -> usize {
        size_of::<S>()
    }

    fn read(&self, src: &[u8]) -> E {
        let stored: S = pod_read_unaligned(&src[..size_of::<S>()]);
        stored.convert_type()
    }

    fn write(&self, value: E, dst: &mut [u8]) {
        let stored: S = value.convert_type();
        dst[..size_of::<S>()].copy_from_slice(bytes_of(&stored));
    }
}

/// Access through registered converters for an element type chosen at run time.
///
/// Reading needs a `stored -> E` converter. Writing also needs `E -> stored`; an accessor
/// without one is read-only and panics on write (see [`DynamicAccess::can_write`]).
#[derive(Clone, Copy, Debug)]
pub struct DynamicAccess {
    stored: ElementType,
    read: Converter,
    write: Option<Converter>,
}

impl DynamicAccess {
    pub fn stored_type(&self) -> ElementType {
        self.stored
    }

    pub fn can_write(&self) -> bool {
        self.write.is_some()
    }
}

impl<E> ElementAccess<E> for DynamicAccess
where
    E: MeshElement,
{
    fn for_element_type(element_type: ElementType) -> Option<Self> {
        Some(Self {
            stored: element_type,
            read: find_converter(element_type, E::ELEMENT_TYPE)?,
            write: find_converter(E::ELEMENT_TYPE, element_type),
        })
    }

    fn stored_size(&self) -> usize {
        self.stored.size()
    }

    fn read(&self, src: &[u8]) -> E {
        let mut value = E::zeroed();
        self.read
            .convert(&src[..self.stored.size()], bytes_of_mut(&mut value));

        value
    }

    fn write(&self, value: E, dst: &mut [u8]) {
        let Some(write) = self.write else {
            panic!("No converter registered from {:?} to {:?}", E::ELEMENT_TYPE, self.stored);
        };

        write.convert(bytes_of(&value), &mut dst[..self.stored.size()]);
    }
}

/// Reads and writes rows of type `T` within the rows of a stream.
///
/// The accessor does not hold the stream; it is built for one stream's layout and must only be
/// used with streams of that layout.
pub struct StreamAccessor<T, A> {
    access: A,
    element_offset: usize,
    stride: usize,
    __: PhantomData<fn() -> T>,
}

impl<T, A> StreamAccessor<T, A>
where
    T: MeshRow,
    A: ElementAccess<T::Element>,
{
    /// Returns `None` if the stream's rows are not wide enough for `T` or `A` can not handle the
    /// stored element type.
    pub fn new(stream: &Stream) -> Option<Self> {
        Self::with_element_offset(stream, 0)
    }

    /// Addresses `T::NUM_ELEMENTS` elements starting at `element_offset` within each row.
    pub fn with_element_offset(stream: &Stream, element_offset: usize) -> Option<Self> {
        if element_offset + T::NUM_ELEMENTS as usize > stream.num_elements() {
            return None;
        }

        Some(Self {
            access: A::for_element_type(stream.element_type())?,
            element_offset,
            stride: stream.stride(),
            __: PhantomData,
        })
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn element_offset(&self) -> usize {
        self.element_offset
    }

    fn element_range(&self, element: usize) -> std::ops::Range<usize> {
        debug_assert!(element < T::NUM_ELEMENTS as usize);

        let size = self.access.stored_size();
        let start = (self.element_offset + element) * size;

        start..start + size
    }

    pub fn get_buffer_value(&self, stream: &Stream, row: usize) -> T {
        debug_assert_eq!(stream.stride(), self.stride);

        let src = stream.row_bytes(row);
        let mut value = T::zeroed();

        for element in 0..T::NUM_ELEMENTS as usize {
            value.set_element(element, self.access.read(&src[self.element_range(element)]));
        }

        value
    }

    pub fn set_buffer_value(&self, stream: &mut Stream, row: usize, value: &T) {
        debug_assert_eq!(stream.stride(), self.stride);

        let dst = stream.row_bytes_mut(row);

        for element in 0..T::NUM_ELEMENTS as usize {
            self.access
                .write(value.element(element), &mut dst[self.element_range(element)]);
        }
    }

    pub fn get_element_value(&self, stream: &Stream, row: usize, element: usize) -> T::Element {
        debug_assert_eq!(stream.stride(), self.stride);

        self.access
            .read(&stream.row_bytes(row)[self.element_range(element)])
    }

    pub fn set_element_value(
        &self,
        stream: &mut Stream,
        row: usize,
        element: usize,
        value: T::Element,
    ) {
        debug_assert_eq!(stream.stride(), self.stride);

        let range = self.element_range(element);
        self.access
            .write(value, &mut stream.row_bytes_mut(row)[range]);
    }
}

impl<T, A> Clone for StreamAccessor<T, A>
where
    A: Clone,
{
    fn clone(&self) -> Self {
        Self {
            access: self.access.clone(),
            element_offset: self.element_offset,
            stride: self.stride,
            __: PhantomData,
        }
    }
}

impl<T, A> Debug for StreamAccessor<T, A>
where
    A: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAccessor")
            .field("access", &self.access)
            .field("element_offset", &self.element_offset)
            .field("stride", &self.stride)
            .finish()
    }
}

/// Read-only builder over a borrowed stream.
pub type StreamReader<'a, T, A = DirectAccess> = StreamBuilder<T, A, &'a Stream>;

/// Read-write builder over a mutably borrowed stream.
pub type StreamWriter<'a, T, A = DirectAccess> = StreamBuilder<T, A, &'a mut Stream>;

/// Array-like editing of a stream through a [`StreamAccessor`].
///
/// `S` is anything which dereferences to a [`Stream`]: `&Stream` gives a read-only builder,
/// `&mut Stream` or a [`crate::StreamMut`] guard a writable one.
pub struct StreamBuilder<T, A, S> {
    stream: S,
    accessor: StreamAccessor<T, A>,
}

impl<T, A, S> StreamBuilder<T, A, S>
where
    T: MeshRow,
    A: ElementAccess<T::Element>,
    S: Deref<Target = Stream>,
{
    pub fn new(stream: S) -> Option<Self> {
        Self::with_element_offset(stream, 0)
    }

    pub fn with_element_offset(stream: S, element_offset: usize) -> Option<Self> {
        let accessor = StreamAccessor::with_element_offset(&stream, element_offset)?;

        Some(Self { stream, accessor })
    }

    pub fn accessor(&self) -> &StreamAccessor<T, A> {
        &self.accessor
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn len(&self) -> usize {
        self.stream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.stream.capacity()
    }

    pub fn is_valid_index(&self, row: usize) -> bool {
        self.stream.is_valid_index(row)
    }

    pub fn get(&self, row: usize) -> T {
        self.accessor.get_buffer_value(&self.stream, row)
    }

    pub fn get_element(&self, row: usize, element: usize) -> T::Element {
        self.accessor.get_element_value(&self.stream, row, element)
    }

    pub fn row(&self, row: usize) -> RowRef<'_, T, A, S> {
        RowRef { builder: self, row }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + '_ {
        (0..self.len()).map(|row| self.get(row))
    }
}

impl<T, A, S> StreamBuilder<T, A, S>
where
    T: MeshRow,
    A: ElementAccess<T::Element>,
    S: DerefMut<Target = Stream>,
{
    pub fn set(&mut self, row: usize, value: T) {
        self.accessor
            .set_buffer_value(&mut self.stream, row, &value);
    }

    pub fn set_element(&mut self, row: usize, element: usize, value: T::Element) {
        self.accessor
            .set_element_value(&mut self.stream, row, element, value);
    }

    pub fn edit(&mut self, row: usize) -> RowMut<'_, T, A, S> {
        RowMut { builder: self, row }
    }

    /// Appends a row and returns its index.
    pub fn add(&mut self, value: T) -> usize {
        let row = self.stream.add_uninitialized(1);
        self.set(row, value);

        row
    }

    pub fn add_uninitialized(&mut self, count: usize) -> usize {
        self.stream.add_uninitialized(count)
    }

    pub fn add_zeroed(&mut self, count: usize) -> usize {
        self.stream.add_zeroed(count)
    }

    /// Overwrites consecutive existing rows starting at `start`.
    pub fn set_range(&mut self, start: usize, values: impl IntoIterator<Item = T>) {
        for (row, value) in (start..).zip(values) {
            self.set(row, value);
        }
    }

    /// Overwrites `count` existing rows starting at `start` with `f(index)`, where `index` counts
    /// from zero.
    pub fn set_generator(&mut self, start: usize, count: usize, mut f: impl FnMut(usize) -> T) {
        for idx in 0..count {
            self.set(start + idx, f(idx));
        }
    }

    /// Appends rows and returns the index of the first one.
    pub fn append(&mut self, values: impl IntoIterator<Item = T>) -> usize {
        let values = values.into_iter();
        let start = self.len();

        self.stream.reserve(start + values.size_hint().0);

        for value in values {
            self.add(value);
        }

        start
    }

    /// Appends `count` rows produced by `f(index)` and returns the index of the first one.
    pub fn append_generator(&mut self, count: usize, f: impl FnMut(usize) -> T) -> usize {
        let start = self.stream.add_uninitialized(count);
        self.set_generator(start, count, f);

        start
    }

    pub fn reserve(&mut self, num: usize) {
        self.stream.reserve(num);
    }

    pub fn set_num_uninitialized(&mut self, num: usize) {
        self.stream.set_num_uninitialized(num);
    }

    pub fn set_num_zeroed(&mut self, num: usize) {
        self.stream.set_num_zeroed(num);
    }

    pub fn empty(&mut self, expected_size: usize, max_slack: usize) {
        self.stream.empty(expected_size, max_slack);
    }

    pub fn remove_at(&mut self, index: usize, count: usize, allow_shrink: bool) {
        self.stream.remove_at(index, count, allow_shrink);
    }
}

/// A read-only reference to one row of a [`StreamBuilder`].
pub struct RowRef<'b, T, A, S> {
    builder: &'b StreamBuilder<T, A, S>,
    row: usize,
}

impl<T, A, S> Clone for RowRef<'_, T, A, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, A, S> Copy for RowRef<'_, T, A, S> {}

impl<T, A, S> RowRef<'_, T, A, S>
where
    T: MeshRow,
    A: ElementAccess<T::Element>,
    S: Deref<Target = Stream>,
{
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn get(&self) -> T {
        self.builder.get(self.row)
    }

    pub fn get_element(&self, element: usize) -> T::Element {
        self.builder.get_element(self.row, element)
    }
}

/// A mutable reference to one row of a [`StreamBuilder`].
pub struct RowMut<'b, T, A, S> {
    builder: &'b mut StreamBuilder<T, A, S>,
    row: usize,
}

impl<T, A, S> RowMut<'_, T, A, S>
where
    T: MeshRow,
    A: ElementAccess<T::Element>,
    S: DerefMut<Target = Stream>,
{
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn get(&self) -> T {
        self.builder.get(self.row)
    }

    pub fn get_element(&self, element: usize) -> T::Element {
        self.builder.get_element(self.row, element)
    }

    pub fn set(&mut self, value: T) {
        self.builder.set(self.row, value);
    }

    pub fn set_element(&mut self, element: usize, value: T::Element) {
        self.builder.set_element(self.row, element, value);
    }
}

macro_rules! row_ops {
    ($($op:ident::$method:ident),*) => {
        paste! {
            $(
                impl<T, A, S> $op<T> for RowRef<'_, T, A, S>
                where
                    T: MeshRow + $op<Output = T>,
                    A: ElementAccess<T::Element>,
                    S: Deref<Target = Stream>,
                {
                    type Output = T;

                    fn $method(self, rhs: T) -> T {
                        self.get().$method(rhs)
                    }
                }

                impl<T, A, S> $op for RowRef<'_, T, A, S>
                where
                    T: MeshRow + $op<Output = T>,
                    A: ElementAccess<T::Element>,
                    S: Deref<Target = Stream>,
                {
                    type Output = T;

                    fn $method(self, rhs: Self) -> T {
                        self.get().$method(rhs.get())
                    }
                }

                impl<T, A, S> [<$op Assign>]<T> for RowMut<'_, T, A, S>
                where
                    T: MeshRow + $op<Output = T>,
                    A: ElementAccess<T::Element>,
                    S: DerefMut<Target = Stream>,
                {
                    fn [<$method _assign>](&mut self, rhs: T) {
                        let value = self.get().$method(rhs);
                        self.set(value);
                    }
                }
            )*
        }
    };
}

row_ops!(Add::add, Sub::sub, Mul::mul, Div::div);

impl<T, A, S> PartialEq<T> for RowRef<'_, T, A, S>
where
    T: MeshRow + PartialEq,
    A: ElementAccess<T::Element>,
    S: Deref<Target = Stream>,
{
    fn eq(&self, other: &T) -> bool {
        self.get() == *other
    }
}

impl<T, A, S> PartialEq for RowRef<'_, T, A, S>
where
    T: MeshRow + PartialEq,
    A: ElementAccess<T::Element>,
    S: Deref<Target = Stream>,
{
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T, A, S> PartialOrd<T> for RowRef<'_, T, A, S>
where
    T: MeshRow + PartialOrd,
    A: ElementAccess<T::Element>,
    S: Deref<Target = Stream>,
{
    fn partial_cmp(&self, other: &T) -> Option<Ordering> {
        self.get().partial_cmp(other)
    }
}

impl<T, A, S> PartialOrd for RowRef<'_, T, A, S>
where
    T: MeshRow + PartialOrd,
    A: ElementAccess<T::Element>,
    S: Deref<Target = Stream>,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.get().partial_cmp(&other.get())
    }
}

impl<T, A, S> PartialEq<T> for RowMut<'_, T, A, S>
where
    T: MeshRow + PartialEq,
    A: ElementAccess<T::Element>,
    S: DerefMut<Target = Stream>,
{
    fn eq(&self, other: &T) -> bool {
        self.get() == *other
    }
}
