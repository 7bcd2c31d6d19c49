use {
    crate::{
        convert::{can_convert, get_converter},
        types::{BufferLayout, ElementType, MeshElement, MeshRow},
    },
    anyhow::Context,
    bytemuck::{bytes_of, pod_read_unaligned},
    log::trace,
    serde::{
        Deserialize, Deserializer, Serialize, Serializer,
        de::Error as _,
        ser::Error as _,
    },
    std::{
        borrow::Cow,
        fmt::{Debug, Display, Formatter},
        io::{Read, Write},
        mem::{size_of, take},
    },
};

/// The role a stream plays within a mesh.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum StreamKind {
    /// One row per vertex.
    Vertex,
    /// Index or per-triangle data.
    Index,
    #[default]
    Unknown,
}

/// Semantic identity of a stream, such as `{Vertex, "Position"}`.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct StreamKey {
    kind: StreamKind,
    name: Cow<'static, str>,
}

impl StreamKey {
    pub fn new(kind: StreamKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: Cow::Owned(name.into()),
        }
    }

    pub const fn new_static(kind: StreamKind, name: &'static str) -> Self {
        Self {
            kind,
            name: Cow::Borrowed(name),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for StreamKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.name)
    }
}

/// A growable, strided array of rows holding one mesh attribute.
///
/// Rows are stored as raw bytes described by a [`BufferLayout`]. Typed access happens either
/// directly through [`Stream::get`]/[`Stream::set`] when the caller knows the stored row type, or
/// through the accessor types in [`crate::accessor`] which may convert on the fly.
///
/// Index arguments are checked with `debug_assert!` only; out of range slices still panic in
/// release builds because all storage is safe Rust.
pub struct Stream {
    key: StreamKey,
    layout: BufferLayout,

    // Always exactly `num * stride` bytes long; capacity is tracked by `max`
    data: Vec<u8>,

    num: usize,
    max: usize,
    link_pool: Option<String>,
}

impl Stream {
    pub fn new(key: StreamKey, layout: BufferLayout) -> Self {
        Self {
            key,
            layout,
            data: vec![],
            num: 0,
            max: 0,
            link_pool: None,
        }
    }

    /// Creates an empty stream whose layout is inferred from the row type.
    pub fn with_type<T>(key: StreamKey) -> Self
    where
        T: MeshRow,
    {
        Self::new(key, T::LAYOUT)
    }

    /// Creates a stream holding a copy of the given rows.
    pub fn from_rows<T>(key: StreamKey, rows: &[T]) -> Self
    where
        T: MeshRow,
    {
        let mut res = Self::with_type::<T>(key);
        res.extend_from_slice(rows);
        res
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn element_type(&self) -> ElementType {
        self.layout.element_type()
    }

    pub fn num_elements(&self) -> usize {
        self.layout.num_elements()
    }

    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.num
    }

    /// The number of rows which fit in the current allocation.
    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.num == 0
    }

    pub fn is_valid_index(&self, row: usize) -> bool {
        row < self.num
    }

    /// Size in bytes of the current allocation.
    pub fn allocated_size(&self) -> usize {
        self.max * self.stride()
    }

    /// Rows which are allocated but unused.
    pub fn slack(&self) -> usize {
        self.max - self.num
    }

    /// The link pool this stream belongs to, if it is owned by a set and linked.
    pub fn link_pool(&self) -> Option<&str> {
        self.link_pool.as_deref()
    }

    pub fn is_linked(&self) -> bool {
        self.link_pool.is_some()
    }

    pub(crate) fn set_link_pool(&mut self, link_pool: Option<String>) {
        self.link_pool = link_pool;
    }

    pub(crate) fn set_key(&mut self, key: StreamKey) {
        self.key = key;
    }

    /// Appends `count` rows and returns the index of the first one.
    ///
    /// New rows must be written before they are read; their contents are not specified.
    pub fn add_uninitialized(&mut self, count: usize) -> usize {
        let start = self.num;
        self.set_num_zeroed(start + count);

        start
    }

    /// Appends `count` zero-filled rows and returns the index of the first one.
    pub fn add_zeroed(&mut self, count: usize) -> usize {
        let start = self.num;
        self.set_num_zeroed(start + count);

        start
    }

    /// Appends one row.
    pub fn push<T>(&mut self, row: T) -> usize
    where
        T: MeshRow,
    {
        let idx = self.add_uninitialized(1);
        self.set(idx, &row);

        idx
    }

    /// Appends rows and returns the index of the first one.
    pub fn extend_from_slice<T>(&mut self, rows: &[T]) -> usize
    where
        T: MeshRow,
    {
        self.assert_row_type::<T>();

        let stride = self.stride();
        let start = self.add_uninitialized(rows.len());
        self.data[start * stride..].copy_from_slice(bytemuck::cast_slice(rows));

        start
    }

    /// Ensures the allocation holds at least `num` rows.
    pub fn reserve(&mut self, num: usize) {
        if num > self.max {
            self.resize_allocation(num);
        }
    }

    /// Releases all slack.
    pub fn shrink(&mut self) {
        if self.max != self.num {
            self.resize_allocation(self.num);
        }
    }

    /// Removes all rows. The allocation is resized to `expected_size` rows unless it already
    /// holds between `expected_size` and `expected_size + max_slack` rows.
    pub fn empty(&mut self, expected_size: usize, max_slack: usize) {
        self.set_num_uninitialized(0);

        if self.max < expected_size || self.max > expected_size + max_slack {
            self.resize_allocation(expected_size);
        }
    }

    /// Sets the row count. Rows past the previous end are not specified.
    pub fn set_num_uninitialized(&mut self, num: usize) {
        self.set_num_zeroed(num);
    }

    /// Sets the row count, zero-filling rows past the previous end.
    pub fn set_num_zeroed(&mut self, num: usize) {
        debug_assert!(num == 0 || self.layout.is_valid());

        if num > self.max {
            self.resize_allocation(calculate_slack_grow(num, self.max));
        }

        self.data.resize(num * self.stride(), 0);
        self.num = num;
    }

    /// Removes `count` rows starting at `index`, moving the tail down to keep row order.
    ///
    /// This is `O(rows after index)`.
    pub fn remove_at(&mut self, index: usize, count: usize, allow_shrink: bool) {
        assert!(
            index + count <= self.num,
            "Remove range {index}..{} out of bounds ({} rows)",
            index + count,
            self.num
        );

        if count == 0 {
            return;
        }

        let stride = self.stride();
        self.data.drain(index * stride..(index + count) * stride);
        self.num -= count;

        if allow_shrink {
            let max = calculate_slack_shrink(self.num, self.max, stride);
            if max != self.max {
                self.resize_allocation(max);
            }
        }
    }

    /// Resizes the allocation to exactly `max` rows.
    pub(crate) fn resize_allocation(&mut self, max: usize) {
        assert!(
            max >= self.num,
            "Allocation of {max} rows can not hold {} rows",
            self.num
        );

        let bytes = max * self.stride();
        if bytes > self.data.capacity() {
            self.data.reserve_exact(bytes - self.data.len());
        } else {
            self.data.shrink_to(bytes);
        }

        self.max = max;
    }

    /// All rows as raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn row_bytes(&self, row: usize) -> &[u8] {
        debug_assert!(self.is_valid_index(row), "Row {row} out of bounds ({})", self.num);

        let stride = self.stride();
        &self.data[row * stride..(row + 1) * stride]
    }

    pub fn row_bytes_mut(&mut self, row: usize) -> &mut [u8] {
        debug_assert!(self.is_valid_index(row), "Row {row} out of bounds ({})", self.num);

        let stride = self.stride();
        &mut self.data[row * stride..(row + 1) * stride]
    }

    /// Bounds-checked in every build configuration.
    pub fn row_checked(&self, row: usize) -> Option<&[u8]> {
        self.is_valid_index(row).then(|| self.row_bytes(row))
    }

    pub fn element_bytes(&self, row: usize, element: usize) -> &[u8] {
        debug_assert!(element < self.num_elements());

        let size = self.element_type().size();
        &self.row_bytes(row)[element * size..(element + 1) * size]
    }

    pub fn element_bytes_mut(&mut self, row: usize, element: usize) -> &mut [u8] {
        debug_assert!(element < self.num_elements());

        let size = self.element_type().size();
        &mut self.row_bytes_mut(row)[element * size..(element + 1) * size]
    }

    fn assert_row_type<T>(&self)
    where
        T: MeshRow,
    {
        assert_eq!(
            size_of::<T>(),
            self.stride(),
            "Row type does not match the stride of {}",
            self.key
        );
        debug_assert!(self.is_of_type::<T>(), "{} is {:?}", self.key, self.layout);
    }

    /// Reads one row stored exactly as `T`.
    pub fn get<T>(&self, row: usize) -> T
    where
        T: MeshRow,
    {
        self.assert_row_type::<T>();

        pod_read_unaligned(self.row_bytes(row))
    }

    /// Writes one row stored exactly as `T`.
    pub fn set<T>(&mut self, row: usize, value: &T)
    where
        T: MeshRow,
    {
        self.assert_row_type::<T>();

        self.row_bytes_mut(row).copy_from_slice(bytes_of(value));
    }

    /// Iterates all rows stored exactly as `T`.
    pub fn iter<T>(&self) -> impl ExactSizeIterator<Item = T> + '_
    where
        T: MeshRow,
    {
        self.assert_row_type::<T>();

        self.data
            .chunks_exact(self.stride().max(1))
            .take(self.num)
            .map(pod_read_unaligned)
    }

    /// Iterates every element of every row, in order, stored exactly as `E`.
    pub fn elements<E>(&self) -> impl Iterator<Item = E> + '_
    where
        E: MeshElement,
    {
        assert_eq!(
            E::ELEMENT_TYPE,
            self.element_type(),
            "Element type does not match {}",
            self.key
        );

        self.data.chunks_exact(size_of::<E>()).map(pod_read_unaligned)
    }

    pub fn is_of_type<T>(&self) -> bool
    where
        T: MeshRow,
    {
        self.is_of_layout(T::LAYOUT)
    }

    pub fn is_of_layout(&self, layout: BufferLayout) -> bool {
        self.layout == layout
    }

    /// `true` when the element counts match and the element types match or have a registered
    /// converter.
    pub fn can_convert_to(&self, layout: BufferLayout) -> bool {
        self.layout.num_elements() == layout.num_elements()
            && can_convert(self.element_type(), layout.element_type())
    }

    pub fn can_convert_to_type<T>(&self) -> bool
    where
        T: MeshRow,
    {
        self.can_convert_to(T::LAYOUT)
    }

    /// Converts all rows in place to the new layout.
    ///
    /// # Panics
    ///
    /// Panics unless [`Stream::can_convert_to`] is `true` for `layout`.
    pub fn convert_to(&mut self, layout: BufferLayout) {
        assert!(
            self.can_convert_to(layout),
            "Unable to convert {} from {:?} to {layout:?}",
            self.key,
            self.layout
        );

        if self.layout == layout {
            return;
        }

        if self.num == 0 {
            self.layout = layout;
            self.data = Vec::with_capacity(self.max * layout.stride());

            return;
        }

        trace!(
            "Converting {} ({} rows) from {:?} to {:?}",
            self.key,
            self.num,
            self.layout.element_type(),
            layout.element_type()
        );

        let converter = get_converter(self.element_type(), layout.element_type());
        let src = take(&mut self.data);

        let mut data = Vec::with_capacity(self.max * layout.stride());
        data.resize(self.num * layout.stride(), 0);
        converter.convert_contiguous(&src, &mut data, self.num * layout.num_elements());

        self.data = data;
        self.layout = layout;
    }

    pub fn convert_to_type<T>(&mut self)
    where
        T: MeshRow,
    {
        self.convert_to(T::LAYOUT)
    }

    /// Converts in place if possible, returning `false` and leaving the stream untouched
    /// otherwise.
    pub fn try_convert_to(&mut self, layout: BufferLayout) -> bool {
        if !self.can_convert_to(layout) {
            return false;
        }

        self.convert_to(layout);

        true
    }

    /// Writes `row`, which must be raw bytes in this stream's layout, into `count` rows.
    pub fn fill_range(&mut self, start: usize, count: usize, row: &[u8]) {
        let stride = self.stride();

        assert_eq!(row.len(), stride);
        assert!(start + count <= self.num);

        for dst in self.data[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
            dst.copy_from_slice(row);
        }
    }

    /// Writes `value` into `count` rows, converting it first if `T` is not the stored row type.
    pub fn fill_range_with<T>(&mut self, start: usize, count: usize, value: &T)
    where
        T: MeshRow,
    {
        self.fill_range_from(start, count, T::LAYOUT, bytes_of(value));
    }

    /// Writes `row`, raw bytes in `layout`, into `count` rows.
    pub fn fill_range_from(&mut self, start: usize, count: usize, layout: BufferLayout, row: &[u8]) {
        if layout == self.layout {
            self.fill_range(start, count, row);

            return;
        }

        assert_eq!(layout.num_elements(), self.num_elements());

        let converter = get_converter(layout.element_type(), self.element_type());
        let mut converted = vec![0; self.stride()];
        converter.convert_contiguous(row, &mut converted, layout.num_elements());

        self.fill_range(start, count, &converted);
    }

    /// Appends the rows of another stream, converting them if the layouts differ.
    ///
    /// # Panics
    ///
    /// Panics if the element counts differ or no converter is registered.
    pub fn append(&mut self, other: &Stream) {
        if !self.layout.is_valid() && self.is_empty() {
            self.layout = other.layout;
        }

        assert_eq!(
            self.num_elements(),
            other.num_elements(),
            "Unable to append {} to {}",
            other.key,
            self.key
        );

        if other.is_empty() {
            return;
        }

        let same_layout = self.layout == other.layout;
        let element_type = self.element_type();
        let start = self.add_uninitialized(other.num);
        let dst = &mut self.data[start * self.layout.stride()..];

        if same_layout {
            dst.copy_from_slice(&other.data);
        } else {
            get_converter(other.element_type(), element_type).convert_contiguous(
                &other.data,
                dst,
                other.num * other.num_elements(),
            );
        }
    }

    /// Appends the rows of another stream, taking its storage when this stream is empty.
    pub fn append_owned(&mut self, other: Stream) {
        let same_layout = self.layout == other.layout || !self.layout.is_valid();
        if self.is_empty() && same_layout && self.max <= other.max {
            self.layout = other.layout;
            self.data = other.data;
            self.num = other.num;
            self.max = other.max;
        } else {
            self.append(&other);
        }
    }

    /// Encodes this stream as a `[key][layout][rows: u32][bytes]` record.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .with_context(|| format!("Unable to encode {}", self.key))
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let (res, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())
            .context("Unable to decode stream")?;

        Ok(res)
    }

    pub fn write_to(&self, mut writer: impl Write) -> anyhow::Result<()> {
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .with_context(|| format!("Unable to write {}", self.key))?;

        Ok(())
    }

    pub fn read_from(mut reader: impl Read) -> anyhow::Result<Self> {
        bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .context("Unable to read stream")
    }
}

/// Growth policy for appends: geometric so that repeated small appends stay amortized O(1).
fn calculate_slack_grow(num: usize, max: usize) -> usize {
    debug_assert!(num > max);

    if max == 0 && num <= 4 {
        4
    } else {
        num + 3 * num / 8 + 16
    }
}

/// Shrink policy for removals: only release memory once the slack is both large relative to the
/// row count and large in bytes.
fn calculate_slack_shrink(num: usize, max: usize, stride: usize) -> usize {
    let slack = max - num;
    if (slack > 3 * num && slack * stride >= 16_384) || (num == 0 && max > 0) {
        num
    } else {
        max
    }
}

impl Clone for Stream {
    /// Copies are never linked.
    fn clone(&self) -> Self {
        let mut data = Vec::with_capacity(self.allocated_size());
        data.extend_from_slice(&self.data);

        Self {
            key: self.key.clone(),
            layout: self.layout,
            data,
            num: self.num,
            max: self.max,
            link_pool: None,
        }
    }
}

impl Debug for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("key", &self.key)
            .field("layout", &self.layout)
            .field("num", &self.num)
            .field("max", &self.max)
            .field("link_pool", &self.link_pool)
            .finish()
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new(StreamKey::default(), BufferLayout::INVALID)
    }
}

impl PartialEq for Stream {
    /// Compares identity, layout and row contents; capacity and linkage are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.layout == other.layout && self.data == other.data
    }
}

#[derive(Serialize)]
struct StreamRecordRef<'a> {
    key: &'a StreamKey,
    layout: BufferLayout,
    num: u32,

    #[serde(with = "serde_bytes")]
    data: &'a [u8],
}

#[derive(Deserialize)]
struct StreamRecord {
    key: StreamKey,
    layout: BufferLayout,
    num: u32,

    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
}

impl Serialize for Stream {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let num = u32::try_from(self.num).map_err(S::Error::custom)?;

        StreamRecordRef {
            key: &self.key,
            layout: self.layout,
            num,
            data: &self.data,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Stream {
    /// Loaded streams are unlinked; binding them into a set re-synchronizes any linkage.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let record = StreamRecord::deserialize(deserializer)?;
        let num = record.num as usize;
        let layout = record.layout;

        if !layout.element_type().is_well_formed() || (num > 0 && !layout.is_valid()) {
            return Err(D::Error::custom(format!(
                "{} has {num} rows of malformed layout {layout:?}",
                record.key
            )));
        }

        if record.data.len() != num * record.layout.stride() {
            return Err(D::Error::custom(format!(
                "{} holds {} bytes, expected {num} rows of {} bytes",
                record.key,
                record.data.len(),
                record.layout.stride()
            )));
        }

        Ok(Self {
            key: record.key,
            layout: record.layout,
            data: record.data,
            num,
            max: num,
            link_pool: None,
        })
    }
}
