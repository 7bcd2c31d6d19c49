use {
    crate::{
        convert::can_convert,
        stream::{Stream, StreamKey},
        types::{BufferLayout, MeshRow},
    },
    bytemuck::bytes_of,
    log::{trace, warn},
    std::collections::BTreeMap,
};

/// One raw row value, with its layout, used to fill rows a linkage adds to a member stream.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultRow {
    layout: BufferLayout,
    bytes: Vec<u8>,
}

impl DefaultRow {
    pub fn new<T>(value: &T) -> Self
    where
        T: MeshRow,
    {
        Self {
            layout: T::LAYOUT,
            bytes: bytes_of(value).to_vec(),
        }
    }

    pub fn from_raw(layout: BufferLayout, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();

        assert_eq!(bytes.len(), layout.stride());

        Self { layout, bytes }
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes this value into `count` rows of `stream` starting at `start`. Rows are left as they
    /// are (zeroed) when the stream has since changed to a layout this value can not convert to.
    fn fill(&self, stream: &mut Stream, start: usize, count: usize) {
        if count == 0 {
            return;
        }

        let convertible = self.layout.num_elements() == stream.num_elements()
            && can_convert(self.layout.element_type(), stream.element_type());

        if convertible {
            stream.fill_range_from(start, count, self.layout, &self.bytes);
        } else {
            warn!(
                "Default {:?} does not fit {} ({:?}); new rows are zeroed",
                self.layout,
                stream.key(),
                stream.layout()
            );
        }
    }
}

#[derive(Clone, Debug)]
struct LinkMember {
    key: StreamKey,
    default: Option<DefaultRow>,
}

/// Keeps the row count and capacity of a group of streams equal.
///
/// A linkage does not own its members: it names them by key and is handed the owning map whenever
/// a change must be propagated. Streams record the pool they belong to by name, so neither side
/// holds a pointer to the other.
#[derive(Clone, Debug, Default)]
pub struct StreamLinkage {
    num: usize,
    max: usize,
    members: Vec<LinkMember>,
}

impl StreamLinkage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared row count.
    pub fn len(&self) -> usize {
        self.num
    }

    /// The shared capacity, in rows.
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// `true` when no stream is bound.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.members.iter().any(|member| &member.key == key)
    }

    /// Member keys in bind order.
    pub fn members(&self) -> impl ExactSizeIterator<Item = &StreamKey> + '_ {
        self.members.iter().map(|member| &member.key)
    }

    /// The fill value recorded for a member.
    pub fn default_of(&self, key: &StreamKey) -> Option<&DefaultRow> {
        self.members
            .iter()
            .find(|member| &member.key == key)
            .and_then(|member| member.default.as_ref())
    }

    /// Adds an unlinked stream to this linkage.
    ///
    /// The first stream bound sets the shared sizes. Later streams are resized to match: longer
    /// streams are truncated, shorter ones are extended with `default` (or zeroes).
    pub(crate) fn bind_stream(
        &mut self,
        pool: &str,
        stream: &mut Stream,
        default: Option<DefaultRow>,
    ) {
        assert!(
            !stream.is_linked(),
            "{} is already linked to {:?}",
            stream.key(),
            stream.link_pool()
        );

        if self.members.is_empty() {
            self.num = stream.len();
            self.max = stream.capacity();
        } else {
            if stream.len() > self.num {
                stream.set_num_uninitialized(self.num);
            }

            stream.resize_allocation(self.max);

            let start = stream.len();
            if start < self.num {
                stream.set_num_zeroed(self.num);

                if let Some(default) = &default {
                    default.fill(stream, start, self.num - start);
                }
            }
        }

        trace!(
            "Linked {} into {pool} ({} rows, {} allocated)",
            stream.key(),
            self.num,
            self.max
        );

        stream.set_link_pool(Some(pool.to_owned()));
        self.members.push(LinkMember {
            key: stream.key().clone(),
            default,
        });
    }

    /// Detaches a stream without changing its size.
    pub(crate) fn unlink(&mut self, stream: &mut Stream) -> bool {
        let removed = self.remove(stream.key());
        stream.set_link_pool(None);

        removed
    }

    /// Forgets a member whose stream no longer exists.
    pub(crate) fn remove(&mut self, key: &StreamKey) -> bool {
        let len = self.members.len();
        self.members.retain(|member| &member.key != key);

        len != self.members.len()
    }

    /// Resizes the allocation of every member other than `source`.
    pub(crate) fn handle_allocated_size_changed(
        &mut self,
        source: &StreamKey,
        max: usize,
        streams: &mut BTreeMap<StreamKey, Stream>,
    ) {
        self.max = max;

        for member in self.members.iter().filter(|member| &member.key != source) {
            let Some(stream) = streams.get_mut(&member.key) else {
                debug_assert!(false, "Linked stream {} is missing", member.key);
                continue;
            };

            assert!(
                max >= stream.len(),
                "Allocation of {max} rows can not hold {} ({} rows)",
                member.key,
                stream.len()
            );

            stream.resize_allocation(max);
        }
    }

    /// Sets the row count of every member other than `source`, filling new rows with each
    /// member's own default.
    pub(crate) fn handle_num_changed(
        &mut self,
        source: &StreamKey,
        num: usize,
        streams: &mut BTreeMap<StreamKey, Stream>,
    ) {
        self.num = num;

        for member in self.members.iter().filter(|member| &member.key != source) {
            let Some(stream) = streams.get_mut(&member.key) else {
                debug_assert!(false, "Linked stream {} is missing", member.key);
                continue;
            };

            let start = stream.len();
            if num < start {
                stream.set_num_uninitialized(num);
            } else if num > start {
                stream.set_num_zeroed(num);

                if let Some(default) = &member.default {
                    default.fill(stream, start, num - start);
                }
            }
        }
    }

    /// `true` when every member exists and has the shared row count and capacity.
    pub(crate) fn check_streams(&self, streams: &BTreeMap<StreamKey, Stream>) -> bool {
        self.members.iter().all(|member| {
            streams
                .get(&member.key)
                .is_some_and(|stream| stream.len() == self.num && stream.capacity() == self.max)
        })
    }

    pub(crate) fn member_defaults(
        &self,
    ) -> impl Iterator<Item = (&StreamKey, Option<&DefaultRow>)> + '_ {
        self.members
            .iter()
            .map(|member| (&member.key, member.default.as_ref()))
    }
}
