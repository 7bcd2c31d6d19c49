use {
    crate::{
        linkage::{DefaultRow, StreamLinkage},
        stream::{Stream, StreamKey},
        types::BufferLayout,
    },
    log::{trace, warn},
    std::{
        collections::{BTreeMap, BTreeSet},
        mem::take,
        ops::{Deref, DerefMut},
        thread::panicking,
    },
};

/// A named collection of streams plus the link pools which keep groups of them the same length.
///
/// Streams are kept in key order: [`StreamSet::iter`], [`StreamSet::for_each`] and
/// [`StreamSet::stream_keys`] always visit streams ordered by [`StreamKey`] (kind, then name),
/// independent of insertion order.
///
/// Mutable access to an owned stream is handed out as a [`StreamMut`] guard. Size changes made
/// through the guard reach the rest of the stream's link pool when the guard is dropped.
#[derive(Debug, Default)]
pub struct StreamSet {
    streams: BTreeMap<StreamKey, Stream>,
    link_pools: BTreeMap<String, StreamLinkage>,
}

impl StreamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.streams.contains_key(key)
    }

    pub fn find(&self, key: &StreamKey) -> Option<&Stream> {
        self.streams.get(key)
    }

    /// # Panics
    ///
    /// Panics if there is no stream at `key`.
    pub fn find_checked(&self, key: &StreamKey) -> &Stream {
        self.streams
            .get(key)
            .unwrap_or_else(|| panic!("Stream {key} not found"))
    }

    pub fn find_mut(&mut self, key: &StreamKey) -> Option<StreamMut<'_>> {
        let (key, stream) = self.streams.remove_entry(key)?;

        Some(StreamMut::new(self, key, stream))
    }

    /// # Panics
    ///
    /// Panics if there is no stream at `key`.
    pub fn find_checked_mut(&mut self, key: &StreamKey) -> StreamMut<'_> {
        self.find_mut(key)
            .unwrap_or_else(|| panic!("Stream {key} not found"))
    }

    /// Mutable access to row values only. Callers must not change the row count or capacity.
    pub(crate) fn find_values_mut(&mut self, key: &StreamKey) -> Option<&mut Stream> {
        self.streams.get_mut(key)
    }

    /// Returns the stream at `key`, creating it with `layout` if needed.
    ///
    /// An existing stream is emptied first unless `keep_existing` is set, and is converted to
    /// `layout` when possible. A stream which can not be converted keeps its current layout and a
    /// warning is logged; check [`Stream::is_of_layout`] on the result when it matters.
    pub fn find_or_add(
        &mut self,
        key: StreamKey,
        layout: BufferLayout,
        keep_existing: bool,
    ) -> StreamMut<'_> {
        if !self.streams.contains_key(&key) {
            self.streams.insert(key.clone(), Stream::new(key.clone(), layout));
        }

        let mut stream = self.find_checked_mut(&key);

        if !keep_existing {
            stream.set_num_uninitialized(0);
        }

        if !stream.is_of_layout(layout) && !stream.try_convert_to(layout) {
            warn!(
                "Unable to convert {key} from {:?} to {layout:?}",
                stream.layout()
            );
        }

        stream
    }

    /// Adds an empty stream, replacing any stream already at `key`.
    pub fn add_stream(&mut self, key: StreamKey, layout: BufferLayout) -> StreamMut<'_> {
        self.insert(Stream::new(key.clone(), layout));
        self.find_checked_mut(&key)
    }

    /// Adds a stream under its own key, returning the stream it replaced (unlinked).
    pub fn insert(&mut self, mut stream: Stream) -> Option<Stream> {
        debug_assert!(!stream.is_linked());

        stream.set_link_pool(None);

        let key = stream.key().clone();
        let res = self.take(&key);
        self.streams.insert(key, stream);

        res
    }

    /// Removes and returns the stream at `key`, detached from any link pool.
    pub fn take(&mut self, key: &StreamKey) -> Option<Stream> {
        let mut stream = self.streams.remove(key)?;

        if let Some(pool) = stream.link_pool().map(str::to_owned) {
            if let Some(linkage) = self.link_pools.get_mut(&pool) {
                linkage.unlink(&mut stream);
            }

            self.remove_empty_pool(&pool);
        }

        stream.set_link_pool(None);

        Some(stream)
    }

    /// Returns the number of streams removed (0 or 1).
    pub fn remove(&mut self, key: &StreamKey) -> usize {
        self.take(key).is_some() as usize
    }

    /// Returns the number of streams removed.
    pub fn remove_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a StreamKey>) -> usize {
        keys.into_iter().map(|key| self.remove(key)).sum()
    }

    pub fn stream_keys(&self) -> BTreeSet<StreamKey> {
        self.streams.keys().cloned().collect()
    }

    /// Keys present in this set but not in `other`.
    pub fn find_difference(&self, other: &StreamSet) -> BTreeSet<StreamKey> {
        self.streams
            .keys()
            .filter(|key| !other.contains(key))
            .cloned()
            .collect()
    }

    /// Links the stream at `key` into `pool`, creating the pool on first use.
    ///
    /// Rows the pool adds to this stream are filled with `default`, or zeroed. Linking a stream
    /// into the pool it already belongs to does nothing. Returns `false` if there is no stream at
    /// `key`.
    ///
    /// # Panics
    ///
    /// Panics if the stream belongs to a different pool.
    pub fn add_stream_to_link_pool(
        &mut self,
        pool: &str,
        key: &StreamKey,
        default: Option<DefaultRow>,
    ) -> bool {
        let Some(stream) = self.streams.get_mut(key) else {
            warn!("Unable to link missing stream {key} into {pool}");

            return false;
        };

        match stream.link_pool() {
            Some(current) if current == pool => return true,
            Some(current) => panic!("{key} is linked to {current}, can not link it into {pool}"),
            None => (),
        }

        let linkage = self.link_pools.entry(pool.to_owned()).or_insert_with(|| {
            trace!("Created link pool {pool}");

            StreamLinkage::new()
        });

        linkage.bind_stream(pool, stream, default);

        debug_assert!(linkage.check_streams(&self.streams));

        true
    }

    /// Detaches the stream at `key` from its pool without changing its size.
    pub fn remove_stream_from_link_pool(&mut self, key: &StreamKey) -> bool {
        let Some(stream) = self.streams.get_mut(key) else {
            return false;
        };

        let Some(pool) = stream.link_pool().map(str::to_owned) else {
            return false;
        };

        let removed = self
            .link_pools
            .get_mut(&pool)
            .is_some_and(|linkage| linkage.unlink(stream));
        stream.set_link_pool(None);

        self.remove_empty_pool(&pool);

        removed
    }

    fn remove_empty_pool(&mut self, pool: &str) {
        if self.link_pools.get(pool).is_some_and(StreamLinkage::is_empty) {
            trace!("Removed link pool {pool}");

            self.link_pools.remove(pool);
        }
    }

    pub fn link_pool_of(&self, key: &StreamKey) -> Option<&str> {
        self.streams.get(key).and_then(Stream::link_pool)
    }

    pub fn link_pool(&self, pool: &str) -> Option<&StreamLinkage> {
        self.link_pools.get(pool)
    }

    pub fn link_pool_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.link_pools.keys().map(String::as_str)
    }

    /// Streams in key order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Stream> + '_ {
        self.streams.values()
    }

    pub fn for_each(&self, f: impl FnMut(&Stream)) {
        self.streams.values().for_each(f);
    }

    /// Calls `f` with mutable access to each stream in key order; size changes propagate through
    /// link pools after each call.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut Stream)) {
        for key in self.stream_keys() {
            if let Some(mut stream) = self.find_mut(&key) {
                f(&mut stream);
            }
        }
    }

    /// Replaces the contents of this set with a deep copy of `other`.
    pub fn copy_from(&mut self, other: &StreamSet) {
        *self = other.clone();
    }

    fn propagate(&mut self, pool: &str, key: &StreamKey, old: (usize, usize), new: (usize, usize)) {
        let Some(linkage) = self.link_pools.get_mut(pool) else {
            return;
        };

        let ((old_num, old_max), (num, max)) = (old, new);

        // Keep capacity >= length for every member at every step
        if num < old_num {
            linkage.handle_num_changed(key, num, &mut self.streams);

            if max != old_max {
                linkage.handle_allocated_size_changed(key, max, &mut self.streams);
            }
        } else {
            if max != old_max {
                linkage.handle_allocated_size_changed(key, max, &mut self.streams);
            }

            if num != old_num {
                linkage.handle_num_changed(key, num, &mut self.streams);
            }
        }

        debug_assert!(linkage.check_streams(&self.streams));
    }
}

impl Clone for StreamSet {
    /// Deep-copies every stream and rebuilds every link pool with the recorded defaults.
    fn clone(&self) -> Self {
        let mut res = Self {
            streams: self.streams.clone(),
            link_pools: BTreeMap::new(),
        };

        for (pool, linkage) in &self.link_pools {
            for (key, default) in linkage.member_defaults() {
                res.add_stream_to_link_pool(pool, key, default.cloned());
            }
        }

        res
    }
}

impl<'a> IntoIterator for &'a StreamSet {
    type Item = &'a Stream;
    type IntoIter = std::collections::btree_map::Values<'a, StreamKey, Stream>;

    fn into_iter(self) -> Self::IntoIter {
        self.streams.values()
    }
}

/// Mutable access to a stream owned by a [`StreamSet`].
///
/// The stream is moved out of the set while the guard lives. Dropping the guard puts it back and
/// resizes every other stream in its link pool to match.
pub struct StreamMut<'a> {
    set: &'a mut StreamSet,
    key: StreamKey,
    stream: Stream,
    link_pool: Option<String>,
    num: usize,
    max: usize,
}

impl<'a> StreamMut<'a> {
    fn new(set: &'a mut StreamSet, key: StreamKey, stream: Stream) -> Self {
        Self {
            set,
            key,
            link_pool: stream.link_pool().map(str::to_owned),
            num: stream.len(),
            max: stream.capacity(),
            stream,
        }
    }
}

impl Deref for StreamMut<'_> {
    type Target = Stream;

    fn deref(&self) -> &Stream {
        &self.stream
    }
}

impl DerefMut for StreamMut<'_> {
    fn deref_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }
}

impl Drop for StreamMut<'_> {
    fn drop(&mut self) {
        let mut stream = take(&mut self.stream);
        stream.set_key(self.key.clone());
        stream.set_link_pool(self.link_pool.clone());

        let new = (stream.len(), stream.capacity());
        self.set.streams.insert(self.key.clone(), stream);

        if panicking() {
            return;
        }

        if let Some(pool) = &self.link_pool {
            self.set
                .propagate(pool, &self.key, (self.num, self.max), new);
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{Color, keys, types::MeshRow},
        glam::{Vec2, Vec3},
    };

    fn linked_set() -> StreamSet {
        let mut set = StreamSet::new();
        set.add_stream(keys::POSITION, Vec3::LAYOUT);
        set.add_stream(keys::COLOR, Color::LAYOUT);
        set.add_stream(keys::TEX_COORDS, Vec2::LAYOUT);

        assert!(set.add_stream_to_link_pool(keys::VERTICES_POOL, &keys::POSITION, None));
        assert!(set.add_stream_to_link_pool(
            keys::VERTICES_POOL,
            &keys::COLOR,
            Some(DefaultRow::new(&Color::WHITE))
        ));
        assert!(set.add_stream_to_link_pool(keys::VERTICES_POOL, &keys::TEX_COORDS, None));

        set
    }

    fn assert_in_sync(set: &StreamSet) {
        let position = set.find_checked(&keys::POSITION);

        for stream in set.iter() {
            assert_eq!(stream.len(), position.len(), "{}", stream.key());
            assert_eq!(stream.capacity(), position.capacity(), "{}", stream.key());
        }
    }

    #[test]
    fn linked_streams_stay_in_sync() {
        let mut set = linked_set();

        set.find_checked_mut(&keys::POSITION).add_uninitialized(3);
        assert_in_sync(&set);

        set.find_checked_mut(&keys::COLOR).set_num_zeroed(40);
        assert_in_sync(&set);

        set.find_checked_mut(&keys::TEX_COORDS).remove_at(5, 30, true);
        assert_in_sync(&set);

        set.find_checked_mut(&keys::POSITION).remove_at(0, 10, true);
        assert_in_sync(&set);

        assert!(set.find_checked(&keys::POSITION).is_empty());
        assert_eq!(set.find_checked(&keys::POSITION).capacity(), 0);

        set.find_checked_mut(&keys::POSITION).reserve(1000);
        assert_in_sync(&set);

        set.find_checked_mut(&keys::COLOR).empty(8, 0);
        assert_in_sync(&set);

        assert_eq!(set.link_pool(keys::VERTICES_POOL).unwrap().capacity(), 8);
    }

    #[test]
    fn new_rows_use_member_defaults() {
        let mut set = linked_set();
        set.find_checked_mut(&keys::POSITION).push(Vec3::ONE);

        assert_eq!(set.find_checked(&keys::COLOR).get::<Color>(0), Color::WHITE);
        assert_eq!(set.find_checked(&keys::TEX_COORDS).get::<Vec2>(0), Vec2::ZERO);
    }

    #[test]
    fn link_pool_membership() {
        let mut set = linked_set();

        assert_eq!(set.link_pool_of(&keys::COLOR), Some(keys::VERTICES_POOL));
        assert!(set.add_stream_to_link_pool(keys::VERTICES_POOL, &keys::COLOR, None));
        assert!(!set.add_stream_to_link_pool(keys::VERTICES_POOL, &keys::TRIANGLES, None));
        assert_eq!(set.link_pool(keys::VERTICES_POOL).unwrap().members().len(), 3);

        assert!(set.remove_stream_from_link_pool(&keys::COLOR));
        assert!(!set.remove_stream_from_link_pool(&keys::COLOR));
        assert_eq!(set.link_pool_of(&keys::COLOR), None);

        set.find_checked_mut(&keys::POSITION).add_zeroed(2);

        assert!(set.find_checked(&keys::COLOR).is_empty());
        assert_eq!(set.find_checked(&keys::TEX_COORDS).len(), 2);
    }

    #[test]
    #[should_panic]
    fn link_into_second_pool() {
        let mut set = linked_set();
        set.add_stream_to_link_pool(keys::TRIANGLES_POOL, &keys::POSITION, None);
    }

    #[test]
    fn remove_cleans_up_pools() {
        let mut set = linked_set();

        assert_eq!(set.remove(&keys::POSITION), 1);
        assert_eq!(set.remove(&keys::POSITION), 0);
        assert_eq!(set.link_pool_names().count(), 1);

        let removed = set.remove_all(&[keys::COLOR, keys::TEX_COORDS, keys::TRIANGLES]);

        assert_eq!(removed, 2);
        assert!(set.is_empty());
        assert_eq!(set.link_pool_names().count(), 0);
    }

    #[test]
    fn insert_replaces_and_unlinks() {
        let mut set = linked_set();
        set.find_checked_mut(&keys::POSITION).add_zeroed(4);

        let old = set
            .insert(Stream::from_rows(keys::COLOR, &[Color::BLACK]))
            .unwrap();

        assert!(!old.is_linked());
        assert_eq!(old.len(), 4);
        assert_eq!(set.link_pool_of(&keys::COLOR), None);
        assert_eq!(set.find_checked(&keys::COLOR).len(), 1);
        assert_eq!(set.link_pool(keys::VERTICES_POOL).unwrap().members().len(), 2);
    }

    #[test]
    fn find_or_add_converts() {
        let mut set = StreamSet::new();
        set.insert(Stream::from_rows(keys::TRIANGLES, &[[0u16, 1, 2]]));

        let stream = set.find_or_add(keys::TRIANGLES, <[u32; 3]>::LAYOUT, true);

        assert!(stream.is_of_type::<[u32; 3]>());
        assert_eq!(stream.get::<[u32; 3]>(0), [0, 1, 2]);

        drop(stream);

        let stream = set.find_or_add(keys::TRIANGLES, <[u32; 3]>::LAYOUT, false);

        assert!(stream.is_empty());
    }

    #[test]
    fn find_or_add_keeps_unconvertible() {
        let mut set = StreamSet::new();
        set.insert(Stream::from_rows(keys::POSITION, &[Vec3::ONE]));

        let stream = set.find_or_add(keys::POSITION, u32::LAYOUT, true);

        assert!(stream.is_of_type::<Vec3>());
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn copy_is_independent() {
        let mut set = linked_set();
        set.find_checked_mut(&keys::POSITION).add_zeroed(4);

        let mut copy = StreamSet::new();
        copy.copy_from(&set);

        assert_eq!(copy.link_pool_of(&keys::COLOR), Some(keys::VERTICES_POOL));
        assert_eq!(copy.find_checked(&keys::COLOR).len(), 4);

        copy.find_checked_mut(&keys::POSITION).add_zeroed(100);
        copy.remove_stream_from_link_pool(&keys::TEX_COORDS);

        assert_eq!(set.find_checked(&keys::POSITION).len(), 4);
        assert_eq!(set.find_checked(&keys::COLOR).len(), 4);
        assert_eq!(set.link_pool_of(&keys::TEX_COORDS), Some(keys::VERTICES_POOL));
        assert_eq!(copy.find_checked(&keys::COLOR).len(), 104);
        assert_eq!(copy.find_checked(&keys::COLOR).get::<Color>(103), Color::WHITE);

        set.find_checked_mut(&keys::COLOR).remove_at(0, 4, true);

        assert_eq!(copy.find_checked(&keys::POSITION).len(), 104);
    }

    #[test]
    fn keys_and_difference() {
        let set = linked_set();
        let mut other = StreamSet::new();
        other.add_stream(keys::COLOR, Color::LAYOUT);
        other.add_stream(keys::TRIANGLES, <[u32; 3]>::LAYOUT);

        let difference = set.find_difference(&other);

        assert_eq!(difference.len(), 2);
        assert!(difference.contains(&keys::POSITION));
        assert!(difference.contains(&keys::TEX_COORDS));
        assert!(set.contains(&keys::COLOR));
        assert_eq!(set.stream_keys().len(), 3);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let mut set = StreamSet::new();
        set.add_stream(keys::TRIANGLES, <[u32; 3]>::LAYOUT);
        set.add_stream(keys::TEX_COORDS, Vec2::LAYOUT);
        set.add_stream(keys::POSITION, Vec3::LAYOUT);

        let names = set.iter().map(|stream| stream.key().name()).collect::<Vec<_>>();

        assert_eq!(names, ["Position", "TexCoords", "Triangles"]);
    }

    #[test]
    fn for_each_mut_propagates() {
        let mut set = linked_set();
        let mut visited = 0;
        set.for_each_mut(|stream| {
            visited += 1;
            stream.add_zeroed(1);
        });

        assert_eq!(visited, 3);
        assert_in_sync(&set);
        assert_eq!(set.find_checked(&keys::POSITION).len(), 3);
    }
}
