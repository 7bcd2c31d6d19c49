//! Polygon group (material section) algorithms over triangle and group id streams.

use {
    crate::{
        keys,
        stream::{Stream, StreamKey},
        stream_set::StreamSet,
        types::{IndexKind, IndexType, MeshRow, dispatch_index_kind},
    },
    bytemuck::{Pod, Zeroable},
    log::{trace, warn},
    serde::{Deserialize, Serialize},
    std::{
        collections::{BTreeMap, HashSet},
        hash::Hash,
        ops::Range,
    },
};

/// A contiguous run of triangles sharing one polygon group id.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Pod, Serialize, Zeroable,
)]
#[repr(C)]
pub struct PolygonGroupRange {
    pub start_index: i32,
    pub count: i32,
    pub polygon_group_index: i32,
}

impl PolygonGroupRange {
    pub const fn new(start_index: i32, count: i32, polygon_group_index: i32) -> Self {
        Self {
            start_index,
            count,
            polygon_group_index,
        }
    }

    /// The triangles covered by this run.
    pub fn triangles(&self) -> Range<usize> {
        let start = self.start_index.max(0) as usize;

        start..start + self.count.max(0) as usize
    }
}

impl MeshRow for PolygonGroupRange {
    type Element = i32;

    const NUM_ELEMENTS: u32 = 3;
}

/// The part of the vertex and index buffers one polygon group covers.
///
/// `indices` counts individual vertex indices (three per triangle), `vertices` spans the lowest
/// to one past the highest vertex those indices reference.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StreamRange {
    pub vertices: Range<u32>,
    pub indices: Range<u32>,
}

impl StreamRange {
    pub fn new(vertices: Range<u32>, indices: Range<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// The smallest range covering both ranges.
    pub fn hull(&self, other: &Self) -> Self {
        Self {
            vertices: self.vertices.start.min(other.vertices.start)
                ..self.vertices.end.max(other.vertices.end),
            indices: self.indices.start.min(other.indices.start)
                ..self.indices.end.max(other.indices.end),
        }
    }
}

fn index_kind_of(stream: &Stream) -> Option<IndexKind> {
    let kind = IndexKind::of(stream.element_type());

    if kind.is_none() {
        warn!(
            "{} holds {:?}, which is not an index type",
            stream.key(),
            stream.element_type()
        );
    }

    kind
}

fn group_kind_of(stream: &Stream) -> Option<IndexKind> {
    if stream.num_elements() != 1 {
        warn!("{} has {} group ids per row", stream.key(), stream.num_elements());

        return None;
    }

    index_kind_of(stream)
}

/// Fills `table` with the row order which stably sorts `groups` ascending.
pub fn sorted_remap_table<I>(groups: &[I], table: &mut Vec<u32>)
where
    I: Copy + Ord,
{
    table.clear();
    table.extend(0..groups.len() as u32);
    table.sort_by_key(|&row| groups[row as usize]);
}

/// Fills `table` with the row order which stably sorts a group id stream ascending.
///
/// Returns `false`, leaving `table` untouched, if the stream does not hold integer group ids.
pub fn generate_sorted_remap_table(poly_groups: &Stream, table: &mut Vec<u32>) -> bool {
    let Some(kind) = group_kind_of(poly_groups) else {
        return false;
    };

    dispatch_index_kind!(kind, I => {
        let groups = poly_groups.elements::<I>().collect::<Vec<_>>();
        sorted_remap_table(&groups, table);
    });

    true
}

/// Reorders whole rows so that row `i` becomes the previous row `table[i]`.
///
/// # Panics
///
/// Panics if the table and stream lengths differ.
pub fn apply_remap_table_to_stream(table: &[u32], stream: &mut Stream) {
    assert_eq!(
        table.len(),
        stream.len(),
        "Remap table does not match {}",
        stream.key()
    );

    let stride = stream.stride();
    let src = stream.data().to_vec();

    for (dst, &row) in stream.data_mut().chunks_exact_mut(stride).zip(table) {
        let start = row as usize * stride;
        dst.copy_from_slice(&src[start..start + stride]);
    }
}

/// Rows of `triangles` per triangle, if the triangle and group streams line up.
fn rows_per_triangle(triangles: &Stream, poly_groups: &Stream) -> Option<usize> {
    let elements = triangles.num_elements();

    if elements == 0 || 3 % elements != 0 {
        warn!(
            "{} has {elements} indices per row, which does not divide a triangle",
            triangles.key()
        );

        return None;
    }

    let rows_per_triangle = 3 / elements;
    if triangles.len() != poly_groups.len() * rows_per_triangle {
        warn!(
            "{} holds {} triangles but {} holds {} group ids",
            triangles.key(),
            triangles.len() / rows_per_triangle,
            poly_groups.key(),
            poly_groups.len()
        );

        return None;
    }

    Some(rows_per_triangle)
}

fn expand_remap_table(table: &[u32], rows_per_triangle: usize) -> Vec<u32> {
    if rows_per_triangle == 1 {
        return table.to_vec();
    }

    let rows = rows_per_triangle as u32;

    table
        .iter()
        .flat_map(|&triangle| (0..rows).map(move |row| triangle * rows + row))
        .collect()
}

/// Sorts triangles by polygon group, keeping the group id stream parallel.
///
/// `table` receives the applied remap table. Returns `false` without changing anything if the
/// streams do not line up or the group ids are not integers.
pub fn organize_triangles_by_polygon_group(
    triangles: &mut Stream,
    poly_groups: &mut Stream,
    table: &mut Vec<u32>,
) -> bool {
    let Some(rows_per_triangle) = rows_per_triangle(triangles, poly_groups) else {
        return false;
    };

    if !generate_sorted_remap_table(poly_groups, table) {
        return false;
    }

    apply_remap_table_to_stream(table, poly_groups);
    apply_remap_table_to_stream(&expand_remap_table(table, rows_per_triangle), triangles);

    true
}

/// `true` when each group id forms exactly one contiguous run.
pub fn are_polygon_group_indices_optimal<I>(groups: &[I]) -> bool
where
    I: Copy + Eq + Hash,
{
    let mut seen = HashSet::new();
    let mut last = None;

    for &group in groups {
        if last != Some(group) {
            if !seen.insert(group) {
                return false;
            }

            last = Some(group);
        }
    }

    true
}

/// `true` when no group id appears in more than one segment.
pub fn are_polygon_group_segments_optimal(segments: &[PolygonGroupRange]) -> bool {
    let mut seen = HashSet::new();

    segments
        .iter()
        .all(|segment| seen.insert(segment.polygon_group_index))
}

/// Type-erased [`are_polygon_group_indices_optimal`]; `false` for streams which do not hold
/// integer group ids.
pub fn is_poly_group_stream_optimal(poly_groups: &Stream) -> bool {
    let Some(kind) = group_kind_of(poly_groups) else {
        return false;
    };

    dispatch_index_kind!(kind, I => {
        are_polygon_group_indices_optimal(&poly_groups.elements::<I>().collect::<Vec<_>>())
    })
}

/// Calls `f` with each run of equal group ids, in order, including the trailing run.
pub fn gather_segments_from_polygon_group_indices<I>(
    groups: &[I],
    mut f: impl FnMut(PolygonGroupRange),
) where
    I: IndexType,
{
    let Some(&first) = groups.first() else {
        return;
    };

    let segment = |start: usize, end: usize, group: I| {
        let group = group.to_i64();

        debug_assert!(
            i32::try_from(group).is_ok(),
            "Polygon group {group} out of range"
        );

        PolygonGroupRange::new(start as i32, (end - start) as i32, group as i32)
    };

    let mut start = 0;
    let mut current = first;

    for (idx, &group) in groups.iter().enumerate().skip(1) {
        if group != current {
            f(segment(start, idx, current));
            start = idx;
            current = group;
        }
    }

    f(segment(start, groups.len(), current));
}

/// Type-erased [`gather_segments_from_polygon_group_indices`].
pub fn gather_segments(poly_groups: &Stream) -> Option<Vec<PolygonGroupRange>> {
    let kind = group_kind_of(poly_groups)?;
    let mut segments = vec![];

    dispatch_index_kind!(kind, I => {
        let groups = poly_groups.elements::<I>().collect::<Vec<_>>();
        gather_segments_from_polygon_group_indices(&groups, |segment| segments.push(segment));
    });

    Some(segments)
}

/// All vertex indices of a triangle stream, flattened.
fn triangle_indices(triangles: &Stream) -> Option<Vec<u32>> {
    let kind = index_kind_of(triangles)?;

    Some(dispatch_index_kind!(kind, I => {
        triangles
            .elements::<I>()
            .map(|index| {
                let index = index.to_i64();

                debug_assert!(
                    (0..u32::MAX as i64).contains(&index),
                    "Vertex index {index} out of range"
                );

                index as u32
            })
            .collect()
    }))
}

fn insert_range(ranges: &mut BTreeMap<i32, StreamRange>, group: i32, range: StreamRange) {
    if let Some(existing) = ranges.get_mut(&group) {
        warn!("Polygon group {group} is split into multiple segments; merging their ranges");

        *existing = existing.hull(&range);
    } else {
        ranges.insert(group, range);
    }
}

fn stream_ranges_from_indices(
    indices: &[u32],
    segments: impl IntoIterator<Item = PolygonGroupRange>,
) -> BTreeMap<i32, StreamRange> {
    let num_triangles = indices.len() / 3;
    let mut ranges = BTreeMap::new();

    for segment in segments {
        let triangles = segment.triangles();

        if triangles.is_empty() {
            continue;
        }

        if triangles.end > num_triangles {
            warn!(
                "Segment {segment:?} is past the last of {num_triangles} triangles; skipping it"
            );

            continue;
        }

        let index_range = triangles.start * 3..triangles.end * 3;
        let (min, max) = indices[index_range.clone()]
            .iter()
            .fold((u32::MAX, 0), |(min, max), &index| (min.min(index), max.max(index)));

        insert_range(
            &mut ranges,
            segment.polygon_group_index,
            StreamRange::new(min..max + 1, index_range.start as u32..index_range.end as u32),
        );
    }

    ranges
}

/// Derives the vertex and index span of every polygon group from precomputed segments.
///
/// Groups without triangles are absent from the result. Returns `None` if the triangle stream
/// does not hold integer indices.
pub fn gather_stream_ranges_from_poly_group_ranges(
    triangles: &Stream,
    segments: &[PolygonGroupRange],
) -> Option<BTreeMap<i32, StreamRange>> {
    let indices = triangle_indices(triangles)?;

    Some(stream_ranges_from_indices(
        &indices,
        segments.iter().copied(),
    ))
}

/// Derives the vertex and index span of every polygon group from per-triangle group ids.
pub fn gather_stream_ranges_from_poly_group_indices(
    triangles: &Stream,
    poly_groups: &Stream,
) -> Option<BTreeMap<i32, StreamRange>> {
    let indices = triangle_indices(triangles)?;
    let segments = gather_segments(poly_groups)?;

    Some(stream_ranges_from_indices(&indices, segments))
}

struct TriangleKeys {
    triangles: StreamKey,
    poly_groups: StreamKey,
    segments: StreamKey,
}

const TRIANGLE_KEYS: TriangleKeys = TriangleKeys {
    triangles: keys::TRIANGLES,
    poly_groups: keys::POLY_GROUPS,
    segments: keys::POLY_GROUP_SEGMENTS,
};

const DEPTH_ONLY_TRIANGLE_KEYS: TriangleKeys = TriangleKeys {
    triangles: keys::DEPTH_ONLY_TRIANGLES,
    poly_groups: keys::DEPTH_ONLY_POLY_GROUPS,
    segments: keys::DEPTH_ONLY_POLY_GROUP_SEGMENTS,
};

fn gather_set_ranges(set: &StreamSet, keys: &TriangleKeys) -> BTreeMap<i32, StreamRange> {
    let Some(triangles) = set.find(&keys.triangles) else {
        return BTreeMap::new();
    };

    let num_triangles = triangles.len() * triangles.num_elements() / 3;

    if let Some(segments) = set.find(&keys.segments) {
        if segments.is_of_type::<PolygonGroupRange>() {
            let segments = segments.iter::<PolygonGroupRange>().collect::<Vec<_>>();
            let covered = segments
                .iter()
                .map(|segment| segment.triangles().len())
                .sum::<usize>();

            if covered == num_triangles {
                return gather_stream_ranges_from_poly_group_ranges(triangles, &segments)
                    .unwrap_or_default();
            }

            warn!(
                "{} covers {covered} of {num_triangles} triangles; ignoring it",
                keys.segments
            );
        } else {
            warn!("{} is {:?}; ignoring it", keys.segments, segments.layout());
        }
    }

    if let Some(poly_groups) = set.find(&keys.poly_groups) {
        return gather_stream_ranges_from_poly_group_indices(triangles, poly_groups)
            .unwrap_or_default();
    }

    gather_stream_ranges_from_poly_group_ranges(
        triangles,
        &[PolygonGroupRange::new(0, num_triangles as i32, 0)],
    )
    .unwrap_or_default()
}

/// Per-group ranges of a whole set, from the segments stream if it covers every triangle, else
/// from the group id stream, else a single group 0 covering every triangle.
pub fn gather_stream_ranges(set: &StreamSet) -> BTreeMap<i32, StreamRange> {
    gather_set_ranges(set, &TRIANGLE_KEYS)
}

/// [`gather_stream_ranges`] for the depth-only triangles.
pub fn gather_depth_only_stream_ranges(set: &StreamSet) -> BTreeMap<i32, StreamRange> {
    gather_set_ranges(set, &DEPTH_ONLY_TRIANGLE_KEYS)
}

fn organize_set_triangles(set: &mut StreamSet, keys: &TriangleKeys) -> bool {
    let (Some(triangles), Some(poly_groups)) =
        (set.find(&keys.triangles), set.find(&keys.poly_groups))
    else {
        return false;
    };

    let Some(rows_per_triangle) = rows_per_triangle(triangles, poly_groups) else {
        return false;
    };

    let mut table = vec![];
    if !generate_sorted_remap_table(poly_groups, &mut table) {
        return false;
    }

    trace!("Sorting {} triangles by polygon group", table.len());

    // Row counts do not change, so linked streams need no propagation
    if let Some(poly_groups) = set.find_values_mut(&keys.poly_groups) {
        apply_remap_table_to_stream(&table, poly_groups);
    }

    if let Some(triangles) = set.find_values_mut(&keys.triangles) {
        apply_remap_table_to_stream(&expand_remap_table(&table, rows_per_triangle), triangles);
    }

    let segments = set
        .find(&keys.poly_groups)
        .and_then(gather_segments)
        .unwrap_or_default();

    let mut stream = set.find_or_add(keys.segments.clone(), PolygonGroupRange::LAYOUT, false);
    if stream.is_of_type::<PolygonGroupRange>() {
        stream.extend_from_slice(&segments);
    }

    true
}

/// Sorts the triangles of a set by polygon group (and the depth-only triangles, if present) and
/// rewrites the matching segments streams.
///
/// Returns `false` if there are no triangles with group ids to sort.
pub fn organize_stream_set_by_polygon_group(set: &mut StreamSet) -> bool {
    let organized = organize_set_triangles(set, &TRIANGLE_KEYS);

    if set.contains(&keys::DEPTH_ONLY_POLY_GROUPS) {
        organize_set_triangles(set, &DEPTH_ONLY_TRIANGLE_KEYS);
    }

    organized
}

#[cfg(test)]
mod tests {
    use {super::*, crate::keys};

    const GROUPS: [u32; 16] = [0, 0, 0, 1, 2, 3, 0, 5, 0, 9, 5, 5, 6, 6, 1, 1];
    const SORTED: [u32; 16] = [0, 0, 0, 0, 0, 1, 1, 1, 2, 3, 5, 5, 5, 6, 6, 9];

    #[test]
    fn sorted_remap_is_stable() {
        let stream = Stream::from_rows(keys::POLY_GROUPS, &GROUPS);
        let mut table = vec![];

        assert!(generate_sorted_remap_table(&stream, &mut table));
        assert_eq!(table, [0, 1, 2, 6, 8, 3, 14, 15, 4, 5, 7, 10, 11, 12, 13, 9]);

        let mut stream = stream;
        apply_remap_table_to_stream(&table, &mut stream);

        assert_eq!(stream.iter::<u32>().collect::<Vec<_>>(), SORTED);
    }

    #[test]
    fn remap_rejects_non_integers() {
        let stream = Stream::from_rows(keys::POLY_GROUPS, &[1.0f32, 0.0]);
        let mut table = vec![42];

        assert!(!generate_sorted_remap_table(&stream, &mut table));
        assert_eq!(table, [42]);
    }

    #[test]
    #[should_panic]
    fn remap_length_mismatch() {
        let mut stream = Stream::from_rows(keys::POLY_GROUPS, &[1u32, 0]);
        apply_remap_table_to_stream(&[0], &mut stream);
    }

    #[test]
    fn optimal_check() {
        assert!(!are_polygon_group_indices_optimal(&GROUPS));
        assert!(are_polygon_group_indices_optimal(&SORTED));
        assert!(are_polygon_group_indices_optimal::<u32>(&[]));
        assert!(are_polygon_group_indices_optimal(&[3i16, 3, 1, 1, 2]));

        assert!(!is_poly_group_stream_optimal(&Stream::from_rows(
            keys::POLY_GROUPS,
            &GROUPS
        )));
        assert!(is_poly_group_stream_optimal(&Stream::from_rows(
            keys::POLY_GROUPS,
            &SORTED
        )));

        assert!(are_polygon_group_segments_optimal(&[
            PolygonGroupRange::new(0, 2, 1),
            PolygonGroupRange::new(2, 2, 0),
        ]));
        assert!(!are_polygon_group_segments_optimal(&[
            PolygonGroupRange::new(0, 2, 1),
            PolygonGroupRange::new(2, 2, 0),
            PolygonGroupRange::new(4, 1, 1),
        ]));
    }

    #[test]
    fn segments_of_sorted_groups() {
        let mut segments = vec![];
        gather_segments_from_polygon_group_indices(&SORTED, |segment| segments.push(segment));

        assert_eq!(
            segments,
            [
                PolygonGroupRange::new(0, 5, 0),
                PolygonGroupRange::new(5, 3, 1),
                PolygonGroupRange::new(8, 1, 2),
                PolygonGroupRange::new(9, 1, 3),
                PolygonGroupRange::new(10, 3, 5),
                PolygonGroupRange::new(13, 2, 6),
                PolygonGroupRange::new(15, 1, 9),
            ]
        );

        assert_eq!(
            gather_segments(&Stream::from_rows(keys::POLY_GROUPS, &SORTED)).unwrap(),
            segments
        );
    }

    #[test]
    fn segments_single_and_empty() {
        let mut segments = vec![];
        gather_segments_from_polygon_group_indices(&[4u16], |segment| segments.push(segment));

        assert_eq!(segments, [PolygonGroupRange::new(0, 1, 4)]);

        segments.clear();
        gather_segments_from_polygon_group_indices::<u16>(&[], |segment| segments.push(segment));

        assert!(segments.is_empty());
    }

    #[test]
    fn organize_triangles() {
        let mut triangles = Stream::from_rows(
            keys::TRIANGLES,
            &[[0u32, 1, 2], [3, 4, 5], [6, 7, 8], [9, 10, 11]],
        );
        let mut poly_groups = Stream::from_rows(keys::POLY_GROUPS, &[1i32, 0, 1, 0]);
        let mut table = vec![];

        assert!(organize_triangles_by_polygon_group(
            &mut triangles,
            &mut poly_groups,
            &mut table
        ));
        assert_eq!(table, [1, 3, 0, 2]);
        assert_eq!(poly_groups.iter::<i32>().collect::<Vec<_>>(), [0, 0, 1, 1]);
        assert_eq!(
            triangles.iter::<[u32; 3]>().collect::<Vec<_>>(),
            [[3, 4, 5], [9, 10, 11], [0, 1, 2], [6, 7, 8]]
        );
    }

    #[test]
    fn organize_flat_indices() {
        let mut triangles = Stream::from_rows(keys::TRIANGLES, &[0u16, 1, 2, 3, 4, 5]);
        let mut poly_groups = Stream::from_rows(keys::POLY_GROUPS, &[1u16, 0]);
        let mut table = vec![];

        assert!(organize_triangles_by_polygon_group(
            &mut triangles,
            &mut poly_groups,
            &mut table
        ));
        assert_eq!(triangles.iter::<u16>().collect::<Vec<_>>(), [3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn organize_rejects_mismatch() {
        let mut triangles = Stream::from_rows(keys::TRIANGLES, &[[0u32, 1, 2]]);
        let mut poly_groups = Stream::from_rows(keys::POLY_GROUPS, &[1u32, 0]);
        let mut table = vec![];

        assert!(!organize_triangles_by_polygon_group(
            &mut triangles,
            &mut poly_groups,
            &mut table
        ));
        assert_eq!(poly_groups.iter::<u32>().collect::<Vec<_>>(), [1, 0]);
    }

    #[test]
    fn stream_ranges() {
        let triangles = Stream::from_rows(
            keys::TRIANGLES,
            &[[0u32, 1, 2], [2, 1, 3], [4, 5, 6], [6, 5, 7]],
        );
        let poly_groups = Stream::from_rows(keys::POLY_GROUPS, &[0u32, 0, 2, 2]);

        let ranges = gather_stream_ranges_from_poly_group_indices(&triangles, &poly_groups).unwrap();

        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[&0], StreamRange::new(0..4, 0..6));
        assert_eq!(ranges[&2], StreamRange::new(4..8, 6..12));
        assert!(!ranges.contains_key(&1));
        assert_eq!(ranges[&2].num_triangles(), 2);
        assert_eq!(ranges[&2].num_vertices(), 4);
    }

    #[test]
    fn stream_ranges_skip_empty_and_merge_split_groups() {
        let triangles = Stream::from_rows(keys::TRIANGLES, &[[0u16, 1, 2], [3, 4, 5], [6, 7, 8]]);
        let ranges = gather_stream_ranges_from_poly_group_ranges(
            &triangles,
            &[
                PolygonGroupRange::new(0, 1, 0),
                PolygonGroupRange::new(1, 0, 1),
                PolygonGroupRange::new(1, 1, 2),
                PolygonGroupRange::new(2, 1, 0),
            ],
        )
        .unwrap();

        assert_eq!(ranges.keys().copied().collect::<Vec<_>>(), [0, 2]);
        assert_eq!(ranges[&0], StreamRange::new(0..9, 0..9));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn oversized_group_ids_are_caught() {
        gather_segments_from_polygon_group_indices(&[1u32, u32::MAX], |_| {});
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn negative_vertex_indices_are_caught() {
        let triangles = Stream::from_rows(keys::TRIANGLES, &[[0i32, -1, 2]]);
        let poly_groups = Stream::from_rows(keys::POLY_GROUPS, &[0u16]);

        let _ = gather_stream_ranges_from_poly_group_indices(&triangles, &poly_groups);
    }

    #[test]
    fn stale_segments_are_ignored() {
        let mut set = StreamSet::new();
        set.insert(Stream::from_rows(
            keys::TRIANGLES,
            &[[0u32, 1, 2], [3, 4, 5], [6, 7, 8]],
        ));
        set.insert(Stream::from_rows(keys::POLY_GROUPS, &[0u32, 1, 2]));
        set.insert(Stream::from_rows(
            keys::POLY_GROUP_SEGMENTS,
            &[PolygonGroupRange::new(0, 1, 0), PolygonGroupRange::new(1, 1, 1)],
        ));

        let ranges = gather_stream_ranges(&set);

        assert_eq!(ranges.keys().copied().collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(ranges[&2], StreamRange::new(6..9, 6..9));
    }

    #[test]
    fn set_ranges_fall_back() {
        let mut set = StreamSet::new();
        set.insert(Stream::from_rows(keys::TRIANGLES, &[[0u32, 1, 2], [1, 2, 3]]));

        let ranges = gather_stream_ranges(&set);

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[&0], StreamRange::new(0..4, 0..6));
        assert!(gather_depth_only_stream_ranges(&set).is_empty());
    }

    #[test]
    fn organize_set() {
        let mut set = StreamSet::new();
        set.insert(Stream::from_rows(
            keys::TRIANGLES,
            &[[0u32, 1, 2], [3, 4, 5], [6, 7, 8]],
        ));
        set.insert(Stream::from_rows(keys::POLY_GROUPS, &[2u32, 1, 2]));
        set.add_stream_to_link_pool(keys::TRIANGLES_POOL, &keys::TRIANGLES, None);
        set.add_stream_to_link_pool(keys::TRIANGLES_POOL, &keys::POLY_GROUPS, None);

        assert!(organize_stream_set_by_polygon_group(&mut set));

        let segments = set.find_checked(&keys::POLY_GROUP_SEGMENTS);

        assert_eq!(
            segments.iter::<PolygonGroupRange>().collect::<Vec<_>>(),
            [PolygonGroupRange::new(0, 1, 1), PolygonGroupRange::new(1, 2, 2)]
        );
        assert_eq!(
            set.find_checked(&keys::TRIANGLES).get::<[u32; 3]>(0),
            [3, 4, 5]
        );

        let ranges = gather_stream_ranges(&set);

        assert_eq!(ranges[&1], StreamRange::new(3..6, 0..3));
        assert_eq!(ranges[&2], StreamRange::new(0..9, 3..9));
    }
}
