use {
    crate::{
        accessor::{DynamicAccess, StreamAccessor},
        keys,
        linkage::DefaultRow,
        packed::{Color, PackedNormal, Tangents},
        stream::StreamKey,
        stream_set::StreamSet,
        types::{BufferLayout, IndexType, MeshElement, MeshRow},
    },
    bitflags::bitflags,
    glam::{Vec2, Vec3, Vec4},
    log::{trace, warn},
    serde::{Deserialize, Serialize},
};

bitflags! {
    /// The optional streams of a mesh.
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct MeshStreams: u8 {
        const TANGENTS = 1 << 0;
        const TEX_COORDS = 1 << 1;
        const COLORS = 1 << 2;
        const POLY_GROUPS = 1 << 3;
        const DEPTH_ONLY_TRIANGLES = 1 << 4;
        const DEPTH_ONLY_POLY_GROUPS = Self::DEPTH_ONLY_TRIANGLES.bits() | 1 << 5;
    }
}

const TANGENT_X: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
const NORMAL_Z: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);

/// Fill value of tangent streams: tangent +X, normal +Z.
pub(crate) fn default_tangents() -> DefaultRow {
    DefaultRow::new(&[TANGENT_X, NORMAL_Z])
}

pub(crate) fn default_color() -> DefaultRow {
    DefaultRow::new(&Color::WHITE)
}

type Accessor<T> = StreamAccessor<T, DynamicAccess>;

/// Builds a triangle mesh into a [`StreamSet`].
///
/// Position and triangle streams always exist. Tangents, texture coordinates, colors, polygon
/// groups and depth-only triangles are optional and may be enabled or disabled at any time.
/// Per-vertex streams share the `Vertices` link pool and per-triangle streams the `Triangles` (or
/// `DepthOnlyTriangles`) pool, so adding a vertex or triangle grows every enabled stream at once;
/// rows nobody has written hold each stream's default (normal +Z, tangent +X, white, group 0).
///
/// The type parameters pick the stored formats of the streams the builder creates or converts:
///
/// - `I`: triangle vertex index
/// - `N`: tangent and normal elements
/// - `U`: texture coordinate elements, with `TEX_COORDS` channels per vertex
/// - `P`: polygon group id
///
/// Values are read and written in full precision (`Vec3`, `Vec4`, `Vec2`, `u32`) and converted on
/// the fly.
pub struct MeshBuilder<
    'a,
    I = u32,
    N = PackedNormal,
    U = Vec2,
    P = u16,
    const TEX_COORDS: usize = 1,
> where
    I: IndexType,
    N: MeshElement,
    U: MeshElement,
    P: IndexType,
{
    set: &'a mut StreamSet,
    position: Accessor<Vec3>,
    triangles: Accessor<[u32; 3]>,
    tangents: Option<Accessor<[Vec4; 2]>>,
    tex_coords: Option<Accessor<[Vec2; TEX_COORDS]>>,
    colors: Option<Accessor<Color>>,
    poly_groups: Option<Accessor<u32>>,
    depth_only_triangles: Option<Accessor<[u32; 3]>>,
    depth_only_poly_groups: Option<Accessor<u32>>,
    __: std::marker::PhantomData<fn() -> (I, N, U, P)>,
}

/// Opens `key` in `set` with exactly `layout`, links it into `pool` and builds an accessor for it.
fn open_stream<T>(
    set: &mut StreamSet,
    key: &StreamKey,
    layout: BufferLayout,
    pool: &str,
    default: Option<DefaultRow>,
) -> Option<Accessor<T>>
where
    T: MeshRow,
{
    let stream = set.find_or_add(key.clone(), layout, true);
    if !stream.is_of_layout(layout) {
        return None;
    }

    drop(stream);

    set.add_stream_to_link_pool(pool, key, default);

    let res = Accessor::new(set.find_checked(key));
    if res.is_none() {
        warn!("Unable to access {key} as {:?}", T::LAYOUT);
    }

    res
}

fn read<T>(set: &StreamSet, key: &StreamKey, accessor: &Option<Accessor<T>>, row: usize) -> T
where
    T: MeshRow,
{
    let accessor = accessor
        .as_ref()
        .unwrap_or_else(|| panic!("{key} is not enabled"));

    accessor.get_buffer_value(set.find_checked(key), row)
}

fn write<T>(
    set: &mut StreamSet,
    key: &StreamKey,
    accessor: &Option<Accessor<T>>,
    row: usize,
    value: &T,
) where
    T: MeshRow,
{
    let accessor = accessor
        .as_ref()
        .unwrap_or_else(|| panic!("{key} is not enabled"));

    if let Some(stream) = set.find_values_mut(key) {
        accessor.set_buffer_value(stream, row, value);
    }
}

/// Drops a segments stream which no longer matches its triangles.
fn invalidate_segments(set: &mut StreamSet, key: &StreamKey) {
    if set.remove(key) > 0 {
        trace!("Removed stale {key}");
    }
}

fn write_element<T>(
    set: &mut StreamSet,
    key: &StreamKey,
    accessor: &Option<Accessor<T>>,
    row: usize,
    element: usize,
    value: T::Element,
) where
    T: MeshRow,
{
    let accessor = accessor
        .as_ref()
        .unwrap_or_else(|| panic!("{key} is not enabled"));

    if let Some(stream) = set.find_values_mut(key) {
        accessor.set_element_value(stream, row, element, value);
    }
}

impl<'a, I, N, U, P, const TEX_COORDS: usize> MeshBuilder<'a, I, N, U, P, TEX_COORDS>
where
    I: IndexType,
    N: MeshElement,
    U: MeshElement,
    P: IndexType,
{
    /// Opens (or creates) the position and triangle streams of `set`.
    ///
    /// Optional streams already in the set are picked up and converted to this builder's
    /// formats. Returns `None` if an existing stream can not be converted.
    pub fn new(set: &'a mut StreamSet) -> Option<Self> {
        let position = open_stream(
            set,
            &keys::POSITION,
            Vec3::LAYOUT,
            keys::VERTICES_POOL,
            None,
        )?;
        let triangles = open_stream(
            set,
            &keys::TRIANGLES,
            <[I; 3]>::LAYOUT,
            keys::TRIANGLES_POOL,
            None,
        )?;

        let existing = MeshStreams::from_set(set);

        let mut res = Self {
            set,
            position,
            triangles,
            tangents: None,
            tex_coords: None,
            colors: None,
            poly_groups: None,
            depth_only_triangles: None,
            depth_only_poly_groups: None,
            __: std::marker::PhantomData,
        };

        res.enable(existing).then_some(res)
    }

    pub fn stream_set(&self) -> &StreamSet {
        self.set
    }

    pub fn num_vertices(&self) -> usize {
        self.set.find_checked(&keys::POSITION).len()
    }

    pub fn num_triangles(&self) -> usize {
        self.set.find_checked(&keys::TRIANGLES).len()
    }

    pub fn num_depth_only_triangles(&self) -> usize {
        self.set
            .find(&keys::DEPTH_ONLY_TRIANGLES)
            .map_or(0, |stream| stream.len())
    }

    pub fn has_tangents(&self) -> bool {
        self.tangents.is_some()
    }

    pub fn has_tex_coords(&self) -> bool {
        self.tex_coords.is_some()
    }

    pub fn has_colors(&self) -> bool {
        self.colors.is_some()
    }

    pub fn has_poly_groups(&self) -> bool {
        self.poly_groups.is_some()
    }

    pub fn has_depth_only_triangles(&self) -> bool {
        self.depth_only_triangles.is_some()
    }

    pub fn has_depth_only_poly_groups(&self) -> bool {
        self.depth_only_poly_groups.is_some()
    }

    pub fn enabled_streams(&self) -> MeshStreams {
        let mut res = MeshStreams::empty();
        res.set(MeshStreams::TANGENTS, self.has_tangents());
        res.set(MeshStreams::TEX_COORDS, self.has_tex_coords());
        res.set(MeshStreams::COLORS, self.has_colors());
        res.set(MeshStreams::POLY_GROUPS, self.has_poly_groups());
        res.set(
            MeshStreams::DEPTH_ONLY_TRIANGLES,
            self.has_depth_only_triangles(),
        );

        if self.has_depth_only_poly_groups() {
            res |= MeshStreams::DEPTH_ONLY_POLY_GROUPS;
        }

        res
    }

    /// Enables every stream in `streams`, returning `false` if any of them failed.
    pub fn enable(&mut self, streams: MeshStreams) -> bool {
        let mut res = true;

        if streams.contains(MeshStreams::TANGENTS) {
            res &= self.enable_tangents();
        }

        if streams.contains(MeshStreams::TEX_COORDS) {
            res &= self.enable_tex_coords();
        }

        if streams.contains(MeshStreams::COLORS) {
            res &= self.enable_colors();
        }

        if streams.contains(MeshStreams::POLY_GROUPS) {
            res &= self.enable_poly_groups();
        }

        if streams.contains(MeshStreams::DEPTH_ONLY_POLY_GROUPS) {
            res &= self.enable_depth_only_poly_groups();
        } else if streams.contains(MeshStreams::DEPTH_ONLY_TRIANGLES) {
            res &= self.enable_depth_only_triangles();
        }

        res
    }

    /// Adds (or converts) a `Tangents<N>` stream; new rows default to tangent +X, normal +Z.
    pub fn enable_tangents(&mut self) -> bool {
        if self.tangents.is_none() {
            self.tangents = open_stream(
                self.set,
                &keys::TANGENTS,
                Tangents::<N>::LAYOUT,
                keys::VERTICES_POOL,
                Some(default_tangents()),
            );
        }

        self.tangents.is_some()
    }

    pub fn disable_tangents(&mut self) {
        self.tangents = None;
        self.set.remove(&keys::TANGENTS);
    }

    pub fn enable_tex_coords(&mut self) -> bool {
        if TEX_COORDS == 0 {
            warn!("Texture coordinates need at least one channel");

            return false;
        }

        if self.tex_coords.is_none() {
            self.tex_coords = open_stream(
                self.set,
                &keys::TEX_COORDS,
                <[U; TEX_COORDS]>::LAYOUT,
                keys::VERTICES_POOL,
                None,
            );
        }

        self.tex_coords.is_some()
    }

    pub fn disable_tex_coords(&mut self) {
        self.tex_coords = None;
        self.set.remove(&keys::TEX_COORDS);
    }

    /// Adds a color stream; new rows default to white.
    pub fn enable_colors(&mut self) -> bool {
        if self.colors.is_none() {
            self.colors = open_stream(
                self.set,
                &keys::COLOR,
                Color::LAYOUT,
                keys::VERTICES_POOL,
                Some(default_color()),
            );
        }

        self.colors.is_some()
    }

    pub fn disable_colors(&mut self) {
        self.colors = None;
        self.set.remove(&keys::COLOR);
    }

    /// Adds a per-triangle polygon group stream; new rows default to group 0.
    pub fn enable_poly_groups(&mut self) -> bool {
        if self.poly_groups.is_none() {
            self.poly_groups = open_stream(
                self.set,
                &keys::POLY_GROUPS,
                BufferLayout::new(P::ELEMENT_TYPE, 1),
                keys::TRIANGLES_POOL,
                None,
            );
        }

        self.poly_groups.is_some()
    }

    pub fn disable_poly_groups(&mut self) {
        self.poly_groups = None;
        self.set
            .remove_all(&[keys::POLY_GROUPS, keys::POLY_GROUP_SEGMENTS]);
    }

    pub fn enable_depth_only_triangles(&mut self) -> bool {
        if self.depth_only_triangles.is_none() {
            self.depth_only_triangles = open_stream(
                self.set,
                &keys::DEPTH_ONLY_TRIANGLES,
                <[I; 3]>::LAYOUT,
                keys::DEPTH_ONLY_TRIANGLES_POOL,
                None,
            );
        }

        self.depth_only_triangles.is_some()
    }

    /// Also removes the depth-only polygon groups.
    pub fn disable_depth_only_triangles(&mut self) {
        self.disable_depth_only_poly_groups();
        self.depth_only_triangles = None;
        self.set.remove(&keys::DEPTH_ONLY_TRIANGLES);
    }

    /// Also enables depth-only triangles.
    pub fn enable_depth_only_poly_groups(&mut self) -> bool {
        if !self.enable_depth_only_triangles() {
            return false;
        }

        if self.depth_only_poly_groups.is_none() {
            self.depth_only_poly_groups = open_stream(
                self.set,
                &keys::DEPTH_ONLY_POLY_GROUPS,
                BufferLayout::new(P::ELEMENT_TYPE, 1),
                keys::DEPTH_ONLY_TRIANGLES_POOL,
                None,
            );
        }

        self.depth_only_poly_groups.is_some()
    }

    pub fn disable_depth_only_poly_groups(&mut self) {
        self.depth_only_poly_groups = None;
        self.set.remove_all(&[
            keys::DEPTH_ONLY_POLY_GROUPS,
            keys::DEPTH_ONLY_POLY_GROUP_SEGMENTS,
        ]);
    }

    pub fn reserve_vertices(&mut self, num: usize) {
        self.set.find_checked_mut(&keys::POSITION).reserve(num);
    }

    pub fn reserve_triangles(&mut self, num: usize) {
        self.set.find_checked_mut(&keys::TRIANGLES).reserve(num);
    }

    /// Adds a vertex; every other vertex stream gets its default value.
    pub fn add_vertex(&mut self, position: Vec3) -> VertexBuilder<'_, 'a, I, N, U, P, TEX_COORDS> {
        let index = self
            .set
            .find_checked_mut(&keys::POSITION)
            .add_uninitialized(1);
        self.set_position(index, position);

        VertexBuilder {
            builder: self,
            index,
        }
    }

    pub fn edit_vertex(&mut self, index: usize) -> VertexBuilder<'_, 'a, I, N, U, P, TEX_COORDS> {
        VertexBuilder {
            builder: self,
            index,
        }
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.position
            .get_buffer_value(self.set.find_checked(&keys::POSITION), index)
    }

    pub fn set_position(&mut self, index: usize, position: Vec3) {
        if let Some(stream) = self.set.find_values_mut(&keys::POSITION) {
            self.position.set_buffer_value(stream, index, &position);
        }
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        read(self.set, &keys::TANGENTS, &self.tangents, index)[1].truncate()
    }

    pub fn tangent(&self, index: usize) -> Vec3 {
        read(self.set, &keys::TANGENTS, &self.tangents, index)[0].truncate()
    }

    /// # Panics
    ///
    /// Panics if tangents are not enabled.
    pub fn set_normal(&mut self, index: usize, normal: Vec3) {
        write_element(
            self.set,
            &keys::TANGENTS,
            &self.tangents,
            index,
            1,
            normal.extend(1.0),
        );
    }

    pub fn set_tangent(&mut self, index: usize, tangent: Vec3) {
        write_element(
            self.set,
            &keys::TANGENTS,
            &self.tangents,
            index,
            0,
            tangent.extend(1.0),
        );
    }

    pub fn set_normal_and_tangent(&mut self, index: usize, normal: Vec3, tangent: Vec3) {
        write(
            self.set,
            &keys::TANGENTS,
            &self.tangents,
            index,
            &[tangent.extend(1.0), normal.extend(1.0)],
        );
    }

    pub fn tex_coord(&self, index: usize, channel: usize) -> Vec2 {
        read(self.set, &keys::TEX_COORDS, &self.tex_coords, index)[channel]
    }

    /// # Panics
    ///
    /// Panics if texture coordinates are not enabled or `channel` is out of range.
    pub fn set_tex_coord(&mut self, index: usize, channel: usize, tex_coord: Vec2) {
        assert!(channel < TEX_COORDS, "Channel {channel} out of range");

        write_element(
            self.set,
            &keys::TEX_COORDS,
            &self.tex_coords,
            index,
            channel,
            tex_coord,
        );
    }

    pub fn color(&self, index: usize) -> Color {
        read(self.set, &keys::COLOR, &self.colors, index)
    }

    /// # Panics
    ///
    /// Panics if colors are not enabled.
    pub fn set_color(&mut self, index: usize, color: Color) {
        write(self.set, &keys::COLOR, &self.colors, index, &color);
    }

    /// Adds a triangle; its polygon group, if enabled, is group 0.
    pub fn add_triangle(&mut self, triangle: [u32; 3]) -> usize {
        let index = self
            .set
            .find_checked_mut(&keys::TRIANGLES)
            .add_uninitialized(1);
        self.set_triangle(index, triangle);
        invalidate_segments(self.set, &keys::POLY_GROUP_SEGMENTS);

        index
    }

    /// # Panics
    ///
    /// Panics if polygon groups are not enabled.
    pub fn add_triangle_with_group(&mut self, triangle: [u32; 3], group: u32) -> usize {
        let index = self.add_triangle(triangle);
        self.set_poly_group(index, group);

        index
    }

    pub fn triangle(&self, index: usize) -> [u32; 3] {
        self.triangles
            .get_buffer_value(self.set.find_checked(&keys::TRIANGLES), index)
    }

    pub fn set_triangle(&mut self, index: usize, triangle: [u32; 3]) {
        if let Some(stream) = self.set.find_values_mut(&keys::TRIANGLES) {
            self.triangles.set_buffer_value(stream, index, &triangle);
        }
    }

    pub fn set_triangle_with_group(&mut self, index: usize, triangle: [u32; 3], group: u32) {
        self.set_triangle(index, triangle);
        self.set_poly_group(index, group);
    }

    pub fn poly_group(&self, index: usize) -> u32 {
        read(self.set, &keys::POLY_GROUPS, &self.poly_groups, index)
    }

    pub fn set_poly_group(&mut self, index: usize, group: u32) {
        write(self.set, &keys::POLY_GROUPS, &self.poly_groups, index, &group);
        invalidate_segments(self.set, &keys::POLY_GROUP_SEGMENTS);
    }

    /// # Panics
    ///
    /// Panics if depth-only triangles are not enabled.
    pub fn add_depth_only_triangle(&mut self, triangle: [u32; 3]) -> usize {
        assert!(
            self.has_depth_only_triangles(),
            "{} is not enabled",
            keys::DEPTH_ONLY_TRIANGLES
        );

        let index = self
            .set
            .find_checked_mut(&keys::DEPTH_ONLY_TRIANGLES)
            .add_uninitialized(1);
        self.set_depth_only_triangle(index, triangle);
        invalidate_segments(self.set, &keys::DEPTH_ONLY_POLY_GROUP_SEGMENTS);

        index
    }

    pub fn add_depth_only_triangle_with_group(&mut self, triangle: [u32; 3], group: u32) -> usize {
        let index = self.add_depth_only_triangle(triangle);
        self.set_depth_only_poly_group(index, group);

        index
    }

    pub fn depth_only_triangle(&self, index: usize) -> [u32; 3] {
        read(
            self.set,
            &keys::DEPTH_ONLY_TRIANGLES,
            &self.depth_only_triangles,
            index,
        )
    }

    pub fn set_depth_only_triangle(&mut self, index: usize, triangle: [u32; 3]) {
        write(
            self.set,
            &keys::DEPTH_ONLY_TRIANGLES,
            &self.depth_only_triangles,
            index,
            &triangle,
        );
    }

    pub fn depth_only_poly_group(&self, index: usize) -> u32 {
        read(
            self.set,
            &keys::DEPTH_ONLY_POLY_GROUPS,
            &self.depth_only_poly_groups,
            index,
        )
    }

    pub fn set_depth_only_poly_group(&mut self, index: usize, group: u32) {
        write(
            self.set,
            &keys::DEPTH_ONLY_POLY_GROUPS,
            &self.depth_only_poly_groups,
            index,
            &group,
        );
        invalidate_segments(self.set, &keys::DEPTH_ONLY_POLY_GROUP_SEGMENTS);
    }
}

impl MeshStreams {
    /// The optional streams present in a set.
    pub fn from_set(set: &StreamSet) -> Self {
        let mut res = Self::empty();
        res.set(Self::TANGENTS, set.contains(&keys::TANGENTS));
        res.set(Self::TEX_COORDS, set.contains(&keys::TEX_COORDS));
        res.set(Self::COLORS, set.contains(&keys::COLOR));
        res.set(Self::POLY_GROUPS, set.contains(&keys::POLY_GROUPS));
        res.set(
            Self::DEPTH_ONLY_TRIANGLES,
            set.contains(&keys::DEPTH_ONLY_TRIANGLES),
        );

        if set.contains(&keys::DEPTH_ONLY_POLY_GROUPS) {
            res |= Self::DEPTH_ONLY_POLY_GROUPS;
        }

        trace!("Found optional streams {res:?}");

        res
    }
}

/// Sets the attributes of one vertex, returned by [`MeshBuilder::add_vertex`].
pub struct VertexBuilder<'b, 'a, I, N, U, P, const TEX_COORDS: usize>
where
    I: IndexType,
    N: MeshElement,
    U: MeshElement,
    P: IndexType,
{
    builder: &'b mut MeshBuilder<'a, I, N, U, P, TEX_COORDS>,
    index: usize,
}

impl<I, N, U, P, const TEX_COORDS: usize> VertexBuilder<'_, '_, I, N, U, P, TEX_COORDS>
where
    I: IndexType,
    N: MeshElement,
    U: MeshElement,
    P: IndexType,
{
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_position(self, position: Vec3) -> Self {
        self.builder.set_position(self.index, position);
        self
    }

    pub fn set_normal(self, normal: Vec3) -> Self {
        self.builder.set_normal(self.index, normal);
        self
    }

    pub fn set_tangent(self, tangent: Vec3) -> Self {
        self.builder.set_tangent(self.index, tangent);
        self
    }

    pub fn set_normal_and_tangent(self, normal: Vec3, tangent: Vec3) -> Self {
        self.builder
            .set_normal_and_tangent(self.index, normal, tangent);
        self
    }

    pub fn set_tex_coord(self, channel: usize, tex_coord: Vec2) -> Self {
        self.builder
            .set_tex_coord(self.index, channel, tex_coord);
        self
    }

    pub fn set_color(self, color: Color) -> Self {
        self.builder.set_color(self.index, color);
        self
    }
}

impl<I, N, U, P, const TEX_COORDS: usize> From<VertexBuilder<'_, '_, I, N, U, P, TEX_COORDS>>
    for usize
where
    I: IndexType,
    N: MeshElement,
    U: MeshElement,
    P: IndexType,
{
    fn from(vertex: VertexBuilder<'_, '_, I, N, U, P, TEX_COORDS>) -> Self {
        vertex.index
    }
}
