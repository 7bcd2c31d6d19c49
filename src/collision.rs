use {
    crate::{
        accessor::{DynamicAccess, StreamAccessor},
        keys,
        poly_group::{StreamRange, gather_stream_ranges},
        stream::{Stream, StreamKey},
        stream_set::StreamSet,
        types::MeshRow,
    },
    glam::{Vec2, Vec3},
    log::{trace, warn},
    std::collections::{HashMap, hash_map::Entry},
};

/// Flat triangle soup handed to a physics cooker.
///
/// `uv_channels` holds one `Vec2` per vertex for each channel and `materials` one material index
/// per triangle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollisionMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub uv_channels: Vec<Vec<Vec2>>,
    pub materials: Vec<u16>,
}

impl CollisionMesh {
    /// Creates an empty mesh collecting `num_uv_channels` texture coordinate channels.
    pub fn new(num_uv_channels: usize) -> Self {
        Self {
            uv_channels: vec![vec![]; num_uv_channels],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Appends the triangles of `set` with the given material.
    ///
    /// With a `range` only those triangles are appended and only the vertices they reference are
    /// copied, once each. Without one every vertex and triangle is copied as is. Returns `false`
    /// if the set has no usable position or triangle stream.
    pub fn append_stream_set(
        &mut self,
        set: &StreamSet,
        material: u16,
        range: Option<&StreamRange>,
    ) -> bool {
        let Some((positions, position)) = open_accessor::<Vec3>(set, &keys::POSITION) else {
            return false;
        };

        let Some((triangles, triangle)) = open_accessor::<[u32; 3]>(set, &keys::TRIANGLES) else {
            return false;
        };

        let tex_coords = set.find(&keys::TEX_COORDS);
        let channels = (0..self.uv_channels.len())
            .map(|channel| {
                tex_coords.and_then(|stream| {
                    StreamAccessor::<Vec2, DynamicAccess>::with_element_offset(stream, channel)
                })
            })
            .collect::<Vec<_>>();

        let push_vertex = |mesh: &mut Self, index: usize| -> u32 {
            let res = mesh.vertices.len() as u32;
            mesh.vertices
                .push(position.get_buffer_value(positions, index));

            for (uvs, channel) in mesh.uv_channels.iter_mut().zip(&channels) {
                uvs.push(match (channel, tex_coords) {
                    (Some(channel), Some(stream)) => channel.get_buffer_value(stream, index),
                    _ => Vec2::ZERO,
                });
            }

            res
        };

        let num_triangles = triangles.len();
        let Some(range) = range else {
            let base = self.vertices.len() as u32;

            for index in 0..positions.len() {
                push_vertex(self, index);
            }

            for row in 0..num_triangles {
                self.triangles
                    .push(triangle.get_buffer_value(triangles, row).map(|index| index + base));
            }

            self.materials
                .extend(std::iter::repeat_n(material, num_triangles));

            return true;
        };

        let first = range.indices.start as usize / 3;
        let last = (range.indices.end as usize / 3).min(num_triangles);
        let mut remap = HashMap::new();

        for row in first..last {
            let source = triangle.get_buffer_value(triangles, row);
            let mut dst = [0; 3];

            for (dst, index) in dst.iter_mut().zip(source) {
                *dst = match remap.entry(index) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => *entry.insert(push_vertex(self, index as usize)),
                };
            }

            self.triangles.push(dst);
            self.materials.push(material);
        }

        trace!(
            "Appended {} triangles and {} vertices of material {material}",
            last.saturating_sub(first),
            remap.len()
        );

        true
    }

    /// Appends every polygon group of `set` as its own material, returning the number of groups
    /// appended.
    pub fn append_sections(&mut self, set: &StreamSet) -> usize {
        let ranges = gather_stream_ranges(set);
        let mut res = 0;

        for (group, range) in &ranges {
            let Ok(material) = u16::try_from(*group) else {
                warn!("Polygon group {group} is not a valid material index");
                continue;
            };

            if self.append_stream_set(set, material, Some(range)) {
                res += 1;
            }
        }

        res
    }
}

fn open_accessor<'s, T>(
    set: &'s StreamSet,
    key: &StreamKey,
) -> Option<(&'s Stream, StreamAccessor<T, DynamicAccess>)>
where
    T: MeshRow,
{
    let Some(stream) = set.find(key) else {
        warn!("Unable to build collision without {key}");

        return None;
    };

    let Some(accessor) = StreamAccessor::new(stream) else {
        warn!("Unable to read {key} ({:?})", stream.layout());

        return None;
    };

    Some((stream, accessor))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{builder::MeshBuilder, builder::MeshStreams},
    };

    fn two_quads() -> StreamSet {
        let mut set = StreamSet::new();
        let mut builder = MeshBuilder::<u16, crate::PackedNormal, Vec2, u16, 2>::new(&mut set)
            .unwrap();
        builder.enable(MeshStreams::TEX_COORDS | MeshStreams::POLY_GROUPS);

        for x in [0.0, 2.0] {
            for (idx, position) in [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y]
                .into_iter()
                .enumerate()
            {
                builder
                    .add_vertex(position + Vec3::new(x, 0.0, 0.0))
                    .set_tex_coord(1, Vec2::splat(idx as f32));
            }
        }

        for (base, group) in [(0, 0), (4, 1)] {
            builder.add_triangle_with_group([base, base + 1, base + 2], group);
            builder.add_triangle_with_group([base + 2, base + 3, base], group);
        }

        drop(builder);

        set
    }

    #[test]
    fn whole_set() {
        let set = two_quads();
        let mut mesh = CollisionMesh::new(2);

        assert!(mesh.append_stream_set(&set, 7, None));
        assert!(mesh.append_stream_set(&set, 8, None));

        assert_eq!(mesh.vertices.len(), 16);
        assert_eq!(mesh.triangles.len(), 8);
        assert_eq!(mesh.triangles[4], [8, 9, 10]);
        assert_eq!(mesh.materials[..4], [7; 4]);
        assert_eq!(mesh.materials[4..], [8; 4]);
        assert_eq!(mesh.uv_channels[0].len(), 16);
        assert_eq!(mesh.uv_channels[1][3], Vec2::splat(3.0));
    }

    #[test]
    fn sub_range_copies_used_vertices_once() {
        let set = two_quads();
        let ranges = gather_stream_ranges(&set);
        let mut mesh = CollisionMesh::new(1);

        assert!(mesh.append_stream_set(&set, 1, Some(&ranges[&1])));

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[0], Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(mesh.triangles, [[0, 1, 2], [2, 3, 0]]);
        assert_eq!(mesh.materials, [1, 1]);
        assert_eq!(mesh.uv_channels[0], [Vec2::ZERO; 4]);
    }

    #[test]
    fn sections() {
        let set = two_quads();
        let mut mesh = CollisionMesh::default();

        assert_eq!(mesh.append_sections(&set), 2);
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.materials, [0, 0, 1, 1]);
        assert!(mesh.uv_channels.is_empty());
    }

    #[test]
    fn missing_streams() {
        let mut mesh = CollisionMesh::new(1);

        assert!(!mesh.append_stream_set(&StreamSet::new(), 0, None));
        assert!(mesh.is_empty());
    }
}
