//! Well-known stream keys and link pool names shared by builders, algorithms and renderers.

use crate::stream::{StreamKey, StreamKind};

pub const POSITION: StreamKey = StreamKey::new_static(StreamKind::Vertex, "Position");
pub const TANGENTS: StreamKey = StreamKey::new_static(StreamKind::Vertex, "Tangents");
pub const TEX_COORDS: StreamKey = StreamKey::new_static(StreamKind::Vertex, "TexCoords");
pub const COLOR: StreamKey = StreamKey::new_static(StreamKind::Vertex, "Color");

pub const TRIANGLES: StreamKey = StreamKey::new_static(StreamKind::Index, "Triangles");
pub const DEPTH_ONLY_TRIANGLES: StreamKey =
    StreamKey::new_static(StreamKind::Index, "DepthOnlyTriangles");

/// Per-triangle polygon group ids, parallel to [`TRIANGLES`].
pub const POLY_GROUPS: StreamKey = StreamKey::new_static(StreamKind::Index, "PolyGroups");
pub const DEPTH_ONLY_POLY_GROUPS: StreamKey =
    StreamKey::new_static(StreamKind::Index, "DepthOnlyPolyGroups");

/// Precomputed [`crate::PolygonGroupRange`] rows describing contiguous runs of [`POLY_GROUPS`].
pub const POLY_GROUP_SEGMENTS: StreamKey =
    StreamKey::new_static(StreamKind::Index, "PolyGroupSegments");
pub const DEPTH_ONLY_POLY_GROUP_SEGMENTS: StreamKey =
    StreamKey::new_static(StreamKind::Index, "DepthOnlyPolyGroupSegments");

pub const VERTICES_POOL: &str = "Vertices";
pub const TRIANGLES_POOL: &str = "Triangles";
pub const DEPTH_ONLY_TRIANGLES_POOL: &str = "DepthOnlyTriangles";
