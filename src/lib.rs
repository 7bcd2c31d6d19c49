//! Typed columnar storage for runtime mesh geometry.
//!
//! A mesh is a [`StreamSet`]: named [`Stream`]s of fixed-stride rows (positions, tangents,
//! triangles, polygon groups and so on). Each stream stores its rows in a [`BufferLayout`] picked
//! at run time and converts between layouts through a global converter registry. Streams which
//! describe the same primitives join a link pool, so growing one grows the others and fills the
//! new rows with each stream's default.
//!
//! [`StreamAccessor`] and [`StreamBuilder`] give typed access to a stream whatever its stored
//! format, [`MeshBuilder`] builds triangle meshes on top of them, and the `poly_group` functions
//! sort triangles by polygon group and derive the per-group vertex and index ranges.

mod accessor;
mod builder;
mod collision;
mod config;
mod convert;
mod linkage;
mod packed;
mod poly_group;
mod stream;
mod stream_set;
mod types;

pub mod keys;

pub use self::{
    accessor::{
        DirectAccess, DynamicAccess, ElementAccess, RowMut, RowRef, StaticAccess, StreamAccessor,
        StreamBuilder, StreamReader, StreamWriter,
    },
    builder::{MeshBuilder, MeshStreams, VertexBuilder},
    collision::CollisionMesh,
    config::{IndexFormat, MAX_TEX_COORDS, StreamSetConfig},
    convert::{
        ConvertContiguousFn, ConvertFn, ConvertType, Converter, ConverterRegistry, can_convert,
        find_converter, get_converter, init_converters, register_converter,
        unregister_converter,
    },
    linkage::{DefaultRow, StreamLinkage},
    packed::{Color, HalfVec2, PackedNormal, PackedRgba16N, Tangents},
    poly_group::{
        PolygonGroupRange, StreamRange, apply_remap_table_to_stream,
        are_polygon_group_indices_optimal, are_polygon_group_segments_optimal,
        gather_depth_only_stream_ranges, gather_segments,
        gather_segments_from_polygon_group_indices, gather_stream_ranges,
        gather_stream_ranges_from_poly_group_indices,
        gather_stream_ranges_from_poly_group_ranges, generate_sorted_remap_table,
        is_poly_group_stream_optimal, organize_stream_set_by_polygon_group,
        organize_triangles_by_polygon_group, sorted_remap_table,
    },
    stream::{Stream, StreamKey, StreamKind},
    stream_set::{StreamMut, StreamSet},
    types::{BufferLayout, DatumType, ElementType, IndexKind, IndexType, MeshElement, MeshRow},
};
