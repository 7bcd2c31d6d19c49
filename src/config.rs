use {
    crate::{
        builder::{MeshStreams, default_color, default_tangents},
        keys,
        linkage::DefaultRow,
        packed::{Color, PackedNormal, PackedRgba16N, Tangents},
        stream::StreamKey,
        stream_set::StreamSet,
        types::{BufferLayout, ElementType, MeshRow},
    },
    anyhow::{Context, bail},
    glam::Vec3,
    log::trace,
    serde::{Deserialize, Serialize},
    std::{fs::read_to_string, path::Path},
};

/// The most texture coordinate channels a vertex may carry.
pub const MAX_TEX_COORDS: u8 = 8;

/// Stored format of triangle vertex indices.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexFormat {
    U16,
    #[default]
    U32,
}

impl IndexFormat {
    pub fn triangle_layout(self) -> BufferLayout {
        match self {
            Self::U16 => <[u16; 3]>::LAYOUT,
            Self::U32 => <[u32; 3]>::LAYOUT,
        }
    }
}

/// Describes the streams of a mesh.
///
/// Read from the `[stream-set]` table of a TOML file:
///
/// ```toml
/// [stream-set]
/// tangents = true
/// tex_coords = 2
/// colors = true
/// index = "u16"
/// reserve_vertices = 1024
/// ```
///
/// Every field is optional; the accessor methods supply the defaults.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StreamSetConfig {
    tangents: Option<bool>,
    high_precision_tangents: Option<bool>,
    tex_coords: Option<u8>,
    high_precision_tex_coords: Option<bool>,
    colors: Option<bool>,
    poly_groups: Option<bool>,
    depth_only: Option<bool>,
    index: Option<IndexFormat>,
    reserve_vertices: Option<u32>,
    reserve_triangles: Option<u32>,
}

impl StreamSetConfig {
    /// Reads the `[stream-set]` table of the given TOML file.
    pub fn read(filename: impl AsRef<Path>) -> anyhow::Result<Self> {
        let filename = filename.as_ref();
        let str = read_to_string(filename).context("Reading stream set file as a string")?;

        Self::from_toml(&str).with_context(|| format!("Loading {}", filename.display()))
    }

    pub fn from_toml(str: &str) -> anyhow::Result<Self> {
        let schema: Schema = toml::from_str(str).context("Parsing stream set toml")?;
        let res = schema
            .stream_set
            .context("Missing [stream-set] table")?;

        if res.tex_coords() > MAX_TEX_COORDS {
            bail!(
                "Unsupported texture coordinate count {} (at most {MAX_TEX_COORDS})",
                res.tex_coords()
            );
        }

        Ok(res)
    }

    /// `true` when vertices carry a normal and tangent. Defaults to `true`.
    pub fn tangents(&self) -> bool {
        self.tangents.unwrap_or(true)
    }

    /// Store tangents as 16-bit instead of 8-bit normalized components.
    pub fn high_precision_tangents(&self) -> bool {
        self.high_precision_tangents.unwrap_or_default()
    }

    /// Texture coordinate channels per vertex. Defaults to one.
    pub fn tex_coords(&self) -> u8 {
        self.tex_coords.unwrap_or(1)
    }

    /// Store texture coordinates as 32-bit instead of 16-bit floats.
    pub fn high_precision_tex_coords(&self) -> bool {
        self.high_precision_tex_coords.unwrap_or_default()
    }

    pub fn colors(&self) -> bool {
        self.colors.unwrap_or_default()
    }

    pub fn poly_groups(&self) -> bool {
        self.poly_groups.unwrap_or(true)
    }

    pub fn depth_only(&self) -> bool {
        self.depth_only.unwrap_or_default()
    }

    pub fn index(&self) -> IndexFormat {
        self.index.unwrap_or_default()
    }

    pub fn reserve_vertices(&self) -> usize {
        self.reserve_vertices.unwrap_or_default() as usize
    }

    pub fn reserve_triangles(&self) -> usize {
        self.reserve_triangles.unwrap_or_default() as usize
    }

    pub fn tangent_layout(&self) -> BufferLayout {
        if self.high_precision_tangents() {
            Tangents::<PackedRgba16N>::LAYOUT
        } else {
            Tangents::<PackedNormal>::LAYOUT
        }
    }

    pub fn tex_coord_layout(&self) -> BufferLayout {
        let element_type = if self.high_precision_tex_coords() {
            ElementType::VEC2
        } else {
            ElementType::HALF_VEC2
        };

        BufferLayout::new(element_type, self.tex_coords() as u32)
    }

    /// The optional streams this description enables.
    pub fn mesh_streams(&self) -> MeshStreams {
        let mut res = MeshStreams::empty();
        res.set(MeshStreams::TANGENTS, self.tangents());
        res.set(MeshStreams::TEX_COORDS, self.tex_coords() > 0);
        res.set(MeshStreams::COLORS, self.colors());
        res.set(MeshStreams::POLY_GROUPS, self.poly_groups());

        if self.depth_only() {
            res |= if self.poly_groups() {
                MeshStreams::DEPTH_ONLY_POLY_GROUPS
            } else {
                MeshStreams::DEPTH_ONLY_TRIANGLES
            };
        }

        res
    }

    /// Creates an empty stream set holding every configured stream, linked into its pool.
    pub fn create_stream_set(&self) -> anyhow::Result<StreamSet> {
        if self.tex_coords() > MAX_TEX_COORDS {
            bail!("Unsupported texture coordinate count {}", self.tex_coords());
        }

        let streams = self.mesh_streams();
        let triangles = self.index().triangle_layout();
        let mut res = StreamSet::new();

        add_linked(&mut res, keys::POSITION, Vec3::LAYOUT, keys::VERTICES_POOL, None);
        add_linked(&mut res, keys::TRIANGLES, triangles, keys::TRIANGLES_POOL, None);

        if streams.contains(MeshStreams::TANGENTS) {
            add_linked(
                &mut res,
                keys::TANGENTS,
                self.tangent_layout(),
                keys::VERTICES_POOL,
                Some(default_tangents()),
            );
        }

        if streams.contains(MeshStreams::TEX_COORDS) {
            add_linked(
                &mut res,
                keys::TEX_COORDS,
                self.tex_coord_layout(),
                keys::VERTICES_POOL,
                None,
            );
        }

        if streams.contains(MeshStreams::COLORS) {
            add_linked(
                &mut res,
                keys::COLOR,
                Color::LAYOUT,
                keys::VERTICES_POOL,
                Some(default_color()),
            );
        }

        if streams.contains(MeshStreams::POLY_GROUPS) {
            add_linked(
                &mut res,
                keys::POLY_GROUPS,
                u16::LAYOUT,
                keys::TRIANGLES_POOL,
                None,
            );
        }

        if streams.contains(MeshStreams::DEPTH_ONLY_TRIANGLES) {
            add_linked(
                &mut res,
                keys::DEPTH_ONLY_TRIANGLES,
                triangles,
                keys::DEPTH_ONLY_TRIANGLES_POOL,
                None,
            );
        }

        if streams.contains(MeshStreams::DEPTH_ONLY_POLY_GROUPS) {
            add_linked(
                &mut res,
                keys::DEPTH_ONLY_POLY_GROUPS,
                u16::LAYOUT,
                keys::DEPTH_ONLY_TRIANGLES_POOL,
                None,
            );
        }

        // Reserving one pool member reserves the whole pool
        res.find_checked_mut(&keys::POSITION)
            .reserve(self.reserve_vertices());
        res.find_checked_mut(&keys::TRIANGLES)
            .reserve(self.reserve_triangles());

        trace!(
            "Created {} streams ({streams:?}), {} vertices and {} triangles reserved",
            res.len(),
            self.reserve_vertices(),
            self.reserve_triangles()
        );

        Ok(res)
    }
}

fn add_linked(
    set: &mut StreamSet,
    key: StreamKey,
    layout: BufferLayout,
    pool: &str,
    default: Option<DefaultRow>,
) {
    drop(set.add_stream(key.clone(), layout));
    set.add_stream_to_link_pool(pool, &key, default);
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(rename = "stream-set")]
    stream_set: Option<StreamSetConfig>,
}

#[cfg(test)]
mod tests {
    use {super::*, crate::HalfVec2, glam::Vec4};

    #[test]
    fn defaults() {
        let config = StreamSetConfig::from_toml("[stream-set]").unwrap();

        assert!(config.tangents());
        assert!(!config.high_precision_tangents());
        assert_eq!(config.tex_coords(), 1);
        assert!(!config.colors());
        assert!(config.poly_groups());
        assert!(!config.depth_only());
        assert_eq!(config.index(), IndexFormat::U32);
        assert_eq!(
            config.mesh_streams(),
            MeshStreams::TANGENTS | MeshStreams::TEX_COORDS | MeshStreams::POLY_GROUPS
        );
    }

    #[test]
    fn parse_errors() {
        assert!(StreamSetConfig::from_toml("").is_err());
        assert!(StreamSetConfig::from_toml("[stream-set]\nindex = \"u8\"").is_err());
        assert!(StreamSetConfig::from_toml("[stream-set]\ntex_coords = 9").is_err());
        assert!(StreamSetConfig::from_toml("[stream-set]\ntex_coords = 8").is_ok());
    }

    #[test]
    fn depth_only_streams() {
        let config =
            StreamSetConfig::from_toml("[stream-set]\ndepth_only = true\npoly_groups = false")
                .unwrap();

        assert_eq!(
            config.mesh_streams() & MeshStreams::DEPTH_ONLY_POLY_GROUPS,
            MeshStreams::DEPTH_ONLY_TRIANGLES
        );

        let set = config.create_stream_set().unwrap();

        assert!(set.contains(&keys::DEPTH_ONLY_TRIANGLES));
        assert!(!set.contains(&keys::DEPTH_ONLY_POLY_GROUPS));
        assert_eq!(
            set.link_pool_of(&keys::DEPTH_ONLY_TRIANGLES),
            Some(keys::DEPTH_ONLY_TRIANGLES_POOL)
        );
    }

    #[test]
    fn create_stream_set() {
        let config = StreamSetConfig::from_toml(
            r#"
            [stream-set]
            high_precision_tangents = true
            tex_coords = 3
            colors = true
            index = "u16"
            reserve_vertices = 100
            reserve_triangles = 50
            "#,
        )
        .unwrap();
        let mut set = config.create_stream_set().unwrap();

        assert_eq!(set.len(), 6);
        assert!(set.find_checked(&keys::TRIANGLES).is_of_type::<[u16; 3]>());
        assert!(
            set.find_checked(&keys::TANGENTS)
                .is_of_type::<Tangents<PackedRgba16N>>()
        );
        assert!(
            set.find_checked(&keys::TEX_COORDS)
                .is_of_type::<[HalfVec2; 3]>()
        );
        assert!(set.find_checked(&keys::COLOR).capacity() >= 100);
        assert!(set.find_checked(&keys::POLY_GROUPS).capacity() >= 50);
        assert_eq!(set.link_pool(keys::VERTICES_POOL).unwrap().len(), 0);

        set.find_checked_mut(&keys::POSITION).push(Vec3::ONE);

        assert_eq!(set.find_checked(&keys::COLOR).get::<Color>(0), Color::WHITE);

        let tangents = set
            .find_checked(&keys::TANGENTS)
            .get::<Tangents<PackedRgba16N>>(0);

        assert_eq!(tangents.tangent.to_vec4(), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(tangents.normal.to_vec3(), Vec3::Z);
    }
}
