use crate::{math::Curvature, util::fts};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt::Write};
use strum::{Display, EnumIter, EnumString};
use validator::{Validate, ValidationError};

/// Configuration that selects a geometry and tunes how its constants are
/// derived. Two configs with the same [signature](GeometryConfig::signature)
/// always produce identical parameter sets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_combination"))]
pub struct GeometryConfig {
    /// The space and tessellation to work in
    #[validate(custom = "validate_geometry")]
    pub geometry: GeometryKind,

    /// The tiling sub-scheme applied on top of the base tessellation. Only
    /// 2D tilings (and products over them) support anything but
    /// [Variation::Pure].
    #[validate(custom = "validate_variation")]
    pub variation: Variation,

    /// World parameters that the render height thresholds are derived from
    #[validate]
    pub heights: WorldHeightConfig,

    /// Scale applied to the size of everything that stands on a cell. This
    /// doesn't change the tessellation, only `scalefactor` and friends.
    #[validate(range(min = 0.01, max = 100.0))]
    pub creature_scale: f64,

    /// How far cell floors are inset from the cell boundary. 0 means floors
    /// touch the boundary, 1 is the maximum inset.
    #[validate(range(min = 0.0, max = 1.0))]
    pub boundary_ratio: f64,

    /// Projection parameter of the 2D disk model. `None` means the default
    /// perspective, which keeps the height mapping well defined. Values very
    /// close to 0 (the Klein model) can't represent heights at all.
    pub projection_alpha: Option<f64>,

    /// Render a 2D geometry as a 3D world with floors and walls
    pub show_3d: bool,

    /// Settings for the raycasting renderer. These never affect derived
    /// constants, so they are not part of the signature.
    #[validate]
    pub raycast: RaycastConfig,
}

/// All supported geometries. Face counts are "S7" (sides of a master cell)
/// and vertex counts are "S3" (cells around a vertex).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometryKind {
    /// Regular 2D tiling `{face, vertex}` of the sphere, the Euclidean plane
    /// or the hyperbolic plane, depending on the angle excess
    Regular { face: u8, vertex: u8 },

    /// Cube honeycomb `{4,3,edge_order}`: `edge_order` cubes around every
    /// edge. 3 is spherical, 4 Euclidean, 5 and up hyperbolic.
    Honeycomb { edge_order: u8 },

    /// A 2D regular tiling times a line. Each cell becomes a prism of height
    /// `plevel_factor * scalefactor`. The twisted version is the rotation
    /// space of the tiling, where moving around a vertex shifts you along
    /// the fiber.
    Product {
        face: u8,
        vertex: u8,
        plevel_factor: f64,
        #[serde(default)]
        twisted: bool,
    },

    /// The combinatorics of `{face, vertex}`, drawn as if `around` cells met
    /// at every vertex. `around` can be fractional, which continuously
    /// changes the curvature.
    Fake { face: u8, vertex: u8, around: f64 },

    /// Archimedean tiling given by its vertex configuration, e.g. `3.4.6.4`
    Archimedean {
        #[serde(with = "serde_symbol")]
        faces: Vec<u8>,
    },

    /// The binary tiling of the hyperbolic plane. `width` stretches the
    /// horocyclic direction.
    BinaryTiling { width: f64 },

    /// Heisenberg group, tiled by boxes of the given width
    Nil { width: f64 },

    /// Solv geometry
    Solv,
}

/// Tiling sub-schemes. Bitruncation and the Goldberg-Coxeter construction
/// add hexagons between the master cells, irregular tilings replace them
/// with a random Voronoi-style subdivision.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Variation {
    Pure,
    Bitruncated,
    Goldberg { a: u8, b: u8 },
    Irregular { density: f64 },
}

/// World parameters, in units of the world, that the render height
/// thresholds are derived from. See
/// [HeightLevels](crate::geometry::HeightLevels).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WorldHeightConfig {
    /// Camera height above the plane, for 2D views
    pub camera: f64,
    /// Depth of the plane below the camera focus
    #[validate(range(min = 0.0))]
    pub depth: f64,
    /// Height of a standard wall. Negative values build the world upside
    /// down.
    pub wall_height: f64,
    /// Height of a humanoid relative to the wall height
    #[validate(range(min = 0.0, max = 10.0))]
    pub human_wall_ratio: f64,
    /// Height of rock piles relative to the wall height
    #[validate(range(min = 0.0, max = 10.0))]
    pub rock_wall_ratio: f64,
    /// Depth of the water surface below the floor, relative to the wall
    /// height
    #[validate(range(min = 0.0, max = 10.0))]
    pub lake_top: f64,
    /// Depth of shallow water, relative to the wall height
    #[validate(range(min = 0.0, max = 10.0))]
    pub lake_shallow: f64,
    /// Depth of the lake bottom, relative to the wall height
    #[validate(range(min = 0.0, max = 10.0))]
    pub lake_bottom: f64,
    /// Height of the second wall tier, relative to the wall height
    pub wall_height2: f64,
    /// Height of the third wall tier, relative to the wall height
    pub wall_height3: f64,
    /// Height of the low sky, relative to the wall height
    pub lowsky_height: f64,
    /// Height of the sky. `None` puts it at the limit of the height mapping.
    pub sky_height: Option<f64>,
    /// Height of the stars. `None` puts them just under the sky.
    pub star_height: Option<f64>,
    /// Depth of the abyss. `None` uses the limit of the height mapping.
    pub infdeep_height: Option<f64>,
    /// Height of a creature relative to the cell width, in native 3D
    /// geometries
    #[validate(range(min = 0.0))]
    pub height_width: f64,
    /// Pull levels that would cross the limit of the mapping back toward
    /// the floor
    pub height_limits: bool,
}

/// When to use the raycasting renderer instead of mesh rendering
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RaycastMode {
    Never,
    /// Only where mesh rendering is known to look bad
    Auto,
    Always,
}

/// Settings for the raycaster. See [crate::raycast].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RaycastConfig {
    pub mode: RaycastMode,

    /// Maximum number of cells included in a raycast map
    #[validate(range(min = 1, max = 65536))]
    pub max_cells: usize,

    /// Iteration cap per ray. `None` picks the family default.
    #[validate(range(min = 1, max = 10000))]
    pub max_iter: Option<u32>,

    /// Opacity at which walls start reflecting. 0 disables reflections.
    #[validate(range(min = 0.0, max = 1.0))]
    pub reflect_val: f64,

    /// Attenuate with per-cell density instead of distance fog
    pub volumetric: bool,

    /// Distance at which the linear fog falloff reaches zero
    #[validate(range(min = 0.0))]
    pub linear_sight_range: f64,

    /// Starting value of the exponential fog falloff
    #[validate(range(min = 0.0))]
    pub exp_start: f64,

    /// Decay length of the exponential fog falloff. `None` picks the family
    /// default.
    #[validate(range(min = 0.0))]
    pub exp_decay: Option<f64>,

    /// Distance beyond which rays stop and write the far plane. `None` means
    /// no limit.
    #[validate(range(min = 0.0))]
    pub hard_limit: Option<f64>,

    /// RGBA fog color, as `0xRRGGBBAA`
    pub fog_color: u32,
}

impl GeometryConfig {
    /// Is this a geometry where the world itself is 3-dimensional (as
    /// opposed to a 2D geometry that may be shown in 3D)?
    pub fn is_native_3d(&self) -> bool {
        matches!(
            self.geometry,
            GeometryKind::Honeycomb { .. }
                | GeometryKind::Product { .. }
                | GeometryKind::Nil { .. }
                | GeometryKind::Solv
        )
    }

    /// Is anything rendered in 3D, whether the world is 3D or not?
    pub fn is_3d_view(&self) -> bool {
        self.is_native_3d() || self.show_3d
    }

    /// The curvature of the space, or of the base surface for products
    pub fn curvature(&self) -> Curvature {
        match &self.geometry {
            GeometryKind::Regular { face, vertex }
            | GeometryKind::Product { face, vertex, .. } => {
                Curvature::of_tiling(*face as f64, *vertex as f64)
            }
            GeometryKind::Honeycomb { edge_order } => {
                Curvature::of_tiling(4.0, *edge_order as f64)
            }
            GeometryKind::Fake { face, around, .. } => {
                Curvature::of_tiling(*face as f64, *around)
            }
            GeometryKind::Archimedean { faces } => {
                // Compare the sum of the Euclidean interior angles with a
                // full turn
                let turns: f64 =
                    faces.iter().map(|&n| 0.5 - 1.0 / n as f64).sum();
                if (turns - 1.0).abs() < 1e-9 {
                    Curvature::Euclidean
                } else if turns > 1.0 {
                    Curvature::Hyperbolic
                } else {
                    Curvature::Spherical
                }
            }
            GeometryKind::BinaryTiling { .. } | GeometryKind::Solv => {
                Curvature::Hyperbolic
            }
            GeometryKind::Nil { .. } => Curvature::Euclidean,
        }
    }

    /// The config of the geometry this one is derived from, if any. Products
    /// are built over their base tiling, fake geometries over the real
    /// tiling with the same combinatorics.
    pub fn underlying_config(&self) -> Option<GeometryConfig> {
        match &self.geometry {
            GeometryKind::Product { face, vertex, .. }
            | GeometryKind::Fake { face, vertex, .. } => Some(GeometryConfig {
                geometry: GeometryKind::Regular {
                    face: *face,
                    vertex: *vertex,
                },
                show_3d: false,
                ..self.clone()
            }),
            _ => None,
        }
    }

    /// The canonical string for this config. Every field that affects
    /// derived constants shows up here, so equal signatures mean the
    /// parameter sets are interchangeable. Floats are formatted with the
    /// shortest round-trip representation, so the output is byte-stable.
    pub fn signature(&self) -> String {
        let mut s = String::new();
        let mut v = |key: &str, value: Cow<'_, str>| {
            // Writing to a String can't fail
            let _ = write!(s, "{}: {}; ", key, value);
        };

        v("GEO", self.geometry.id().into());
        v("VAR", self.variation.id().into());
        match self.variation {
            Variation::Goldberg { a, b } => {
                v("GP", format!("{},{}", a, b).into())
            }
            Variation::Irregular { density } => v("IRR", fts(density).into()),
            Variation::Pure | Variation::Bitruncated => {}
        }
        v("BR", fts(self.boundary_ratio).into());

        if let Some(underlying) = self.underlying_config() {
            v("U", format!("({})", underlying.signature()).into());
        }
        match &self.geometry {
            GeometryKind::Product {
                plevel_factor,
                twisted,
                ..
            } => {
                v("PL", fts(*plevel_factor).into());
                v("TW", if *twisted { "ON" } else { "OFF" }.into());
            }
            GeometryKind::Fake { face, vertex, around } => {
                v("S7", face.to_string().into());
                v("S3", vertex.to_string().into());
                v("AROUND", fts(*around).into());
            }
            GeometryKind::Nil { width } => v("NILW", fts(*width).into()),
            GeometryKind::BinaryTiling { width } => v("BW", fts(*width).into()),
            _ => {}
        }

        let h = &self.heights;
        v("CAMERA", fts(h.camera).into());
        v("DEPTH", fts(h.depth).into());
        v("WH", fts(h.wall_height).into());
        v("HW", fts(h.human_wall_ratio).into());
        v("RW", fts(h.rock_wall_ratio).into());
        v("LT", fts(h.lake_top).into());
        v("LB", fts(h.lake_bottom).into());
        v("LS", fts(h.lake_shallow).into());
        v("WH2", fts(h.wall_height2).into());
        v("WH3", fts(h.wall_height3).into());
        v("WHL", fts(h.lowsky_height).into());
        if let Some(sky) = h.sky_height {
            v("SKY", fts(sky).into());
        }
        if let Some(star) = h.star_height {
            v("STAR", fts(star).into());
        }
        if let Some(infdeep) = h.infdeep_height {
            v("INFD", fts(infdeep).into());
        }
        if self.is_native_3d() {
            v("HTW", fts(h.height_width).into());
        }
        v("HL", if h.height_limits { "ON" } else { "OFF" }.into());

        if self.creature_scale != 1.0 {
            v("CS", fts(self.creature_scale).into());
        }
        if let Some(alpha) = self.projection_alpha {
            v("ALPHA", fts(alpha).into());
        }
        v("3D", if self.show_3d { "ON" } else { "OFF" }.into());
        s
    }
}

impl GeometryKind {
    /// Short human-readable id, used as the `GEO` entry of signatures
    pub fn id(&self) -> String {
        match self {
            Self::Regular { face, vertex } => {
                format!("{{{},{}}}", face, vertex)
            }
            Self::Honeycomb { edge_order } => format!("{{4,3,{}}}", edge_order),
            Self::Product {
                face,
                vertex,
                twisted: false,
                ..
            } => format!("{{{},{}}}xE", face, vertex),
            Self::Product {
                face,
                vertex,
                twisted: true,
                ..
            } => format!("rot{{{},{}}}", face, vertex),
            Self::Fake { face, .. } => format!("fake{{{}}}", face),
            Self::Archimedean { faces } => {
                format!("arcm({})", serde_symbol::to_symbol(faces))
            }
            Self::BinaryTiling { .. } => "binary".into(),
            Self::Nil { .. } => "nil".into(),
            Self::Solv => "solv".into(),
        }
    }

    /// Number of sides of a master cell, not counting fiber directions
    pub fn master_sides(&self) -> usize {
        match self {
            Self::Regular { face, .. }
            | Self::Product { face, .. }
            | Self::Fake { face, .. } => *face as usize,
            Self::Honeycomb { .. } | Self::Nil { .. } => 6,
            Self::Archimedean { faces } => {
                faces.first().copied().unwrap_or(3) as usize
            }
            Self::BinaryTiling { .. } => 6,
            Self::Solv => 8,
        }
    }

    /// Is this a tiling of a 2D surface (possibly times a line), where
    /// variations other than pure make sense?
    pub fn supports_variations(&self) -> bool {
        matches!(
            self,
            Self::Regular { .. } | Self::Product { .. } | Self::Fake { .. }
        )
    }
}

impl Variation {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Pure => "pure",
            Self::Bitruncated => "bitruncated",
            Self::Goldberg { .. } => "goldberg",
            Self::Irregular { .. } => "irregular",
        }
    }

    /// Does this variation place secondary (hexagonal) cells between the
    /// master cells?
    pub fn is_bitruncated(&self) -> bool {
        matches!(self, Self::Bitruncated)
    }
}

fn validate_geometry(kind: &GeometryKind) -> Result<(), ValidationError> {
    let polygon = |n: u8| (3..=20).contains(&n);
    let valid = match kind {
        GeometryKind::Regular { face, vertex } => {
            polygon(*face) && polygon(*vertex)
        }
        GeometryKind::Honeycomb { edge_order } => {
            (3..=8).contains(edge_order)
        }
        GeometryKind::Product {
            face,
            vertex,
            plevel_factor,
            ..
        } => polygon(*face) && polygon(*vertex) && *plevel_factor > 0.0,
        GeometryKind::Fake { face, vertex, around } => {
            polygon(*face) && polygon(*vertex) && *around > 2.0
        }
        GeometryKind::Archimedean { faces } => {
            (3..=8).contains(&faces.len()) && faces.iter().all(|&n| polygon(n))
        }
        GeometryKind::BinaryTiling { width } | GeometryKind::Nil { width } => {
            *width > 0.0 && *width <= 10.0
        }
        GeometryKind::Solv => true,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("geometry"))
    }
}

fn validate_variation(variation: &Variation) -> Result<(), ValidationError> {
    match variation {
        Variation::Goldberg { a, b }
            if (*a == 0 && *b == 0) || *a >= 32 || *b >= 32 =>
        {
            Err(ValidationError::new("goldberg"))
        }
        Variation::Irregular { density } if !(1.0..=10.0).contains(density) => {
            Err(ValidationError::new("irregular"))
        }
        _ => Ok(()),
    }
}

/// Checks that involve more than one field
fn validate_combination(
    config: &GeometryConfig,
) -> Result<(), ValidationError> {
    let geometry = &config.geometry;
    if config.variation != Variation::Pure && !geometry.supports_variations()
    {
        return Err(ValidationError::new("variation_unsupported"));
    }
    if let (
        Variation::Goldberg { .. },
        GeometryKind::Regular { vertex, .. }
        | GeometryKind::Product { vertex, .. }
        | GeometryKind::Fake { vertex, .. },
    ) = (config.variation, geometry)
    {
        if *vertex != 3 && *vertex != 4 {
            return Err(ValidationError::new("goldberg_vertex"));
        }
    }
    if matches!(
        (config.variation, geometry),
        (Variation::Irregular { .. }, GeometryKind::Fake { .. })
    ) {
        return Err(ValidationError::new("irregular_fake"));
    }
    Ok(())
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            geometry: GeometryKind::Regular { face: 7, vertex: 3 },
            variation: Variation::Bitruncated,
            heights: WorldHeightConfig::default(),
            creature_scale: 1.0,
            boundary_ratio: 1.0,
            projection_alpha: None,
            show_3d: false,
            raycast: RaycastConfig::default(),
        }
    }
}

impl Default for WorldHeightConfig {
    fn default() -> Self {
        Self {
            camera: 1.0,
            depth: 1.0,
            wall_height: 0.3,
            human_wall_ratio: 0.7,
            rock_wall_ratio: 0.9,
            lake_top: 0.25,
            lake_shallow: 0.4,
            lake_bottom: 0.9,
            wall_height2: 1.5,
            wall_height3: 2.0,
            lowsky_height: 2.0,
            sky_height: None,
            star_height: None,
            infdeep_height: None,
            height_width: 1.5,
            height_limits: true,
        }
    }
}

impl Default for RaycastConfig {
    fn default() -> Self {
        Self {
            mode: RaycastMode::Auto,
            max_cells: 2048,
            max_iter: None,
            reflect_val: 0.0,
            volumetric: false,
            linear_sight_range: 10.0,
            exp_start: 1.0,
            exp_decay: None,
            hard_limit: None,
            fog_color: 0x000000FF,
        }
    }
}

/// Archimedean vertex configurations are written as symbols like `3.4.6.4`.
/// When deserializing we also accept a plain list of face sizes. They are
/// always serialized as a symbol.
mod serde_symbol {
    use serde::{
        de::{self, SeqAccess, Visitor},
        Deserializer, Serializer,
    };
    use std::fmt;

    pub fn to_symbol(faces: &[u8]) -> String {
        faces
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    struct SymbolVisitor;

    impl<'de> Visitor<'de> for SymbolVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a vertex symbol like \"3.4.6.4\" or a list")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value
                .split('.')
                .map(|part| {
                    part.trim().parse::<u8>().map_err(|_| {
                        E::custom(format!("invalid face size {:?}", part))
                    })
                })
                .collect()
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut faces = Vec::new();
            while let Some(face) = seq.next_element::<u8>()? {
                faces.push(face);
            }
            Ok(faces)
        }
    }

    pub fn serialize<S>(faces: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_symbol(faces))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SymbolVisitor)
    }
}
