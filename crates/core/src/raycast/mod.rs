//! Support for rendering by raycasting instead of drawing cell meshes. Each
//! pixel follows a ray through the cell graph, from wall to wall, until it
//! hits something opaque or fades into the fog.
//!
//! The host side does three things:
//! - lays out the wall matrices of every cell shape ([WallLayout]),
//! - snapshots the neighborhood of the viewer into textures ([RaycastMap]),
//! - generates the fragment program that walks those textures
//!   ([RaycastShaderBuilder]).
//!
//! The map and the program depend on each other through the size of the
//! matrix array, see [Raycaster::prepare] for how they are kept in sync. For
//! the closed-form families, [Tracer] runs the same walk on the CPU.

mod map;
mod shader;
mod tracer;
mod walls;

pub use map::{
    CapacityExceeded, Connection, MapBuilder, MapSummary, RaycastMap, Texel,
};
pub use shader::{
    RaycastShaderBuilder, ShaderCache, ShaderFlags, ShaderKey, ShaderProgram,
};
pub use tracer::{RayState, RayTrace, Termination, Tracer};
pub use walls::{
    CellAppearance, LayoutKey, OpenSpace, ShapeWalls, WallLayout, WallSet,
};

use crate::{
    config::{
        GeometryConfig, GeometryKind, RaycastConfig, RaycastMode, Variation,
    },
    geometry::{GeometryFamily, GeometryParameterSet},
    graph::CellGraph,
    math::Curvature,
    transform::TransformResolver,
};
use log::{debug, info};
use serde::Serialize;
use std::rc::Rc;

/// Upper bound on the size of the shader's matrix array
pub const GMS_LIMIT: usize = 110;
/// Size of the matrix array before any map asked for more
pub const DEFAULT_MATRIX_CAPACITY: usize = 16;
/// Iteration cap of closed-form families, where an iteration is one wall
pub const MAX_ITER_ISO: u32 = 60;
/// Iteration cap of step-based families, where an iteration is one step
pub const MAX_ITER_SOL: u32 = 600;
pub const MAXSTEP_SOL: f64 = 0.05;
pub const MAXSTEP_NIL: f64 = 0.1;
pub const MAXSTEP_PRO: f64 = 0.5;
pub const MINSTEP: f64 = 0.001;
/// Hard sight limit meaning "no limit"
pub const NO_LIMIT: f64 = 999999.0;
/// Wall color of sides leading out of the map
pub const COLOR_OUT_OF_RANGE: u32 = 0x0F0800FF;
/// Default exponential fog decay for exponentially growing spaces
pub const EXP_DECAY_EXP: f64 = 4.0;
/// Default exponential fog decay for polynomially growing spaces
pub const EXP_DECAY_POLY: f64 = 10.0;
/// Width of the map textures, in texels
pub const TEXTURE_WIDTH: usize = 4096;
/// Rays stop once less than this much light is left to collect
pub const MIN_VISIBLE: f64 = 1.0 / 256.0;
/// Near and far clipping planes the depth output is computed for
pub const VNEAR: f64 = 1e-3;
pub const VFAR: f64 = 1e9;

/// Can this geometry be raycast at all? Needs a 3D view, and cells whose
/// walls the raycaster knows how to lay out.
pub fn available(config: &GeometryConfig) -> bool {
    if !config.is_3d_view() {
        return false;
    }
    let tiling_supported = !matches!(
        config.variation,
        Variation::Goldberg { .. } | Variation::Irregular { .. }
    );
    let geometry_supported = !matches!(
        config.geometry,
        GeometryKind::Archimedean { .. } | GeometryKind::BinaryTiling { .. }
    );
    tiling_supported && geometry_supported
}

/// Should this geometry be raycast, given the user's settings? In automatic
/// mode only where meshes look bad: native 3D spaces that aren't flat.
/// Rotation spaces are left to meshes, the integrator is too slow there.
pub fn requested(settings: &RaycastConfig, config: &GeometryConfig) -> bool {
    if !available(config) {
        return false;
    }
    match settings.mode {
        RaycastMode::Never => false,
        RaycastMode::Always => true,
        RaycastMode::Auto => {
            let family = GeometryFamily::of(config);
            config.is_native_3d()
                && family != GeometryFamily::Euclidean
                && !matches!(family, GeometryFamily::RotationSpace(_))
        }
    }
}

/// [RaycastConfig] with the family-dependent defaults filled in
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct RaycastSettings {
    pub max_cells: usize,
    pub max_iter: u32,
    /// Step size of the integrator, for step-based families
    pub maxstep: f64,
    pub minstep: f64,
    pub reflect_val: f64,
    pub volumetric: bool,
    pub linear_sight_range: f64,
    pub exp_start: f64,
    pub exp_decay: f64,
    pub hard_limit: f64,
    pub fog_color: u32,
}

impl RaycastSettings {
    pub fn new(config: &RaycastConfig, family: GeometryFamily) -> Self {
        let max_iter = if family.is_step_based() {
            MAX_ITER_SOL
        } else {
            MAX_ITER_ISO
        };
        let maxstep = match family {
            GeometryFamily::Solv => MAXSTEP_SOL,
            GeometryFamily::RotationSpace(_) => MAXSTEP_PRO,
            _ => MAXSTEP_NIL,
        };
        let exp_decay = match family {
            GeometryFamily::Hyperbolic
            | GeometryFamily::BinaryTiling
            | GeometryFamily::Solv
            | GeometryFamily::RotationSpace(Curvature::Hyperbolic) => {
                EXP_DECAY_EXP
            }
            _ => EXP_DECAY_POLY,
        };
        Self {
            max_cells: config.max_cells,
            max_iter: config.max_iter.unwrap_or(max_iter),
            maxstep,
            minstep: MINSTEP,
            reflect_val: config.reflect_val,
            volumetric: config.volumetric,
            linear_sight_range: config.linear_sight_range,
            exp_start: config.exp_start,
            exp_decay: config.exp_decay.unwrap_or(exp_decay),
            hard_limit: config.hard_limit.unwrap_or(NO_LIMIT),
            fog_color: config.fog_color,
        }
    }

    pub fn has_hard_limit(&self) -> bool {
        self.hard_limit < NO_LIMIT
    }

    /// Fog color as RGBA floats
    pub fn fog_rgba(&self) -> [f64; 4] {
        let channel =
            |shift: u32| f64::from((self.fog_color >> shift) & 0xFF) / 255.0;
        [channel(24), channel(16), channel(8), channel(0)]
    }
}

/// Everything the GPU needs for one frame
#[derive(Clone, Debug)]
pub struct Frame<C: Eq + std::hash::Hash> {
    pub map: RaycastMap<C>,
    pub program: Rc<ShaderProgram>,
    /// Values of the scalar uniforms the program declares
    pub uniforms: Vec<(&'static str, f64)>,
}

/// Keeps the raycast map and the shader program consistent with each other
/// and with the current geometry. A map whose matrix table outgrows the
/// program's array makes the program grow; a new geometry throws both away
/// and resolves the settings again for its family.
#[derive(Debug)]
pub struct Raycaster {
    config: RaycastConfig,
    settings: RaycastSettings,
    shaders: ShaderCache,
    capacity: usize,
    signature: Option<String>,
}

impl Raycaster {
    pub fn new(config: RaycastConfig, params: &GeometryParameterSet) -> Self {
        Self {
            config,
            settings: RaycastSettings::new(&config, params.family),
            shaders: ShaderCache::default(),
            capacity: DEFAULT_MATRIX_CAPACITY,
            signature: None,
        }
    }

    pub fn settings(&self) -> &RaycastSettings {
        &self.settings
    }

    /// Current size of the matrix array
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cached_programs(&self) -> usize {
        self.shaders.len()
    }

    /// Drop every program and go back to the default capacity
    pub fn invalidate(&mut self) {
        debug!("Invalidating raycaster state");
        self.shaders.clear();
        self.capacity = DEFAULT_MATRIX_CAPACITY;
        self.signature = None;
    }

    /// Build the map around `center` and the program to go with it. The map
    /// is complete before it is returned; if it needed a larger matrix
    /// array, the returned program already has it.
    pub fn prepare<G, A>(
        &mut self,
        resolver: &TransformResolver<'_, G>,
        appearance: &A,
        center: G::Cell,
    ) -> anyhow::Result<Frame<G::Cell>>
    where
        G: CellGraph,
        A: CellAppearance<G::Cell>,
    {
        let params = resolver.params();
        if self.signature.as_deref() != Some(params.signature.as_str()) {
            if self.signature.is_some() {
                info!("Geometry changed, rebuilding raycaster");
            }
            self.invalidate();
            self.settings = RaycastSettings::new(&self.config, params.family);
            self.signature = Some(params.signature.clone());
        }

        let layout = WallLayout::new(params, self.settings.reflect_val > 0.0)?;
        let builder = MapBuilder::new(
            resolver,
            &layout,
            appearance,
            self.settings.max_cells,
        );
        let (map, capacity) =
            builder.build_with_growth(center, self.capacity)?;
        if capacity != self.capacity {
            // Programs for the old capacity can't hold this map
            self.shaders.clear();
            self.capacity = capacity;
        }

        let shader = RaycastShaderBuilder::new(
            params,
            &layout,
            &self.settings,
            self.capacity,
        );
        let program =
            self.shaders.get_or_build(shader.key(), || shader.build())?;
        Ok(Frame {
            map,
            program,
            uniforms: shader.uniform_values(),
        })
    }
}

/// Convenience for callers that only have a parameter set: the settings
/// resolved for its family
pub fn settings_for(
    config: &RaycastConfig,
    params: &GeometryParameterSet,
) -> RaycastSettings {
    RaycastSettings::new(config, params.family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::ParameterBuilder,
        graph::{TilingPatch, TorusGrid},
    };

    fn config(geometry: GeometryKind, show_3d: bool) -> GeometryConfig {
        GeometryConfig {
            geometry,
            variation: Variation::Pure,
            show_3d,
            ..Default::default()
        }
    }

    #[test]
    fn test_available() {
        let heptagons = GeometryKind::Regular { face: 7, vertex: 3 };
        assert!(!available(&config(heptagons.clone(), false)));
        assert!(available(&config(heptagons.clone(), true)));
        assert!(available(&config(GeometryKind::Solv, false)));
        assert!(available(&config(
            GeometryKind::Honeycomb { edge_order: 5 },
            false
        )));
        assert!(!available(&config(
            GeometryKind::BinaryTiling { width: 1.0 },
            true
        )));
        assert!(!available(&config(
            GeometryKind::Archimedean {
                faces: vec![3, 4, 6, 4]
            },
            true
        )));
        let mut goldberg = config(heptagons, true);
        goldberg.variation = Variation::Goldberg { a: 2, b: 0 };
        assert!(!available(&goldberg));
    }

    #[test]
    fn test_requested() {
        let mut settings = RaycastConfig::default();
        let honeycomb =
            config(GeometryKind::Honeycomb { edge_order: 5 }, false);
        let cubes = config(GeometryKind::Honeycomb { edge_order: 4 }, false);
        let embedded =
            config(GeometryKind::Regular { face: 7, vertex: 3 }, true);
        let flat = config(GeometryKind::Regular { face: 7, vertex: 3 }, false);

        assert!(requested(&settings, &honeycomb));
        assert!(!requested(&settings, &cubes));
        assert!(!requested(&settings, &embedded));

        settings.mode = RaycastMode::Always;
        assert!(requested(&settings, &cubes));
        assert!(requested(&settings, &embedded));
        assert!(!requested(&settings, &flat));

        settings.mode = RaycastMode::Never;
        assert!(!requested(&settings, &honeycomb));
    }

    #[test]
    fn test_settings_defaults() {
        let config = RaycastConfig::default();
        let hyperbolic =
            RaycastSettings::new(&config, GeometryFamily::Hyperbolic);
        assert_eq!(hyperbolic.max_iter, MAX_ITER_ISO);
        assert_eq!(hyperbolic.exp_decay, EXP_DECAY_EXP);
        assert!(!hyperbolic.has_hard_limit());

        let nil = RaycastSettings::new(&config, GeometryFamily::Nil);
        assert_eq!(nil.max_iter, MAX_ITER_SOL);
        assert_eq!(nil.maxstep, MAXSTEP_NIL);
        assert_eq!(nil.exp_decay, EXP_DECAY_POLY);

        let solv = RaycastSettings::new(
            &RaycastConfig {
                max_iter: Some(100),
                hard_limit: Some(5.0),
                ..config
            },
            GeometryFamily::Solv,
        );
        assert_eq!(solv.max_iter, 100);
        assert_eq!(solv.maxstep, MAXSTEP_SOL);
        assert!(solv.has_hard_limit());
        assert_eq!(hyperbolic.fog_rgba(), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_prepare_reuses_program() {
        let params = ParameterBuilder::build(
            &config(GeometryKind::Regular { face: 4, vertex: 4 }, true),
            None,
        )
        .unwrap();
        let torus = TorusGrid::new(4, 4).unwrap();
        let resolver = TransformResolver::new(&params, &torus);
        let mut raycaster = Raycaster::new(RaycastConfig::default(), &params);

        let first = raycaster.prepare(&resolver, &OpenSpace, (0, 0)).unwrap();
        let second = raycaster.prepare(&resolver, &OpenSpace, (1, 2)).unwrap();
        assert_eq!(first.map.len(), 16);
        assert!(Rc::ptr_eq(&first.program, &second.program));
        assert_eq!(raycaster.cached_programs(), 1);
        assert_eq!(raycaster.capacity(), DEFAULT_MATRIX_CAPACITY);
        assert!(first
            .uniforms
            .iter()
            .any(|(name, _)| *name == "uLinearSightRange"));
    }

    #[test]
    fn test_prepare_grows_and_switches_geometry() {
        let bitruncated = ParameterBuilder::build(
            &GeometryConfig {
                variation: Variation::Bitruncated,
                ..config(GeometryKind::Regular { face: 7, vertex: 3 }, true)
            },
            None,
        )
        .unwrap();
        let patch = TilingPatch::new(&bitruncated, 2).unwrap();
        let resolver = TransformResolver::new(&bitruncated, &patch);
        let mut raycaster =
            Raycaster::new(RaycastConfig::default(), &bitruncated);

        let frame = raycaster.prepare(&resolver, &OpenSpace, 0).unwrap();
        assert!(raycaster.capacity() > DEFAULT_MATRIX_CAPACITY);
        assert_eq!(raycaster.capacity(), frame.map.matrices().len());
        let declaration = format!("uM[{}]", raycaster.capacity());
        assert!(frame.program.fragment.contains(&declaration));

        let squares = ParameterBuilder::build(
            &config(GeometryKind::Regular { face: 4, vertex: 4 }, true),
            None,
        )
        .unwrap();
        let torus = TorusGrid::new(3, 3).unwrap();
        let resolver = TransformResolver::new(&squares, &torus);
        raycaster.prepare(&resolver, &OpenSpace, (0, 0)).unwrap();
        assert_eq!(raycaster.capacity(), DEFAULT_MATRIX_CAPACITY);
        assert_eq!(raycaster.cached_programs(), 1);
    }

    #[test]
    fn test_prepare_resolves_settings_per_family() {
        let heptagons = ParameterBuilder::build(
            &config(GeometryKind::Regular { face: 7, vertex: 3 }, true),
            None,
        )
        .unwrap();
        let mut raycaster =
            Raycaster::new(RaycastConfig::default(), &heptagons);
        assert_eq!(raycaster.settings().exp_decay, EXP_DECAY_EXP);

        let squares = ParameterBuilder::build(
            &config(GeometryKind::Regular { face: 4, vertex: 4 }, true),
            None,
        )
        .unwrap();
        let torus = TorusGrid::new(4, 4).unwrap();
        let resolver = TransformResolver::new(&squares, &torus);
        raycaster.prepare(&resolver, &OpenSpace, (0, 0)).unwrap();
        assert_eq!(
            *raycaster.settings(),
            settings_for(&RaycastConfig::default(), &squares)
        );
        assert_eq!(raycaster.settings().exp_decay, EXP_DECAY_POLY);

        // Explicit values survive the switch
        let mut raycaster = Raycaster::new(
            RaycastConfig {
                exp_decay: Some(2.0),
                ..Default::default()
            },
            &heptagons,
        );
        raycaster.prepare(&resolver, &OpenSpace, (0, 0)).unwrap();
        assert_eq!(raycaster.settings().max_iter, MAX_ITER_ISO);
        assert_eq!(raycaster.settings().exp_decay, 2.0);
    }
}
