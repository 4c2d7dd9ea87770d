//! Render height thresholds. Everything that stands on a cell (floors,
//! walls, water, creature body parts) is drawn at a "factor" that the
//! renderer scales points by. Factors are derived from levels, i.e. heights
//! in world units above the floor, through a [HeightMapping] that depends on
//! how the geometry is viewed.

use crate::config::WorldHeightConfig;
use log::warn;
use serde::Serialize;

/// Smallest distance to the pole of a 2D mapping that we still represent.
/// Levels closer than this to the camera plane are clamped.
const MIN_POLE_DISTANCE: f64 = 1e-3;

/// Largest argument we pass to `atanh`
const ATANH_BOUND: f64 = 1.0 - 1e-9;

/// Levels beyond which the linear (3D) mappings stop placing things
const LINEAR_LEVEL_LIMIT: f64 = 10.0;

/// Deepest factor of the affine mapping. The true limit is 0, which the
/// renderer can't do anything with.
const AFFINE_DEEP_LIMIT: f64 = 0.01;

/// How levels (heights above the floor) map to render factors. There is
/// exactly one mapping per parameter set, picked from the geometry family and
/// the view.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeightMapping {
    /// 2D spherical and Euclidean views. Projection distance grows linearly
    /// with depth.
    Affine { camera: f64, depth: f64 },
    /// 2D hyperbolic views, in the `tanh` scale of the Poincaré/Klein
    /// family of projections
    Hyperbolic { camera: f64, depth: f64 },
    /// Product spaces, where the fiber coordinate is the level itself
    Product,
    /// Geometries that are 3D to begin with
    Native3D,
    /// 2D geometries drawn as 3D worlds
    Embedded3D { depth: f64 },
}

impl HeightMapping {
    pub fn camera_depth(self) -> Option<(f64, f64)> {
        match self {
            Self::Affine { camera, depth }
            | Self::Hyperbolic { camera, depth } => Some((camera, depth)),
            _ => None,
        }
    }

    /// Projection parameter of a point `abslev` below the camera plane. Only
    /// meaningful for 2D mappings.
    pub fn abslev_to_projection(self, abslev: f64) -> f64 {
        match self {
            Self::Hyperbolic { camera, .. } => abslev.tanh() / camera.tanh(),
            Self::Affine { camera, .. } => camera + abslev,
            _ => abslev,
        }
    }

    /// Inverse of [Self::abslev_to_projection]
    pub fn projection_to_abslev(self, proj: f64) -> f64 {
        match self {
            Self::Hyperbolic { camera, .. } => (proj * camera.tanh())
                .clamp(-ATANH_BOUND, ATANH_BOUND)
                .atanh(),
            Self::Affine { camera, .. } => proj - camera,
            _ => proj,
        }
    }

    pub fn lev_to_projection(self, lev: f64) -> f64 {
        let depth = self.camera_depth().map_or(0.0, |(_, depth)| depth);
        self.abslev_to_projection(depth - lev)
    }

    pub fn projection_to_factor(self, proj: f64) -> f64 {
        self.lev_to_projection(0.0) / proj
    }

    pub fn factor_to_projection(self, factor: f64) -> f64 {
        self.lev_to_projection(0.0) / factor
    }

    /// Render factor of a level. Levels at or past the pole of a 2D mapping
    /// are clamped so that the result is always finite.
    pub fn lev_to_factor(self, lev: f64) -> f64 {
        match self {
            Self::Product => -lev,
            Self::Native3D => lev,
            Self::Embedded3D { depth } => depth - lev,
            Self::Hyperbolic { depth, .. } => {
                let abslev = (depth - lev).max(MIN_POLE_DISTANCE);
                self.projection_to_factor(self.abslev_to_projection(abslev))
            }
            Self::Affine { camera, depth } => {
                let proj = (camera + depth - lev).max(MIN_POLE_DISTANCE);
                self.projection_to_factor(proj)
            }
        }
    }

    /// Exact inverse of [Self::lev_to_factor] inside its domain
    pub fn factor_to_lev(self, factor: f64) -> f64 {
        match self {
            Self::Product => -factor,
            Self::Native3D => factor,
            Self::Embedded3D { depth } => depth - factor,
            Self::Hyperbolic { depth, .. } | Self::Affine { depth, .. } => {
                depth
                    - self
                        .projection_to_abslev(self.factor_to_projection(factor))
            }
        }
    }

    /// The factor at the far end of the mapping's domain, going up toward
    /// the camera or down into the abyss
    pub fn height_limit(self, upward: bool) -> f64 {
        match (self, upward) {
            (Self::Hyperbolic { depth, .. }, false) => depth.tanh(),
            (Self::Affine { .. }, false) => AFFINE_DEEP_LIMIT,
            (Self::Hyperbolic { .. } | Self::Affine { .. }, true) => {
                self.lev_to_factor(f64::INFINITY)
            }
            (_, true) => self.lev_to_factor(LINEAR_LEVEL_LIMIT),
            (_, false) => self.lev_to_factor(-LINEAR_LEVEL_LIMIT),
        }
    }

    /// Check whether this mapping can represent heights at all. Returns a
    /// description of the problem if not.
    fn check(self, projection_alpha: Option<f64>) -> Option<String> {
        if matches!(projection_alpha, Some(alpha) if alpha.abs() < 1e-6) {
            return Some("does not work with perfect Klein".into());
        }
        let degenerate = match self {
            Self::Hyperbolic { camera, .. } => {
                camera.tanh().abs() < 1e-12
                    || self.lev_to_projection(0.0).abs() < 1e-12
            }
            Self::Affine { .. } => self.lev_to_projection(0.0).abs() < 1e-12,
            _ => false,
        };
        if degenerate {
            Some("zero denominator in height mapping".into())
        } else {
            None
        }
    }
}

/// Render factors of all the landmark heights. Field names follow the
/// landmark they place, e.g. `wall` is the top of a standard wall.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeightLevels {
    pub human_height: f64,
    pub infdeep: f64,
    pub deep: f64,
    pub hellspike: f64,
    pub shallow: f64,
    pub waterlevel: f64,
    pub floor: f64,
    pub red: [f64; 4],
    pub wall: f64,
    pub high: f64,
    pub high2: f64,
    pub lowsky: f64,
    pub sky: f64,
    pub star: f64,
    pub hell: f64,
    pub stuff: f64,
    pub flateye: f64,
    pub leg1: f64,
    pub leg: f64,
    pub leg3: f64,
    pub groin: f64,
    pub groin1: f64,
    pub ghost: f64,
    pub body: f64,
    pub body1: f64,
    pub body2: f64,
    pub body3: f64,
    pub neck1: f64,
    pub neck: f64,
    pub neck3: f64,
    pub head: f64,
    pub head1: f64,
    pub head2: f64,
    pub head3: f64,
    pub abody: f64,
    pub ahead: f64,
    pub bird: f64,
}

/// Inputs to the height computation that come from the parameter set
/// rather than the config
#[derive(Copy, Clone, Debug)]
pub struct HeightInputs {
    pub mapping: HeightMapping,
    /// Actual height of a wall: the configured one, or the fiber level of a
    /// product
    pub wall_height: f64,
    pub scalefactor: f64,
    pub orbsize: f64,
    pub zhexf: f64,
    /// Fiber level height, for products
    pub plevel: Option<f64>,
    pub native_3d: bool,
    pub view_3d: bool,
}

impl HeightLevels {
    /// Values used when the mapping is degenerate. They only make sense in
    /// the "factor" sense, i.e. relative to a floor at 1.
    pub fn fallback(human_height: f64) -> Self {
        Self {
            human_height,
            infdeep: 0.7,
            deep: 0.8,
            hellspike: 0.85,
            shallow: 0.9,
            waterlevel: 0.95,
            floor: 1.0,
            red: [1.0, 1.08, 1.16, 1.24],
            wall: 1.25,
            high: 1.0,
            high2: 1.0,
            lowsky: 1.0,
            sky: 1.0,
            star: 1.0,
            hell: 1.0,
            stuff: 1.0,
            flateye: 1.03,
            leg1: 1.025,
            leg: 1.05,
            leg3: 1.075,
            groin: 1.09,
            groin1: 1.105,
            ghost: 1.1,
            body: 1.15,
            body1: 1.151,
            body2: 1.152,
            body3: 1.153,
            neck1: 1.16,
            neck: 1.17,
            neck3: 1.18,
            head: 1.188,
            head1: 1.189,
            head2: 1.190,
            head3: 1.191,
            abody: 1.08,
            ahead: 1.12,
            bird: 1.20,
        }
    }

    /// Compute all thresholds. Returns the levels and, if the mapping is
    /// degenerate, a description of why the fallback table was used instead.
    pub fn compute(
        config: &WorldHeightConfig,
        projection_alpha: Option<f64>,
        inputs: HeightInputs,
    ) -> (Self, Option<String>) {
        let HeightInputs {
            mapping,
            wall_height: wh,
            ..
        } = inputs;

        let mut human_height = config.human_wall_ratio * wh;
        if inputs.native_3d {
            human_height = inputs.scalefactor * config.height_width / 2.0;
        }
        if let Some(plevel) = inputs.plevel {
            human_height = human_height.min(plevel * 0.9);
        }

        if let Some(invalid) = mapping.check(projection_alpha) {
            warn!("Using fallback height table: {}", invalid);
            return (Self::fallback(human_height), Some(invalid));
        }

        let f = |lev: f64| mapping.lev_to_factor(lev);
        let reduce = if inputs.native_3d {
            human_height / 2.0
        } else {
            0.0
        };
        let body = |ratio: f64| f(human_height * ratio - reduce);
        let reduce_animal = if inputs.view_3d {
            human_height * 0.3
        } else {
            0.0
        };
        let animal = |ratio: f64| f(human_height * ratio - reduce_animal);
        let sgn = if config.wall_height > 0.0 { 1.0 } else { -1.0 };

        let floor = f(0.0);
        let sky = match config.sky_height {
            Some(sky) => f(sky * wh),
            None => mapping.height_limit(sgn > 0.0),
        };
        let star = match config.star_height {
            Some(star) => f(star * wh),
            None => floor + (sky - floor) * 0.95,
        };
        let infdeep = match config.infdeep_height {
            Some(infdeep) => f(infdeep * wh),
            None => mapping.height_limit(sgn < 0.0),
        };
        let rock = config.rock_wall_ratio * wh;

        let mut levels = Self {
            human_height,
            infdeep,
            deep: f(wh * -config.lake_bottom),
            hellspike: f(wh * -(config.lake_top + config.lake_bottom) / 2.0),
            shallow: f(wh * -config.lake_shallow),
            waterlevel: f(wh * -config.lake_top),
            floor,
            red: [0.0, 1.0, 2.0, 3.0].map(|s| f(rock * s / 3.0)),
            wall: f(wh),
            high: f(config.wall_height2 * wh),
            high2: f(config.wall_height3 * wh),
            lowsky: f(config.lowsky_height * wh),
            sky,
            star,
            hell: -sky,
            stuff: floor
                - sgn * (inputs.orbsize * 0.3).max(inputs.zhexf * 0.6),
            flateye: f(human_height * 0.15),
            leg1: body(0.1),
            leg: body(0.2),
            leg3: body(0.3),
            groin: body(0.4),
            groin1: body(0.5),
            ghost: f(if inputs.native_3d {
                0.0
            } else {
                human_height * 0.5
            }),
            body: body(0.6),
            body1: body(0.61),
            body2: body(0.62),
            body3: body(0.63),
            neck1: body(0.7),
            neck: body(0.8),
            neck3: body(0.9),
            head: body(0.97),
            head1: body(0.98),
            head2: body(0.99),
            head3: body(1.0),
            abody: animal(0.4),
            ahead: animal(0.6),
            bird: f(if inputs.native_3d {
                0.0
            } else {
                (config.human_wall_ratio + 1.0) / 2.0 * wh * 0.8
            }),
        };

        if config.height_limits {
            levels.apply_limits(mapping);
        }
        (levels, None)
    }

    /// Pull levels past the mapping's limits back toward a guide level
    fn apply_limits(&mut self, mapping: HeightMapping) {
        let a = mapping.height_limit(true);
        let b = mapping.height_limit(false);
        let (lo, hi) = (a.min(b), a.max(b));
        let adjust = |val: f64, guide: f64, t: f64| {
            if val > hi {
                guide + (hi - guide) * t
            } else if val < lo {
                guide + (lo - guide) * t
            } else {
                val
            }
        };
        self.high = adjust(self.high, self.floor, 0.8);
        self.high2 = adjust(self.high2, self.high, 0.5);
        self.sky = adjust(self.sky, self.floor, 1.0);
        self.star = adjust(self.star, self.floor, 0.9);
        self.waterlevel = adjust(self.waterlevel, self.floor, 0.8);
        self.shallow = adjust(self.shallow, self.waterlevel, 0.9);
        self.deep = adjust(self.deep, self.shallow, 0.5);
        self.infdeep = adjust(self.infdeep, self.floor, 1.0);
    }
}
