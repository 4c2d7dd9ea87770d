//! The raycaster's per-pixel loop, run on the CPU in double precision. Only
//! the closed-form families are supported; it follows the same steps as the
//! generated program, so it can be used to check what a ray would see.

use crate::{
    geometry::{GeometryFamily, GeometryParameterSet},
    math::{product, Curvature, Point, Transform},
    raycast::{
        map::{RaycastMap, Texel},
        walls::{ShapeWalls, WallLayout},
        RaycastSettings, MIN_VISIBLE, VFAR, VNEAR,
    },
};
use anyhow::{bail, ensure};
use log::trace;
use nalgebra::{Vector3, Vector4};
use serde::Serialize;
use std::hash::Hash;

/// How far a ray moves in one iteration when no wall is in the way
const NO_WALL: f64 = 100.0;

/// Why a ray stopped
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Hit an opaque wall
    Hit,
    /// So little light was left that nothing behind could show
    FogExhausted,
    /// Ran out of iterations
    IterationCap,
    /// Went past the hard sight limit
    HardLimit,
    /// Left the map, or got stuck with no wall ahead
    Escaped,
}

/// One step of a ray's walk
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum RayState {
    /// Moved without reaching a wall
    Advancing { distance: f64 },
    /// Reached wall `wall` of the current cell, `distance` from the eye
    AtBoundary { wall: usize, distance: f64 },
    /// Entered the cell with this map id
    Crossed { cell: usize },
    /// Bounced off wall `wall`
    Reflected { wall: usize },
    Terminated(Termination),
}

/// The outcome of one ray
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RayTrace {
    pub states: Vec<RayState>,
    /// Final RGBA color
    pub color: [f64; 4],
    /// Depth buffer value, 1 when nothing was hit
    pub depth: f64,
    /// Distance traveled along the ray
    pub distance: f64,
    /// Map id of the cell the ray ended in
    pub cell: usize,
    pub termination: Termination,
}

impl RayTrace {
    /// Map ids of the cells entered, in order
    pub fn crossings(&self) -> impl Iterator<Item = usize> + '_ {
        self.states.iter().filter_map(|state| match state {
            RayState::Crossed { cell } => Some(*cell),
            _ => None,
        })
    }

    /// Distances at which walls were reached, in order
    pub fn boundaries(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.states.iter().filter_map(|state| match state {
            RayState::AtBoundary { wall, distance } => Some((*wall, *distance)),
            _ => None,
        })
    }
}

/// Traces rays through a [RaycastMap]
pub struct Tracer<'a, C: Eq + Hash> {
    family: GeometryFamily,
    map: &'a RaycastMap<C>,
    settings: &'a RaycastSettings,
    start_walls: ShapeWalls,
    reflection_offset: Option<usize>,
    /// Half the height of a fiber level, for product spaces
    half_level: f64,
}

/// Mutable state of a ray in flight
struct Ray {
    position: Point,
    tangent: Point,
    /// Direction in the eye's frame, for the depth value
    direction: Vector3<f64>,
    zpos: f64,
    zspeed: f64,
    xspeed: f64,
    go: f64,
    left: f64,
    color: [f64; 4],
    depth: f64,
    /// Reflective rays keep going after the depth is written
    depth_set: bool,
    id: usize,
    wall_offset: usize,
    sides: usize,
    states: Vec<RayState>,
}

impl<'a, C: Copy + Eq + Hash> Tracer<'a, C> {
    /// Rays start in the map's center cell, id 0, which is taken to have
    /// the first shape of the layout
    pub fn new(
        params: &GeometryParameterSet,
        layout: &WallLayout,
        map: &'a RaycastMap<C>,
        settings: &'a RaycastSettings,
    ) -> anyhow::Result<Self> {
        let family = params.family;
        if family.is_step_based() || family == GeometryFamily::BinaryTiling {
            bail!("can't trace rays in {} geometry", family);
        }
        ensure!(!map.is_empty(), "can't trace rays in an empty map");
        let start_walls = match layout.shapes().first() {
            Some(walls) => *walls,
            None => bail!("wall layout without any cell shapes"),
        };
        let reflection_offset = if settings.reflect_val > 0.0 {
            layout.reflection_offset()
        } else {
            None
        };
        Ok(Self {
            family,
            map,
            settings,
            start_walls,
            reflection_offset,
            half_level: params.plevel().unwrap_or(0.0) / 2.0,
        })
    }

    /// Trace a ray leaving the eye at `start` (relative to the center cell)
    /// in `direction`, given in the eye's frame
    pub fn trace(
        &self,
        start: &Transform,
        direction: Vector3<f64>,
    ) -> RayTrace {
        let mut ray = self.launch(start, direction);
        let termination = self.walk(&mut ray);
        if termination != Termination::Hit
            && termination != Termination::HardLimit
        {
            let fog = self.settings.fog_rgba();
            for (channel, fog) in ray.color.iter_mut().zip(&fog).take(3) {
                *channel += ray.left * fog;
            }
        }
        ray.states.push(RayState::Terminated(termination));
        trace!(
            "Ray ended in cell {} after {:.3}: {:?}",
            ray.id,
            ray.go,
            termination
        );
        RayTrace {
            states: ray.states,
            color: ray.color,
            depth: ray.depth,
            distance: ray.go,
            cell: ray.id,
            termination,
        }
    }

    fn launch(&self, start: &Transform, direction: Vector3<f64>) -> Ray {
        let direction = direction.normalize();
        let mut ray = Ray {
            position: start * self.family.origin(),
            tangent: Vector4::zeros(),
            direction,
            zpos: 0.0,
            zspeed: 0.0,
            xspeed: 0.0,
            go: 0.0,
            left: 1.0,
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            depth_set: false,
            id: 0,
            wall_offset: self.start_walls.offset,
            sides: self.start_walls.sides,
            states: Vec::new(),
        };
        if self.family.is_hybrid() {
            let zpos = product::zlevel(self.family.curvature(), &ray.position);
            let scale = (-zpos).exp();
            ray.position *= scale;
            ray.zpos = zpos;
            ray.zspeed = direction.z;
            ray.xspeed = direction.xy().norm();
            if ray.xspeed > 0.0 {
                let flat = Vector4::new(direction.x, direction.y, 0.0, 0.0);
                ray.tangent = start * flat * scale / ray.xspeed;
            }
        } else {
            let at = Vector4::new(direction.x, direction.y, direction.z, 0.0);
            ray.tangent = start * at;
        }
        ray
    }

    fn walk(&self, ray: &mut Ray) -> Termination {
        let family = self.family;
        let matrices = self.map.matrices();
        for _ in 0..self.settings.max_iter {
            if ray.left < MIN_VISIBLE {
                return Termination::FogExhausted;
            }
            let (dist, which) = self.nearest_wall(ray);
            if which.is_none() && dist == 0.0 {
                return Termination::Escaped;
            }
            advance(family, ray, dist);
            renormalize(family, ray);
            if let Some(limit) = self.volumetric_limit() {
                self.absorb(ray, dist, limit);
            }
            ray.go += dist;

            let which = match which {
                Some(which) => which,
                None => {
                    ray.states.push(RayState::Advancing { distance: ray.go });
                    continue;
                }
            };
            ray.states.push(RayState::AtBoundary {
                wall: which,
                distance: ray.go,
            });

            let mut reflect = false;
            let col = to_f64(self.map.wall_color(ray.id, which));
            if col[3] > 0.0 {
                match self.shade(ray, which, col) {
                    Shade::Stop(termination) => return termination,
                    Shade::Reflect => reflect = true,
                    Shade::Continue => {}
                }
            }

            if reflect {
                ray.states.push(RayState::Reflected { wall: which });
                if family.is_hybrid() && which + 2 >= ray.sides {
                    ray.zspeed = -ray.zspeed;
                } else if let Some(offset) = self.reflection_offset {
                    ray.tangent = matrices[offset + which] * ray.tangent;
                }
                continue;
            }

            let connection = match self.map.connection(ray.id, which) {
                Some(connection) => connection,
                None => return Termination::Escaped,
            };
            if family.is_hybrid() {
                if which + 2 == ray.sides {
                    ray.zpos += 2.0 * self.half_level;
                } else if which + 1 == ray.sides {
                    ray.zpos -= 2.0 * self.half_level;
                }
            }
            let m = matrices[connection.matrix]
                * matrices[ray.wall_offset + which];
            ray.position = m * ray.position;
            ray.tangent = m * ray.tangent;
            ray.id = connection.target;
            ray.wall_offset = connection.wall_offset;
            ray.sides = connection.sides;
            ray.states.push(RayState::Crossed { cell: ray.id });
        }
        Termination::IterationCap
    }

    /// The closest wall along the ray and the distance to it
    fn nearest_wall(&self, ray: &Ray) -> (f64, Option<usize>) {
        let family = self.family;
        let matrices = self.map.matrices();
        let mut dist = NO_WALL;
        let mut which = None;

        let flat = if family.is_hybrid() {
            ray.sides.saturating_sub(2)
        } else {
            ray.sides
        };
        if !family.is_hybrid() || ray.xspeed > 0.0 {
            for i in 0..flat {
                let m = &matrices[ray.wall_offset + i];
                if let Some(d) =
                    wall_distance(family, m, &ray.position, &ray.tangent)
                {
                    let d = if family.is_hybrid() { d / ray.xspeed } else { d };
                    if d < dist {
                        dist = d;
                        which = Some(i);
                    }
                }
            }
        }

        if family.is_hybrid() {
            if ray.zspeed > 0.0 {
                let d = (self.half_level - ray.zpos) / ray.zspeed;
                if d < dist {
                    dist = d;
                    which = Some(ray.sides - 1);
                }
            }
            if ray.zspeed < 0.0 {
                let d = (-self.half_level - ray.zpos) / ray.zspeed;
                if d < dist {
                    dist = d;
                    which = Some(ray.sides - 2);
                }
            }
        }
        (dist.max(0.0), which)
    }

    fn volumetric_limit(&self) -> Option<f64> {
        if self.settings.volumetric {
            Some(self.settings.hard_limit)
        } else {
            None
        }
    }

    /// Absorption by the fog inside the current cell
    fn absorb(&self, ray: &mut Ray, dist: f64, limit: f64) {
        if dist <= 0.0 || ray.go >= limit {
            return;
        }
        let dist = dist.min(limit - ray.go);
        let index = self.map.texel_index(ray.id, 0);
        let mut col = to_f64(self.map.volumetric()[index]);
        let factor = col[3];
        col[3] = 1.0;
        let frac = (-(factor + 1.0 / self.settings.exp_decay) * dist).exp();
        for (channel, col) in ray.color.iter_mut().zip(&col) {
            *channel += ray.left * (1.0 - frac) * col;
        }
        ray.left *= frac;
    }

    /// Mix the color of the wall just reached into the ray's color
    fn shade(&self, ray: &mut Ray, which: usize, mut col: [f64; 4]) -> Shade {
        let settings = self.settings;
        let gou = ray.go;
        if settings.has_hard_limit() && gou > settings.hard_limit {
            ray.depth = 1.0;
            return Shade::Stop(Termination::HardLimit);
        }

        let index = self.map.texel_index(ray.id, which);
        let shading = f64::from(self.map.texture_map()[index][0]);
        for channel in &mut col[..3] {
            *channel *= 1.0 - shading;
        }
        if !settings.volumetric {
            let d = (1.0 - gou / settings.linear_sight_range)
                .max(settings.exp_start * (-gou / settings.exp_decay).exp());
            let fog = settings.fog_rgba();
            for (channel, fog) in col.iter_mut().zip(&fog).take(3) {
                *channel = *channel * d + fog * (1.0 - d);
            }
        }

        let mut reflect = false;
        if self.reflection_offset.is_some() && col[3] == 1.0 {
            col[3] = 1.0 - settings.reflect_val;
            reflect = true;
        }
        let alpha = col[3];
        for (channel, value) in ray.color.iter_mut().zip(&col).take(3) {
            *channel += ray.left * value * alpha;
        }
        let opaque = alpha == 1.0;
        if opaque || (reflect && !ray.depth_set) {
            ray.depth = self.depth(ray);
            ray.depth_set = true;
        }
        if opaque {
            return Shade::Stop(Termination::Hit);
        }
        ray.left *= 1.0 - alpha;
        if reflect {
            Shade::Reflect
        } else {
            Shade::Continue
        }
    }

    /// Depth buffer value for a hit at the ray's current distance
    fn depth(&self, ray: &Ray) -> f64 {
        let scale = match self.family {
            GeometryFamily::Hyperbolic => ray.go.sinh(),
            _ => ray.go,
        };
        let z = ray.direction.z * scale;
        let ndc = (-VNEAR - VFAR + 2.0 * VNEAR * VFAR / z) / (VNEAR - VFAR);
        (ndc + 1.0) / 2.0
    }
}

enum Shade {
    Continue,
    Reflect,
    Stop(Termination),
}

fn to_f64(texel: Texel) -> [f64; 4] {
    [
        f64::from(texel[0]),
        f64::from(texel[1]),
        f64::from(texel[2]),
        f64::from(texel[3]),
    ]
}

/// Distance along the ray from `p` in direction `t` to the wall given by
/// `m`, i.e. to the points that `m` moves no further from the center. For
/// product spaces this is the distance in the base surface.
fn wall_distance(
    family: GeometryFamily,
    m: &Transform,
    p: &Point,
    t: &Point,
) -> Option<f64> {
    // Homogeneous coordinate
    let k = if family.is_hybrid() { 2 } else { 3 };
    match family.curvature() {
        Curvature::Hyperbolic => {
            let v = (p - m * p)[k] / (m * t - t)[k];
            if !(-1.0..=1.0).contains(&v) {
                return None;
            }
            let d = v.atanh();
            let next = p * d.sinh() + t * d.cosh();
            if next[k] < (m * next)[k] {
                None
            } else {
                Some(d)
            }
        }
        Curvature::Spherical => {
            let v = (p - m * p)[k] / (m * t - t)[k];
            let d = v.atan();
            let next = t * d.cos() - p * d.sin();
            if next[k] > (m * next)[k] {
                None
            } else {
                Some(d)
            }
        }
        Curvature::Euclidean => {
            let (mp, mt) = (m * p, m * t);
            let deno = p.dot(t) - mp.dot(&mt);
            if deno.abs() < 1e-6 {
                return None;
            }
            let d = (mp.dot(&mp) - p.dot(p)) / 2.0 / deno;
            if d < 0.0 {
                return None;
            }
            let next = p + t * d;
            if next.dot(t) < (m * next).dot(&mt) {
                None
            } else {
                Some(d)
            }
        }
    }
}

/// Move `dist` along the ray
fn advance(family: GeometryFamily, ray: &mut Ray, dist: f64) {
    let (p, t) = (ray.position, ray.tangent);
    let flat = if family.is_hybrid() {
        ray.zpos += dist * ray.zspeed;
        dist * ray.xspeed
    } else {
        dist
    };
    match family.curvature() {
        Curvature::Hyperbolic => {
            let (ch, sh) = (flat.cosh(), flat.sinh());
            ray.position = p * ch + t * sh;
            ray.tangent = t * ch + p * sh;
        }
        Curvature::Spherical => {
            let (ch, sh) = (flat.cos(), flat.sin());
            ray.position = p * ch + t * sh;
            ray.tangent = t * ch - p * sh;
        }
        Curvature::Euclidean => {
            ray.position = p + t * flat;
        }
    }
}

/// Pull a hyperbolic ray back onto the hyperboloid
fn renormalize(family: GeometryFamily, ray: &mut Ray) {
    match family {
        GeometryFamily::Hyperbolic => {
            let p = ray.position;
            let p = p / (p.w * p.w - p.xyz().norm_squared()).sqrt();
            let t = ray.tangent;
            let t = t - p * (p.w * t.w - p.xyz().dot(&t.xyz()));
            ray.position = p;
            ray.tangent = t / (t.xyz().norm_squared() - t.w * t.w).sqrt();
        }
        GeometryFamily::Product(Curvature::Hyperbolic) => {
            let p = ray.position;
            let p = p / (p.z * p.z - p.xy().norm_squared()).sqrt();
            ray.position = p;
            if ray.xspeed > 0.0 {
                let t = ray.tangent;
                let t = t - p * (p.z * t.z - p.xy().dot(&t.xy()));
                ray.tangent =
                    t / (t.xy().norm_squared() - t.z * t.z).sqrt();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, GeometryKind, RaycastConfig, Variation},
        geometry::{CellShape, ParameterBuilder},
        graph::{CellGraph, ProductGraph, TilingPatch, TorusGrid},
        math::{self, tc0},
        raycast::{
            settings_for, CellAppearance, MapBuilder, OpenSpace, WallSet,
            GMS_LIMIT,
        },
        transform::TransformResolver,
    };
    use assert_approx_eq::assert_approx_eq;
    use std::rc::Rc;

    fn build_params(config: &GeometryConfig) -> GeometryParameterSet {
        let underlying = config
            .underlying_config()
            .map(|u| Rc::new(ParameterBuilder::build(&u, None).unwrap()));
        ParameterBuilder::build(config, underlying).unwrap()
    }

    #[test]
    fn test_vertical_ray_climbs_levels() {
        let params = build_params(&GeometryConfig {
            geometry: GeometryKind::Product {
                face: 4,
                vertex: 4,
                plevel_factor: 1.0,
                twisted: false,
            },
            variation: Variation::Pure,
            ..Default::default()
        });
        let plevel = params.plevel().unwrap();
        let graph = ProductGraph::new(TorusGrid::new(3, 3).unwrap());
        let resolver = TransformResolver::new(&params, &graph);
        let layout = WallLayout::new(&params, false).unwrap();
        let settings = settings_for(&RaycastConfig::default(), &params);
        let (map, _) = MapBuilder::new(&resolver, &layout, &OpenSpace, 2048)
            .build_with_growth(graph.root(), GMS_LIMIT)
            .unwrap();
        let tracer = Tracer::new(&params, &layout, &map, &settings).unwrap();

        let up = Vector3::new(0.0, 0.0, 1.0);
        let ray = tracer.trace(&Transform::identity(), up);
        let crossed: Vec<_> = ray.crossings().take(5).collect();
        for (k, id) in crossed.iter().enumerate() {
            let expected = graph.cell((0, 0), k as i64 + 1);
            assert_eq!(map.cells()[*id], expected);
        }
        for (k, (_, distance)) in ray.boundaries().take(5).enumerate() {
            assert_approx_eq!(distance, plevel * (k as f64 + 0.5), 1e-9);
        }
        // Nothing to see in open space
        assert_eq!(ray.termination, Termination::IterationCap);
        assert_eq!(ray.color, settings.fog_rgba());
    }

    #[test]
    fn test_hits_wall_and_floor() {
        let params = build_params(&GeometryConfig {
            geometry: GeometryKind::Regular { face: 7, vertex: 3 },
            variation: Variation::Pure,
            show_3d: true,
            ..Default::default()
        });
        let patch = TilingPatch::new(&params, 2).unwrap();
        let resolver = TransformResolver::new(&params, &patch);
        let layout = WallLayout::new(&params, false).unwrap();
        let settings = settings_for(&RaycastConfig::default(), &params);
        let mut walls = WallSet::new(0xFF0000FF);
        walls.insert(patch.neighbor(0, 0).unwrap());
        let (map, _) = MapBuilder::new(&resolver, &layout, &walls, 2048)
            .build_with_growth(0, GMS_LIMIT)
            .unwrap();
        let tracer = Tracer::new(&params, &layout, &map, &settings).unwrap();

        // Towards the center of neighbor 0
        let step = params.shape_move(CellShape::Master, 0).unwrap();
        let angle = math::angle_of(&tc0(&step));
        let towards = Vector3::new(angle.cos(), angle.sin(), 0.0);
        let ray = tracer.trace(&Transform::identity(), towards);
        assert_eq!(ray.termination, Termination::Hit);
        assert_eq!(ray.boundaries().next().map(|(wall, _)| wall), Some(0));
        assert_approx_eq!(ray.distance, params.distances.tessf / 2.0, 1e-6);
        assert_eq!(ray.cell, 0);
        assert!(ray.color[0] > ray.color[1]);

        // Straight down onto the floor
        let floor = params.heights.floor;
        let down = Vector3::new(0.0, 0.0, -floor.signum());
        let ray = tracer.trace(&Transform::identity(), down);
        assert_eq!(ray.termination, Termination::Hit);
        assert_eq!(ray.boundaries().next().map(|(wall, _)| wall), Some(7));
        assert_approx_eq!(ray.distance, floor.abs(), 1e-6);
    }

    #[test]
    fn test_fog_exhausts_translucent_walls() {
        let params = build_params(&GeometryConfig {
            geometry: GeometryKind::Regular { face: 4, vertex: 4 },
            variation: Variation::Pure,
            show_3d: true,
            ..Default::default()
        });
        let torus = TorusGrid::new(4, 4).unwrap();
        let resolver = TransformResolver::new(&params, &torus);
        let layout = WallLayout::new(&params, false).unwrap();
        let settings = settings_for(&RaycastConfig::default(), &params);
        // Every boundary lets half the light through
        let mut tinted = WallSet::new(0x0000FF80);
        for cell in torus.cells() {
            tinted.insert(cell);
        }
        let appearance = Translucent(tinted);
        let (map, _) = MapBuilder::new(&resolver, &layout, &appearance, 64)
            .build_with_growth((0, 0), GMS_LIMIT)
            .unwrap();
        let tracer = Tracer::new(&params, &layout, &map, &settings).unwrap();

        let ray =
            tracer.trace(&Transform::identity(), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(ray.termination, Termination::FogExhausted);
        // Wrapping around the torus, one crossing per boundary
        assert!(ray.crossings().count() >= 8);
        assert!(ray.color[2] > ray.color[0]);
    }

    #[test]
    fn test_step_based_unsupported() {
        let params = build_params(&GeometryConfig {
            geometry: GeometryKind::Solv,
            variation: Variation::Pure,
            ..Default::default()
        });
        let layout = WallLayout::new(&params, false).unwrap();
        let settings = settings_for(&RaycastConfig::default(), &params);
        let graph = TorusGrid::new(3, 3).unwrap();
        let square = build_params(&GeometryConfig {
            geometry: GeometryKind::Regular { face: 4, vertex: 4 },
            variation: Variation::Pure,
            ..Default::default()
        });
        let resolver = TransformResolver::new(&square, &graph);
        let square_layout = WallLayout::new(&square, false).unwrap();
        let (map, _) =
            MapBuilder::new(&resolver, &square_layout, &OpenSpace, 16)
                .build_with_growth((0, 0), GMS_LIMIT)
                .unwrap();
        assert!(Tracer::new(&params, &layout, &map, &settings).is_err());
    }

    /// Boundaries between any two cells are tinted, but no cell is solid
    struct Translucent(WallSet<(usize, usize)>);

    impl CellAppearance<(usize, usize)> for Translucent {
        fn is_wall(&self, _cell: (usize, usize)) -> bool {
            false
        }

        fn boundary_color(
            &self,
            from: (usize, usize),
            to: (usize, usize),
        ) -> u32 {
            self.0.boundary_color(from, to)
        }
    }
}
