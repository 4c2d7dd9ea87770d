use crate::{
    geometry::{CellShape, GeometryFamily, GeometryParameterSet, HeightMapping},
    math::{self, product, tc0, Curvature, Transform},
};
use anyhow::{bail, Context};
use fnv::FnvHashSet;
use log::warn;
use serde::Serialize;
use std::hash::Hash;

/// Floor and ceiling planes of embedded tilings are kept at most this far
/// from the cell center. Further out the plane matrices overflow `f32`.
const MAX_PLANE_DISTANCE: f64 = 10.0;

/// Side counts and wall offsets are packed into one texel channel, which
/// leaves room for this many sides per cell
pub const MAX_PACKED_SIDES: usize = 16;

/// The walls of one cell shape: its wall matrices sit at
/// `offset..offset + sides` in the matrix table
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ShapeWalls {
    pub shape: CellShape,
    pub offset: usize,
    pub sides: usize,
}

/// Everything that decides the shape of the wall section of the matrix
/// table, and so the shader program. Used as part of the shader cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct LayoutKey {
    pub shapes: Vec<ShapeWalls>,
    pub reflective: bool,
    pub mirrors: usize,
    pub embedded: bool,
}

/// The fixed head of the raycaster's matrix table. For every cell shape, one
/// matrix per wall: a point is on wall `i` when it is as far from the cell
/// center as from the neighbor's center, which the shader checks by
/// comparing a point with its image under the wall matrix. Then one
/// reflection per wall of the master shape, if reflections are on, and the
/// extra mirrors of ultra-ideal tilings.
#[derive(Clone, Debug)]
pub struct WallLayout {
    family: GeometryFamily,
    shapes: Vec<ShapeWalls>,
    matrices: Vec<Transform>,
    reflection_offset: Option<usize>,
    mirror_offset: usize,
    embedded: bool,
}

impl WallLayout {
    /// Lay out the walls of every cell shape of a geometry. Embedded 2D
    /// tilings get two more walls per cell, floor then ceiling.
    pub fn new(
        params: &GeometryParameterSet,
        reflect: bool,
    ) -> anyhow::Result<Self> {
        let family = params.family;
        let embedded =
            matches!(params.mapping, HeightMapping::Embedded3D { .. });
        let bitruncated = match &params.underlying {
            Some(underlying) if family.is_hybrid() => underlying.bitruncated,
            _ => params.bitruncated,
        };
        let kinds: &[CellShape] = if bitruncated {
            &[CellShape::Master, CellShape::Hex]
        } else {
            &[CellShape::Master]
        };

        let mut shapes = Vec::with_capacity(kinds.len());
        let mut matrices = Vec::new();
        for &shape in kinds {
            let offset = matrices.len();
            let flat = params.shape_sides(shape);
            for dir in 0..flat {
                matrices.push(wall_matrix(params, shape, dir)?);
            }
            if family.is_hybrid() {
                // The fiber is traced separately, so the level walls
                // don't move anything
                let len = matrices.len();
                matrices[len - 2] = Transform::identity();
                matrices[len - 1] = Transform::identity();
            }
            if embedded {
                let (floor, ceiling) = planes(params);
                matrices.push(floor);
                matrices.push(ceiling);
            }
            let sides = matrices.len() - offset;
            if kinds.len() > 1 && sides >= MAX_PACKED_SIDES {
                bail!(
                    "{} cells have {} sides, at most {} fit in a texel",
                    shape,
                    sides,
                    MAX_PACKED_SIDES - 1
                );
            }
            shapes.push(ShapeWalls {
                shape,
                offset,
                sides,
            });
        }

        let reflective = reflect && Self::supports_reflections(family);
        let reflection_offset = if reflective && shapes.len() > 1 {
            warn!("Reflections are not supported with several cell shapes");
            None
        } else if reflective {
            let offset = matrices.len();
            for dir in 0..shapes[0].sides {
                matrices.push(reflection(params, dir, shapes[0].sides)?);
            }
            Some(offset)
        } else {
            None
        };

        let mirror_offset = matrices.len();
        Ok(Self {
            family,
            shapes,
            matrices,
            reflection_offset,
            mirror_offset,
            embedded,
        })
    }

    /// Add the reflections of an ultra-ideal tiling. Only hyperbolic
    /// geometries have them; elsewhere this is a no-op.
    pub fn with_mirrors(mut self, mirrors: &[Transform]) -> Self {
        if self.family == GeometryFamily::Hyperbolic {
            self.matrices.truncate(self.mirror_offset);
            self.matrices.extend_from_slice(mirrors);
        }
        self
    }

    /// Nil and Solv walls are reflected by flipping coordinates in the
    /// shader, there are no reflection matrices for them
    fn supports_reflections(family: GeometryFamily) -> bool {
        !matches!(family, GeometryFamily::Nil | GeometryFamily::Solv)
    }

    pub fn family(&self) -> GeometryFamily {
        self.family
    }

    pub fn shapes(&self) -> &[ShapeWalls] {
        &self.shapes
    }

    pub fn walls(&self, shape: CellShape) -> Option<ShapeWalls> {
        self.shapes.iter().find(|walls| walls.shape == shape).copied()
    }

    /// The fixed matrices every map starts its table with
    pub fn matrices(&self) -> &[Transform] {
        &self.matrices
    }

    /// Widest cell, i.e. texels per cell in the map textures
    pub fn degree(&self) -> usize {
        self.shapes.iter().map(|walls| walls.sides).max().unwrap_or(0)
    }

    /// With more than one cell shape, each cell's wall offset and side count
    /// come from its connection texel instead of being compiled in
    pub fn many_cell_types(&self) -> bool {
        self.shapes.len() > 1
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn reflection_offset(&self) -> Option<usize> {
        self.reflection_offset
    }

    pub fn mirrors(&self) -> std::ops::Range<usize> {
        self.mirror_offset..self.matrices.len()
    }

    pub fn key(&self) -> LayoutKey {
        LayoutKey {
            shapes: self.shapes.clone(),
            reflective: self.reflection_offset.is_some(),
            mirrors: self.mirrors().len(),
            embedded: self.embedded,
        }
    }
}

fn wall_matrix(
    params: &GeometryParameterSet,
    shape: CellShape,
    dir: usize,
) -> anyhow::Result<Transform> {
    let step = params.shape_move(shape, dir).with_context(|| {
        format!("no move for {} cells in direction {}", shape, dir)
    })?;
    Ok(params.family.invert(&step))
}

/// Floor and ceiling wall matrices of an embedded tiling. The floor is
/// `heights.floor` below the center, the ceiling `heights.sky` (which is
/// negative when the sky is above).
fn planes(params: &GeometryParameterSet) -> (Transform, Transform) {
    let curv = params.family.curvature();
    let clamp = |d: f64| d.clamp(-MAX_PLANE_DISTANCE, MAX_PLANE_DISTANCE);
    (
        curv.zpush(2.0 * clamp(params.heights.floor)),
        curv.zpush(2.0 * clamp(params.heights.sky)),
    )
}

/// The reflection in wall `dir` of a master cell
fn reflection(
    params: &GeometryParameterSet,
    dir: usize,
    sides: usize,
) -> anyhow::Result<Transform> {
    let family = params.family;
    let curv = family.curvature();
    let embedded = matches!(params.mapping, HeightMapping::Embedded3D { .. });
    if embedded && dir + 2 >= sides {
        let (floor, ceiling) = planes(params);
        let plane = if dir + 2 == sides { floor } else { ceiling };
        return Ok(math::mirror(2) * plane);
    }
    if family.is_hybrid() && dir + 2 >= sides {
        // Fiber reflections just flip the vertical speed
        return Ok(Transform::identity());
    }

    let step = params.shape_move(CellShape::Master, dir).with_context(|| {
        format!("no move for master cells in direction {}", dir)
    })?;
    if family.is_hybrid() {
        let flat = bisector_reflection(curv, &product::swap_layout(&step));
        Ok(product::swap_layout(&flat))
    } else {
        Ok(bisector_reflection(curv, &step))
    }
}

/// Reflection in the perpendicular bisector of the origin and the image of
/// the origin under `step`
fn bisector_reflection(curv: Curvature, step: &Transform) -> Transform {
    let h = tc0(step);
    let d = curv.hdist0(&h);
    let angle = math::angle_of(&h);
    math::spin(angle)
        * curv.xpush(d / 2.0)
        * math::mirror(0)
        * curv.xpush(-d / 2.0)
        * math::spin(-angle)
}

/// What the raycaster needs to know about the contents of cells. Colors are
/// RGBA packed as `0xRRGGBBAA`; an alpha of 0 is see-through.
pub trait CellAppearance<C> {
    /// Is the whole cell a solid wall? Rays never get past these.
    fn is_wall(&self, cell: C) -> bool;

    /// Color of the boundary seen when moving from `from` into `to`
    fn boundary_color(&self, from: C, to: C) -> u32;

    /// Floor (and ceiling) color of embedded tilings
    fn floor_color(&self, _cell: C) -> u32 {
        0x404040FF
    }

    /// Darkening of the boundary on side `dir`, in sixteenths
    fn darkness(&self, _cell: C, _dir: usize) -> u8 {
        0
    }

    /// Fog color and density (in the alpha channel) inside a cell, for
    /// volumetric rendering
    fn volume_color(&self, _cell: C) -> u32 {
        0
    }
}

/// Empty space: no walls anywhere
#[derive(Copy, Clone, Debug, Default)]
pub struct OpenSpace;

impl<C> CellAppearance<C> for OpenSpace {
    fn is_wall(&self, _cell: C) -> bool {
        false
    }

    fn boundary_color(&self, _from: C, _to: C) -> u32 {
        0
    }
}

/// A set of solid wall cells, all the same color, in otherwise empty space
#[derive(Clone, Debug)]
pub struct WallSet<C> {
    color: u32,
    walls: FnvHashSet<C>,
}

impl<C: Eq + Hash> WallSet<C> {
    pub fn new(color: u32) -> Self {
        Self {
            color,
            walls: FnvHashSet::default(),
        }
    }

    pub fn insert(&mut self, cell: C) {
        self.walls.insert(cell);
    }

    pub fn len(&self) -> usize {
        self.walls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walls.is_empty()
    }
}

impl<C: Eq + Hash> CellAppearance<C> for WallSet<C> {
    fn is_wall(&self, cell: C) -> bool {
        self.walls.contains(&cell)
    }

    fn boundary_color(&self, _from: C, to: C) -> u32 {
        if self.walls.contains(&to) {
            self.color
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, GeometryKind, Variation},
        geometry::ParameterBuilder,
        math::eq_matrix,
    };
    use assert_approx_eq::assert_approx_eq;

    fn build(config: &GeometryConfig) -> GeometryParameterSet {
        ParameterBuilder::build(config, None).unwrap()
    }

    #[test]
    fn test_walls_are_bisectors() {
        let params = build(&GeometryConfig {
            geometry: GeometryKind::Regular { face: 7, vertex: 3 },
            variation: Variation::Pure,
            show_3d: true,
            ..Default::default()
        });
        let layout = WallLayout::new(&params, false).unwrap();
        assert!(layout.is_embedded());
        assert_eq!(layout.degree(), 9);
        assert!(!layout.many_cell_types());

        // The midpoint between neighbors lies on their wall
        let curv = Curvature::Hyperbolic;
        let mid = curv.xpush0(params.distances.tessf / 2.0);
        let wall = layout.matrices()[0];
        assert_approx_eq!((wall * mid).w, mid.w, 1e-9);

        // The floor is heights.floor below the center
        let below = curv.zpush(-params.heights.floor) * math::c0();
        assert_approx_eq!((layout.matrices()[7] * below).w, below.w, 1e-9);
    }

    #[test]
    fn test_bitruncated_offsets() {
        let params = build(&GeometryConfig {
            geometry: GeometryKind::Regular { face: 7, vertex: 3 },
            variation: Variation::Bitruncated,
            show_3d: true,
            ..Default::default()
        });
        let layout = WallLayout::new(&params, true).unwrap();
        assert!(layout.many_cell_types());
        let hex = layout.walls(CellShape::Hex).unwrap();
        assert_eq!(hex.offset, 9);
        assert_eq!(hex.sides, 8);
        // Not supported with two shapes
        assert_eq!(layout.reflection_offset(), None);
        assert_eq!(layout.matrices().len(), 17);
    }

    #[test]
    fn test_reflections_fix_walls() {
        let params = build(&GeometryConfig {
            geometry: GeometryKind::Regular { face: 5, vertex: 3 },
            variation: Variation::Pure,
            show_3d: true,
            ..Default::default()
        });
        let layout = WallLayout::new(&params, true).unwrap();
        let offset = layout.reflection_offset().unwrap();
        let curv = Curvature::Spherical;
        for dir in 0..5 {
            let r = layout.matrices()[offset + dir];
            assert!(eq_matrix(&(r * r), &Transform::identity(), 1e-9));
            // Swaps the center with the neighbor's
            let step = params.shape_move(CellShape::Master, dir).unwrap();
            let image = r * math::c0();
            assert_approx_eq!(curv.hdist(&image, &tc0(&step)), 0.0, 1e-6);
        }
    }
}
