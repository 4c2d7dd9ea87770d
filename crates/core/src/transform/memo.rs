use crate::{
    geometry::GeometryFamily,
    graph::CellGraph,
    math::{self, Point, Transform, MATRIX_EPSILON},
    transform::{search, TransformResolver},
};
use fnv::FnvHashMap;
use ordered_float::OrderedFloat;
use std::hash::Hash;

/// Cell transforms already resolved relative to one viewpoint cell. Moving
/// the viewpoint drops everything; so does [Self::clear], which callers use
/// when the camera or the geometry changes. Never authoritative, a missing
/// entry is just recomputed.
#[derive(Clone, Debug)]
pub struct TransformMemo<C> {
    viewpoint: Option<C>,
    transforms: FnvHashMap<C, Transform>,
}

impl<C: Copy + Eq + Hash> TransformMemo<C> {
    pub fn new() -> Self {
        Self {
            viewpoint: None,
            transforms: FnvHashMap::default(),
        }
    }

    pub fn viewpoint(&self) -> Option<C> {
        self.viewpoint
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn clear(&mut self) {
        self.viewpoint = None;
        self.transforms.clear();
    }

    /// The transform carrying `cell`'s frame into `viewpoint`'s frame,
    /// resolved on first use
    pub fn get_or_resolve<G: CellGraph<Cell = C>>(
        &mut self,
        resolver: &TransformResolver<'_, G>,
        viewpoint: C,
        cell: C,
        hint: &Point,
    ) -> Transform {
        if self.viewpoint != Some(viewpoint) {
            self.transforms.clear();
            self.viewpoint = Some(viewpoint);
        }
        *self
            .transforms
            .entry(cell)
            .or_insert_with(|| resolver.relative_matrix(cell, viewpoint, hint))
    }
}

impl<C: Copy + Eq + Hash> Default for TransformMemo<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every distinct transform at which each cell can be reached from an
/// origin cell, within a distance cutoff. In a quotient space a cell shows
/// up once per copy of it in range; [Self::best] picks the copy nearest an
/// approximate position.
#[derive(Clone, Debug)]
pub struct ReachabilityMap<C> {
    origin: C,
    family: GeometryFamily,
    cutoff: f64,
    transforms: FnvHashMap<C, Vec<Transform>>,
}

impl<C: Copy + Eq + Hash + std::fmt::Debug> ReachabilityMap<C> {
    /// Walk all paths out of `origin` whose cells stay within `cutoff` of
    /// it
    pub fn build<G: CellGraph<Cell = C>>(
        resolver: &TransformResolver<'_, G>,
        origin: C,
        cutoff: f64,
    ) -> Self {
        let family = resolver.family();
        let center = family.origin();
        let mut transforms: FnvHashMap<C, Vec<Transform>> =
            FnvHashMap::default();
        search::reachable(
            resolver,
            origin,
            |m| family.distance(&(m * center), &center) <= cutoff,
            |cell, m| {
                let known = transforms.entry(cell).or_default();
                if known
                    .iter()
                    .any(|k| math::eq_matrix(k, m, MATRIX_EPSILON))
                {
                    false
                } else {
                    known.push(*m);
                    true
                }
            },
        );
        Self {
            origin,
            family,
            cutoff,
            transforms,
        }
    }

    pub fn origin(&self) -> C {
        self.origin
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Number of recorded (cell, transform) pairs
    pub fn len(&self) -> usize {
        self.transforms.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// All recorded transforms for a cell
    pub fn transforms(&self, cell: C) -> &[Transform] {
        self.transforms.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// The recorded transform for `target` that puts it closest to `hint`
    pub fn best(&self, target: C, hint: &Point) -> Option<Transform> {
        let center = self.family.origin();
        self.transforms(target)
            .iter()
            .min_by_key(|m| {
                OrderedFloat(self.family.distance(&(*m * center), hint))
            })
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, GeometryKind, Variation},
        geometry::ParameterBuilder,
        graph::TorusGrid,
        math::{tc0, Curvature},
    };
    use assert_approx_eq::assert_approx_eq;

    fn square_grid() -> crate::geometry::GeometryParameterSet {
        let config = GeometryConfig {
            geometry: GeometryKind::Regular { face: 4, vertex: 4 },
            variation: Variation::Pure,
            ..Default::default()
        };
        ParameterBuilder::build(&config, None).unwrap()
    }

    #[test]
    fn test_memo_resets_on_viewpoint() {
        let params = square_grid();
        let torus = TorusGrid::new(3, 3).unwrap();
        let resolver = TransformResolver::new(&params, &torus);
        let mut memo = TransformMemo::new();
        let hint = math::c0();
        memo.get_or_resolve(&resolver, (0, 0), (1, 0), &hint);
        memo.get_or_resolve(&resolver, (0, 0), (1, 1), &hint);
        assert_eq!(memo.len(), 2);
        let m = memo.get_or_resolve(&resolver, (1, 0), (1, 0), &hint);
        assert_eq!(m, Transform::identity());
        assert_eq!(memo.len(), 1);
        assert_eq!(memo.viewpoint(), Some((1, 0)));
        memo.clear();
        assert!(memo.is_empty());
    }

    #[test]
    fn test_reachability_copies() {
        let params = square_grid();
        let torus = TorusGrid::new(3, 3).unwrap();
        let resolver = TransformResolver::new(&params, &torus);
        let map = ReachabilityMap::build(&resolver, (0, 0), 3.5);
        let curv = Curvature::Euclidean;

        // The origin is seen again one torus period away in each direction
        assert!(map.transforms((0, 0)).len() >= 5);
        let east = map.best((0, 0), &curv.xpush0(3.0)).unwrap();
        assert_approx_eq!(tc0(&east).x, 3.0, 1e-9);
        assert_approx_eq!(tc0(&east).y, 0.0, 1e-9);
        let home = map.best((0, 0), &math::c0()).unwrap();
        assert_approx_eq!(tc0(&home).x, 0.0, 1e-9);
        assert!(map.best((5, 5), &math::c0()).is_none());
    }
}
