use crate::{
    graph::{CellGraph, SearchHint},
    math::{nil, Point},
};
use derive_more::Display;

/// A box of the Nil lattice. The box's center is the group element
/// `(a·w, b·w, c·w²)` for lattice width `w`.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display(fmt = "({}, {}, {})", a, b, c)]
pub struct NilCell {
    pub a: i64,
    pub b: i64,
    pub c: i64,
}

impl NilCell {
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    pub const fn new(a: i64, b: i64, c: i64) -> Self {
        Self { a, b, c }
    }
}

/// The lattice of boxes tiling Nil, generated by the six translations of
/// the Nil move table (`-x, -y, -z, +x, +y, +z`). Moving along y shears the
/// z coordinate by the x coordinate, which is what makes the lattice
/// non-commutative.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NilLattice {
    width: f64,
}

impl NilLattice {
    pub fn new(width: f64) -> Self {
        Self { width }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// The group element at the center of a box
    pub fn center(&self, cell: NilCell) -> Point {
        let w = self.width;
        Point::new(
            cell.a as f64 * w,
            cell.b as f64 * w,
            cell.c as f64 * w * w,
            1.0,
        )
    }
}

impl CellGraph for NilLattice {
    type Cell = NilCell;

    fn root(&self) -> NilCell {
        NilCell::ORIGIN
    }

    fn degree(&self, _cell: NilCell) -> usize {
        6
    }

    fn neighbor(&self, cell: NilCell, dir: usize) -> Option<NilCell> {
        let NilCell { a, b, c } = cell;
        match dir {
            0 => Some(NilCell::new(a - 1, b, c)),
            1 => Some(NilCell::new(a, b - 1, c - a)),
            2 => Some(NilCell::new(a, b, c - 1)),
            3 => Some(NilCell::new(a + 1, b, c)),
            4 => Some(NilCell::new(a, b + 1, c + a)),
            5 => Some(NilCell::new(a, b, c + 1)),
            _ => None,
        }
    }

    fn spin(&self, _cell: NilCell, dir: usize) -> usize {
        (dir + 3) % 6
    }

    fn depth(&self, cell: NilCell) -> usize {
        (cell.a.abs() + cell.b.abs() + cell.c.abs()) as usize
    }

    fn search_hint(&self) -> SearchHint {
        SearchHint::Crystal
    }

    /// Coordinate distance between the centers, measured in the frame of
    /// `a`. Left translations keep this consistent no matter where the two
    /// cells are.
    fn space_distance(&self, a: NilCell, b: NilCell) -> Option<f64> {
        let relative = nil::compose(
            &nil::group_inverse(&self.center(a)),
            &self.center(b),
        );
        Some(relative.xyz().norm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, GeometryKind, Variation},
        geometry::ParameterBuilder,
        math,
    };

    #[test]
    fn test_neighbors_match_moves() {
        let config = GeometryConfig {
            geometry: GeometryKind::Nil { width: 1.5 },
            variation: Variation::Pure,
            ..Default::default()
        };
        let params = ParameterBuilder::build(&config, None).unwrap();
        let lattice = NilLattice::new(1.5);
        let cell = NilCell::new(2, -1, 3);
        for (dir, mv) in params.moves.heptmove.iter().enumerate() {
            let n = lattice.neighbor(cell, dir).unwrap();
            let expected = math::nil::translate(&lattice.center(cell)) * mv;
            let actual = math::nil::translate(&lattice.center(n));
            assert!(
                math::eq_matrix(&expected, &actual, 1e-9),
                "direction {}",
                dir
            );
            assert_eq!(
                lattice.neighbor(n, lattice.spin(cell, dir)),
                Some(cell)
            );
        }
    }

    #[test]
    fn test_commutator() {
        let lattice = NilLattice::new(1.0);
        // +x +y -x -y is one step up
        let end = [3, 4, 0, 1]
            .iter()
            .try_fold(NilCell::ORIGIN, |c, &d| lattice.neighbor(c, d));
        assert_eq!(end, Some(NilCell::new(0, 0, 1)));
    }
}
