use crate::{
    geometry::BinaryMove,
    graph::{CellGraph, SearchHint},
    math::{horo, tc0, Curvature, Transform},
};
use derive_more::Display;
use std::f64::consts::LN_2;

/// A cell of the binary tiling. Cells on the same horocyclic level are
/// numbered left to right; a cell's parent sits one level up and its two
/// children one level down.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display(fmt = "({}, {})", level, x)]
pub struct BinaryCell {
    pub level: i32,
    pub x: i64,
}

impl BinaryCell {
    pub const ORIGIN: Self = Self::new(0, 0);

    pub const fn new(level: i32, x: i64) -> Self {
        Self { level, x }
    }
}

/// The binary tiling of the hyperbolic plane, with directions numbered by
/// [BinaryMove::index]. Only one of the two parent moves applies to any
/// given cell, the other one has no neighbor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BinaryTilingGraph {
    width: f64,
}

impl BinaryTilingGraph {
    pub fn new(width: f64) -> Self {
        Self { width }
    }

    /// Position of a cell relative to the origin cell. Consistent with the
    /// binary move table: `frame(c) * move(d) == frame(neighbor(c, d))`.
    pub fn frame(&self, cell: BinaryCell) -> Transform {
        let scale = 2f64.powi(cell.level);
        let u = self.width * ((cell.x as f64 + 0.5) * scale - 0.5);
        horo::parabolic(u, 0.0)
            * Curvature::Hyperbolic.xpush(cell.level as f64 * LN_2)
    }
}

impl CellGraph for BinaryTilingGraph {
    type Cell = BinaryCell;

    fn root(&self) -> BinaryCell {
        BinaryCell::ORIGIN
    }

    fn degree(&self, _cell: BinaryCell) -> usize {
        BinaryMove::ALL.len()
    }

    fn neighbor(&self, cell: BinaryCell, dir: usize) -> Option<BinaryCell> {
        let BinaryCell { level, x } = cell;
        let is_left = x.rem_euclid(2) == 0;
        match BinaryMove::ALL.get(dir)? {
            BinaryMove::Right => Some(BinaryCell::new(level, x + 1)),
            BinaryMove::Left => Some(BinaryCell::new(level, x - 1)),
            BinaryMove::ParentFromLeft if is_left => {
                Some(BinaryCell::new(level + 1, x.div_euclid(2)))
            }
            BinaryMove::ParentFromRight if !is_left => {
                Some(BinaryCell::new(level + 1, x.div_euclid(2)))
            }
            BinaryMove::ParentFromLeft | BinaryMove::ParentFromRight => None,
            BinaryMove::LeftChild => Some(BinaryCell::new(level - 1, 2 * x)),
            BinaryMove::RightChild => {
                Some(BinaryCell::new(level - 1, 2 * x + 1))
            }
        }
    }

    fn spin(&self, _cell: BinaryCell, dir: usize) -> usize {
        (dir + 3) % 6
    }

    fn depth(&self, cell: BinaryCell) -> usize {
        cell.level.unsigned_abs() as usize + cell.x.unsigned_abs() as usize
    }

    fn search_hint(&self) -> SearchHint {
        SearchHint::Crystal
    }

    fn space_distance(&self, a: BinaryCell, b: BinaryCell) -> Option<f64> {
        Some(
            Curvature::Hyperbolic
                .hdist(&tc0(&self.frame(a)), &tc0(&self.frame(b))),
        )
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

    #[test]
    fn test_frames_follow_moves() {
        let config = GeometryConfig {
            geometry: GeometryKind::BinaryTiling { width: 1.3 },
            variation: Variation::Pure,
            ..Default::default()
        };
        let params = ParameterBuilder::build(&config, None).unwrap();
        let graph = BinaryTilingGraph::new(1.3);
        let moves = &params.moves.heptmove;
        for &cell in &[
            BinaryCell::ORIGIN,
            BinaryCell::new(2, -3),
            BinaryCell::new(-1, 5),
        ] {
            for (dir, mv) in moves.iter().enumerate() {
                if let Some(n) = graph.neighbor(cell, dir) {
                    assert!(
                        eq_matrix(
                            &(graph.frame(cell) * mv),
                            &graph.frame(n),
                            1e-9
                        ),
                        "{} in direction {}",
                        cell,
                        dir
                    );
                    assert_eq!(
                        graph.neighbor(n, graph.spin(cell, dir)),
                        Some(cell)
                    );
                }
            }
        }
    }

    #[test]
    fn test_one_parent() {
        let graph = BinaryTilingGraph::new(1.0);
        let cell = BinaryCell::new(0, 3);
        assert_eq!(graph.neighbor(cell, 1), None);
        assert_eq!(graph.neighbor(cell, 2), Some(BinaryCell::new(1, 1)));
        assert_eq!(
            graph.neighbor(BinaryCell::new(0, -2), 1),
            Some(BinaryCell::new(1, -1))
        );
    }
}
