use crate::graph::{CellGraph, SearchHint};

/// A cell of a product graph: a cell of the base graph at a fiber level
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProductCell<C> {
    pub cell: C,
    pub level: i64,
}

/// `G × ℤ`: a stack of copies of the base graph. Directions
/// `0..degree(base)` stay on the same level, `degree` goes one level down
/// and `degree + 1` one level up.
#[derive(Clone, Debug)]
pub struct ProductGraph<G> {
    base: G,
}

impl<G: CellGraph> ProductGraph<G> {
    pub fn new(base: G) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &G {
        &self.base
    }

    pub fn cell(&self, cell: G::Cell, level: i64) -> ProductCell<G::Cell> {
        ProductCell { cell, level }
    }
}

impl<G: CellGraph> CellGraph for ProductGraph<G> {
    type Cell = ProductCell<G::Cell>;

    fn root(&self) -> Self::Cell {
        self.cell(self.base.root(), 0)
    }

    fn degree(&self, cell: Self::Cell) -> usize {
        self.base.degree(cell.cell) + 2
    }

    fn neighbor(&self, cell: Self::Cell, dir: usize) -> Option<Self::Cell> {
        let flat = self.base.degree(cell.cell);
        match dir.checked_sub(flat) {
            None => {
                Some(self.cell(self.base.neighbor(cell.cell, dir)?, cell.level))
            }
            Some(0) => Some(self.cell(cell.cell, cell.level - 1)),
            Some(1) => Some(self.cell(cell.cell, cell.level + 1)),
            Some(_) => None,
        }
    }

    fn spin(&self, cell: Self::Cell, dir: usize) -> usize {
        let flat = self.base.degree(cell.cell);
        match dir.checked_sub(flat) {
            None => self.base.spin(cell.cell, dir),
            // Down and up lead back to each other
            Some(0) => flat + 1,
            Some(_) => flat,
        }
    }

    fn mirrored(&self, cell: Self::Cell, dir: usize) -> bool {
        dir < self.base.degree(cell.cell) && self.base.mirrored(cell.cell, dir)
    }

    fn master(&self, cell: Self::Cell) -> Self::Cell {
        self.cell(self.base.master(cell.cell), cell.level)
    }

    fn master_direction(&self, cell: Self::Cell) -> Option<usize> {
        self.base.master_direction(cell.cell)
    }

    fn master_degree(&self, master: Self::Cell) -> usize {
        self.base.master_degree(master.cell) + 2
    }

    fn master_neighbor(
        &self,
        master: Self::Cell,
        dir: usize,
    ) -> Option<Self::Cell> {
        let flat = self.base.master_degree(master.cell);
        match dir.checked_sub(flat) {
            None => Some(self.cell(
                self.base.master_neighbor(master.cell, dir)?,
                master.level,
            )),
            Some(0) => Some(self.cell(master.cell, master.level - 1)),
            Some(1) => Some(self.cell(master.cell, master.level + 1)),
            Some(_) => None,
        }
    }

    fn master_spin(&self, master: Self::Cell, dir: usize) -> usize {
        let flat = self.base.master_degree(master.cell);
        match dir.checked_sub(flat) {
            None => self.base.master_spin(master.cell, dir),
            Some(0) => flat + 1,
            Some(_) => flat,
        }
    }

    fn master_mirrored(&self, master: Self::Cell, dir: usize) -> bool {
        dir < self.base.master_degree(master.cell)
            && self.base.master_mirrored(master.cell, dir)
    }

    fn depth(&self, master: Self::Cell) -> usize {
        self.base.depth(master.cell) + master.level.unsigned_abs() as usize
    }

    /// Level first, then down the base graph
    fn parent_direction(&self, master: Self::Cell) -> usize {
        let flat = self.base.master_degree(master.cell);
        if master.level > 0 {
            flat
        } else if master.level < 0 {
            flat + 1
        } else {
            self.base.parent_direction(master.cell)
        }
    }

    fn search_hint(&self) -> SearchHint {
        self.base.search_hint()
    }

    fn cell_distance(&self, a: Self::Cell, b: Self::Cell) -> Option<usize> {
        let flat = self.base.cell_distance(a.cell, b.cell)?;
        Some(flat + (a.level - b.level).unsigned_abs() as usize)
    }

    fn space_distance(&self, a: Self::Cell, b: Self::Cell) -> Option<f64> {
        let flat = self.base.space_distance(a.cell, b.cell)?;
        let dz = (a.level - b.level) as f64;
        Some((flat * flat + dz * dz).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TorusGrid;

    #[test]
    fn test_levels() {
        let graph = ProductGraph::new(TorusGrid::new(4, 4).unwrap());
        let root = graph.root();
        assert_eq!(graph.degree(root), 6);
        let up = graph.neighbor(root, 5).unwrap();
        assert_eq!(up, graph.cell((0, 0), 1));
        assert_eq!(graph.spin(root, 5), 4);
        assert_eq!(graph.neighbor(up, 4), Some(root));
        assert_eq!(graph.neighbor(root, 0), Some(graph.cell((1, 0), 0)));
        assert_eq!(graph.spin(root, 0), 2);
        assert_eq!(graph.neighbor(root, 6), None);
    }

    #[test]
    fn test_parent_direction() {
        let graph = ProductGraph::new(TorusGrid::new(4, 4).unwrap());
        assert_eq!(graph.parent_direction(graph.cell((1, 1), 3)), 4);
        assert_eq!(graph.parent_direction(graph.cell((1, 1), -2)), 5);
        assert_eq!(graph.depth(graph.cell((1, 1), -2)), 4);
        assert_eq!(
            graph.cell_distance(graph.cell((0, 0), 1), graph.cell((3, 0), -1)),
            Some(3)
        );
    }
}
