//! Cell adjacency graphs. The resolver, rebaser and raycaster only ever see
//! a tessellation through the [CellGraph] trait: given a cell and a
//! direction, it names the neighbor and how the neighbor's directions are
//! rotated relative to ours.
//!
//! The implementations here cover the shapes of space this crate knows how
//! to walk without an external map generator: finite patches of regular
//! tilings, a torus, the Nil lattice, the binary tiling and products of any
//! of these with a line.

mod binary;
mod lattice;
mod patch;
mod product;
mod torus;

pub use binary::{BinaryCell, BinaryTilingGraph};
pub use lattice::{NilCell, NilLattice};
pub use patch::TilingPatch;
pub use product::{ProductCell, ProductGraph};
pub use torus::TorusGrid;

use crate::geometry::CellShape;
use derive_more::Display;
use std::{fmt::Debug, hash::Hash};

/// Which frontier policy finds paths between two cells of a graph. This is
/// a property of the space's topology, not of the tiling.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum SearchHint {
    /// Compact space. There may be several short paths between two cells,
    /// and the approximate target position picks between them.
    Bounded,
    /// Bounded quotient with a graph distance oracle. We descend greedily on
    /// the oracle.
    Quotient,
    /// Infinite lattice with an intrinsic distance between cells. Searched
    /// best-first by that distance.
    Crystal,
    /// Infinite tiling with a BFS depth from a root. Both sides step toward
    /// the root until they meet.
    DistanceField,
}

/// An adjacency oracle over cells. Directions are numbered `0..degree`. The
/// graph is never mutated through this trait.
///
/// Master cells carry the combinatorial structure; for tilings without
/// secondary cells every cell is its own master and the `master_*` methods
/// fall back to the cell-level ones.
pub trait CellGraph {
    type Cell: Copy + Debug + Eq + Hash;

    /// The cell that depths are measured from
    fn root(&self) -> Self::Cell;

    /// Number of directions out of a cell, including fiber directions
    fn degree(&self, cell: Self::Cell) -> usize;

    /// The neighbor across side `dir`. `None` past the edge of a finite
    /// graph, or where the direction doesn't apply (binary tiling parents).
    fn neighbor(&self, cell: Self::Cell, dir: usize) -> Option<Self::Cell>;

    /// The direction out of `neighbor(cell, dir)` that leads back to `cell`
    fn spin(&self, cell: Self::Cell, dir: usize) -> usize;

    /// Does crossing side `dir` reverse orientation?
    fn mirrored(&self, _cell: Self::Cell, _dir: usize) -> bool {
        false
    }

    fn master(&self, cell: Self::Cell) -> Self::Cell {
        cell
    }

    /// For secondary cells, the direction `d` such that the cell's frame is
    /// its master's frame times `hexmove[d]`. `None` for masters.
    fn master_direction(&self, _cell: Self::Cell) -> Option<usize> {
        None
    }

    fn shape(&self, cell: Self::Cell) -> CellShape {
        match self.master_direction(cell) {
            Some(_) => CellShape::Hex,
            None => CellShape::Master,
        }
    }

    fn master_degree(&self, master: Self::Cell) -> usize {
        self.degree(master)
    }

    fn master_neighbor(
        &self,
        master: Self::Cell,
        dir: usize,
    ) -> Option<Self::Cell> {
        self.neighbor(master, dir)
    }

    fn master_spin(&self, master: Self::Cell, dir: usize) -> usize {
        self.spin(master, dir)
    }

    fn master_mirrored(&self, master: Self::Cell, dir: usize) -> bool {
        self.mirrored(master, dir)
    }

    /// Graph distance of a master from the root
    fn depth(&self, master: Self::Cell) -> usize;

    /// The master-level direction that decreases [Self::depth]. Only
    /// consulted for depths above 0.
    fn parent_direction(&self, _master: Self::Cell) -> usize {
        0
    }

    fn search_hint(&self) -> SearchHint;

    /// Exact graph distance between two masters, for quotient spaces
    fn cell_distance(&self, _a: Self::Cell, _b: Self::Cell) -> Option<usize> {
        None
    }

    /// Intrinsic distance between the centers of two masters, for lattices
    fn space_distance(&self, _a: Self::Cell, _b: Self::Cell) -> Option<f64> {
        None
    }
}

/// Follow a path of directions from a cell. `None` if any step leaves the
/// graph.
pub fn walk<G: CellGraph>(
    graph: &G,
    from: G::Cell,
    path: &[usize],
) -> Option<G::Cell> {
    path.iter()
        .try_fold(from, |cell, &dir| graph.neighbor(cell, dir))
}
