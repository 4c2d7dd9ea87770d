use crate::graph::{CellGraph, SearchHint};
use anyhow::ensure;

/// Offsets of the four directions of a square cell: `+x, +y, -x, -y`
const STEPS: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// The `{4,4}` square grid wrapped onto a `width × height` torus. Between
/// two cells there are usually several shortest paths, one per way around
/// the torus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TorusGrid {
    width: usize,
    height: usize,
}

impl TorusGrid {
    pub fn new(width: usize, height: usize) -> anyhow::Result<Self> {
        // Smaller tori have cells that neighbor themselves
        ensure!(
            width >= 3 && height >= 3,
            "torus must be at least 3x3, got {}x{}",
            width,
            height
        );
        Ok(Self { width, height })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All cells, row by row
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| (x, y)))
    }

    fn wrap(value: i64, size: usize) -> usize {
        value.rem_euclid(size as i64) as usize
    }

    fn wrapped_distance(a: usize, b: usize, size: usize) -> usize {
        let d = if a > b { a - b } else { b - a };
        d.min(size - d)
    }
}

impl CellGraph for TorusGrid {
    type Cell = (usize, usize);

    fn root(&self) -> (usize, usize) {
        (0, 0)
    }

    fn degree(&self, _cell: (usize, usize)) -> usize {
        STEPS.len()
    }

    fn neighbor(
        &self,
        (x, y): (usize, usize),
        dir: usize,
    ) -> Option<(usize, usize)> {
        let (dx, dy) = STEPS.get(dir)?;
        Some((
            Self::wrap(x as i64 + dx, self.width),
            Self::wrap(y as i64 + dy, self.height),
        ))
    }

    fn spin(&self, _cell: (usize, usize), dir: usize) -> usize {
        (dir + 2) % 4
    }

    fn depth(&self, (x, y): (usize, usize)) -> usize {
        Self::wrapped_distance(x, 0, self.width)
            + Self::wrapped_distance(y, 0, self.height)
    }

    fn search_hint(&self) -> SearchHint {
        SearchHint::Quotient
    }

    fn cell_distance(
        &self,
        (ax, ay): (usize, usize),
        (bx, by): (usize, usize),
    ) -> Option<usize> {
        Some(
            Self::wrapped_distance(ax, bx, self.width)
                + Self::wrapped_distance(ay, by, self.height),
        )
    }
}
