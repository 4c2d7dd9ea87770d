use crate::{
    geometry::{CellShape, Extension, GeometryFamily, GeometryParameterSet},
    graph::{CellGraph, SearchHint},
    math::{self, Transform},
    unwrap_or_bail,
};
use anyhow::{bail, ensure};
use log::debug;
use std::{collections::VecDeque, ops::Range};

/// Hard cap on the size of a patch. A hyperbolic patch grows exponentially
/// with its radius, so a careless radius would otherwise exhaust memory.
const MAX_PATCH_CELLS: usize = 100_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Link {
    target: usize,
    spin: usize,
}

#[derive(Clone, Debug)]
struct PatchCell {
    /// Position of the cell, in the root's frame
    frame: Transform,
    master: usize,
    master_direction: Option<usize>,
    depth: usize,
    links: Vec<Option<Link>>,
    /// Links between masters. Same as `links` for pure tilings.
    master_links: Vec<Option<Link>>,
}

/// A finite patch of a regular `{S7, S3}` tiling, pure or bitruncated, with
/// every master cell within `radius` steps of the root. Spherical tilings
/// close up on themselves once the radius is large enough.
///
/// The patch is built geometrically: each new cell is placed with the move
/// matrices of the parameter set, and a cell that lands on an existing one
/// is linked to it. Spins are read off the frames, so resolving transforms
/// over the patch reproduces the frames exactly.
#[derive(Clone, Debug)]
pub struct TilingPatch {
    family: GeometryFamily,
    cells: Vec<PatchCell>,
    masters: usize,
    closed: bool,
}

impl TilingPatch {
    pub fn new(
        params: &GeometryParameterSet,
        radius: usize,
    ) -> anyhow::Result<Self> {
        let family = params.family;
        ensure!(
            matches!(
                family,
                GeometryFamily::Hyperbolic
                    | GeometryFamily::Spherical
                    | GeometryFamily::Euclidean
            ) && params.extension == Extension::None
                && params.underlying.is_none(),
            "tiling patches need a regular 2D tiling, not {}",
            params.signature
        );
        ensure!(
            params.vertex.fract() == 0.0,
            "can't build a patch with {} cells around a vertex",
            params.vertex
        );
        ensure!(
            !params.bitruncated || params.vertex == 3.0,
            "bitruncated patches need three cells around each vertex"
        );

        let tolerance = 0.01
            * params
                .distances
                .tessf
                .min(params.distances.crossf)
                .min(params.distances.hexhexdist);
        let mut builder = PatchBuilder {
            params,
            tolerance,
            cells: Vec::new(),
            closed: true,
        };
        builder.grow_masters(radius)?;
        let masters = builder.cells.len();
        if params.bitruncated {
            builder.add_hexes(masters)?;
        } else {
            for cell in &mut builder.cells {
                cell.links = cell.master_links.clone();
            }
        }

        debug!(
            "built {} patch with {} cells ({} masters), closed: {}",
            family,
            builder.cells.len(),
            masters,
            builder.closed
        );
        Ok(Self {
            family,
            cells: builder.cells,
            masters,
            closed: builder.closed,
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Did every link find its neighbor, i.e. does the patch cover the whole
    /// (necessarily spherical) tiling?
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn family(&self) -> GeometryFamily {
        self.family
    }

    /// All cell ids
    pub fn cells(&self) -> Range<usize> {
        0..self.cells.len()
    }

    /// Ids of the master cells. Masters come first.
    pub fn masters(&self) -> Range<usize> {
        0..self.masters
    }

    /// Where the cell was placed, relative to the root
    pub fn frame(&self, cell: usize) -> Option<&Transform> {
        self.cells.get(cell).map(|c| &c.frame)
    }

    fn link(links: &[Option<Link>], dir: usize) -> Option<Link> {
        links.get(dir).copied().flatten()
    }
}

struct PatchBuilder<'a> {
    params: &'a GeometryParameterSet,
    tolerance: f64,
    cells: Vec<PatchCell>,
    closed: bool,
}

impl<'a> PatchBuilder<'a> {
    /// Breadth-first placement of the masters. A new master is placed with
    /// spin 0, so its direction 0 leads back to the master that found it.
    fn grow_masters(&mut self, radius: usize) -> anyhow::Result<()> {
        let n = self.params.moves.heptmove.len();
        self.cells.push(PatchCell {
            frame: Transform::identity(),
            master: 0,
            master_direction: None,
            depth: 0,
            links: Vec::new(),
            master_links: vec![None; n],
        });

        let mut queue = VecDeque::from(vec![0]);
        while let Some(m) = queue.pop_front() {
            for dir in 0..n {
                if self.cells[m].master_links[dir].is_some() {
                    continue;
                }
                let frame = self.cells[m].frame * self.params.heptmove(dir);
                let target = match self.find(&frame, CellShape::Master) {
                    Some(target) => target,
                    None if self.cells[m].depth < radius => {
                        ensure!(
                            self.cells.len() < MAX_PATCH_CELLS,
                            "patch of radius {} is too large",
                            radius
                        );
                        let id = self.cells.len();
                        self.cells.push(PatchCell {
                            frame,
                            master: id,
                            master_direction: None,
                            depth: self.cells[m].depth + 1,
                            links: Vec::new(),
                            master_links: vec![None; n],
                        });
                        queue.push_back(id);
                        id
                    }
                    None => {
                        self.closed = false;
                        continue;
                    }
                };

                let relative = self.params.family.invert(&frame)
                    * self.cells[target].frame;
                let spin = self.rotation_steps(&relative)?;
                self.cells[m].master_links[dir] = Some(Link { target, spin });
                let back = Link {
                    target: m,
                    spin: dir,
                };
                match self.cells[target].master_links[spin] {
                    None => self.cells[target].master_links[spin] = Some(back),
                    Some(link) => ensure!(
                        link == back,
                        "inconsistent link between masters {} and {}",
                        m,
                        target
                    ),
                }
            }
        }
        Ok(())
    }

    /// Place the secondary cells around every master, then link all cells
    /// by position
    fn add_hexes(&mut self, masters: usize) -> anyhow::Result<()> {
        for m in 0..masters {
            for dir in 0..self.params.sides {
                let frame = self.cells[m].frame * self.params.hexmove(dir);
                if self.find(&frame, CellShape::Hex).is_none() {
                    self.cells.push(PatchCell {
                        frame,
                        master: m,
                        master_direction: Some(dir),
                        depth: self.cells[m].depth,
                        links: Vec::new(),
                        master_links: Vec::new(),
                    });
                }
            }
        }

        for cell in 0..self.cells.len() {
            let shape = self.shape(cell);
            let sides = self.params.shape_sides(shape);
            let mut links = vec![None; sides];
            for (dir, link) in links.iter_mut().enumerate() {
                let step = unwrap_or_bail!(
                    self.params.shape_move(shape, dir),
                    "no move {} out of a {} cell",
                    dir,
                    shape
                );
                let target_shape = match shape {
                    CellShape::Master => CellShape::Hex,
                    CellShape::Hex if dir % 2 == 1 => CellShape::Master,
                    CellShape::Hex => CellShape::Hex,
                };
                let frame = self.cells[cell].frame * step;
                match self.find(&frame, target_shape) {
                    Some(target) => {
                        let spin = self.direction_towards(target, cell)?;
                        *link = Some(Link { target, spin });
                    }
                    None => self.closed = false,
                }
            }
            self.cells[cell].links = links;
        }
        Ok(())
    }

    fn shape(&self, cell: usize) -> CellShape {
        match self.cells[cell].master_direction {
            Some(_) => CellShape::Hex,
            None => CellShape::Master,
        }
    }

    /// Find an existing cell of the given shape centered where `frame`
    /// puts the origin
    fn find(&self, frame: &Transform, shape: CellShape) -> Option<usize> {
        let curv = self.params.family.curvature();
        let center = math::tc0(frame);
        self.cells.iter().enumerate().position(|(i, cell)| {
            self.shape(i) == shape
                && curv.hdist(&center, &math::tc0(&cell.frame)) < self.tolerance
        })
    }

    /// Number of master-direction steps in a transform that should be a
    /// plain rotation about the origin
    fn rotation_steps(&self, relative: &Transform) -> anyhow::Result<usize> {
        let n = self.params.moves.heptmove.len();
        let angle = relative[(0, 1)].atan2(relative[(0, 0)]);
        let steps =
            ((angle / self.params.alpha).round() as i64).rem_euclid(n as i64);
        let expected = math::spin(steps as f64 * self.params.alpha);
        if !math::eq_matrix(relative, &expected, 1e-6) {
            bail!(
                "neighbor frame is not a rotation of the move, \
                 is this a plane tiling? {}",
                relative
            );
        }
        Ok(steps as usize)
    }

    /// The side of `cell` that faces the center of `from`
    fn direction_towards(
        &self,
        cell: usize,
        from: usize,
    ) -> anyhow::Result<usize> {
        let curv = self.params.family.curvature();
        let shape = self.shape(cell);
        let target = math::tc0(&self.cells[from].frame);
        let mut best = None;
        for dir in 0..self.params.shape_sides(shape) {
            let step = unwrap_or_bail!(
                self.params.shape_move(shape, dir),
                "no move {} out of a {} cell",
                dir,
                shape
            );
            let center = math::tc0(&(self.cells[cell].frame * step));
            let dist = curv.hdist(&center, &target);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((dir, dist));
            }
        }
        match best {
            Some((dir, dist)) if dist < self.tolerance => Ok(dir),
            _ => bail!("cell {} doesn't border cell {}", cell, from),
        }
    }
}

impl CellGraph for TilingPatch {
    type Cell = usize;

    fn root(&self) -> usize {
        0
    }

    fn degree(&self, cell: usize) -> usize {
        self.cells.get(cell).map_or(0, |c| c.links.len())
    }

    fn neighbor(&self, cell: usize, dir: usize) -> Option<usize> {
        Self::link(&self.cells.get(cell)?.links, dir).map(|l| l.target)
    }

    fn spin(&self, cell: usize, dir: usize) -> usize {
        self.cells
            .get(cell)
            .and_then(|c| Self::link(&c.links, dir))
            .map_or(0, |l| l.spin)
    }

    fn master(&self, cell: usize) -> usize {
        self.cells.get(cell).map_or(cell, |c| c.master)
    }

    fn master_direction(&self, cell: usize) -> Option<usize> {
        self.cells.get(cell)?.master_direction
    }

    fn master_degree(&self, master: usize) -> usize {
        self.cells.get(master).map_or(0, |c| c.master_links.len())
    }

    fn master_neighbor(&self, master: usize, dir: usize) -> Option<usize> {
        Self::link(&self.cells.get(master)?.master_links, dir)
            .map(|l| l.target)
    }

    fn master_spin(&self, master: usize, dir: usize) -> usize {
        self.cells
            .get(master)
            .and_then(|c| Self::link(&c.master_links, dir))
            .map_or(0, |l| l.spin)
    }

    fn master_mirrored(&self, _master: usize, _dir: usize) -> bool {
        false
    }

    fn depth(&self, master: usize) -> usize {
        self.cells.get(master).map_or(0, |c| c.depth)
    }

    fn search_hint(&self) -> SearchHint {
        if self.closed {
            SearchHint::Bounded
        } else {
            SearchHint::DistanceField
        }
    }
}
