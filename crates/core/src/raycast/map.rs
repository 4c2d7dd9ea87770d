use crate::{
    graph::CellGraph,
    math::{self, Transform, MATRIX_EPSILON},
    raycast::{
        walls::{CellAppearance, WallLayout, MAX_PACKED_SIDES},
        COLOR_OUT_OF_RANGE, GMS_LIMIT, TEXTURE_WIDTH,
    },
    timed,
    transform::TransformResolver,
};
use anyhow::{anyhow, ensure, Context};
use derive_more::Display;
use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, error, info};
use serde::Serialize;
use std::hash::Hash;

/// One element of a map texture
pub type Texel = [f32; 4];

/// Scale of the matrix index in the `z` channel of a connection texel
pub(crate) const MATRIX_INDEX_SCALE: f32 = 1024.0;

/// Texture map entries: which wall texture to use, and how much of it
const TEXTURE_SOLID: Texel = [0.1, 0.0, 0.0, 0.0];
const TEXTURE_TINTED: Texel = [0.001, 0.0, 0.0, 0.0];

/// Connection texel of a side that leads out of the map
const CONNECTION_OUT_OF_RANGE: Texel = [-1.0, -1.0, 0.0, 0.0];

/// The matrix table outgrew the shader's uniform array. The shader has to be
/// rebuilt with at least `required` slots, then the map built again.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
#[display(
    fmt = "raycast map needs {} matrices, the shader holds {}",
    required,
    capacity
)]
pub struct CapacityExceeded {
    pub required: usize,
    pub capacity: usize,
}

impl std::error::Error for CapacityExceeded {}

/// A decoded connection texel
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    /// Map id of the cell on the other side
    pub target: usize,
    /// Index of the crossing transform in the matrix table
    pub matrix: usize,
    /// Where the target's wall matrices start
    pub wall_offset: usize,
    /// Number of walls of the target
    pub sides: usize,
}

/// The cells around a center cell, flattened into textures the raycasting
/// shader can read. Cell `id` owns `degree` consecutive texels starting at
/// [Self::texel_index], one per side; each texture is `TEXTURE_WIDTH` texels
/// wide and has a power of two rows.
#[derive(Clone, Debug, PartialEq)]
pub struct RaycastMap<C: Eq + Hash> {
    cells: Vec<C>,
    ids: FnvHashMap<C, usize>,
    matrices: Vec<Transform>,
    degree: usize,
    per_row: usize,
    rows: usize,
    connections: Vec<Texel>,
    wall_colors: Vec<Texel>,
    texture_map: Vec<Texel>,
    volumetric: Vec<Texel>,
}

/// Sizes of a [RaycastMap], for reporting
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MapSummary {
    pub cells: usize,
    pub matrices: usize,
    pub degree: usize,
    pub per_row: usize,
    pub rows: usize,
}

impl<C: Copy + Eq + Hash> RaycastMap<C> {
    fn new(cells: Vec<C>, matrices: Vec<Transform>, degree: usize) -> Self {
        let per_row = TEXTURE_WIDTH / degree;
        let rows = ((cells.len() + per_row - 1) / per_row).next_power_of_two();
        let size = TEXTURE_WIDTH * rows;
        let ids = cells.iter().enumerate().map(|(i, c)| (*c, i)).collect();
        Self {
            cells,
            ids,
            matrices,
            degree,
            per_row,
            rows,
            connections: vec![[0.0; 4]; size],
            wall_colors: vec![[0.0; 4]; size],
            texture_map: vec![[0.0; 4]; size],
            volumetric: vec![[0.0; 4]; size],
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn summary(&self) -> MapSummary {
        MapSummary {
            cells: self.cells.len(),
            matrices: self.matrices.len(),
            degree: self.degree,
            per_row: self.per_row,
            rows: self.rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in visiting order; a cell's index is its id
    pub fn cells(&self) -> &[C] {
        &self.cells
    }

    pub fn id(&self, cell: C) -> Option<usize> {
        self.ids.get(&cell).copied()
    }

    /// The full matrix table: the wall layout, then the interned crossings
    pub fn matrices(&self) -> &[Transform] {
        &self.matrices
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn per_row(&self) -> usize {
        self.per_row
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn connections(&self) -> &[Texel] {
        &self.connections
    }

    pub fn wall_colors(&self) -> &[Texel] {
        &self.wall_colors
    }

    pub fn texture_map(&self) -> &[Texel] {
        &self.texture_map
    }

    pub fn volumetric(&self) -> &[Texel] {
        &self.volumetric
    }

    /// Texture coordinates of side `side` of cell `id`
    pub fn enc(&self, id: usize, side: usize) -> [f32; 2] {
        let x = ((id % self.per_row) * self.degree + side) as f32 + 0.5;
        let y = (id / self.per_row) as f32 + 0.5;
        [x / TEXTURE_WIDTH as f32, y / self.rows as f32]
    }

    /// Index into the textures of side `side` of cell `id`
    pub fn texel_index(&self, id: usize, side: usize) -> usize {
        (id / self.per_row) * TEXTURE_WIDTH
            + (id % self.per_row) * self.degree
            + side
    }

    /// Read back the connection texel of a side, the way the shader does.
    /// `None` for sides leading out of the map.
    pub fn connection(&self, id: usize, side: usize) -> Option<Connection> {
        let texel = self.connections.get(self.texel_index(id, side))?;
        if texel[0] < 0.0 {
            return None;
        }
        let column = (texel[0] * TEXTURE_WIDTH as f32) as usize;
        let row = (texel[1] * self.rows as f32) as usize;
        let wall_offset = (texel[3] * 256.0) as usize;
        let packed = (texel[3] * TEXTURE_WIDTH as f32) as usize;
        Some(Connection {
            target: row * self.per_row + column / self.degree,
            matrix: (texel[2] * MATRIX_INDEX_SCALE) as usize,
            wall_offset,
            sides: packed - MAX_PACKED_SIDES * wall_offset,
        })
    }

    pub fn wall_color(&self, id: usize, side: usize) -> Texel {
        self.wall_colors[self.texel_index(id, side)]
    }

    /// Index of a transform in the table, adding it if it's new
    fn intern(&mut self, m: Transform) -> usize {
        match self
            .matrices
            .iter()
            .position(|known| math::eq_matrix(known, &m, MATRIX_EPSILON))
        {
            Some(k) => k,
            None => {
                self.matrices.push(m);
                self.matrices.len() - 1
            }
        }
    }
}

/// Convert a packed `0xRRGGBBAA` color to a texel, darkened by `darkness`
/// sixteenths
fn color_texel(color: u32, darkness: u8) -> Texel {
    let channel = |shift: u32| ((color >> shift) & 0xFF) as f32 / 255.0;
    let p = 1.0 - f32::from(darkness) / 16.0;
    [
        channel(24) * p,
        channel(16) * p,
        channel(8) * p,
        channel(0),
    ]
}

/// Builds [RaycastMap]s out of a graph, the wall layout of its geometry and
/// the contents of its cells
pub struct MapBuilder<'a, 'g, G, A> {
    resolver: &'a TransformResolver<'g, G>,
    layout: &'a WallLayout,
    appearance: &'a A,
    max_cells: usize,
}

impl<'a, 'g, G, A> MapBuilder<'a, 'g, G, A>
where
    G: CellGraph,
    A: CellAppearance<G::Cell>,
{
    pub fn new(
        resolver: &'a TransformResolver<'g, G>,
        layout: &'a WallLayout,
        appearance: &'a A,
        max_cells: usize,
    ) -> Self {
        Self {
            resolver,
            layout,
            appearance,
            max_cells: max_cells.max(1),
        }
    }

    /// Build the map around `center`, for a shader whose matrix array has
    /// `capacity` slots. Fails if the table doesn't fit; see
    /// [Self::build_with_growth].
    pub fn try_build(
        &self,
        center: G::Cell,
        capacity: usize,
    ) -> Result<RaycastMap<G::Cell>, CapacityExceeded> {
        let cells = timed!("Cell listing", self.list_cells(center));
        let degree = self.layout.degree().max(1);
        let mut map =
            RaycastMap::new(cells, self.layout.matrices().to_vec(), degree);
        timed!("Connection generation", {
            for id in 0..map.len() {
                self.connect(&mut map, id);
            }
        });
        debug!(
            "Raycast map around {:?}: {} cells, {} matrices",
            center,
            map.len(),
            map.matrices.len()
        );

        if map.matrices.len() > capacity {
            Err(CapacityExceeded {
                required: map.matrices.len(),
                capacity,
            })
        } else {
            Ok(map)
        }
    }

    /// Build the map, growing the matrix capacity once if it doesn't fit.
    /// Returns the map and the capacity it fits in; if that differs from
    /// `capacity`, the shader has to be rebuilt before the map is used.
    pub fn build_with_growth(
        &self,
        center: G::Cell,
        capacity: usize,
    ) -> anyhow::Result<(RaycastMap<G::Cell>, usize)> {
        let mut capacity = capacity;
        let mut grown = false;
        loop {
            match self.try_build(center, capacity) {
                Ok(map) => return Ok((map, capacity)),
                Err(exceeded) if !grown => {
                    ensure!(
                        exceeded.required <= GMS_LIMIT,
                        "{}, which is over the limit of {}",
                        exceeded,
                        GMS_LIMIT
                    );
                    info!(
                        "Growing raycast matrix capacity from {} to {}",
                        capacity, exceeded.required
                    );
                    capacity = exceeded.required;
                    grown = true;
                }
                Err(exceeded) => {
                    return Err(anyhow!(exceeded))
                        .context("raycast map still too large after growing")
                }
            }
        }
    }

    /// Breadth-first from the center, up to the cell limit. Solid wall
    /// cells can't be seen past, so we don't expand them, unless the center
    /// is inside a wall itself.
    fn list_cells(&self, center: G::Cell) -> Vec<G::Cell> {
        let graph = self.resolver.graph();
        let skip_walls = !self.appearance.is_wall(center);
        let mut cells = vec![center];
        let mut listed = FnvHashSet::default();
        listed.insert(center);

        let mut i = 0;
        'listing: while i < cells.len() {
            let cell = cells[i];
            i += 1;
            if skip_walls && self.appearance.is_wall(cell) {
                continue;
            }
            for dir in 0..graph.degree(cell) {
                if let Some(next) = graph.neighbor(cell, dir) {
                    if listed.insert(next) {
                        cells.push(next);
                    }
                    if cells.len() >= self.max_cells {
                        break 'listing;
                    }
                }
            }
        }
        cells
    }

    /// Fill in the texels of one cell
    fn connect(&self, map: &mut RaycastMap<G::Cell>, id: usize) {
        let graph = self.resolver.graph();
        let family = self.resolver.family();
        let appearance = self.appearance;
        let cell = map.cells[id];
        let base = map.texel_index(id, 0);
        map.volumetric[base] = color_texel(appearance.volume_color(cell), 0);

        let walls = match self.layout.walls(graph.shape(cell)) {
            Some(walls) => walls,
            None => {
                error!("No wall layout for {} cells", graph.shape(cell));
                return;
            }
        };
        let degree = graph.degree(cell);
        for dir in 0..degree {
            let u = base + dir;
            let target = graph.neighbor(cell, dir).and_then(|n| {
                map.id(n).map(|target| (n, target))
            });
            let (neighbor, target) = match target {
                Some(target) => target,
                None => {
                    map.connections[u] = CONNECTION_OUT_OF_RANGE;
                    map.wall_colors[u] = color_texel(COLOR_OUT_OF_RANGE, 0);
                    map.texture_map[u] = TEXTURE_SOLID;
                    continue;
                }
            };

            let darkness =
                appearance.darkness(neighbor, graph.spin(cell, dir));
            let color = appearance.boundary_color(cell, neighbor);
            if appearance.is_wall(neighbor) {
                map.wall_colors[u] = color_texel(color | 0xFF, darkness);
                map.texture_map[u] = TEXTURE_SOLID;
            } else if color != 0 {
                map.wall_colors[u] = color_texel(color, darkness);
                map.texture_map[u] = TEXTURE_TINTED;
            }

            // Level crossings of product spaces only change the fiber
            // coordinate, which the shader tracks by itself
            let fiber = family.is_hybrid() && dir + 2 >= degree;
            let crossing = match self.resolver.cell_iadj(cell, dir) {
                Some(_) if fiber => Transform::identity(),
                Some(iadj) => {
                    let wall = &self.layout.matrices()[walls.offset + dir];
                    iadj * family.invert(wall)
                }
                None => Transform::identity(),
            };
            let k = map.intern(crossing);

            let target_walls = self
                .layout
                .walls(graph.shape(neighbor))
                .unwrap_or(walls);
            let [x, y] = map.enc(target, 0);
            map.connections[u] = [
                x,
                y,
                (k as f32 + 0.5) / MATRIX_INDEX_SCALE,
                target_walls.offset as f32 / 256.0
                    + (target_walls.sides as f32 + 0.5) / TEXTURE_WIDTH as f32,
            ];
        }

        // Floor and ceiling of embedded tilings
        if self.layout.is_embedded() {
            let floor = color_texel(appearance.floor_color(cell) | 0xFF, 0);
            for u in base + degree..base + (walls.sides).min(map.degree) {
                map.wall_colors[u] = floor;
                map.texture_map[u] = TEXTURE_SOLID;
            }
        }
    }
}
