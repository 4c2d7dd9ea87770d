use crate::{
    geometry::{GeometryFamily, HeightLevels, HeightMapping},
    math::{self, product, Transform},
};
use derive_more::Display;
use serde::Serialize;
use std::{f64::consts::PI, rc::Rc};

/// Distance from the center of a heptagon to the center of an adjacent
/// hexagon in the standard bitruncated `{7,3}` tiling. Other geometries are
/// scaled relative to this.
pub const HCROSSF7: f64 = 0.620672;
/// Center-to-vertex distance of the heptagons in bitruncated `{7,3}`
pub const HEXF7: f64 = 0.378077;
/// Distance between adjacent heptagon centers in `{7,3}`
pub const TESSF7: f64 = 1.090550;
/// Distance between adjacent hexagon centers in bitruncated `{7,3}`
pub const HEXHEXDIST7: f64 = 0.566256;

/// The distance constants of a tessellation. The names are historical, they
/// come from the heptagon/hexagon pattern of bitruncated `{7,3}`: "hept"
/// cells are the master cells, "hex" cells the ones bitruncation adds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Distances {
    /// Center of a master cell to its vertex, in bitruncated tilings
    pub hexf: f64,
    /// Center of a master cell to a vertex of the pure tiling
    pub hcrossf: f64,
    /// Center of a master cell to its vertex, for the active variation
    pub rhexf: f64,
    /// Center to center of adjacent master cells
    pub tessf: f64,
    /// Center of a master cell to the center of an adjacent cell, for the
    /// active variation
    pub crossf: f64,
    /// Center to center of adjacent secondary cells
    pub hexhexdist: f64,
    /// Center of a secondary cell to its vertex
    pub hexvdist: f64,
    /// Length of a master cell edge
    pub edgelen: f64,
}

/// Derived scale constants, sizing everything drawn on a cell
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Scales {
    /// Size of content relative to the standard `{7,3}` geometry
    pub scalefactor: f64,
    pub orbsize: f64,
    pub zhexf: f64,
    pub floorrad0: f64,
    pub floorrad1: f64,
    /// Height of one fiber level, for hybrid geometries
    pub plevel: f64,
}

/// Per-direction transforms out of a master cell. `heptmove[d]` carries the
/// frame of the neighbor in direction `d` (with spin 0) into the master's
/// frame. `hexmove` does the same for the secondary cells of bitruncated
/// tilings, and is empty for families without them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Moves {
    pub heptmove: Vec<Transform>,
    pub invheptmove: Vec<Transform>,
    pub hexmove: Vec<Transform>,
    pub invhexmove: Vec<Transform>,
}

/// The local shape of a cell. Master cells have `sides` sides; bitruncated
/// tilings add hexagons between them.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellShape {
    Master,
    Hex,
}

/// Constants of a Goldberg-Coxeter tiling `GP(a, b)`
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct GoldbergTables {
    pub a: u8,
    pub b: u8,
    /// Factor applied to distances relative to the pure tiling
    pub scale: f64,
    /// Angle between the master cell's direction 0 and the line to the
    /// nearest master along the `(a, b)` path
    pub rotation: f64,
}

/// Per-face metrics of an Archimedean tiling, in the order of its vertex
/// configuration
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArchimedeanTables {
    pub faces: Vec<u8>,
    pub edge: f64,
    pub inradius: Vec<f64>,
    pub circumradius: Vec<f64>,
    /// Interior angle of each face
    pub angles: Vec<f64>,
}

/// The moves of the binary tiling, as indices into its move table
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryMove {
    Right,
    /// To the parent, from a cell that is its left child
    ParentFromLeft,
    /// To the parent, from a cell that is its right child
    ParentFromRight,
    Left,
    LeftChild,
    RightChild,
}

impl BinaryMove {
    pub const ALL: [Self; 6] = [
        Self::Right,
        Self::ParentFromLeft,
        Self::ParentFromRight,
        Self::Left,
        Self::LeftChild,
        Self::RightChild,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BinaryTables {
    pub width: f64,
    /// Horocyclic level difference between a cell and its parent
    pub level_step: f64,
    /// Indexed by [BinaryMove::index]
    #[serde(skip)]
    pub moves: Vec<Transform>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductLevels {
    pub plevel: f64,
    pub twisted: bool,
    /// For rotation spaces: fiber steps per full turn around a vertex and
    /// per cell, i.e. `plevel = π * single_step / psl_steps`
    pub single_step: i32,
    pub psl_steps: i32,
    #[serde(skip)]
    pub level_down: Transform,
    #[serde(skip)]
    pub level_up: Transform,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct IrregularTables {
    /// Cells per master cell
    pub density: f64,
    pub scale: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatticeKind {
    Nil,
    Solv,
}

/// Box lattices of Nil and Solv
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LatticeTables {
    pub kind: LatticeKind,
    pub width: f64,
    /// Translation to each neighbor box, indexed by direction
    #[serde(skip)]
    pub moves: Vec<Transform>,
}

/// Geometry-specific data. At most one block is populated per parameter
/// set, selected by the geometry and variation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extension {
    None,
    Goldberg(GoldbergTables),
    Archimedean(ArchimedeanTables),
    BinaryTiling(BinaryTables),
    ProductLevels(ProductLevels),
    Irregular(IrregularTables),
    Lattice(LatticeTables),
}

/// Everything derived from one geometry configuration. Built once by
/// [ParameterBuilder](crate::geometry::ParameterBuilder) and immutable
/// afterwards; it is shared through `Rc` handles from the
/// [GeometryCache](crate::geometry::GeometryCache).
#[derive(Clone, Debug, Serialize)]
pub struct GeometryParameterSet {
    pub signature: String,
    pub family: GeometryFamily,
    /// Sides of a master cell ("S7"), not counting fiber directions
    pub sides: usize,
    /// Cells around a vertex ("S3"). Fractional for fake geometries.
    pub vertex: f64,
    /// Angle between consecutive directions of a master cell
    pub alpha: f64,
    pub bitruncated: bool,
    /// Rotation of the secondary cells' directions, for bitruncated tilings
    /// with even-sided masters
    pub hexshift: f64,
    #[serde(flatten)]
    pub distances: Distances,
    #[serde(flatten)]
    pub scales: Scales,
    pub mapping: HeightMapping,
    pub heights: HeightLevels,
    /// Set when the height mapping is degenerate. The heights are then the
    /// fallback table.
    pub invalid: Option<String>,
    #[serde(skip)]
    pub moves: Moves,
    pub extension: Extension,
    /// The parameter set of the underlying geometry, for hybrid and fake
    /// geometries
    #[serde(skip)]
    pub underlying: Option<Rc<GeometryParameterSet>>,
}

impl GeometryParameterSet {
    /// Serialize the derived constants into JSON. Move matrices and the
    /// underlying parameter set are left out.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> String {
        // Panic here indicates an internal bug in the data format
        serde_json::to_string_pretty(self)
            .expect("error serializing parameters")
    }

    pub fn heptmove(&self, dir: usize) -> &Transform {
        &self.moves.heptmove[dir % self.moves.heptmove.len()]
    }

    pub fn invheptmove(&self, dir: usize) -> &Transform {
        &self.moves.invheptmove[dir % self.moves.invheptmove.len()]
    }

    /// Transform to the secondary cell in direction `dir`. Falls back to the
    /// master move for tilings without secondary cells.
    pub fn hexmove(&self, dir: usize) -> &Transform {
        if self.moves.hexmove.is_empty() {
            self.heptmove(dir)
        } else {
            &self.moves.hexmove[dir % self.moves.hexmove.len()]
        }
    }

    pub fn invhexmove(&self, dir: usize) -> &Transform {
        if self.moves.invhexmove.is_empty() {
            self.invheptmove(dir)
        } else {
            &self.moves.invhexmove[dir % self.moves.invhexmove.len()]
        }
    }

    /// Height of one fiber level, for hybrid geometries
    pub fn plevel(&self) -> Option<f64> {
        match &self.extension {
            Extension::ProductLevels(levels) => Some(levels.plevel),
            _ => None,
        }
    }

    pub fn product_levels(&self) -> Option<&ProductLevels> {
        match &self.extension {
            Extension::ProductLevels(levels) => Some(levels),
            _ => None,
        }
    }

    pub fn binary_tables(&self) -> Option<&BinaryTables> {
        match &self.extension {
            Extension::BinaryTiling(tables) => Some(tables),
            _ => None,
        }
    }

    pub fn lattice_tables(&self) -> Option<&LatticeTables> {
        match &self.extension {
            Extension::Lattice(tables) => Some(tables),
            _ => None,
        }
    }

    /// Signature of the underlying parameter set, if there is one
    pub fn underlying_signature(&self) -> Option<&str> {
        self.underlying.as_ref().map(|u| u.signature.as_str())
    }

    /// Number of sides of a cell with the given shape, fiber directions
    /// included
    pub fn shape_sides(&self, shape: CellShape) -> usize {
        match (&self.underlying, self.family.is_hybrid()) {
            (Some(underlying), true) => underlying.shape_sides(shape) + 2,
            _ => match shape {
                CellShape::Master => self.moves.heptmove.len(),
                CellShape::Hex => 6,
            },
        }
    }

    /// Transform from a cell of the given shape to its neighbor in direction
    /// `dir`, with the neighbor's direction 0 pointing back. `None` if the
    /// shape has no such direction.
    pub fn shape_move(
        &self,
        shape: CellShape,
        dir: usize,
    ) -> Option<Transform> {
        if self.family.is_hybrid() {
            let underlying = self.underlying.as_ref()?;
            let levels = self.product_levels()?;
            let flat = underlying.shape_sides(shape);
            return match dir.checked_sub(flat) {
                None => underlying
                    .shape_move(shape, dir)
                    .map(|m| product::swap_layout(&m)),
                Some(0) => Some(levels.level_down),
                Some(1) => Some(levels.level_up),
                Some(_) => None,
            };
        }
        match shape {
            CellShape::Master if self.bitruncated => {
                self.moves.hexmove.get(dir).copied()
            }
            CellShape::Master => self.moves.heptmove.get(dir).copied(),
            CellShape::Hex if dir < 6 => {
                // Odd directions lead back to masters, even ones to hexes
                let dist = if dir % 2 == 0 {
                    self.distances.hexhexdist
                } else {
                    self.distances.crossf
                };
                Some(
                    math::spin(-(dir as f64) * PI / 3.0)
                        * self.family.curvature().xpush(dist)
                        * math::spin(PI),
                )
            }
            CellShape::Hex => None,
        }
    }
}
