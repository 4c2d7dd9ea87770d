use crate::{
    config::GeometryKind,
    geometry::{
        derive::Derive, Distances, ParameterBuilder, HCROSSF7, HEXF7,
        HEXHEXDIST7,
    },
};

/// The binary tiling. Cells have unit height in the horocyclic direction;
/// `width` only stretches them sideways.
#[derive(Debug)]
pub struct BinaryDistances;

impl Derive for BinaryDistances {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let width = match builder.config.geometry {
            GeometryKind::BinaryTiling { width } => width,
            _ => 1.0,
        };
        let crossf = HCROSSF7 * width.min(1.0);
        builder.set_distances(Distances {
            hexf: HEXF7,
            hcrossf: crossf,
            rhexf: 1.0,
            tessf: 1.0,
            crossf,
            hexhexdist: HEXHEXDIST7,
            hexvdist: 1.0,
            edgelen: width,
        })
    }
}

/// Box lattices of Nil and Solv. All boxes are the same size, half a unit
/// from the center to a face.
#[derive(Debug)]
pub struct LatticeDistances;

impl Derive for LatticeDistances {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let width = match builder.config.geometry {
            GeometryKind::Nil { width } => width,
            _ => 1.0,
        };
        builder.set_distances(Distances {
            hexf: HEXF7 / 2.0,
            hcrossf: HCROSSF7 / 2.0,
            rhexf: 0.5,
            tessf: 0.5,
            crossf: HCROSSF7 / 2.0,
            hexhexdist: HEXHEXDIST7 / 2.0,
            hexvdist: 0.5,
            edgelen: width,
        })
    }
}
