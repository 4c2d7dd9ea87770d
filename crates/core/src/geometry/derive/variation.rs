use crate::{
    config::{GeometryKind, Variation},
    geometry::{
        derive::Derive, Extension, GoldbergTables, IrregularTables,
        ParameterBuilder,
    },
};
use anyhow::bail;

/// Goldberg-Coxeter `GP(a, b)`: the master cells shrink by the length of
/// the `(a, b)` path between neighboring masters, measured in cells
#[derive(Debug)]
pub struct GoldbergScale;

impl Derive for GoldbergScale {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let (a, b) = match builder.config.variation {
            Variation::Goldberg { a, b } => (a, b),
            other => bail!("not a Goldberg variation: {:?}", other),
        };
        let (fa, fb) = (a as f64, b as f64);
        let vertex = match builder.config.geometry {
            GeometryKind::Regular { vertex, .. }
            | GeometryKind::Fake { vertex, .. }
            | GeometryKind::Product { vertex, .. } => vertex,
            ref other => bail!("no Goldberg variation of {:?}", other),
        };
        let (scale, rotation) = if vertex == 3 {
            (
                1.0 / (fa * fa + fa * fb + fb * fb).sqrt(),
                (fb * 3f64.sqrt() / 2.0).atan2(fa + fb / 2.0),
            )
        } else {
            (1.0 / (fa * fa + fb * fb).sqrt(), fb.atan2(fa))
        };

        let d = builder.distances_mut()?;
        d.crossf *= scale;
        d.hexf *= scale;
        d.rhexf *= scale;
        d.hexvdist *= scale;
        d.hcrossf *= scale;
        builder.extension = Extension::Goldberg(GoldbergTables {
            a,
            b,
            scale,
            rotation,
        });
        Ok(())
    }
}

/// Irregular tilings split every master into `density` cells of roughly
/// equal area
#[derive(Debug)]
pub struct IrregularScale;

impl Derive for IrregularScale {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let density = match builder.config.variation {
            Variation::Irregular { density } => density,
            other => bail!("not an irregular variation: {:?}", other),
        };
        let scale = (1.0 / density).sqrt();

        let d = builder.distances_mut()?;
        d.crossf *= scale;
        d.hexvdist *= scale;
        d.rhexf *= scale;
        builder.extension =
            Extension::Irregular(IrregularTables { density, scale });
        Ok(())
    }
}
