use crate::{
    config::{GeometryConfig, GeometryKind, Variation},
    geometry::{
        derive::{
            archimedean::ArchimedeanDistances,
            fake::FakeDistances,
            finish::{HeightStep, MoveStep, ScaleStep},
            hybrid::HybridDistances,
            lattice::{BinaryDistances, LatticeDistances},
            regular::{HoneycombDistances, RegularDistances},
            variation::{GoldbergScale, IrregularScale},
            Derive,
        },
        Distances, Extension, GeometryFamily, GeometryParameterSet,
        HeightLevels, HeightMapping, Moves, Scales,
    },
    timed,
};
use anyhow::{anyhow, bail, Context};
use log::debug;
use std::{f64::consts::PI, fmt::Debug, rc::Rc};
use validator::Validate;

/// A container for deriving a [GeometryParameterSet]. This applies a series
/// of derivation steps in sequence: distances first, then variation
/// adjustments, then scales and moves, then render heights. Fields that a
/// step fills in are `Option`s with getters that error if the field hasn't
/// been set yet, which catches steps running out of order.
pub struct ParameterBuilder<'a> {
    /// The config being derived. Please **do not mutate it**, it's only
    /// public for disjoint borrowing.
    pub config: &'a GeometryConfig,
    pub family: GeometryFamily,
    /// Parameter set of the underlying geometry, if there is one. Must be
    /// built before this one.
    pub underlying: Option<Rc<GeometryParameterSet>>,
    pub sides: usize,
    pub vertex: f64,
    pub alpha: f64,
    pub bitruncated: bool,
    pub hexshift: f64,
    pub extension: Extension,
    distances: Option<Distances>,
    scales: Option<Scales>,
    moves: Option<Moves>,
    heights: Option<(HeightMapping, HeightLevels, Option<String>)>,
}

impl<'a> ParameterBuilder<'a> {
    pub fn new(
        config: &'a GeometryConfig,
        underlying: Option<Rc<GeometryParameterSet>>,
    ) -> Self {
        let sides = config.geometry.master_sides();
        let vertex = match &config.geometry {
            GeometryKind::Regular { vertex, .. }
            | GeometryKind::Product { vertex, .. } => *vertex as f64,
            GeometryKind::Fake { around, .. } => *around,
            GeometryKind::Archimedean { faces } => faces.len() as f64,
            GeometryKind::Honeycomb { .. } => 3.0,
            GeometryKind::BinaryTiling { .. } => 3.0,
            GeometryKind::Nil { .. } | GeometryKind::Solv => 4.0,
        };
        Self {
            config,
            family: GeometryFamily::of(config),
            underlying,
            sides,
            vertex,
            alpha: 2.0 * PI / sides as f64,
            bitruncated: config.variation.is_bitruncated(),
            hexshift: 0.0,
            extension: Extension::None,
            distances: None,
            scales: None,
            moves: None,
            heights: None,
        }
    }

    /// Derive the full parameter set for a config. The config is validated
    /// first; hybrid and fake geometries need the parameter set of their
    /// [underlying config](GeometryConfig::underlying_config).
    pub fn build(
        config: &'a GeometryConfig,
        underlying: Option<Rc<GeometryParameterSet>>,
    ) -> anyhow::Result<GeometryParameterSet> {
        config.validate().context("invalid geometry config")?;
        if config.underlying_config().is_some() && underlying.is_none() {
            bail!("{} requires an underlying geometry", config.geometry.id());
        }
        debug!("Deriving parameters for {}", config.signature());
        timed!(
            format!("Parameter derivation for {}", config.geometry.id()),
            Self::new(config, underlying).derive_all()
        )
    }

    fn derive_all(mut self) -> anyhow::Result<GeometryParameterSet> {
        // Distances. The order of the steps is important!
        match &self.config.geometry {
            GeometryKind::Regular { .. } => self.apply_step(RegularDistances)?,
            GeometryKind::Honeycomb { .. } => {
                self.apply_step(HoneycombDistances)?
            }
            GeometryKind::Product { .. } => self.apply_step(HybridDistances)?,
            GeometryKind::Fake { .. } => self.apply_step(FakeDistances)?,
            GeometryKind::Archimedean { .. } => {
                self.apply_step(ArchimedeanDistances)?
            }
            GeometryKind::BinaryTiling { .. } => {
                self.apply_step(BinaryDistances)?
            }
            GeometryKind::Nil { .. } | GeometryKind::Solv => {
                self.apply_step(LatticeDistances)?
            }
        }

        // Variations only rescale 2D tilings. Products inherit the scaled
        // distances from their underlying set.
        if !self.family.is_hybrid() {
            match self.config.variation {
                Variation::Goldberg { .. } => self.apply_step(GoldbergScale)?,
                Variation::Irregular { .. } => {
                    self.apply_step(IrregularScale)?
                }
                Variation::Pure | Variation::Bitruncated => {}
            }
        }

        self.apply_step(ScaleStep)?;
        self.apply_step(MoveStep)?;
        self.apply_step(HeightStep)?;
        self.finish()
    }

    /// A helper to run a derivation step on this builder
    fn apply_step(&mut self, step: impl Debug + Derive) -> anyhow::Result<()> {
        timed!(format!("{:?}", step), step.derive(self))
            .with_context(|| format!("error in {:?}", step))
    }

    fn finish(self) -> anyhow::Result<GeometryParameterSet> {
        let distances = self.distances()?;
        let scales = self.scales()?;
        let moves = self
            .moves
            .ok_or_else(|| anyhow!("moves not initialized"))?;
        let (mapping, heights, invalid) = self
            .heights
            .ok_or_else(|| anyhow!("heights not initialized"))?;
        Ok(GeometryParameterSet {
            signature: self.config.signature(),
            family: self.family,
            sides: self.sides,
            vertex: self.vertex,
            alpha: self.alpha,
            bitruncated: self.bitruncated,
            hexshift: self.hexshift,
            distances,
            scales,
            mapping,
            heights,
            invalid,
            moves,
            extension: self.extension,
            underlying: self.underlying,
        })
    }

    /// Get the underlying parameter set. Returns an error if there is none.
    pub fn underlying(&self) -> anyhow::Result<&GeometryParameterSet> {
        self.underlying
            .as_deref()
            .ok_or_else(|| anyhow!("underlying geometry not initialized"))
    }

    /// Get the distance constants. Returns an error if they haven't been
    /// derived yet.
    pub fn distances(&self) -> anyhow::Result<Distances> {
        self.distances
            .ok_or_else(|| anyhow!("distances not initialized"))
    }

    /// Modify already derived distance constants
    pub fn distances_mut(&mut self) -> anyhow::Result<&mut Distances> {
        self.distances
            .as_mut()
            .ok_or_else(|| anyhow!("distances not initialized"))
    }

    pub fn set_distances(
        &mut self,
        distances: Distances,
    ) -> anyhow::Result<()> {
        let values = [
            distances.hexf,
            distances.hcrossf,
            distances.rhexf,
            distances.tessf,
            distances.crossf,
            distances.hexhexdist,
            distances.hexvdist,
            distances.edgelen,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            bail!("non-finite distance in {:?}", distances);
        }
        self.distances = Some(distances);
        Ok(())
    }

    /// Get the scale constants. Returns an error if they haven't been
    /// derived yet.
    pub fn scales(&self) -> anyhow::Result<Scales> {
        self.scales.ok_or_else(|| anyhow!("scales not initialized"))
    }

    pub fn set_scales(&mut self, scales: Scales) {
        self.scales = Some(scales);
    }

    pub fn set_moves(&mut self, moves: Moves) -> anyhow::Result<()> {
        if moves.heptmove.len() != moves.invheptmove.len()
            || moves.hexmove.len() != moves.invhexmove.len()
        {
            bail!("move tables and their inverses differ in length");
        }
        self.moves = Some(moves);
        Ok(())
    }

    pub fn set_heights(
        &mut self,
        mapping: HeightMapping,
        heights: HeightLevels,
        invalid: Option<String>,
    ) {
        self.heights = Some((mapping, heights, invalid));
    }
}
