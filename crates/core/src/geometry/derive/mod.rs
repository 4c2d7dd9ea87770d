pub mod archimedean;
pub mod fake;
pub mod finish;
pub mod hybrid;
pub mod lattice;
pub mod regular;
pub mod variation;

use crate::geometry::ParameterBuilder;

/// A step in deriving a parameter set. Each step reads what earlier steps
/// filled in on the builder and adds its own fields. Steps are chained in a
/// fixed order by [ParameterBuilder::build].
pub trait Derive {
    /// Apply this step to the builder. The config has already been
    /// validated, so any error here is a bug rather than bad input.
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()>;
}

/// Bisect over `[lo, hi]` for a fixed number of iterations. `too_low`
/// decides which half the answer is in. Returns the lower bound, which
/// after 100 iterations is as precise as an `f64` gets.
fn bisect(
    mut lo: f64,
    mut hi: f64,
    iterations: usize,
    too_low: impl Fn(f64) -> bool,
) -> f64 {
    for _ in 0..iterations {
        let mid = (lo + hi) / 2.0;
        if too_low(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}
