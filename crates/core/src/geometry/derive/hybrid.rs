use crate::geometry::{
    derive::Derive, Distances, GeometryFamily, ParameterBuilder,
};
use std::f64::consts::PI;

/// Products and rotation spaces. Distances are those of the underlying
/// surface; rotation spaces halve them, since moving across a cell there
/// also turns the fiber.
#[derive(Debug)]
pub struct HybridDistances;

impl Derive for HybridDistances {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let d = match builder.family {
            GeometryFamily::RotationSpace(_) => 2.0,
            _ => 1.0,
        };
        let underlying = builder.underlying()?;
        let curv = underlying.family.curvature();
        let u = underlying.distances;
        let alpha = 2.0 * PI / underlying.sides as f64;
        let distances = Distances {
            hexf: u.hexf / d,
            hcrossf: u.crossf / d,
            rhexf: u.rhexf / d,
            tessf: u.tessf / d,
            crossf: u.crossf / d,
            hexhexdist: curv.hdist(
                &curv.xpush0(u.hcrossf),
                &curv.xspinpush0(alpha, u.hcrossf),
            ) / d,
            hexvdist: u.hexvdist / d,
            edgelen: u.edgelen / d,
        };
        let (hexshift, vertex) = (underlying.hexshift, underlying.vertex);

        builder.hexshift = hexshift;
        builder.vertex = vertex;
        builder.set_distances(distances)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::{GeometryConfig, GeometryKind, Variation},
        geometry::ParameterBuilder,
    };
    use assert_approx_eq::assert_approx_eq;
    use std::rc::Rc;

    fn product(twisted: bool) -> GeometryConfig {
        GeometryConfig {
            geometry: GeometryKind::Product {
                face: 7,
                vertex: 3,
                plevel_factor: 0.7,
                twisted,
            },
            variation: Variation::Pure,
            ..Default::default()
        }
    }

    #[test]
    fn test_divided_by_twist() {
        for &(twisted, d) in &[(false, 1.0), (true, 2.0)] {
            let config = product(twisted);
            let underlying_config = config.underlying_config().unwrap();
            let underlying = Rc::new(
                ParameterBuilder::build(&underlying_config, None).unwrap(),
            );
            let params =
                ParameterBuilder::build(&config, Some(Rc::clone(&underlying)))
                    .unwrap();
            assert_approx_eq!(
                params.distances.tessf,
                underlying.distances.tessf / d
            );
            assert_approx_eq!(
                params.distances.hcrossf,
                underlying.distances.crossf / d
            );
            assert_eq!(params.vertex, 3.0);
            assert_eq!(
                params.underlying_signature(),
                Some(underlying.signature.as_str())
            );
        }
    }
}
