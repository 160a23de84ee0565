//! Nearest-node slowness lookup.

use super::{SlownessLookup3, SlownessSample};
use crate::{field::SlownessField, geometry::Point3, grid::GridPointQuery3, num::SFloat};

/// A lookup strategy returning the value and gradient stored at the
/// lattice node closest to the queried position.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearestNodeLookup3;

impl NearestNodeLookup3 {
    pub fn new() -> Self {
        Self
    }
}

impl<F: SFloat> SlownessLookup3<F> for NearestNodeLookup3 {
    fn sample(
        &self,
        field: &SlownessField<F>,
        position: &Point3<F>,
    ) -> GridPointQuery3<SlownessSample<F>> {
        match field.nearest_index(position) {
            GridPointQuery3::Inside(indices) => GridPointQuery3::Inside(SlownessSample {
                slowness: field.slowness_at_idx(&indices),
                gradient: field.gradient_at_idx(&indices),
            }),
            GridPointQuery3::Outside => GridPointQuery3::Outside,
        }
    }
}
