//! Sampling of slowness fields at arbitrary positions.

pub mod nearest;
pub mod trilinear;

use crate::{field::SlownessField, geometry::Point3, geometry::Vec3, grid::GridPointQuery3, num::SFloat};

/// A slowness value and its spatial gradient sampled at a position.
#[derive(Clone, Debug, PartialEq)]
pub struct SlownessSample<F> {
    /// Sampled slowness value.
    pub slowness: F,
    /// Sampled spatial gradient of the slowness.
    pub gradient: Vec3<F>,
}

/// Defines the properties of a 3D slowness lookup strategy.
pub trait SlownessLookup3<F: SFloat>: Clone + Sync + Send {
    /// Samples the slowness and its spatial gradient at the given position.
    ///
    /// # Parameters
    ///
    /// - `field`: Slowness field to sample.
    /// - `position`: Position where the sample should be computed.
    ///
    /// # Returns
    ///
    /// A `GridPointQuery3<SlownessSample<F>>` which is either:
    ///
    /// - `Inside`: Contains the sampled slowness and gradient.
    /// - `Outside`: The position was outside the extended lattice.
    fn sample(
        &self,
        field: &SlownessField<F>,
        position: &Point3<F>,
    ) -> GridPointQuery3<SlownessSample<F>>;
}
