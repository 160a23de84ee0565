//! Generation of initial ray states for ray tracing.

use super::{ftr, RayState};
use crate::{
    error::{RayTraceError, Result},
    field::SlownessField,
    geometry::{
        Dim3::{X, Y, Z},
        Point3, Vec3,
    },
    interpolation::SlownessLookup3,
};

/// A takeoff direction for a ray leaving its source, given in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TakeoffAngle {
    /// Inclination measured from the positive z-axis [deg].
    pub inclination: ftr,
    /// Azimuth measured from the positive x-axis towards the positive y-axis [deg].
    pub azimuth: ftr,
}

impl TakeoffAngle {
    /// Creates a new takeoff angle with the given inclination and azimuth in degrees.
    pub fn new(inclination: ftr, azimuth: ftr) -> Self {
        TakeoffAngle {
            inclination,
            azimuth,
        }
    }

    /// Computes the initial momentum vector of a ray taking off in this
    /// direction from a location with the given slowness value.
    ///
    /// The momentum magnitude equals the slowness, as required for the ray
    /// to stay on the characteristic of the eikonal equation.
    pub fn initial_momentum(&self, slowness: ftr) -> Vec3<ftr> {
        let inclination = self.inclination.to_radians();
        let azimuth = self.azimuth.to_radians();
        Vec3::new(
            slowness * inclination.sin() * azimuth.cos(),
            slowness * inclination.sin() * azimuth.sin(),
            slowness * inclination.cos(),
        )
    }
}

/// Computes the initial state of a ray leaving the given source position
/// with the given takeoff angle.
///
/// The initial momentum is scaled with the slowness sampled at the source,
/// and the initial travel time is zero.
///
/// # Parameters
///
/// - `field`: Slowness field to trace the ray through.
/// - `lookup`: Lookup scheme to use for sampling the slowness at the source.
/// - `source`: Position where the ray starts.
/// - `angle`: Takeoff angle of the ray.
///
/// # Returns
///
/// A `Result` which is either:
///
/// - `Ok`: Contains the initial `RayState` for the ray.
/// - `Err`: Contains an error if the source lies outside the extended field.
///
/// # Type parameters
///
/// - `L`: Type of slowness lookup scheme.
pub fn initial_ray_state<L>(
    field: &SlownessField<ftr>,
    lookup: &L,
    source: &Point3<ftr>,
    angle: &TakeoffAngle,
) -> Result<RayState>
where
    L: SlownessLookup3<ftr>,
{
    let sample = lookup
        .sample(field, source)
        .into_option()
        .ok_or(RayTraceError::SourceOutsideField {
            position: [source[X], source[Y], source[Z]],
        })?;
    Ok(RayState::new(
        source.clone(),
        angle.initial_momentum(sample.slowness),
        0.0,
    ))
}

/// Computes the initial states of a batch of rays given by parallel slices
/// of source positions and takeoff angles.
///
/// # Parameters
///
/// - `field`: Slowness field to trace the rays through.
/// - `lookup`: Lookup scheme to use for sampling the slowness at the sources.
/// - `sources`: Positions where the rays start.
/// - `angles`: Takeoff angles of the rays, one per source.
///
/// # Returns
///
/// A `Result` which is either:
///
/// - `Ok`: Contains a vector with the initial `RayState` for each ray.
/// - `Err`: Contains an error if the slice lengths differ or a source lies
///   outside the extended field.
///
/// # Type parameters
///
/// - `L`: Type of slowness lookup scheme.
pub fn initial_ray_states<L>(
    field: &SlownessField<ftr>,
    lookup: &L,
    sources: &[Point3<ftr>],
    angles: &[TakeoffAngle],
) -> Result<Vec<RayState>>
where
    L: SlownessLookup3<ftr>,
{
    if sources.len() != angles.len() {
        return Err(RayTraceError::InvalidBatch {
            n_sources: sources.len(),
            n_angles: angles.len(),
        });
    }
    sources
        .iter()
        .zip(angles)
        .map(|(source, angle)| initial_ray_state(field, lookup, source, angle))
        .collect()
}
