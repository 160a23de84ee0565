//! Error types for model construction and batch tracing.

use crate::geometry::{Dim3, Idx3};
use std::fmt;

/// Errors that can occur during domain/field construction or batch setup.
#[derive(Debug)]
pub enum RayTraceError {
    /// A coordinate axis is under-sized, non-monotonic or non-uniform.
    InvalidDomain {
        /// The offending axis.
        axis: Dim3,
        /// Explanation of why the axis is invalid.
        reason: String,
    },
    /// The velocity array shape does not match the domain shape.
    ModelShapeMismatch {
        /// The shape of the domain.
        expected: [usize; 3],
        /// The shape of the velocity array.
        got: [usize; 3],
    },
    /// A velocity value is not positive and finite.
    InvalidVelocityModel {
        /// The grid indices of the invalid value.
        indices: Idx3<usize>,
        /// The invalid value.
        value: f64,
    },
    /// The numbers of sources and takeoff angles differ.
    InvalidBatch {
        /// The number of source positions provided.
        n_sources: usize,
        /// The number of takeoff angles provided.
        n_angles: usize,
    },
    /// A source position lies outside the extended field coverage.
    SourceOutsideField {
        /// The source coordinates.
        position: [f64; 3],
    },
    /// A requested execution mode is unavailable.
    NotSupported {
        /// The operation that was requested.
        operation: &'static str,
        /// Explanation of why it is unavailable.
        reason: String,
    },
}

impl fmt::Display for RayTraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RayTraceError::InvalidDomain { axis, reason } => {
                write!(f, "invalid domain: {}-axis {}", axis, reason)
            }
            RayTraceError::ModelShapeMismatch { expected, got } => {
                write!(
                    f,
                    "invalid velocity model: shape {:?} does not match domain shape {:?}",
                    got, expected
                )
            }
            RayTraceError::InvalidVelocityModel { indices, value } => {
                write!(
                    f,
                    "invalid velocity model: value {} at {} (must be positive and finite)",
                    value, indices
                )
            }
            RayTraceError::InvalidBatch { n_sources, n_angles } => {
                write!(
                    f,
                    "invalid batch: {} sources but {} takeoff angles",
                    n_sources, n_angles
                )
            }
            RayTraceError::SourceOutsideField { position } => {
                write!(
                    f,
                    "invalid batch: source [{}, {}, {}] lies outside the extended field",
                    position[0], position[1], position[2]
                )
            }
            RayTraceError::NotSupported { operation, reason } => {
                write!(f, "{} is not supported: {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for RayTraceError {}

/// Convenience alias for results with a [`RayTraceError`].
pub type Result<T> = ::std::result::Result<T, RayTraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_domain() {
        let e = RayTraceError::InvalidDomain {
            axis: Dim3::Y,
            reason: format!("has {} samples (at least 2 needed)", 1),
        };
        assert_eq!(
            e.to_string(),
            "invalid domain: y-axis has 1 samples (at least 2 needed)"
        );
    }

    #[test]
    fn display_invalid_velocity_model() {
        let e = RayTraceError::InvalidVelocityModel {
            indices: Idx3::new(0, 3, 2),
            value: -1.5,
        };
        assert_eq!(
            e.to_string(),
            "invalid velocity model: value -1.5 at [0, 3, 2] (must be positive and finite)"
        );
    }

    #[test]
    fn display_invalid_batch() {
        let e = RayTraceError::InvalidBatch {
            n_sources: 3,
            n_angles: 2,
        };
        assert_eq!(e.to_string(), "invalid batch: 3 sources but 2 takeoff angles");
    }

    #[test]
    fn display_not_supported() {
        let e = RayTraceError::NotSupported {
            operation: "pooled batch execution",
            reason: "crate compiled without the `parallel` feature".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "pooled batch execution is not supported: crate compiled without the `parallel` feature"
        );
    }
}
