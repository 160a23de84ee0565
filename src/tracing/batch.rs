//! Tracing of whole batches of rays.

use super::{ftr, stepping::RayStepperFactory, RayState, TraceResult};
use crate::{
    error::{RayTraceError, Result},
    events::BoundaryEvents,
    field::SlownessField,
    interpolation::SlownessLookup3,
};
use indicatif::{ProgressBar, ProgressIterator};

#[cfg(feature = "parallel")]
use indicatif::ParallelProgressIterator;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Whether or not to report progress while tracing a batch.
#[derive(Clone, Copy, Debug)]
pub enum Verbose {
    Yes,
    No,
}

impl Verbose {
    pub fn is_yes(&self) -> bool {
        match self {
            Verbose::Yes => true,
            Verbose::No => false,
        }
    }

    /// Creates a progress bar for the given number of items, hidden unless
    /// progress reporting is requested.
    fn create_progress_bar(&self, number_of_items: usize) -> ProgressBar {
        if self.is_yes() {
            ProgressBar::new(number_of_items as u64)
        } else {
            ProgressBar::hidden()
        }
    }
}

/// How the rays of a batch are distributed over threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Trace all rays one after another on the calling thread.
    Sequential,
    /// Trace rays concurrently on a dedicated thread pool with the given
    /// number of worker threads, or the default number if `None`.
    Pooled { n_workers: Option<usize> },
}

/// How the states along each ray are recorded in the trace results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingMode {
    /// Record the state after every accepted step.
    Natural,
    /// Record states at regular path length intervals using dense output.
    Dense,
}

/// Configuration parameters for batch tracing.
#[derive(Clone, Debug)]
pub struct BatchTracerConfig {
    /// How the rays of the batch are distributed over threads.
    pub execution_mode: ExecutionMode,
    /// How the states along each ray are recorded.
    pub sampling_mode: SamplingMode,
    /// Whether to report progress while tracing.
    pub verbose: Verbose,
}

impl BatchTracerConfig {
    pub const DEFAULT_N_WORKERS: usize = 4;
}

impl Default for BatchTracerConfig {
    fn default() -> Self {
        BatchTracerConfig {
            execution_mode: ExecutionMode::Sequential,
            sampling_mode: SamplingMode::Natural,
            verbose: Verbose::No,
        }
    }
}

/// Traces a batch of rays from the given initial states through the given
/// slowness field.
///
/// The trace results are returned in the same order as the initial states,
/// regardless of the execution mode.
///
/// # Parameters
///
/// - `field`: Slowness field to trace the rays through.
/// - `lookup`: Lookup scheme to use for sampling the field.
/// - `events`: Boundary events to monitor while tracing.
/// - `stepper_factory`: Factory producing one stepper per ray.
/// - `initial_states`: Initial states of the rays to trace.
/// - `path_length_bound`: Path length at which tracing of a ray stops.
/// - `config`: Configuration parameters for the batch.
///
/// # Returns
///
/// A `Result` which is either:
///
/// - `Ok`: Contains a vector with the `TraceResult` for each ray.
/// - `Err`: Contains an error if the requested execution mode is not
///   available.
///
/// # Type parameters
///
/// - `L`: Type of slowness lookup scheme.
/// - `Sf`: Type of stepper factory.
pub fn trace_ray_batch<L, Sf>(
    field: &SlownessField<ftr>,
    lookup: &L,
    events: &BoundaryEvents<ftr>,
    stepper_factory: &Sf,
    initial_states: &[RayState],
    path_length_bound: ftr,
    config: &BatchTracerConfig,
) -> Result<Vec<TraceResult>>
where
    L: SlownessLookup3<ftr>,
    Sf: RayStepperFactory + Sync,
{
    let trace_single = |initial_state: &RayState| {
        let mut stepper = stepper_factory.produce();
        match config.sampling_mode {
            SamplingMode::Natural => TraceResult::trace(
                field,
                lookup,
                events,
                &mut stepper,
                initial_state,
                path_length_bound,
            ),
            SamplingMode::Dense => TraceResult::trace_dense(
                field,
                lookup,
                events,
                &mut stepper,
                initial_state,
                path_length_bound,
            ),
        }
    };

    match config.execution_mode {
        ExecutionMode::Sequential => Ok(initial_states
            .iter()
            .progress_with(config.verbose.create_progress_bar(initial_states.len()))
            .map(trace_single)
            .collect()),
        #[cfg(feature = "parallel")]
        ExecutionMode::Pooled { n_workers } => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_workers.unwrap_or(BatchTracerConfig::DEFAULT_N_WORKERS))
                .build()
                .map_err(|err| RayTraceError::NotSupported {
                    operation: "pooled batch execution",
                    reason: err.to_string(),
                })?;
            Ok(pool.install(|| {
                initial_states
                    .par_iter()
                    .progress_with(config.verbose.create_progress_bar(initial_states.len()))
                    .map(trace_single)
                    .collect()
            }))
        }
        #[cfg(not(feature = "parallel"))]
        ExecutionMode::Pooled { .. } => Err(RayTraceError::NotSupported {
            operation: "pooled batch execution",
            reason: "crate compiled without the `parallel` feature".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{
        geometry::{In3D, Point3, Vec3},
        grid::Domain,
        interpolation::nearest::NearestNodeLookup3,
        tracing::stepping::rkf::{rkf45::RKF45RayStepperFactory, RKFStepperConfig},
    };
    use approx::assert_abs_diff_eq;
    use ndarray::prelude::*;
    use std::sync::Arc;

    fn uniform_field() -> SlownessField<ftr> {
        let domain = Arc::new(
            Domain::from_bounds(Vec3::zero(), Vec3::equal_components(10.0), In3D::same(11))
                .unwrap(),
        );
        let velocities = Array3::from_elem((11, 11, 11), 1.0);
        SlownessField::from_velocity_model(domain, &velocities).unwrap()
    }

    fn axis_aligned_batch() -> Vec<RayState> {
        vec![
            RayState::new(Point3::new(5.0, 5.0, 5.0), Vec3::new(1.0, 0.0, 0.0), 0.0),
            RayState::new(Point3::new(5.0, 5.0, 5.0), Vec3::new(0.0, 1.0, 0.0), 0.0),
            RayState::new(Point3::new(5.0, 5.0, 5.0), Vec3::new(0.0, 0.0, 1.0), 0.0),
        ]
    }

    #[test]
    fn sequential_batch_preserves_input_order() {
        let field = uniform_field();
        let lookup = NearestNodeLookup3::new();
        let events = BoundaryEvents::new();
        let stepper_factory = RKF45RayStepperFactory::new(RKFStepperConfig::default());
        let initial_states = axis_aligned_batch();

        let results = trace_ray_batch(
            &field,
            &lookup,
            &events,
            &stepper_factory,
            &initial_states,
            2.0,
            &BatchTracerConfig::default(),
        )
        .unwrap();

        assert_eq!(results.len(), 3);
        let expected_positions = [
            Point3::new(7.0, 5.0, 5.0),
            Point3::new(5.0, 7.0, 5.0),
            Point3::new(5.0, 5.0, 7.0),
        ];
        for (result, expected_position) in results.iter().zip(&expected_positions) {
            assert_abs_diff_eq!(
                result.final_state().unwrap().position,
                expected_position.clone(),
                epsilon = 1e-9
            );
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn pooled_batch_agrees_with_sequential() {
        let field = uniform_field();
        let lookup = NearestNodeLookup3::new();
        let events = BoundaryEvents::new();
        let stepper_factory = RKF45RayStepperFactory::new(RKFStepperConfig::default());
        let initial_states = axis_aligned_batch();

        let sequential_results = trace_ray_batch(
            &field,
            &lookup,
            &events,
            &stepper_factory,
            &initial_states,
            2.0,
            &BatchTracerConfig::default(),
        )
        .unwrap();
        let pooled_results = trace_ray_batch(
            &field,
            &lookup,
            &events,
            &stepper_factory,
            &initial_states,
            2.0,
            &BatchTracerConfig {
                execution_mode: ExecutionMode::Pooled { n_workers: Some(2) },
                ..BatchTracerConfig::default()
            },
        )
        .unwrap();

        assert_eq!(sequential_results.len(), pooled_results.len());
        for (sequential, pooled) in sequential_results.iter().zip(&pooled_results) {
            assert_eq!(sequential.path_lengths(), pooled.path_lengths());
            assert_eq!(sequential.states(), pooled.states());
        }
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn pooled_batch_without_parallel_feature_is_rejected() {
        let field = uniform_field();
        let lookup = NearestNodeLookup3::new();
        let events = BoundaryEvents::new();
        let stepper_factory = RKF45RayStepperFactory::new(RKFStepperConfig::default());
        let initial_states = axis_aligned_batch();

        let result = trace_ray_batch(
            &field,
            &lookup,
            &events,
            &stepper_factory,
            &initial_states,
            2.0,
            &BatchTracerConfig {
                execution_mode: ExecutionMode::Pooled { n_workers: None },
                ..BatchTracerConfig::default()
            },
        );
        assert!(matches!(
            result,
            Err(RayTraceError::NotSupported { .. })
        ));
    }
}
