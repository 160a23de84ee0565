//! Stepping along rays through a slowness field.

pub mod rkf;

use super::{ftr, RayState, TerminationCause};
use crate::events::{BoundaryEvents, EventCrossing};
use crate::field::SlownessField;
use crate::interpolation::SlownessLookup3;

/// A stepper result which is either OK (with an arbitrary value) or
/// stopped (with a cause).
#[derive(Clone, Debug)]
pub enum StepperResult<T> {
    Ok(T),
    Stopped(TerminationCause),
}

/// Lets the stepper callback communicate whether tracing should
/// continue or terminate.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum StepperInstruction {
    Continue,
    Terminate,
}

/// Defines the properties of a ray stepping scheme.
pub trait RayStepper: Clone {
    /// Places the stepper at the initial ray state.
    ///
    /// # Parameters
    ///
    /// - `field`: Slowness field to step through.
    /// - `lookup`: Slowness lookup strategy to use.
    /// - `events`: Boundary events to check while stepping.
    /// - `initial_state`: Ray state the stepper should start from.
    /// - `path_length_bound`: Path length at which stepping stops if no
    ///   terminal event fires first.
    /// - `callback`: Closure that will be called with the initial path length and ray state.
    ///
    /// # Returns
    ///
    /// A `StepperResult<()>` which is either:
    ///
    /// - `Ok`: Stepper placement succeeded.
    /// - `Stopped`: Contains a `TerminationCause` indicating why stepper placement failed.
    ///
    /// # Type parameters
    ///
    /// - `L`: Type of slowness lookup.
    /// - `C`: Mutable function type taking a path length and a reference to a ray state and returning a `StepperInstruction`.
    fn place<L, C>(
        &mut self,
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
        initial_state: &RayState,
        path_length_bound: ftr,
        callback: &mut C,
    ) -> StepperResult<()>
    where
        L: SlownessLookup3<ftr>,
        C: FnMut(ftr, &RayState) -> StepperInstruction;

    /// Performs a step.
    ///
    /// # Parameters
    ///
    /// - `field`: Slowness field to step through.
    /// - `lookup`: Slowness lookup strategy to use.
    /// - `events`: Boundary events to check while stepping.
    /// - `callback`: Closure that will be called with the path length and ray state resulting
    ///   from the step if it does not terminate the integration.
    ///
    /// # Returns
    ///
    /// A `StepperResult<()>` which is either:
    ///
    /// - `Ok`: The step succeeded.
    /// - `Stopped`: Contains a `TerminationCause` indicating why stepping came to an end.
    ///
    /// # Type parameters
    ///
    /// - `L`: Type of slowness lookup.
    /// - `C`: Mutable function type taking a path length and a reference to a ray state and returning a `StepperInstruction`.
    fn step<L, C>(
        &mut self,
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
        callback: &mut C,
    ) -> StepperResult<()>
    where
        L: SlownessLookup3<ftr>,
        C: FnMut(ftr, &RayState) -> StepperInstruction;

    /// Performs a step, producing regularly spaced output states.
    ///
    /// # Parameters
    ///
    /// - `field`: Slowness field to step through.
    /// - `lookup`: Slowness lookup strategy to use.
    /// - `events`: Boundary events to check while stepping.
    /// - `callback`: Closure that will be called with the path length and ray state of each
    ///   regularly spaced output point produced by the step.
    ///
    /// # Returns
    ///
    /// A `StepperResult<()>` which is either:
    ///
    /// - `Ok`: The step succeeded.
    /// - `Stopped`: Contains a `TerminationCause` indicating why stepping came to an end.
    ///
    /// # Type parameters
    ///
    /// - `L`: Type of slowness lookup.
    /// - `C`: Mutable function type taking a path length and a reference to a ray state and returning a `StepperInstruction`.
    fn step_dense_output<L, C>(
        &mut self,
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
        callback: &mut C,
    ) -> StepperResult<()>
    where
        L: SlownessLookup3<ftr>,
        C: FnMut(ftr, &RayState) -> StepperInstruction;

    /// Returns a reference to the current ray state of the stepper.
    fn ray_state(&self) -> &RayState;

    /// Returns the current path length of the stepper along the ray.
    fn path_length(&self) -> ftr;

    /// Whether any evaluation of the ray equations has fallen outside
    /// the extended field since placement.
    fn rhs_fallback_invoked(&self) -> bool;

    /// Returns the non-terminal event crossings recorded since placement.
    fn event_crossings(&self) -> &[EventCrossing<ftr>];
}

/// Defines the properties of a ray stepper factory structure.
pub trait RayStepperFactory {
    type Output: RayStepper;
    fn produce(&self) -> Self::Output;
}
