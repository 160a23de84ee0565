//! Stepping using Runge–Kutta–Fehlberg methods,
//! a set of RK methods with step size adaptation driven by
//! error estimation through an embedded lower-order step.

pub mod rkf23;
pub mod rkf45;

use super::{StepperInstruction, StepperResult};
use crate::{
    events::{BoundaryEvent, BoundaryEvents, EventCrossing},
    field::SlownessField,
    geometry::{Point3, Vec3},
    interpolation::SlownessLookup3,
    tracing::{
        evaluate_ray_equations, ftr, RayState, RayVector, TerminationCause, N_STATE_COMPONENTS,
    },
};

/// Largest number of bisections used to refine an event crossing within
/// an accepted step.
const MAX_REFINEMENT_BISECTIONS: u32 = 100;

/// Bisection stops when the bracketing interval of the step fraction
/// becomes smaller than this.
const CROSSING_FRACTION_TOLERANCE: ftr = 1e-12;

#[derive(Clone, Debug)]
struct RKFRayStepperState {
    /// Configuration parameters for the stepper.
    config: RKFStepperConfig,
    /// PI control parameters for the stepper.
    pi_control: PIControlParams,
    /// Current state of the traced ray.
    ray_state: RayState,
    /// Derivatives of the ray state at the current state.
    derivatives: RayVector,
    /// Current path length of the stepper along the ray.
    path_length: ftr,
    /// Path length at which stepping stops if no terminal event fires first.
    path_length_bound: ftr,
    /// Step length to use in the next step.
    step_length: ftr,
    /// The estimated error of the step from the previous to the current state.
    error: ftr,
    /// The step size used to get from the previous to the current state.
    previous_step_length: ftr,
    /// Path length of the stepper directly before the previous step was taken.
    previous_path_length: ftr,
    /// State of the ray directly before the previous step was taken.
    previous_ray_state: RayState,
    /// Derivatives of the ray state at the previous state.
    previous_derivatives: RayVector,
    /// Intermediate derivatives evaluated during the previous step.
    intermediate_derivatives: Vec<RayVector>,
    /// Change in ray state from the previous to the current state.
    previous_state_change: RayVector,
    /// Event values at the current ray state.
    event_values: Vec<ftr>,
    /// Recorded crossings of non-terminal events.
    event_crossings: Vec<EventCrossing<ftr>>,
    /// Whether any evaluation of the ray equations fell outside the
    /// extended field.
    rhs_fallback_invoked: bool,
    /// Path length where the next dense output state should be computed.
    next_output_path_length: ftr,
}

impl RKFRayStepperState {
    fn with_config(config: RKFStepperConfig, pi_control: PIControlParams) -> Self {
        let step_length = config.initial_step_length;
        let error = config.initial_error;
        let next_output_path_length = config.dense_step_length;
        Self {
            config,
            pi_control,
            ray_state: RayState::new(Point3::origin(), Vec3::zero(), 0.0),
            derivatives: RayVector::zero(),
            path_length: 0.0,
            path_length_bound: 0.0,
            step_length,
            error,
            previous_step_length: 0.0,
            previous_path_length: 0.0,
            previous_ray_state: RayState::new(Point3::origin(), Vec3::zero(), 0.0),
            previous_derivatives: RayVector::zero(),
            intermediate_derivatives: Vec::new(),
            previous_state_change: RayVector::zero(),
            event_values: Vec::new(),
            event_crossings: Vec::new(),
            rhs_fallback_invoked: false,
            next_output_path_length,
        }
    }
}

/// Configuration parameters for RKF steppers.
#[derive(Clone, Debug)]
pub struct RKFStepperConfig {
    /// Step length to use for dense (uniform) output states.
    pub dense_step_length: ftr,
    /// Maximum number of step attempts before terminating.
    pub max_step_attempts: u32,
    /// Absolute error tolerance.
    pub absolute_tolerance: ftr,
    /// Relative error tolerance.
    pub relative_tolerance: ftr,
    /// Scaling factor for the error to reduce oscillations.
    pub safety_factor: ftr,
    /// Smallest allowed scaling of the step size in one step.
    pub min_step_scale: ftr,
    /// Largest allowed scaling of the step size in one step.
    pub max_step_scale: ftr,
    /// Largest allowed step size.
    pub max_step_length: ftr,
    /// Start value for error.
    pub initial_error: ftr,
    /// Initial step size.
    pub initial_step_length: ftr,
    /// Whether to use Proportional Integral (PI) control for stabilizing the stepping.
    pub use_pi_control: bool,
}

#[derive(Clone, Debug)]
struct PIControlParams {
    k_i: ftr,
    k_p: ftr,
}

#[derive(Clone, Debug)]
enum StepError {
    Acceptable(ftr),
    TooLarge(ftr),
}

#[derive(Clone, Debug)]
struct RayStepAttempt {
    next_ray_state: RayState,
    next_derivatives: RayVector,
    intermediate_derivatives: Vec<RayVector>,
    state_change: RayVector,
    out_of_range: bool,
}

trait RKFRayStepper {
    fn state(&self) -> &RKFRayStepperState;
    fn state_mut(&mut self) -> &mut RKFRayStepperState;

    fn attempt_step<L>(&self, field: &SlownessField<ftr>, lookup: &L) -> RayStepAttempt
    where
        L: SlownessLookup3<ftr>;

    fn compute_error_deltas(&self, attempt: &RayStepAttempt) -> [ftr; N_STATE_COMPONENTS];

    fn compute_dense_interpolation_coefs(&self) -> Vec<RayVector>;

    /// Computes the interpolated ray state at the given fraction of the
    /// step from the previous to the current state.
    fn interpolate_dense_state(&self, coefs: &[RayVector], fraction: ftr) -> RayState;

    fn evaluate_derivatives<L>(
        field: &SlownessField<ftr>,
        lookup: &L,
        state: &RayState,
        out_of_range: &mut bool,
    ) -> RayVector
    where
        L: SlownessLookup3<ftr>,
    {
        let eval = evaluate_ray_equations(field, lookup, state);
        *out_of_range = *out_of_range || eval.out_of_range;
        eval.derivatives
    }

    fn reset_state(
        &mut self,
        initial_state: &RayState,
        derivatives: RayVector,
        event_values: Vec<ftr>,
        path_length_bound: ftr,
        out_of_range: bool,
    ) {
        let state = self.state_mut();
        state.ray_state = initial_state.clone();
        state.derivatives = derivatives.clone();
        state.path_length = 0.0;
        state.path_length_bound = path_length_bound;
        state.step_length = state.config.initial_step_length;
        state.error = state.config.initial_error;
        state.previous_step_length = 0.0;
        state.previous_path_length = 0.0;
        state.previous_ray_state = initial_state.clone();
        state.previous_derivatives = derivatives;
        state.intermediate_derivatives = Vec::new();
        state.previous_state_change = RayVector::zero();
        state.event_values = event_values;
        state.event_crossings = Vec::new();
        state.rhs_fallback_invoked = out_of_range;
        state.next_output_path_length = state.config.dense_step_length;
    }

    fn place_with_callback<L, C>(
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
        C: FnMut(ftr, &RayState) -> StepperInstruction,
    {
        let eval = evaluate_ray_equations(field, lookup, initial_state);
        let event_values = events.values_at(&initial_state.position);
        self.reset_state(
            initial_state,
            eval.derivatives,
            event_values,
            path_length_bound,
            eval.out_of_range,
        );
        if let StepperInstruction::Terminate =
            callback(self.state().path_length, &self.state().ray_state)
        {
            return StepperResult::Stopped(TerminationCause::StoppedByCallback);
        }
        StepperResult::Ok(())
    }

    fn step_with_callback<L, C>(
        &mut self,
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
        callback: &mut C,
    ) -> StepperResult<()>
    where
        L: SlownessLookup3<ftr>,
        C: FnMut(ftr, &RayState) -> StepperInstruction,
    {
        let step_result = self.perform_step(field, lookup, events);
        if let StepperResult::Ok(_) = step_result {
            if let StepperInstruction::Terminate =
                callback(self.state().path_length, &self.state().ray_state)
            {
                return StepperResult::Stopped(TerminationCause::StoppedByCallback);
            }
        }
        step_result
    }

    fn step_with_callback_dense_output<L, C>(
        &mut self,
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
        callback: &mut C,
    ) -> StepperResult<()>
    where
        L: SlownessLookup3<ftr>,
        C: FnMut(ftr, &RayState) -> StepperInstruction,
    {
        let step_result = self.perform_step(field, lookup, events);
        match step_result {
            StepperResult::Ok(_) => self.compute_dense_output(callback),
            StepperResult::Stopped(TerminationCause::TooManyStepAttempts) => step_result,
            StepperResult::Stopped(_) => {
                // A terminal event or the path length bound still leaves a
                // completed partial step to produce dense output for.
                if let StepperResult::Stopped(callback_cause) = self.compute_dense_output(callback)
                {
                    StepperResult::Stopped(callback_cause)
                } else {
                    step_result
                }
            }
        }
    }

    fn perform_step<L>(
        &mut self,
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
    ) -> StepperResult<()>
    where
        L: SlownessLookup3<ftr>,
    {
        let mut attempts = 0;
        let mut succeeded = false;

        while !succeeded && attempts < self.state().config.max_step_attempts {
            let lands_on_bound = {
                let state = self.state_mut();
                let mut step_length = ftr::min(state.step_length, state.config.max_step_length);
                // Clamp the final step so the last sample lands exactly on the bound
                let remaining = ftr::max(state.path_length_bound - state.path_length, 0.0);
                let lands_on_bound = step_length >= remaining;
                if lands_on_bound {
                    step_length = remaining;
                }
                state.step_length = step_length;
                lands_on_bound
            };

            let step_attempt = self.attempt_step(field, lookup);

            attempts += 1;

            if step_attempt.out_of_range {
                self.state_mut().rhs_fallback_invoked = true;
            }

            match self.compute_error(&step_attempt) {
                StepError::Acceptable(new_error) => {
                    let mut new_step_length = self.compute_step_length_accepted(new_error);

                    // Don't increase step size if the previous attempt was rejected
                    if attempts > 1 && new_step_length > self.state().step_length {
                        new_step_length = self.state().step_length;
                    }

                    self.apply_step_attempt(step_attempt);
                    self.update_step_length(new_step_length, new_error);

                    if let Some(cause) = self.handle_event_crossings(events) {
                        return StepperResult::Stopped(cause);
                    }
                    if lands_on_bound {
                        let state = self.state_mut();
                        state.path_length = state.path_length_bound;
                        return StepperResult::Stopped(TerminationCause::PathLengthBoundReached);
                    }
                    succeeded = true;
                }
                StepError::TooLarge(new_error) => {
                    let new_step_length = self.compute_step_length_rejected(new_error);
                    self.update_step_length(new_step_length, new_error);
                }
            };
        }

        if succeeded {
            StepperResult::Ok(())
        } else {
            StepperResult::Stopped(TerminationCause::TooManyStepAttempts)
        }
    }

    fn compute_error(&self, attempt: &RayStepAttempt) -> StepError {
        let state = self.state();
        let error_deltas = self.compute_error_deltas(attempt);
        let next_components = attempt.next_ray_state.components();

        let mut squared_error_sum = 0.0;
        for (&delta, &component) in error_deltas.iter().zip(next_components.iter()) {
            let scale =
                state.config.absolute_tolerance + state.config.relative_tolerance * component.abs();
            let scaled_delta = delta / scale;
            squared_error_sum += scaled_delta * scaled_delta;
        }

        let error = ftr::sqrt(squared_error_sum / (N_STATE_COMPONENTS as ftr));

        if error <= 1.0 {
            StepError::Acceptable(error)
        } else {
            StepError::TooLarge(error)
        }
    }

    fn compute_step_length_accepted(&self, new_error: ftr) -> ftr {
        let state = self.state();
        let step_scale = if new_error < 1e-9 {
            // Use max step scale directly for very small error to avoid division by zero
            state.config.max_step_scale
        } else {
            let step_scale = state.config.safety_factor * (state.error.powf(state.pi_control.k_i))
                / (new_error.powf(state.pi_control.k_p));
            if step_scale < state.config.min_step_scale {
                state.config.min_step_scale
            } else if step_scale > state.config.max_step_scale {
                state.config.max_step_scale
            } else {
                step_scale
            }
        };
        state.step_length * step_scale
    }

    fn compute_step_length_rejected(&self, new_error: ftr) -> ftr {
        let state = self.state();
        ftr::max(
            state.config.safety_factor / (new_error.powf(state.pi_control.k_p)),
            state.config.min_step_scale,
        ) * state.step_length
    }

    fn apply_step_attempt(&mut self, attempt: RayStepAttempt) {
        let state = self.state_mut();
        state.previous_ray_state = state.ray_state.clone();
        state.previous_derivatives = state.derivatives.clone();
        state.ray_state = attempt.next_ray_state;
        state.derivatives = attempt.next_derivatives;
        // Advance the path length with the step size *prior to* calling `update_step_length`
        state.previous_path_length = state.path_length;
        state.path_length += state.step_length;
        state.intermediate_derivatives = attempt.intermediate_derivatives;
        state.previous_state_change = attempt.state_change;
    }

    fn update_step_length(&mut self, new_step_length: ftr, new_error: ftr) {
        let state = self.state_mut();
        state.previous_step_length = state.step_length;
        state.step_length = new_step_length;
        state.error = new_error;
    }

    fn handle_event_crossings(&mut self, events: &BoundaryEvents<ftr>) -> Option<TerminationCause> {
        if events.is_empty() {
            return None;
        }
        let new_values = events.values_at(&self.state().ray_state.position);
        let crossed: Vec<(usize, &BoundaryEvent<ftr>)> = events
            .iter()
            .enumerate()
            .filter(|&(event_index, event)| {
                event.is_crossing(self.state().event_values[event_index], new_values[event_index])
            })
            .collect();

        if crossed.is_empty() {
            self.state_mut().event_values = new_values;
            return None;
        }

        let coefs = self.compute_dense_interpolation_coefs();
        let mut earliest_terminal: Option<(usize, ftr)> = None;
        let mut non_terminal_crossings = Vec::new();

        for (event_index, event) in crossed {
            let previous_value = self.state().event_values[event_index];
            let fraction = self.refine_crossing_fraction(&coefs, event, previous_value);
            let crossing_path_length =
                self.state().previous_path_length + fraction * self.state().previous_step_length;
            if event.is_terminal() {
                let is_earliest = earliest_terminal
                    .map_or(true, |(_, path_length)| crossing_path_length < path_length);
                if is_earliest {
                    earliest_terminal = Some((event_index, crossing_path_length));
                }
            } else {
                non_terminal_crossings.push(EventCrossing {
                    event_index,
                    path_length: crossing_path_length,
                });
            }
        }
        non_terminal_crossings.sort_by(|a, b| a.path_length.total_cmp(&b.path_length));

        match earliest_terminal {
            Some((event_index, crossing_path_length)) => {
                let fraction = (crossing_path_length - self.state().previous_path_length)
                    / self.state().previous_step_length;
                let crossing_state = self.interpolate_dense_state(&coefs, fraction);
                let state = self.state_mut();
                // Crossings after the terminal one never happened.
                for crossing in non_terminal_crossings {
                    if crossing.path_length <= crossing_path_length {
                        state.event_crossings.push(crossing);
                    }
                }
                state.ray_state = crossing_state;
                state.path_length = crossing_path_length;
                Some(TerminationCause::BoundaryReached { event_index })
            }
            None => {
                let state = self.state_mut();
                state.event_crossings.extend(non_terminal_crossings);
                state.event_values = new_values;
                None
            }
        }
    }

    /// Refines the step fraction where the given event changes sign,
    /// using bisection over the dense interpolant of the last step.
    fn refine_crossing_fraction(
        &self,
        coefs: &[RayVector],
        event: &BoundaryEvent<ftr>,
        mut lower_value: ftr,
    ) -> ftr {
        let mut lower = 0.0;
        let mut upper = 1.0;
        for _ in 0..MAX_REFINEMENT_BISECTIONS {
            let midpoint = 0.5 * (lower + upper);
            let midpoint_value =
                event.value(&self.interpolate_dense_state(coefs, midpoint).position);
            if event.is_crossing(lower_value, midpoint_value) {
                upper = midpoint;
            } else {
                lower = midpoint;
                lower_value = midpoint_value;
            }
            if upper - lower <= CROSSING_FRACTION_TOLERANCE {
                break;
            }
        }
        0.5 * (lower + upper)
    }

    fn compute_dense_output<C>(&mut self, callback: &mut C) -> StepperResult<()>
    where
        C: FnMut(ftr, &RayState) -> StepperInstruction,
    {
        #![allow(clippy::float_cmp)] // Allows the float comparison with zero
        let state = self.state();
        let previous_path_length = state.previous_path_length;
        if state.path_length <= previous_path_length {
            // A degenerate step made no progress to interpolate over.
            return StepperResult::Ok(());
        }
        debug_assert_ne!(state.previous_step_length, 0.0);
        debug_assert!(state.next_output_path_length > previous_path_length);

        let mut next_output_path_length = state.next_output_path_length;

        if next_output_path_length <= state.path_length {
            let coefs = self.compute_dense_interpolation_coefs();
            loop {
                let fraction =
                    (next_output_path_length - previous_path_length) / state.previous_step_length;
                let output_state = self.interpolate_dense_state(&coefs, fraction);
                if let StepperInstruction::Terminate =
                    callback(next_output_path_length, &output_state)
                {
                    return StepperResult::Stopped(TerminationCause::StoppedByCallback);
                }
                next_output_path_length += state.config.dense_step_length;
                if next_output_path_length > state.path_length {
                    break;
                }
            }
        }

        self.state_mut().next_output_path_length = next_output_path_length;

        StepperResult::Ok(())
    }
}

impl RKFStepperConfig {
    pub const DEFAULT_DENSE_STEP_LENGTH: ftr = 1e-2;
    pub const DEFAULT_MAX_STEP_ATTEMPTS: u32 = 16;
    pub const DEFAULT_ABSOLUTE_TOLERANCE: ftr = 1e-6;
    pub const DEFAULT_RELATIVE_TOLERANCE: ftr = 1e-6;
    pub const DEFAULT_SAFETY_FACTOR: ftr = 0.9;
    pub const DEFAULT_MIN_STEP_SCALE: ftr = 0.2;
    pub const DEFAULT_MAX_STEP_SCALE: ftr = 10.0;
    pub const DEFAULT_MAX_STEP_LENGTH: ftr = ftr::INFINITY;
    pub const DEFAULT_INITIAL_ERROR: ftr = 1e-4;
    pub const DEFAULT_INITIAL_STEP_LENGTH: ftr = 1e-4;
    pub const DEFAULT_USE_PI_CONTROL: bool = true;

    fn validate(&self) {
        assert!(
            self.dense_step_length > 0.0,
            "Dense step size must be larger than zero."
        );
        assert!(
            self.max_step_attempts > 0,
            "Maximum number of step attempts must be larger than zero."
        );
        assert!(
            self.absolute_tolerance > 0.0,
            "Absolute error tolerance must be larger than zero."
        );
        assert!(
            self.relative_tolerance >= 0.0,
            "Relative error tolerance must be larger than or equal to zero."
        );
        assert!(
            self.safety_factor > 0.0 && self.safety_factor <= 1.0,
            "Safety factor must be in the range (0, 1]."
        );
        assert!(
            self.min_step_scale > 0.0,
            "Minimum step scale must be larger than zero."
        );
        assert!(
            self.max_step_scale >= self.min_step_scale,
            "Maximum step scale must be larger than or equal to the minimum step scale."
        );
        assert!(
            self.max_step_length > 0.0,
            "Maximum step size must be larger than zero."
        );
        assert!(
            self.initial_step_length > 0.0,
            "Initial step size must be larger than zero."
        );
        assert!(
            self.initial_error > 0.0 && self.initial_error <= 1.0,
            "Initial error must be in the range (0, 1]."
        );
    }
}

impl Default for RKFStepperConfig {
    fn default() -> Self {
        RKFStepperConfig {
            dense_step_length: Self::DEFAULT_DENSE_STEP_LENGTH,
            max_step_attempts: Self::DEFAULT_MAX_STEP_ATTEMPTS,
            absolute_tolerance: Self::DEFAULT_ABSOLUTE_TOLERANCE,
            relative_tolerance: Self::DEFAULT_RELATIVE_TOLERANCE,
            safety_factor: Self::DEFAULT_SAFETY_FACTOR,
            min_step_scale: Self::DEFAULT_MIN_STEP_SCALE,
            max_step_scale: Self::DEFAULT_MAX_STEP_SCALE,
            max_step_length: Self::DEFAULT_MAX_STEP_LENGTH,
            initial_step_length: Self::DEFAULT_INITIAL_STEP_LENGTH,
            initial_error: Self::DEFAULT_INITIAL_ERROR,
            use_pi_control: Self::DEFAULT_USE_PI_CONTROL,
        }
    }
}

impl PIControlParams {
    fn activated(scheme_order: u8) -> Self {
        #[allow(clippy::cast_lossless)]
        let order = scheme_order as ftr;
        let k_i = 0.4 / order;
        let k_p = 1.0 / order - 0.75 * k_i;
        PIControlParams { k_i, k_p }
    }

    fn deactivated(scheme_order: u8) -> Self {
        #[allow(clippy::cast_lossless)]
        let order = scheme_order as ftr;
        let k_i = 0.0;
        let k_p = 1.0 / order;
        PIControlParams { k_i, k_p }
    }
}
