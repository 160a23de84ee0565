//! Stepping using the Bogacki–Shampine scheme,
//! a third-order Runge-Kutta method with error
//! estimation through an embedded second-order step.

use super::super::{RayStepper, RayStepperFactory, StepperInstruction, StepperResult};
use super::{PIControlParams, RKFRayStepper, RKFRayStepperState, RKFStepperConfig, RayStepAttempt};
use crate::events::{BoundaryEvents, EventCrossing};
use crate::field::SlownessField;
use crate::interpolation::SlownessLookup3;
use crate::tracing::{ftr, RayState, RayVector, N_STATE_COMPONENTS};

/// A stepper using the third order Bogacki–Shampine Runge–Kutta method.
#[derive(Clone, Debug)]
pub struct RKF23RayStepper(RKFRayStepperState);

/// Factory for `RKF23RayStepper` objects.
#[derive(Clone, Debug)]
pub struct RKF23RayStepperFactory {
    config: RKFStepperConfig,
}

impl RKF23RayStepper {
    const ORDER: u8 = 3;

    const A21: ftr = 1.0 / 2.0;
    const A32: ftr = 3.0 / 4.0;
    const A41: ftr = 2.0 / 9.0;
    const A42: ftr = 1.0 / 3.0;
    const A43: ftr = 4.0 / 9.0;

    const E1: ftr = -5.0 / 72.0;
    const E2: ftr = 1.0 / 12.0;
    const E3: ftr = 1.0 / 9.0;
    const E4: ftr = -1.0 / 8.0;

    /// Creates a new RKF23 stepper with the given configuration.
    pub fn new(config: RKFStepperConfig) -> Self {
        config.validate();

        let pi_control = if config.use_pi_control {
            PIControlParams::activated(Self::ORDER)
        } else {
            PIControlParams::deactivated(Self::ORDER)
        };
        RKF23RayStepper(RKFRayStepperState::with_config(config, pi_control))
    }
}

impl RKFRayStepper for RKF23RayStepper {
    fn state(&self) -> &RKFRayStepperState {
        &self.0
    }
    fn state_mut(&mut self) -> &mut RKFRayStepperState {
        &mut self.0
    }

    fn attempt_step<L>(&self, field: &SlownessField<ftr>, lookup: &L) -> RayStepAttempt
    where
        L: SlownessLookup3<ftr>,
    {
        let state = self.state();
        let mut out_of_range = false;

        let mut next_state =
            &state.ray_state + &state.derivatives * (Self::A21 * state.step_length);
        let intermediate_derivatives_1 =
            Self::evaluate_derivatives(field, lookup, &next_state, &mut out_of_range);

        next_state =
            &state.ray_state + &intermediate_derivatives_1 * (Self::A32 * state.step_length);
        let intermediate_derivatives_2 =
            Self::evaluate_derivatives(field, lookup, &next_state, &mut out_of_range);

        let state_change = (&state.derivatives * Self::A41
            + &intermediate_derivatives_1 * Self::A42
            + &intermediate_derivatives_2 * Self::A43)
            * state.step_length;

        let next_ray_state = &state.ray_state + &state_change;
        let next_derivatives =
            Self::evaluate_derivatives(field, lookup, &next_ray_state, &mut out_of_range);

        RayStepAttempt {
            next_ray_state,
            next_derivatives,
            intermediate_derivatives: vec![intermediate_derivatives_1, intermediate_derivatives_2],
            state_change,
            out_of_range,
        }
    }

    fn compute_error_deltas(&self, attempt: &RayStepAttempt) -> [ftr; N_STATE_COMPONENTS] {
        let state = self.state();
        ((&state.derivatives * Self::E1
            + &attempt.intermediate_derivatives[0] * Self::E2
            + &attempt.intermediate_derivatives[1] * Self::E3
            + &attempt.next_derivatives * Self::E4)
            * state.step_length)
            .components()
    }

    fn compute_dense_interpolation_coefs(&self) -> Vec<RayVector> {
        let state = self.state();
        let coef_vec_1 = state.previous_ray_state.to_vector();
        let coef_vec_2 = state.previous_state_change.clone();
        let coef_vec_3 = &state.previous_derivatives * state.previous_step_length;
        let coef_vec_4 = &state.derivatives * state.previous_step_length;
        vec![coef_vec_1, coef_vec_2, coef_vec_3, coef_vec_4]
    }

    fn interpolate_dense_state(&self, coefs: &[RayVector], fraction: ftr) -> RayState {
        debug_assert!(fraction > 0.0 && fraction <= 1.0);
        let fraction_minus_one = fraction - 1.0;
        (&coefs[0]
            + &coefs[1] * fraction
            + (&coefs[1] * (-(fraction + fraction_minus_one))
                + &coefs[2] * fraction_minus_one
                + &coefs[3] * fraction)
                * (fraction * fraction_minus_one))
            .to_ray_state()
    }
}

impl RayStepper for RKF23RayStepper {
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
        C: FnMut(ftr, &RayState) -> StepperInstruction,
    {
        self.place_with_callback(
            field,
            lookup,
            events,
            initial_state,
            path_length_bound,
            callback,
        )
    }

    fn step<L, C>(
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
        self.step_with_callback(field, lookup, events, callback)
    }

    fn step_dense_output<L, C>(
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
        self.step_with_callback_dense_output(field, lookup, events, callback)
    }

    fn ray_state(&self) -> &RayState {
        &self.state().ray_state
    }
    fn path_length(&self) -> ftr {
        self.state().path_length
    }
    fn rhs_fallback_invoked(&self) -> bool {
        self.state().rhs_fallback_invoked
    }
    fn event_crossings(&self) -> &[EventCrossing<ftr>] {
        &self.state().event_crossings
    }
}

impl RKF23RayStepperFactory {
    /// Creates a new factory for producing steppers with the given configuration parameters.
    pub fn new(config: RKFStepperConfig) -> Self {
        RKF23RayStepperFactory { config }
    }
}

impl RayStepperFactory for RKF23RayStepperFactory {
    type Output = RKF23RayStepper;
    fn produce(&self) -> Self::Output {
        RKF23RayStepper::new(self.config.clone())
    }
}
