//! Stepping using the Dormand-Prince scheme,
//! a fifth-order Runge-Kutta method with error
//! estimation through an embedded fourth-order step.

use super::super::{RayStepper, RayStepperFactory, StepperInstruction, StepperResult};
use super::{PIControlParams, RKFRayStepper, RKFRayStepperState, RKFStepperConfig, RayStepAttempt};
use crate::events::{BoundaryEvents, EventCrossing};
use crate::field::SlownessField;
use crate::interpolation::SlownessLookup3;
use crate::tracing::{ftr, RayState, RayVector, N_STATE_COMPONENTS};

/// A stepper using the fifth order Dormand–Prince Runge–Kutta method.
#[derive(Clone, Debug)]
pub struct RKF45RayStepper(RKFRayStepperState);

/// Factory for `RKF45RayStepper` objects.
#[derive(Clone, Debug)]
pub struct RKF45RayStepperFactory {
    config: RKFStepperConfig,
}

impl RKF45RayStepper {
    const ORDER: u8 = 5;

    const A21: ftr = 1.0 / 5.0;
    const A31: ftr = 3.0 / 40.0;
    const A32: ftr = 9.0 / 40.0;
    const A41: ftr = 44.0 / 45.0;
    const A42: ftr = -56.0 / 15.0;
    const A43: ftr = 32.0 / 9.0;
    const A51: ftr = 19_372.0 / 6561.0;
    const A52: ftr = -25_360.0 / 2187.0;
    const A53: ftr = 64_448.0 / 6561.0;
    const A54: ftr = -212.0 / 729.0;
    const A61: ftr = 9017.0 / 3168.0;
    const A62: ftr = -355.0 / 33.0;
    const A63: ftr = 46_732.0 / 5247.0;
    const A64: ftr = 49.0 / 176.0;
    const A65: ftr = -5103.0 / 18_656.0;
    const A71: ftr = 35.0 / 384.0;
    //  const A72: ftr =       0.0         ;
    const A73: ftr = 500.0 / 1113.0;
    const A74: ftr = 125.0 / 192.0;
    const A75: ftr = -2187.0 / 6784.0;
    const A76: ftr = 11.0 / 84.0;

    const E1: ftr = 71.0 / 57_600.0;
    //  const E2: ftr =       0.0          ;
    const E3: ftr = -71.0 / 16_695.0;
    const E4: ftr = 71.0 / 1920.0;
    const E5: ftr = -17_253.0 / 339_200.0;
    const E6: ftr = 22.0 / 525.0;
    const E7: ftr = -1.0 / 40.0;

    const D1: ftr = -12_715_105_075.0 / 11_282_082_432.0;
    //  const D2: ftr =               0.0                  ;
    const D3: ftr = 87_487_479_700.0 / 32_700_410_799.0;
    const D4: ftr = -10_690_763_975.0 / 1_880_347_072.0;
    const D5: ftr = 701_980_252_875.0 / 199_316_789_632.0;
    const D6: ftr = -1_453_857_185.0 / 822_651_844.0;
    const D7: ftr = 69_997_945.0 / 29_380_423.0;

    /// Creates a new RKF45 stepper with the given configuration.
    pub fn new(config: RKFStepperConfig) -> Self {
        config.validate();

        let pi_control = if config.use_pi_control {
            PIControlParams::activated(Self::ORDER)
        } else {
            PIControlParams::deactivated(Self::ORDER)
        };
        RKF45RayStepper(RKFRayStepperState::with_config(config, pi_control))
    }
}

impl RKFRayStepper for RKF45RayStepper {
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

        next_state = &state.ray_state
            + (&state.derivatives * Self::A31 + &intermediate_derivatives_1 * Self::A32)
                * state.step_length;
        let intermediate_derivatives_2 =
            Self::evaluate_derivatives(field, lookup, &next_state, &mut out_of_range);

        next_state = &state.ray_state
            + (&state.derivatives * Self::A41
                + &intermediate_derivatives_1 * Self::A42
                + &intermediate_derivatives_2 * Self::A43)
                * state.step_length;
        let intermediate_derivatives_3 =
            Self::evaluate_derivatives(field, lookup, &next_state, &mut out_of_range);

        next_state = &state.ray_state
            + (&state.derivatives * Self::A51
                + &intermediate_derivatives_1 * Self::A52
                + &intermediate_derivatives_2 * Self::A53
                + &intermediate_derivatives_3 * Self::A54)
                * state.step_length;
        let intermediate_derivatives_4 =
            Self::evaluate_derivatives(field, lookup, &next_state, &mut out_of_range);

        next_state = &state.ray_state
            + (&state.derivatives * Self::A61
                + &intermediate_derivatives_1 * Self::A62
                + &intermediate_derivatives_2 * Self::A63
                + &intermediate_derivatives_3 * Self::A64
                + &intermediate_derivatives_4 * Self::A65)
                * state.step_length;
        let intermediate_derivatives_5 =
            Self::evaluate_derivatives(field, lookup, &next_state, &mut out_of_range);

        let state_change = (&state.derivatives * Self::A71
            + &intermediate_derivatives_2 * Self::A73
            + &intermediate_derivatives_3 * Self::A74
            + &intermediate_derivatives_4 * Self::A75
            + &intermediate_derivatives_5 * Self::A76)
            * state.step_length;

        let next_ray_state = &state.ray_state + &state_change;
        let next_derivatives =
            Self::evaluate_derivatives(field, lookup, &next_ray_state, &mut out_of_range);

        RayStepAttempt {
            next_ray_state,
            next_derivatives,
            intermediate_derivatives: vec![
                intermediate_derivatives_1,
                intermediate_derivatives_2,
                intermediate_derivatives_3,
                intermediate_derivatives_4,
                intermediate_derivatives_5,
            ],
            state_change,
            out_of_range,
        }
    }

    fn compute_error_deltas(&self, attempt: &RayStepAttempt) -> [ftr; N_STATE_COMPONENTS] {
        let state = self.state();
        ((&state.derivatives * Self::E1
            + &attempt.intermediate_derivatives[1] * Self::E3
            + &attempt.intermediate_derivatives[2] * Self::E4
            + &attempt.intermediate_derivatives[3] * Self::E5
            + &attempt.intermediate_derivatives[4] * Self::E6
            + &attempt.next_derivatives * Self::E7)
            * state.step_length)
            .components()
    }

    fn compute_dense_interpolation_coefs(&self) -> Vec<RayVector> {
        let state = self.state();
        let coef_vec_1 = state.previous_ray_state.to_vector();
        let coef_vec_2 = state.previous_state_change.clone();
        let coef_vec_3 = &state.previous_derivatives * state.previous_step_length - &coef_vec_2;
        let coef_vec_4 =
            &coef_vec_2 - &state.derivatives * state.previous_step_length - &coef_vec_3;
        let coef_vec_5 = (&state.previous_derivatives * Self::D1
            + &state.intermediate_derivatives[1] * Self::D3
            + &state.intermediate_derivatives[2] * Self::D4
            + &state.intermediate_derivatives[3] * Self::D5
            + &state.intermediate_derivatives[4] * Self::D6
            + &state.derivatives * Self::D7)
            * state.previous_step_length;
        vec![coef_vec_1, coef_vec_2, coef_vec_3, coef_vec_4, coef_vec_5]
    }

    fn interpolate_dense_state(&self, coefs: &[RayVector], fraction: ftr) -> RayState {
        debug_assert!(fraction > 0.0 && fraction <= 1.0);
        let one_minus_fraction = 1.0 - fraction;
        let interpolated = &coefs[3] + &coefs[4] * one_minus_fraction;
        let interpolated = &coefs[2] + interpolated * fraction;
        let interpolated = &coefs[1] + interpolated * one_minus_fraction;
        (&coefs[0] + interpolated * fraction).to_ray_state()
    }
}

impl RayStepper for RKF45RayStepper {
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

impl RKF45RayStepperFactory {
    /// Creates a new factory for producing steppers with the given configuration parameters.
    pub fn new(config: RKFStepperConfig) -> Self {
        RKF45RayStepperFactory { config }
    }
}

impl RayStepperFactory for RKF45RayStepperFactory {
    type Output = RKF45RayStepper;
    fn produce(&self) -> Self::Output {
        RKF45RayStepper::new(self.config.clone())
    }
}
