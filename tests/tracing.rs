//! Integration tests for ray tracing through slowness fields.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;
use seisray::{
    error::RayTraceError,
    events::{BoundaryEvent, BoundaryEvents, CrossingDirection},
    field::SlownessField,
    geometry::{Dim3, In3D, Point3, Vec3},
    grid::Domain,
    interpolation::{nearest::NearestNodeLookup3, trilinear::TrilinearLookup3},
    tracing::{
        batch::{trace_ray_batch, BatchTracerConfig, SamplingMode},
        ftr,
        seeding::{initial_ray_state, initial_ray_states, TakeoffAngle},
        stepping::{
            rkf::{
                rkf23::RKF23RayStepperFactory,
                rkf45::{RKF45RayStepper, RKF45RayStepperFactory},
                RKFStepperConfig,
            },
            StepperInstruction,
        },
        trace_ray, TerminationCause, TraceResult,
    },
};
use std::sync::Arc;

fn cube_domain(extent: ftr, n_nodes: usize) -> Arc<Domain<ftr>> {
    Arc::new(
        Domain::from_bounds(
            Vec3::zero(),
            Vec3::equal_components(extent),
            In3D::same(n_nodes),
        )
        .unwrap(),
    )
}

fn uniform_field(speed: ftr) -> SlownessField<ftr> {
    let velocities = Array3::from_elem((11, 11, 11), speed);
    SlownessField::from_velocity_model(cube_domain(10.0, 11), &velocities).unwrap()
}

fn depth_gradient_field() -> SlownessField<ftr> {
    let velocities = Array3::from_shape_fn((21, 21, 21), |(_, _, k)| 1.5 + 0.05 * k as ftr);
    SlownessField::from_velocity_model(cube_domain(10.0, 21), &velocities).unwrap()
}

fn center() -> Point3<ftr> {
    Point3::new(5.0, 5.0, 5.0)
}

#[test]
fn straight_ray_reproduces_uniform_speed_travel_time() {
    let field = uniform_field(2.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::new();
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(90.0, 0.0)).unwrap();
    let mut stepper = RKF45RayStepper::new(RKFStepperConfig::default());

    let result = TraceResult::trace(&field, &lookup, &events, &mut stepper, &initial_state, 4.0);

    assert_eq!(
        result.termination_cause(),
        TerminationCause::PathLengthBoundReached
    );
    assert!(!result.rhs_fallback_invoked());
    let final_state = result.final_state().unwrap();
    assert_abs_diff_eq!(final_state.position[Dim3::X], 9.0, epsilon = 1e-9);
    assert_abs_diff_eq!(final_state.position[Dim3::Y], 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(final_state.position[Dim3::Z], 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(final_state.travel_time, 2.0, epsilon = 1e-9);
}

#[test]
fn tracing_stops_exactly_at_path_length_bound() {
    let field = uniform_field(2.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::new();
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(0.0, 0.0)).unwrap();
    let mut stepper = RKF45RayStepper::new(RKFStepperConfig::default());

    let result =
        TraceResult::trace(&field, &lookup, &events, &mut stepper, &initial_state, 1.2345);

    assert_eq!(
        result.termination_cause(),
        TerminationCause::PathLengthBoundReached
    );
    assert_eq!(result.path_lengths().last().copied().unwrap(), 1.2345);
}

#[test]
fn ray_terminates_on_domain_wall() {
    let field = uniform_field(1.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::from_domain(field.domain());
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(0.0, 0.0)).unwrap();
    let mut stepper = RKF45RayStepper::new(RKFStepperConfig::default());

    let result = TraceResult::trace(&field, &lookup, &events, &mut stepper, &initial_state, 100.0);

    assert_eq!(
        result.termination_cause(),
        TerminationCause::BoundaryReached { event_index: 5 }
    );
    let final_state = result.final_state().unwrap();
    assert_abs_diff_eq!(final_state.position[Dim3::Z], 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(final_state.travel_time, 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(
        result.path_lengths().last().copied().unwrap(),
        5.0,
        epsilon = 1e-9
    );
}

#[test]
fn margin_wall_events_trigger_inside_domain() {
    let field = uniform_field(1.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::from_domain_with_margin(field.domain(), 1);
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(0.0, 0.0)).unwrap();
    let mut stepper = RKF45RayStepper::new(RKFStepperConfig::default());

    let result = TraceResult::trace(&field, &lookup, &events, &mut stepper, &initial_state, 100.0);

    assert_eq!(
        result.termination_cause(),
        TerminationCause::BoundaryReached { event_index: 5 }
    );
    assert_abs_diff_eq!(
        result.final_state().unwrap().position[Dim3::Z],
        9.0,
        epsilon = 1e-9
    );
}

#[test]
fn non_terminal_crossings_are_recorded() {
    let field = uniform_field(1.0);
    let lookup = NearestNodeLookup3::new();
    let mut events = BoundaryEvents::from_domain(field.domain());
    events.add_event(BoundaryEvent::new(
        Dim3::Z,
        6.0,
        CrossingDirection::Rising,
        false,
    ));
    events.add_event(BoundaryEvent::new(
        Dim3::Z,
        7.0,
        CrossingDirection::Falling,
        false,
    ));
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(0.0, 0.0)).unwrap();
    let mut stepper = RKF45RayStepper::new(RKFStepperConfig::default());

    let result = TraceResult::trace(&field, &lookup, &events, &mut stepper, &initial_state, 100.0);

    assert_eq!(
        result.termination_cause(),
        TerminationCause::BoundaryReached { event_index: 5 }
    );
    // The rising ray passes both surfaces, but only the crossing matching
    // its direction filter is recorded.
    assert_eq!(result.event_crossings().len(), 1);
    let crossing = &result.event_crossings()[0];
    assert_eq!(crossing.event_index, 6);
    assert_abs_diff_eq!(crossing.path_length, 1.0, epsilon = 1e-9);
}

#[test]
fn repeated_traces_are_identical() {
    let field = depth_gradient_field();
    let lookup = TrilinearLookup3::new();
    let events = BoundaryEvents::from_domain(field.domain());
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(40.0, 25.0)).unwrap();

    let mut first_stepper = RKF45RayStepper::new(RKFStepperConfig::default());
    let first = TraceResult::trace(
        &field,
        &lookup,
        &events,
        &mut first_stepper,
        &initial_state,
        6.0,
    );
    let mut second_stepper = RKF45RayStepper::new(RKFStepperConfig::default());
    let second = TraceResult::trace(
        &field,
        &lookup,
        &events,
        &mut second_stepper,
        &initial_state,
        6.0,
    );

    assert_eq!(first.termination_cause(), second.termination_cause());
    assert_eq!(first.path_lengths(), second.path_lengths());
    assert_eq!(first.states(), second.states());
}

#[test]
fn dense_sampling_is_regular() {
    let field = uniform_field(1.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::new();
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(0.0, 0.0)).unwrap();
    let config = RKFStepperConfig {
        dense_step_length: 0.25,
        ..RKFStepperConfig::default()
    };
    let mut stepper = RKF45RayStepper::new(config);

    let result =
        TraceResult::trace_dense(&field, &lookup, &events, &mut stepper, &initial_state, 1.5);

    let expected_path_lengths: Vec<ftr> = (0..=6).map(|i| 0.25 * i as ftr).collect();
    assert_eq!(result.path_lengths(), expected_path_lengths.as_slice());
    for (&path_length, state) in result.path_lengths().iter().zip(result.states()) {
        assert_abs_diff_eq!(state.position[Dim3::Z], 5.0 + path_length, epsilon = 1e-9);
    }
}

#[test]
fn batch_results_follow_input_order() {
    let field = uniform_field(1.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::new();
    let sources = vec![center(), center(), center()];
    let angles = vec![
        TakeoffAngle::new(90.0, 0.0),
        TakeoffAngle::new(90.0, 90.0),
        TakeoffAngle::new(0.0, 0.0),
    ];
    let initial_states = initial_ray_states(&field, &lookup, &sources, &angles).unwrap();
    let stepper_factory = RKF23RayStepperFactory::new(RKFStepperConfig::default());

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
    let displaced_dims = [Dim3::X, Dim3::Y, Dim3::Z];
    for (result, &displaced_dim) in results.iter().zip(&displaced_dims) {
        let final_state = result.final_state().unwrap();
        for dim in Dim3::slice() {
            let expected = if dim == displaced_dim { 7.0 } else { 5.0 };
            assert_abs_diff_eq!(final_state.position[dim], expected, epsilon = 1e-9);
        }
    }
}

#[cfg(feature = "parallel")]
#[test]
fn pooled_batch_matches_sequential() {
    use seisray::tracing::batch::ExecutionMode;

    let field = depth_gradient_field();
    let lookup = TrilinearLookup3::new();
    let events = BoundaryEvents::from_domain(field.domain());
    let sources = vec![center(); 8];
    let angles: Vec<_> = (0..8)
        .map(|i| TakeoffAngle::new(20.0 + 10.0 * i as ftr, 45.0 * i as ftr))
        .collect();
    let initial_states = initial_ray_states(&field, &lookup, &sources, &angles).unwrap();
    let stepper_factory = RKF45RayStepperFactory::new(RKFStepperConfig::default());

    let sequential = trace_ray_batch(
        &field,
        &lookup,
        &events,
        &stepper_factory,
        &initial_states,
        5.0,
        &BatchTracerConfig::default(),
    )
    .unwrap();
    let pooled = trace_ray_batch(
        &field,
        &lookup,
        &events,
        &stepper_factory,
        &initial_states,
        5.0,
        &BatchTracerConfig {
            execution_mode: ExecutionMode::Pooled { n_workers: Some(3) },
            ..BatchTracerConfig::default()
        },
    )
    .unwrap();

    assert_eq!(sequential.len(), pooled.len());
    for (sequential_result, pooled_result) in sequential.iter().zip(&pooled) {
        assert_eq!(
            sequential_result.termination_cause(),
            pooled_result.termination_cause()
        );
        assert_eq!(
            sequential_result.path_lengths(),
            pooled_result.path_lengths()
        );
        assert_eq!(sequential_result.states(), pooled_result.states());
    }
}

#[test]
fn dense_batch_sampling_uses_regular_intervals() {
    let field = uniform_field(1.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::new();
    let initial_states = initial_ray_states(
        &field,
        &lookup,
        &[center()],
        &[TakeoffAngle::new(90.0, 0.0)],
    )
    .unwrap();
    let stepper_factory = RKF45RayStepperFactory::new(RKFStepperConfig {
        dense_step_length: 0.5,
        ..RKFStepperConfig::default()
    });

    let results = trace_ray_batch(
        &field,
        &lookup,
        &events,
        &stepper_factory,
        &initial_states,
        2.0,
        &BatchTracerConfig {
            sampling_mode: SamplingMode::Dense,
            ..BatchTracerConfig::default()
        },
    )
    .unwrap();

    let expected_path_lengths: Vec<ftr> = (0..=4).map(|i| 0.5 * i as ftr).collect();
    assert_eq!(results[0].path_lengths(), expected_path_lengths.as_slice());
}

#[test]
fn invalid_velocity_models_are_rejected() {
    let domain = cube_domain(10.0, 11);

    let mut with_zero = Array3::from_elem((11, 11, 11), 2.0);
    with_zero[[3, 4, 5]] = 0.0;
    assert!(matches!(
        SlownessField::from_velocity_model(Arc::clone(&domain), &with_zero),
        Err(RayTraceError::InvalidVelocityModel { .. })
    ));

    let mut with_nan = Array3::from_elem((11, 11, 11), 2.0);
    with_nan[[0, 0, 0]] = ftr::NAN;
    assert!(matches!(
        SlownessField::from_velocity_model(Arc::clone(&domain), &with_nan),
        Err(RayTraceError::InvalidVelocityModel { .. })
    ));

    let wrong_shape = Array3::from_elem((10, 11, 11), 2.0);
    assert!(matches!(
        SlownessField::from_velocity_model(domain, &wrong_shape),
        Err(RayTraceError::ModelShapeMismatch { .. })
    ));
}

#[test]
fn invalid_batches_are_rejected() {
    let field = uniform_field(2.0);
    let lookup = NearestNodeLookup3::new();

    let sources = vec![center(), center()];
    let angles = vec![TakeoffAngle::new(0.0, 0.0)];
    assert!(matches!(
        initial_ray_states(&field, &lookup, &sources, &angles),
        Err(RayTraceError::InvalidBatch {
            n_sources: 2,
            n_angles: 1
        })
    ));

    let outside = Point3::new(-100.0, 5.0, 5.0);
    assert!(matches!(
        initial_ray_state(&field, &lookup, &outside, &TakeoffAngle::new(0.0, 0.0)),
        Err(RayTraceError::SourceOutsideField { .. })
    ));
}

#[test]
fn exhausted_step_attempts_terminate_the_trace() {
    let field = depth_gradient_field();
    let lookup = TrilinearLookup3::new();
    let events = BoundaryEvents::new();
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(40.0, 0.0)).unwrap();
    let config = RKFStepperConfig {
        max_step_attempts: 1,
        absolute_tolerance: 1e-300,
        relative_tolerance: 0.0,
        ..RKFStepperConfig::default()
    };
    let mut stepper = RKF45RayStepper::new(config);

    let result = TraceResult::trace(&field, &lookup, &events, &mut stepper, &initial_state, 10.0);

    assert_eq!(
        result.termination_cause(),
        TerminationCause::TooManyStepAttempts
    );
    assert_eq!(result.path_lengths(), &[0.0]);
}

#[test]
fn lookup_schemes_agree_in_uniform_field() {
    let field = uniform_field(2.0);
    let events = BoundaryEvents::new();
    let nearest = NearestNodeLookup3::new();
    let trilinear = TrilinearLookup3::new();
    let angle = TakeoffAngle::new(55.0, 120.0);

    let nearest_initial = initial_ray_state(&field, &nearest, &center(), &angle).unwrap();
    let mut nearest_stepper = RKF45RayStepper::new(RKFStepperConfig::default());
    let nearest_result = TraceResult::trace(
        &field,
        &nearest,
        &events,
        &mut nearest_stepper,
        &nearest_initial,
        3.0,
    );

    let trilinear_initial = initial_ray_state(&field, &trilinear, &center(), &angle).unwrap();
    let mut trilinear_stepper = RKF45RayStepper::new(RKFStepperConfig::default());
    let trilinear_result = TraceResult::trace(
        &field,
        &trilinear,
        &events,
        &mut trilinear_stepper,
        &trilinear_initial,
        3.0,
    );

    let nearest_final = nearest_result.final_state().unwrap();
    let trilinear_final = trilinear_result.final_state().unwrap();
    for dim in Dim3::slice() {
        assert_abs_diff_eq!(
            nearest_final.position[dim],
            trilinear_final.position[dim],
            epsilon = 1e-9
        );
    }
    assert_abs_diff_eq!(
        nearest_final.travel_time,
        trilinear_final.travel_time,
        epsilon = 1e-9
    );
}

#[test]
fn callback_can_stop_the_trace() {
    let field = uniform_field(1.0);
    let lookup = NearestNodeLookup3::new();
    let events = BoundaryEvents::new();
    let initial_state =
        initial_ray_state(&field, &lookup, &center(), &TakeoffAngle::new(0.0, 0.0)).unwrap();
    let mut stepper = RKF45RayStepper::new(RKFStepperConfig::default());

    let mut n_callback_invocations = 0;
    let cause = trace_ray(
        &field,
        &lookup,
        &events,
        &mut stepper,
        &initial_state,
        100.0,
        &mut |path_length, _state| {
            n_callback_invocations += 1;
            if path_length > 0.5 {
                StepperInstruction::Terminate
            } else {
                StepperInstruction::Continue
            }
        },
    );

    assert_eq!(cause, TerminationCause::StoppedByCallback);
    assert!(n_callback_invocations >= 2);
}
