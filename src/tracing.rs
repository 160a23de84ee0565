//! Tracing rays through slowness fields.

pub mod batch;
pub mod seeding;
pub mod stepping;

use self::stepping::{RayStepper, StepperInstruction, StepperResult};
use crate::{
    events::{BoundaryEvents, EventCrossing},
    field::SlownessField,
    geometry::{
        Dim3::{X, Y, Z},
        Point3, Vec3,
    },
    grid::GridPointQuery3,
    interpolation::{SlownessLookup3, SlownessSample},
};
use std::ops::{Add, Mul, Sub};

#[cfg(feature = "serialization")]
use serde::Serialize;

#[cfg(any(feature = "for-testing", test))]
use approx::{AbsDiffEq, RelativeEq};

/// Floating-point precision to use for tracing.
#[allow(non_camel_case_types)]
pub type ftr = f64;

/// Number of scalar components in a traced ray state.
pub const N_STATE_COMPONENTS: usize = 7;

/// The state of a ray at a point along its path, consisting of the
/// spatial position, the momentum vector and the accumulated travel
/// time.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct RayState {
    /// Spatial position of the ray.
    pub position: Point3<ftr>,
    /// Momentum (slowness) vector of the ray.
    pub momentum: Vec3<ftr>,
    /// Travel time accumulated by the ray.
    pub travel_time: ftr,
}

impl RayState {
    /// Creates a new ray state given the position, momentum and travel time.
    pub fn new(position: Point3<ftr>, momentum: Vec3<ftr>, travel_time: ftr) -> Self {
        Self {
            position,
            momentum,
            travel_time,
        }
    }

    /// Returns the scalar components of the state, ordered as position,
    /// momentum, travel time.
    pub fn components(&self) -> [ftr; N_STATE_COMPONENTS] {
        [
            self.position[X],
            self.position[Y],
            self.position[Z],
            self.momentum[X],
            self.momentum[Y],
            self.momentum[Z],
            self.travel_time,
        ]
    }

    /// Constructs a new ray vector from the state components.
    pub fn to_vector(&self) -> RayVector {
        RayVector::new(
            self.position.to_vec3(),
            self.momentum.clone(),
            self.travel_time,
        )
    }
}

/// A displacement in ray state space, used for state derivatives and
/// differences between ray states.
#[derive(Clone, Debug, PartialEq)]
pub struct RayVector {
    /// Displacement of the spatial position.
    pub position: Vec3<ftr>,
    /// Displacement of the momentum vector.
    pub momentum: Vec3<ftr>,
    /// Displacement of the travel time.
    pub travel_time: ftr,
}

impl RayVector {
    /// Creates a new ray vector given the position and momentum
    /// displacements and the travel time displacement.
    pub fn new(position: Vec3<ftr>, momentum: Vec3<ftr>, travel_time: ftr) -> Self {
        Self {
            position,
            momentum,
            travel_time,
        }
    }

    /// Creates a new zero ray vector.
    pub fn zero() -> Self {
        Self::new(Vec3::zero(), Vec3::zero(), 0.0)
    }

    /// Returns the scalar components of the vector, ordered as position,
    /// momentum, travel time.
    pub fn components(&self) -> [ftr; N_STATE_COMPONENTS] {
        [
            self.position[X],
            self.position[Y],
            self.position[Z],
            self.momentum[X],
            self.momentum[Y],
            self.momentum[Z],
            self.travel_time,
        ]
    }

    /// Constructs a new ray state from the vector components.
    pub fn to_ray_state(&self) -> RayState {
        RayState::new(
            self.position.to_point3(),
            self.momentum.clone(),
            self.travel_time,
        )
    }
}

macro_rules! impl_ray_state_vector_op {
    ($trait:ident, $method:ident) => {
        impl $trait<RayVector> for RayState {
            type Output = RayState;
            fn $method(self, vector: RayVector) -> Self::Output {
                $trait::$method(&self, &vector)
            }
        }

        impl<'a> $trait<&'a RayVector> for RayState {
            type Output = RayState;
            fn $method(self, vector: &'a RayVector) -> Self::Output {
                $trait::$method(&self, vector)
            }
        }

        impl<'a> $trait<RayVector> for &'a RayState {
            type Output = RayState;
            fn $method(self, vector: RayVector) -> Self::Output {
                $trait::$method(self, &vector)
            }
        }

        impl<'a, 'b> $trait<&'b RayVector> for &'a RayState {
            type Output = RayState;
            fn $method(self, vector: &'b RayVector) -> Self::Output {
                RayState::new(
                    $trait::$method(&self.position, &vector.position),
                    $trait::$method(&self.momentum, &vector.momentum),
                    $trait::$method(self.travel_time, vector.travel_time),
                )
            }
        }
    };
}

impl_ray_state_vector_op!(Add, add);
impl_ray_state_vector_op!(Sub, sub);

impl<'a, 'b> Sub<&'b RayState> for &'a RayState {
    type Output = RayVector;
    fn sub(self, other: &'b RayState) -> Self::Output {
        RayVector::new(
            &self.position - &other.position,
            &self.momentum - &other.momentum,
            self.travel_time - other.travel_time,
        )
    }
}

macro_rules! impl_ray_vector_add_sub {
    ($trait:ident, $method:ident) => {
        impl $trait<RayVector> for RayVector {
            type Output = RayVector;
            fn $method(self, other: RayVector) -> Self::Output {
                $trait::$method(&self, &other)
            }
        }

        impl<'a> $trait<&'a RayVector> for RayVector {
            type Output = RayVector;
            fn $method(self, other: &'a RayVector) -> Self::Output {
                $trait::$method(&self, other)
            }
        }

        impl<'a> $trait<RayVector> for &'a RayVector {
            type Output = RayVector;
            fn $method(self, other: RayVector) -> Self::Output {
                $trait::$method(self, &other)
            }
        }

        impl<'a, 'b> $trait<&'b RayVector> for &'a RayVector {
            type Output = RayVector;
            fn $method(self, other: &'b RayVector) -> Self::Output {
                RayVector::new(
                    $trait::$method(&self.position, &other.position),
                    $trait::$method(&self.momentum, &other.momentum),
                    $trait::$method(self.travel_time, other.travel_time),
                )
            }
        }
    };
}

impl_ray_vector_add_sub!(Add, add);
impl_ray_vector_add_sub!(Sub, sub);

impl Mul<ftr> for RayVector {
    type Output = RayVector;
    fn mul(self, factor: ftr) -> Self::Output {
        &self * factor
    }
}

impl Mul<ftr> for &RayVector {
    type Output = RayVector;
    fn mul(self, factor: ftr) -> Self::Output {
        RayVector::new(
            &self.position * factor,
            &self.momentum * factor,
            self.travel_time * factor,
        )
    }
}

#[cfg(any(feature = "for-testing", test))]
impl AbsDiffEq for RayState {
    type Epsilon = <ftr as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        ftr::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.position.abs_diff_eq(&other.position, epsilon)
            && self.momentum.abs_diff_eq(&other.momentum, epsilon)
            && self.travel_time.abs_diff_eq(&other.travel_time, epsilon)
    }
}

#[cfg(any(feature = "for-testing", test))]
impl RelativeEq for RayState {
    fn default_max_relative() -> Self::Epsilon {
        ftr::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.position.relative_eq(&other.position, epsilon, max_relative)
            && self.momentum.relative_eq(&other.momentum, epsilon, max_relative)
            && self
                .travel_time
                .relative_eq(&other.travel_time, epsilon, max_relative)
    }
}

/// The derivatives of a ray state with respect to path length, together
/// with a flag showing whether the evaluation position fell outside the
/// extended field.
#[derive(Clone, Debug)]
pub struct RayEquationsEval {
    /// Derivatives of the ray state with respect to path length.
    pub derivatives: RayVector,
    /// Whether the zero-derivative fallback was used.
    pub out_of_range: bool,
}

/// Evaluates the right-hand side of the kinematic ray equations at the
/// given ray state.
///
/// With path length λ, momentum p and local slowness s the derivatives
/// are dx/dλ = p/s, dp/dλ = ∇s and dT/dλ = s. If the state position
/// falls outside the extended field the evaluation does not abort;
/// it yields a zero derivative and is flagged as out of range.
///
/// # Parameters
///
/// - `field`: Slowness field the ray travels through.
/// - `lookup`: Lookup strategy for sampling the field.
/// - `state`: Ray state to evaluate the derivatives at.
///
/// # Returns
///
/// A `RayEquationsEval` holding the derivatives and the out-of-range flag.
///
/// # Type parameters
///
/// - `L`: Type of slowness lookup.
pub fn evaluate_ray_equations<L: SlownessLookup3<ftr>>(
    field: &SlownessField<ftr>,
    lookup: &L,
    state: &RayState,
) -> RayEquationsEval {
    match lookup.sample(field, &state.position) {
        GridPointQuery3::Inside(SlownessSample { slowness, gradient }) => RayEquationsEval {
            derivatives: RayVector::new(&state.momentum / slowness, gradient, slowness),
            out_of_range: false,
        },
        GridPointQuery3::Outside => RayEquationsEval {
            derivatives: RayVector::zero(),
            out_of_range: true,
        },
    }
}

/// The reason the tracing of a ray came to an end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub enum TerminationCause {
    /// A terminal boundary event fired; contains the index of the event.
    BoundaryReached { event_index: usize },
    /// The path length reached the configured bound.
    PathLengthBoundReached,
    /// The step-size controller exceeded its maximum number of attempts.
    TooManyStepAttempts,
    /// The stepping callback requested termination.
    StoppedByCallback,
}

/// Traces a ray through a slowness field until a terminal boundary
/// event fires or the path length reaches the given bound.
///
/// # Parameters
///
/// - `field`: Slowness field to trace the ray through.
/// - `lookup`: Slowness lookup strategy to use.
/// - `events`: Boundary events to check while tracing.
/// - `stepper`: Stepper to use.
/// - `initial_state`: State of the ray at the start of tracing.
/// - `path_length_bound`: Path length at which tracing stops if no
///   terminal event fires first.
/// - `callback`: Closure called with the current path length and ray
///   state for the initial state and after each accepted step.
///
/// # Returns
///
/// The `TerminationCause` describing why tracing came to an end.
///
/// # Type parameters
///
/// - `L`: Type of slowness lookup.
/// - `St`: Type of stepper.
/// - `C`: Mutable function type taking a path length and a reference to a ray state and returning a `StepperInstruction`.
pub fn trace_ray<L, St, C>(
    field: &SlownessField<ftr>,
    lookup: &L,
    events: &BoundaryEvents<ftr>,
    stepper: &mut St,
    initial_state: &RayState,
    path_length_bound: ftr,
    callback: &mut C,
) -> TerminationCause
where
    L: SlownessLookup3<ftr>,
    St: RayStepper,
    C: FnMut(ftr, &RayState) -> StepperInstruction,
{
    if let StepperResult::Stopped(cause) =
        stepper.place(field, lookup, events, initial_state, path_length_bound, callback)
    {
        return cause;
    }
    loop {
        if let StepperResult::Stopped(cause) = stepper.step(field, lookup, events, callback) {
            return cause;
        }
    }
}

/// Traces a ray through a slowness field, producing regularly spaced
/// output via the stepper's dense interpolant.
///
/// Apart from the output sampling this behaves like [`trace_ray`].
pub fn trace_ray_dense<L, St, C>(
    field: &SlownessField<ftr>,
    lookup: &L,
    events: &BoundaryEvents<ftr>,
    stepper: &mut St,
    initial_state: &RayState,
    path_length_bound: ftr,
    callback: &mut C,
) -> TerminationCause
where
    L: SlownessLookup3<ftr>,
    St: RayStepper,
    C: FnMut(ftr, &RayState) -> StepperInstruction,
{
    if let StepperResult::Stopped(cause) =
        stepper.place(field, lookup, events, initial_state, path_length_bound, callback)
    {
        return cause;
    }
    loop {
        if let StepperResult::Stopped(cause) =
            stepper.step_dense_output(field, lookup, events, callback)
        {
            return cause;
        }
    }
}

/// The sampled trajectory of a single traced ray.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct TraceResult {
    initial_state: RayState,
    path_lengths: Vec<ftr>,
    states: Vec<RayState>,
    termination_cause: TerminationCause,
    rhs_fallback_invoked: bool,
    event_crossings: Vec<EventCrossing<ftr>>,
}

impl TraceResult {
    /// Traces a single ray, sampling the trajectory at the initial state
    /// and at every accepted solver step.
    ///
    /// # Parameters
    ///
    /// - `field`: Slowness field to trace the ray through.
    /// - `lookup`: Slowness lookup strategy to use.
    /// - `events`: Boundary events to check while tracing.
    /// - `stepper`: Stepper to use.
    /// - `initial_state`: State of the ray at the start of tracing.
    /// - `path_length_bound`: Path length at which tracing stops if no
    ///   terminal event fires first.
    ///
    /// # Returns
    ///
    /// A new `TraceResult` holding the sampled trajectory.
    ///
    /// # Type parameters
    ///
    /// - `L`: Type of slowness lookup.
    /// - `St`: Type of stepper.
    pub fn trace<L, St>(
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
        stepper: &mut St,
        initial_state: &RayState,
        path_length_bound: ftr,
    ) -> Self
    where
        L: SlownessLookup3<ftr>,
        St: RayStepper,
    {
        let mut path_lengths = Vec::new();
        let mut states = Vec::new();
        let termination_cause = trace_ray(
            field,
            lookup,
            events,
            stepper,
            initial_state,
            path_length_bound,
            &mut |path_length, state: &RayState| {
                path_lengths.push(path_length);
                states.push(state.clone());
                StepperInstruction::Continue
            },
        );
        Self::from_samples(stepper, initial_state, path_lengths, states, termination_cause)
    }

    /// Traces a single ray, sampling the trajectory at regularly spaced
    /// path lengths reconstructed from the stepper's dense interpolant.
    ///
    /// Apart from the output sampling this behaves like [`TraceResult::trace`].
    pub fn trace_dense<L, St>(
        field: &SlownessField<ftr>,
        lookup: &L,
        events: &BoundaryEvents<ftr>,
        stepper: &mut St,
        initial_state: &RayState,
        path_length_bound: ftr,
    ) -> Self
    where
        L: SlownessLookup3<ftr>,
        St: RayStepper,
    {
        let mut path_lengths = Vec::new();
        let mut states = Vec::new();
        let termination_cause = trace_ray_dense(
            field,
            lookup,
            events,
            stepper,
            initial_state,
            path_length_bound,
            &mut |path_length, state: &RayState| {
                path_lengths.push(path_length);
                states.push(state.clone());
                StepperInstruction::Continue
            },
        );
        Self::from_samples(stepper, initial_state, path_lengths, states, termination_cause)
    }

    fn from_samples<St: RayStepper>(
        stepper: &St,
        initial_state: &RayState,
        mut path_lengths: Vec<ftr>,
        mut states: Vec<RayState>,
        termination_cause: TerminationCause,
    ) -> Self {
        // The callback only sees continuing steps, so the terminal
        // sample is appended here.
        let final_path_length = stepper.path_length();
        if path_lengths
            .last()
            .map_or(true, |&last| final_path_length > last)
        {
            path_lengths.push(final_path_length);
            states.push(stepper.ray_state().clone());
        }
        Self {
            initial_state: initial_state.clone(),
            path_lengths,
            states,
            termination_cause,
            rhs_fallback_invoked: stepper.rhs_fallback_invoked(),
            event_crossings: stepper.event_crossings().to_vec(),
        }
    }

    /// Returns the state the ray was traced from.
    pub fn initial_state(&self) -> &RayState {
        &self.initial_state
    }

    /// Returns the path lengths of the sampled trajectory points.
    pub fn path_lengths(&self) -> &[ftr] {
        &self.path_lengths
    }

    /// Returns the sampled ray states along the trajectory.
    pub fn states(&self) -> &[RayState] {
        &self.states
    }

    /// Returns the last sampled state, or `None` if no samples were
    /// recorded.
    pub fn final_state(&self) -> Option<&RayState> {
        self.states.last()
    }

    /// Returns the number of sampled trajectory points.
    pub fn number_of_samples(&self) -> usize {
        self.states.len()
    }

    /// Returns the cause of termination for the trace.
    pub fn termination_cause(&self) -> TerminationCause {
        self.termination_cause
    }

    /// Whether any right-hand side evaluation fell outside the extended
    /// field during the trace.
    pub fn rhs_fallback_invoked(&self) -> bool {
        self.rhs_fallback_invoked
    }

    /// Returns the recorded non-terminal event crossings in order.
    pub fn event_crossings(&self) -> &[EventCrossing<ftr>] {
        &self.event_crossings
    }
}
