//! Boundary events stopping or marking traced rays.

use crate::{
    geometry::{
        Dim3::{self, X, Y, Z},
        Point3,
    },
    grid::Domain,
    num::SFloat,
};

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Which sign changes of an event value count as crossings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub enum CrossingDirection {
    /// Every sign change counts.
    Any,
    /// Only changes toward larger values count.
    Rising,
    /// Only changes toward smaller values count.
    Falling,
}

/// A planar event surface normal to one of the coordinate axes.
///
/// The event value at a position is the signed distance from the bound
/// along the event axis. A crossing occurs when the value changes sign
/// between two consecutive accepted solver steps.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct BoundaryEvent<F> {
    axis: Dim3,
    bound: F,
    direction: CrossingDirection,
    terminal: bool,
}

impl<F: SFloat> BoundaryEvent<F> {
    /// Creates a new boundary event.
    ///
    /// # Parameters
    ///
    /// - `axis`: Axis the event surface is normal to.
    /// - `bound`: Coordinate of the event surface along the axis.
    /// - `direction`: Which sign changes count as crossings.
    /// - `terminal`: Whether a crossing stops the integration.
    pub fn new(axis: Dim3, bound: F, direction: CrossingDirection, terminal: bool) -> Self {
        Self {
            axis,
            bound,
            direction,
            terminal,
        }
    }

    /// Returns the axis the event surface is normal to.
    pub fn axis(&self) -> Dim3 {
        self.axis
    }

    /// Returns the coordinate of the event surface along its axis.
    pub fn bound(&self) -> F {
        self.bound
    }

    /// Returns the crossing direction filter of the event.
    pub fn direction(&self) -> CrossingDirection {
        self.direction
    }

    /// Whether a crossing of this event stops the integration.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Evaluates the signed event value at the given position.
    pub fn value(&self, position: &Point3<F>) -> F {
        position[self.axis] - self.bound
    }

    /// Whether the change from `previous_value` to `current_value`
    /// constitutes a crossing of the event surface.
    pub fn is_crossing(&self, previous_value: F, current_value: F) -> bool {
        if previous_value * current_value > F::zero() {
            return false;
        }
        if previous_value == F::zero() && current_value == F::zero() {
            return false;
        }
        match self.direction {
            CrossingDirection::Any => true,
            CrossingDirection::Rising => current_value > previous_value,
            CrossingDirection::Falling => current_value < previous_value,
        }
    }
}

/// An ordered collection of boundary events checked during tracing.
#[derive(Clone, Debug, Default)]
pub struct BoundaryEvents<F>(Vec<BoundaryEvent<F>>);

impl<F: SFloat> BoundaryEvents<F> {
    /// Creates an empty event collection.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates terminal wall events at the six bounds of the given domain.
    ///
    /// The events are ordered as lower x, upper x, lower y, upper y,
    /// lower z, upper z.
    pub fn from_domain(domain: &Domain<F>) -> Self {
        Self::from_domain_with_margin(domain, 0)
    }

    /// Creates terminal wall events inset inward from the six bounds of
    /// the given domain by a whole number of node spacings.
    ///
    /// # Parameters
    ///
    /// - `domain`: Domain providing the bounds and node spacings.
    /// - `margin_nodes`: Number of node spacings to inset each wall.
    pub fn from_domain_with_margin(domain: &Domain<F>, margin_nodes: usize) -> Self {
        let margin = F::from_usize(margin_nodes).expect("Conversion failed");
        let mut events = Vec::with_capacity(6);
        for dim in [X, Y, Z] {
            let inset = margin * domain.spacings()[dim];
            events.push(BoundaryEvent::new(
                dim,
                domain.lower_bounds()[dim] + inset,
                CrossingDirection::Any,
                true,
            ));
            events.push(BoundaryEvent::new(
                dim,
                domain.upper_bounds()[dim] - inset,
                CrossingDirection::Any,
                true,
            ));
        }
        Self(events)
    }

    /// Appends an event to the collection.
    pub fn add_event(&mut self, event: BoundaryEvent<F>) {
        self.0.push(event);
    }

    /// Returns the number of events in the collection.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection contains no events.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a reference to the event with the given index.
    pub fn get(&self, event_index: usize) -> Option<&BoundaryEvent<F>> {
        self.0.get(event_index)
    }

    /// Returns an iterator over the events in order.
    pub fn iter(&self) -> impl Iterator<Item = &BoundaryEvent<F>> {
        self.0.iter()
    }

    /// Evaluates all event values at the given position, in event order.
    pub fn values_at(&self, position: &Point3<F>) -> Vec<F> {
        self.0.iter().map(|event| event.value(position)).collect()
    }
}

/// A record of a ray crossing an event surface.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct EventCrossing<F> {
    /// Index of the crossed event in the event collection.
    pub event_index: usize,
    /// Path length at which the crossing occurred.
    pub path_length: F,
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::geometry::{In3D, Vec3};
    use approx::assert_abs_diff_eq;

    fn example_domain() -> Domain<f64> {
        Domain::from_bounds(
            Vec3::new(0.0, -1.0, 2.0),
            Vec3::new(4.0, 1.0, 6.0),
            In3D::new(5, 3, 5),
        )
        .unwrap()
    }

    #[test]
    fn wall_events_are_ordered_by_axis_and_side() {
        let events = BoundaryEvents::from_domain(&example_domain());

        assert_eq!(events.len(), 6);
        let bounds: Vec<_> = events.iter().map(|event| event.bound()).collect();
        assert_eq!(bounds, vec![0.0, 4.0, -1.0, 1.0, 2.0, 6.0]);
        let axes: Vec<_> = events.iter().map(|event| event.axis()).collect();
        assert_eq!(axes, vec![X, X, Y, Y, Z, Z]);
        assert!(events.iter().all(|event| event.is_terminal()));
    }

    #[test]
    fn margin_insets_walls_by_node_spacings() {
        let events = BoundaryEvents::from_domain_with_margin(&example_domain(), 1);

        let bounds: Vec<_> = events.iter().map(|event| event.bound()).collect();
        assert_eq!(bounds, vec![1.0, 3.0, 0.0, 0.0, 3.0, 5.0]);
    }

    #[test]
    fn event_value_is_signed_distance_along_axis() {
        let event = BoundaryEvent::new(Y, 1.0, CrossingDirection::Any, true);

        assert_abs_diff_eq!(event.value(&Point3::new(10.0, 1.75, -3.0)), 0.75);
        assert_abs_diff_eq!(event.value(&Point3::new(10.0, 0.5, -3.0)), -0.5);
    }

    #[test]
    fn sign_changes_are_detected() {
        let event = BoundaryEvent::new(X, 0.0, CrossingDirection::Any, true);

        assert!(event.is_crossing(-1.0, 1.0));
        assert!(event.is_crossing(1.0, -1.0));
        assert!(event.is_crossing(0.0, 1.0));
        assert!(event.is_crossing(-1.0, 0.0));
        assert!(!event.is_crossing(1.0, 2.0));
        assert!(!event.is_crossing(-2.0, -1.0));
        assert!(!event.is_crossing(0.0, 0.0));
    }

    #[test]
    fn direction_filters_restrict_crossings() {
        let rising = BoundaryEvent::new(X, 0.0, CrossingDirection::Rising, false);
        assert!(rising.is_crossing(-1.0, 1.0));
        assert!(!rising.is_crossing(1.0, -1.0));

        let falling = BoundaryEvent::new(X, 0.0, CrossingDirection::Falling, false);
        assert!(!falling.is_crossing(-1.0, 1.0));
        assert!(falling.is_crossing(1.0, -1.0));
    }

    #[test]
    fn added_events_follow_the_walls() {
        let mut events = BoundaryEvents::from_domain(&example_domain());
        events.add_event(BoundaryEvent::new(
            Z,
            4.0,
            CrossingDirection::Rising,
            false,
        ));

        assert_eq!(events.len(), 7);
        assert_eq!(events.get(6).map(|event| event.bound()), Some(4.0));
        assert!(!events.get(6).unwrap().is_terminal());
    }
}
