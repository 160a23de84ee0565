//! Slowness fields derived from discretized velocity models.

use crate::{
    error::{RayTraceError, Result},
    geometry::{
        Dim3::{self, X, Y, Z},
        Idx3, In3D, Point3, Vec3,
    },
    grid::{Coords3, Domain, GridPointQuery3},
    num::SFloat,
};
use ndarray::prelude::*;
use std::sync::Arc;

/// Default number of padding nodes added on each side of every axis.
pub const DEFAULT_PADDING_WIDTH: usize = 10;

/// A discretized 3D slowness field extended beyond the domain bounds.
///
/// Node values are the reciprocals of the input velocity model. The field
/// is extended with a fixed number of padding nodes on each side of every
/// axis by continuing the node coordinates uniformly and replicating the
/// value of the nearest boundary node. The spatial gradient of the
/// slowness is precomputed on the extended lattice using central
/// differences, with one-sided differences at the extreme planes.
#[derive(Clone, Debug)]
pub struct SlownessField<F> {
    domain: Arc<Domain<F>>,
    padding_width: usize,
    extended_coords: Coords3<F>,
    extended_shape: In3D<usize>,
    extended_lower_bounds: Vec3<F>,
    extended_upper_bounds: Vec3<F>,
    slowness: Array3<F>,
    gradients: In3D<Array3<F>>,
}

impl<F: SFloat> SlownessField<F> {
    /// Creates a new slowness field from a velocity model sampled on the
    /// nodes of the given domain, extended with the default number of
    /// padding nodes.
    pub fn from_velocity_model(domain: Arc<Domain<F>>, velocities: &Array3<F>) -> Result<Self> {
        Self::from_velocity_model_with_padding(domain, velocities, DEFAULT_PADDING_WIDTH)
    }

    /// Creates a new slowness field from a velocity model sampled on the
    /// nodes of the given domain.
    ///
    /// # Parameters
    ///
    /// - `domain`: Grid on whose nodes the velocity model is sampled.
    /// - `velocities`: 3D array of node velocities, with the same shape
    ///   as the domain.
    /// - `padding_width`: Number of padding nodes to add on each side of
    ///   every axis.
    ///
    /// # Returns
    ///
    /// A `Result` with the new slowness field, or an error if the model
    /// shape does not match the domain or any velocity is non-positive
    /// or non-finite.
    pub fn from_velocity_model_with_padding(
        domain: Arc<Domain<F>>,
        velocities: &Array3<F>,
        padding_width: usize,
    ) -> Result<Self> {
        let shape = domain.shape();
        let expected = [shape[X], shape[Y], shape[Z]];
        let got = [
            velocities.shape()[0],
            velocities.shape()[1],
            velocities.shape()[2],
        ];
        if got != expected {
            return Err(RayTraceError::ModelShapeMismatch { expected, got });
        }
        for ((i, j, k), &velocity) in velocities.indexed_iter() {
            if !(velocity.is_finite() && velocity > F::zero()) {
                return Err(RayTraceError::InvalidVelocityModel {
                    indices: Idx3::new(i, j, k),
                    value: velocity.to_f64().unwrap_or(f64::NAN),
                });
            }
        }

        let extended_shape = In3D::with_each_component(|dim| shape[dim] + 2 * padding_width);
        let slowness = Array3::from_shape_fn(extended_shape.to_tuple(), |(i, j, k)| {
            F::one()
                / velocities[[
                    Self::source_index(i, padding_width, shape[X]),
                    Self::source_index(j, padding_width, shape[Y]),
                    Self::source_index(k, padding_width, shape[Z]),
                ]]
        });

        let spacings = domain.spacings().clone();
        let extended_coords = Coords3::new(
            Self::extended_axis_coords(
                domain.lower_bounds()[X],
                spacings[X],
                padding_width,
                extended_shape[X],
            ),
            Self::extended_axis_coords(
                domain.lower_bounds()[Y],
                spacings[Y],
                padding_width,
                extended_shape[Y],
            ),
            Self::extended_axis_coords(
                domain.lower_bounds()[Z],
                spacings[Z],
                padding_width,
                extended_shape[Z],
            ),
        );
        let extended_lower_bounds = Vec3::with_each_component(|dim| extended_coords[dim][0]);
        let extended_upper_bounds =
            Vec3::with_each_component(|dim| extended_coords[dim][extended_shape[dim] - 1]);

        let gradients =
            In3D::with_each_component(|dim| Self::difference_gradient(&slowness, dim, spacings[dim]));

        Ok(Self {
            domain,
            padding_width,
            extended_coords,
            extended_shape,
            extended_lower_bounds,
            extended_upper_bounds,
            slowness,
            gradients,
        })
    }

    /// Returns a reference to the domain the field was built on.
    pub fn domain(&self) -> &Domain<F> {
        self.domain.as_ref()
    }

    /// Returns a new atomic reference counted pointer to the domain.
    pub fn arc_with_domain(&self) -> Arc<Domain<F>> {
        Arc::clone(&self.domain)
    }

    /// Returns the number of padding nodes on each side of every axis.
    pub fn padding_width(&self) -> usize {
        self.padding_width
    }

    /// Returns the 3D shape of the extended lattice.
    pub fn extended_shape(&self) -> &In3D<usize> {
        &self.extended_shape
    }

    /// Returns a reference to the coordinates of the extended lattice nodes.
    pub fn extended_coords(&self) -> &Coords3<F> {
        &self.extended_coords
    }

    /// Returns the lower coordinate bounds of the extended lattice.
    pub fn extended_lower_bounds(&self) -> &Vec3<F> {
        &self.extended_lower_bounds
    }

    /// Returns the upper coordinate bounds of the extended lattice.
    pub fn extended_upper_bounds(&self) -> &Vec3<F> {
        &self.extended_upper_bounds
    }

    /// Returns a reference to the 3D array of extended slowness values.
    pub fn values(&self) -> &Array3<F> {
        &self.slowness
    }

    /// Whether the given position lies within the extended lattice bounds.
    pub fn extended_contains(&self, position: &Point3<F>) -> bool {
        Dim3::slice().iter().all(|&dim| {
            position[dim] >= self.extended_lower_bounds[dim]
                && position[dim] <= self.extended_upper_bounds[dim]
        })
    }

    /// Finds the indices of the extended lattice node closest to the
    /// given position.
    ///
    /// # Parameters
    ///
    /// - `position`: Position to query.
    ///
    /// # Returns
    ///
    /// A `GridPointQuery3<Idx3<usize>>` which is either:
    ///
    /// - `Inside`: Contains the indices of the closest node.
    /// - `Outside`: The position is outside the extended lattice.
    pub fn nearest_index(&self, position: &Point3<F>) -> GridPointQuery3<Idx3<usize>> {
        if !self.extended_contains(position) {
            return GridPointQuery3::Outside;
        }
        let spacings = self.domain.spacings();
        GridPointQuery3::Inside(Idx3::with_each_component(|dim| {
            let offset = (position[dim] - self.extended_lower_bounds[dim]) / spacings[dim];
            let idx = offset.round().to_usize().expect("Conversion failed");
            idx.min(self.extended_shape[dim] - 1)
        }))
    }

    /// Finds the indices of the lower corner node of the extended lattice
    /// cell containing the given position.
    ///
    /// # Parameters
    ///
    /// - `position`: Position to query.
    ///
    /// # Returns
    ///
    /// A `GridPointQuery3<Idx3<usize>>` which is either:
    ///
    /// - `Inside`: Contains the indices of the lower corner node.
    /// - `Outside`: The position is outside the extended lattice.
    pub fn cell_index(&self, position: &Point3<F>) -> GridPointQuery3<Idx3<usize>> {
        if !self.extended_contains(position) {
            return GridPointQuery3::Outside;
        }
        let spacings = self.domain.spacings();
        GridPointQuery3::Inside(Idx3::with_each_component(|dim| {
            let offset = (position[dim] - self.extended_lower_bounds[dim]) / spacings[dim];
            let idx = offset.floor().to_usize().expect("Conversion failed");
            idx.min(self.extended_shape[dim] - 2)
        }))
    }

    /// Returns the slowness value at the given extended lattice node.
    pub fn slowness_at_idx(&self, indices: &Idx3<usize>) -> F {
        self.slowness[indices.to_tuple()]
    }

    /// Returns the precomputed slowness gradient at the given extended
    /// lattice node.
    pub fn gradient_at_idx(&self, indices: &Idx3<usize>) -> Vec3<F> {
        Vec3::with_each_component(|dim| self.gradients[dim][indices.to_tuple()])
    }

    fn source_index(extended_idx: usize, padding_width: usize, n_interior: usize) -> usize {
        extended_idx
            .saturating_sub(padding_width)
            .min(n_interior - 1)
    }

    fn extended_axis_coords(
        lower: F,
        spacing: F,
        padding_width: usize,
        n_extended: usize,
    ) -> Vec<F> {
        (0..n_extended)
            .map(|idx| {
                let offset =
                    F::from_isize(idx as isize - padding_width as isize).expect("Conversion failed");
                lower + offset * spacing
            })
            .collect()
    }

    fn difference_gradient(values: &Array3<F>, dim: Dim3, spacing: F) -> Array3<F> {
        let n = values.raw_dim()[dim.num()];
        let two = F::from_f64(2.0).expect("Conversion failed");
        Array3::from_shape_fn(values.raw_dim(), |(i, j, k)| {
            let indices = [i, j, k];
            let along = indices[dim.num()];
            let (below, above, denom) = if along == 0 {
                (0, 1, spacing)
            } else if along == n - 1 {
                (n - 2, n - 1, spacing)
            } else {
                (along - 1, along + 1, two * spacing)
            };
            let mut below_indices = indices;
            below_indices[dim.num()] = below;
            let mut above_indices = indices;
            above_indices[dim.num()] = above;
            (values[above_indices] - values[below_indices]) / denom
        })
    }
}
