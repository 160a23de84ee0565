//! Regular grids describing the modeled volume.

use crate::{
    error::{RayTraceError, Result},
    geometry::{
        Dim3::{self, X, Y, Z},
        In3D, Point3, Vec3,
    },
    num::SFloat,
};

/// Largest tolerated relative deviation of an axis spacing from the
/// spacing between the first two samples.
pub const MAX_RELATIVE_SPACING_DEVIATION: f64 = 1e-6;

/// A query for a value at a point that may lie outside the grid.
#[derive(Clone, Debug, PartialEq)]
pub enum GridPointQuery3<T> {
    /// The point is covered by the grid; contains the queried value.
    Inside(T),
    /// The point is not covered by the grid.
    Outside,
}

impl<T> GridPointQuery3<T> {
    /// Whether the queried point was covered by the grid.
    pub fn is_inside(&self) -> bool {
        matches!(self, GridPointQuery3::Inside(_))
    }

    /// Returns the queried value, or `None` if the point was outside.
    pub fn into_option(self) -> Option<T> {
        match self {
            GridPointQuery3::Inside(value) => Some(value),
            GridPointQuery3::Outside => None,
        }
    }
}

/// 3D spatial coordinate arrays.
#[derive(Clone, Debug)]
pub struct Coords3<F>(In3D<Vec<F>>);

impl<F: SFloat> Coords3<F> {
    /// Creates a new 3D set of coordinates given the component 1D coordinates.
    pub fn new(x: Vec<F>, y: Vec<F>, z: Vec<F>) -> Self {
        Self(In3D::new(x, y, z))
    }
}

impl<F> std::ops::Index<Dim3> for Coords3<F> {
    type Output = Vec<F>;
    fn index(&self, dim: Dim3) -> &Self::Output {
        &self.0[dim]
    }
}

/// A regular 3D grid with strictly increasing, uniformly spaced axes.
///
/// Validated once at construction and immutable afterwards.
#[derive(Clone, Debug)]
pub struct Domain<F> {
    coords: Coords3<F>,
    shape: In3D<usize>,
    lower_bounds: Vec3<F>,
    upper_bounds: Vec3<F>,
    extents: Vec3<F>,
    spacings: Vec3<F>,
}

impl<F: SFloat> Domain<F> {
    /// Creates a new domain given the axis coordinate arrays.
    ///
    /// # Parameters
    ///
    /// - `coords`: Coordinates of the grid nodes along each axis.
    ///
    /// # Returns
    ///
    /// A `Result` with the new domain, or an `InvalidDomain` error if any
    /// axis has fewer than two samples, is not strictly increasing or is
    /// not uniformly spaced within [`MAX_RELATIVE_SPACING_DEVIATION`].
    pub fn from_coords(coords: Coords3<F>) -> Result<Self> {
        for dim in Dim3::slice() {
            Self::validate_axis(dim, &coords[dim])?;
        }

        let shape = In3D::with_each_component(|dim| coords[dim].len());
        let lower_bounds = Vec3::with_each_component(|dim| coords[dim][0]);
        let upper_bounds = Vec3::with_each_component(|dim| coords[dim][shape[dim] - 1]);
        let extents = &upper_bounds - &lower_bounds;
        let spacings = Vec3::with_each_component(|dim| {
            extents[dim] / F::from_usize(shape[dim] - 1).expect("Conversion failed")
        });

        Ok(Self {
            coords,
            shape,
            lower_bounds,
            upper_bounds,
            extents,
            spacings,
        })
    }

    /// Creates a new domain spanning the given bounds with uniformly
    /// distributed grid nodes.
    ///
    /// # Parameters
    ///
    /// - `lower_bounds`: Coordinates of the first grid node along each axis.
    /// - `upper_bounds`: Coordinates of the last grid node along each axis.
    /// - `shape`: Number of grid nodes along each axis.
    ///
    /// # Returns
    ///
    /// A `Result` with the new domain, or an `InvalidDomain` error if a
    /// bound pair is not increasing or an axis has fewer than two nodes.
    pub fn from_bounds(
        lower_bounds: Vec3<F>,
        upper_bounds: Vec3<F>,
        shape: In3D<usize>,
    ) -> Result<Self> {
        for dim in Dim3::slice() {
            if shape[dim] < 2 {
                return Err(RayTraceError::InvalidDomain {
                    axis: dim,
                    reason: format!("has {} samples (at least 2 needed)", shape[dim]),
                });
            }
            if upper_bounds[dim] <= lower_bounds[dim] {
                return Err(RayTraceError::InvalidDomain {
                    axis: dim,
                    reason: format!(
                        "bounds [{:?}, {:?}] are not increasing",
                        lower_bounds[dim], upper_bounds[dim]
                    ),
                });
            }
        }
        let coords = Coords3::new(
            Self::equidistant_coords(lower_bounds[X], upper_bounds[X], shape[X]),
            Self::equidistant_coords(lower_bounds[Y], upper_bounds[Y], shape[Y]),
            Self::equidistant_coords(lower_bounds[Z], upper_bounds[Z], shape[Z]),
        );
        Self::from_coords(coords)
    }

    /// Returns the 3D shape of the grid.
    pub fn shape(&self) -> &In3D<usize> {
        &self.shape
    }

    /// Returns a reference to the coordinates of the grid nodes.
    pub fn coords(&self) -> &Coords3<F> {
        &self.coords
    }

    /// Returns the lower coordinate bounds of the grid.
    pub fn lower_bounds(&self) -> &Vec3<F> {
        &self.lower_bounds
    }

    /// Returns the upper coordinate bounds of the grid.
    pub fn upper_bounds(&self) -> &Vec3<F> {
        &self.upper_bounds
    }

    /// Returns the extent of the grid along each axis.
    pub fn extents(&self) -> &Vec3<F> {
        &self.extents
    }

    /// Returns the node spacing of the grid along each axis.
    pub fn spacings(&self) -> &Vec3<F> {
        &self.spacings
    }

    /// Whether the given position lies within the grid bounds (inclusive).
    pub fn contains(&self, position: &Point3<F>) -> bool {
        Dim3::slice().iter().all(|&dim| {
            position[dim] >= self.lower_bounds[dim] && position[dim] <= self.upper_bounds[dim]
        })
    }

    fn validate_axis(dim: Dim3, coords: &[F]) -> Result<()> {
        if coords.len() < 2 {
            return Err(RayTraceError::InvalidDomain {
                axis: dim,
                reason: format!("has {} samples (at least 2 needed)", coords.len()),
            });
        }
        let first_spacing = coords[1] - coords[0];
        let tolerance = F::from_f64(MAX_RELATIVE_SPACING_DEVIATION).expect("Conversion failed");
        for idx in 1..coords.len() {
            let spacing = coords[idx] - coords[idx - 1];
            if spacing <= F::zero() {
                return Err(RayTraceError::InvalidDomain {
                    axis: dim,
                    reason: format!("is not strictly increasing at sample {}", idx),
                });
            }
            if num::Float::abs((spacing - first_spacing) / first_spacing) > tolerance {
                return Err(RayTraceError::InvalidDomain {
                    axis: dim,
                    reason: format!("is not uniformly spaced at sample {}", idx),
                });
            }
        }
        Ok(())
    }

    fn equidistant_coords(lower: F, upper: F, n_samples: usize) -> Vec<F> {
        let denom = F::from_usize(n_samples - 1).expect("Conversion failed");
        (0..n_samples)
            .map(|idx| {
                let frac = F::from_usize(idx).expect("Conversion failed") / denom;
                lower + (upper - lower) * frac
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::prelude::*;

    #[test]
    fn domain_from_coords_works() {
        let xc = Array::linspace(-1.0, 1.0, 17);
        let yc = Array::linspace(1.0, 5.2, 5);
        let zc = Array::linspace(-10.0, 10.0, 29);
        let domain =
            Domain::from_coords(Coords3::new(xc.to_vec(), yc.to_vec(), zc.to_vec())).unwrap();

        assert_eq!(domain.shape().to_tuple(), (17, 5, 29));
        assert_eq!(domain.lower_bounds(), &Vec3::new(-1.0, 1.0, -10.0));
        assert_eq!(domain.upper_bounds(), &Vec3::new(1.0, 5.2, 10.0));
        assert_eq!(domain.extents(), &Vec3::new(2.0, 4.2, 20.0));
        assert_eq!(domain.spacings()[X], 0.125);
    }

    #[test]
    fn domain_from_bounds_matches_from_coords() {
        let from_bounds = Domain::from_bounds(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 2.0, 8.0),
            In3D::new(5, 3, 9),
        )
        .unwrap();
        let from_coords = Domain::from_coords(Coords3::new(
            Array::linspace(0.0, 4.0, 5).to_vec(),
            Array::linspace(0.0, 2.0, 3).to_vec(),
            Array::linspace(0.0, 8.0, 9).to_vec(),
        ))
        .unwrap();

        assert_eq!(from_bounds.spacings(), from_coords.spacings());
        assert_eq!(from_bounds.coords()[Z], from_coords.coords()[Z]);
    }

    #[test]
    fn under_sized_axis_is_rejected() {
        let result = Domain::from_coords(Coords3::new(
            vec![0.0],
            vec![0.0, 1.0],
            vec![0.0, 1.0],
        ));
        assert!(matches!(
            result,
            Err(RayTraceError::InvalidDomain { axis: X, .. })
        ));
    }

    #[test]
    fn non_monotonic_axis_is_rejected() {
        let result = Domain::from_coords(Coords3::new(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0, 0.5],
            vec![0.0, 1.0, 2.0],
        ));
        assert!(matches!(
            result,
            Err(RayTraceError::InvalidDomain { axis: Y, .. })
        ));
    }

    #[test]
    fn non_uniform_axis_is_rejected() {
        let result = Domain::from_coords(Coords3::new(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0, 2.5],
        ));
        assert!(matches!(
            result,
            Err(RayTraceError::InvalidDomain { axis: Z, .. })
        ));
    }

    #[test]
    fn contains_is_inclusive_at_bounds() {
        let domain = Domain::from_bounds(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            In3D::new(2, 2, 2),
        )
        .unwrap();
        assert!(domain.contains(&Point3::new(0.0, 0.5, 1.0)));
        assert!(!domain.contains(&Point3::new(0.0, 0.5, 1.1)));
    }
}
