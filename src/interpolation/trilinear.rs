//! Trilinear slowness lookup.

use super::{SlownessLookup3, SlownessSample};
use crate::{
    field::SlownessField,
    geometry::{Dim3, Idx3, In3D, Point3, Vec3},
    grid::GridPointQuery3,
    num::SFloat,
};

/// A lookup strategy blending the values and gradients stored at the
/// eight corner nodes of the lattice cell containing the queried
/// position.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrilinearLookup3;

impl TrilinearLookup3 {
    pub fn new() -> Self {
        Self
    }
}

impl<F: SFloat> SlownessLookup3<F> for TrilinearLookup3 {
    fn sample(
        &self,
        field: &SlownessField<F>,
        position: &Point3<F>,
    ) -> GridPointQuery3<SlownessSample<F>> {
        let lower_indices = match field.cell_index(position) {
            GridPointQuery3::Inside(indices) => indices,
            GridPointQuery3::Outside => return GridPointQuery3::Outside,
        };
        let coords = field.extended_coords();
        let spacings = field.domain().spacings();
        let fractions = Vec3::with_each_component(|dim| {
            (position[dim] - coords[dim][lower_indices[dim]]) / spacings[dim]
        });

        let mut slowness = F::zero();
        let mut gradient = Vec3::zero();
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    let offsets = In3D::new(i, j, k);
                    let indices =
                        Idx3::with_each_component(|dim| lower_indices[dim] + offsets[dim]);
                    let weight = Dim3::slice().iter().fold(F::one(), |weight, &dim| {
                        weight
                            * if offsets[dim] == 1 {
                                fractions[dim]
                            } else {
                                F::one() - fractions[dim]
                            }
                    });
                    slowness = slowness + weight * field.slowness_at_idx(&indices);
                    gradient = gradient + field.gradient_at_idx(&indices) * weight;
                }
            }
        }
        GridPointQuery3::Inside(SlownessSample { slowness, gradient })
    }
}
