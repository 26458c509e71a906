use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::kernel::{interpolate, tabulate_shape_functions, Kernel, KernelContext};
use crate::requests::{CoordinatesType, DataRequirementSet, GatherKey};
use crate::scratch::ScratchViews;
use crate::Real;
use nalgebra::{DMatrixViewMut, DVectorViewMut};

/// Galerkin diffusion `∫ Γ ∇N_i · ∇N_j` of a nodal scalar, integrated with Gauss quadrature.
///
/// The residual is `-K φ` for the current iterate `φ`. With the shifted gradient operator the
/// diffusion coefficient is interpolated with shifted shape functions as well.
#[derive(Debug, Clone)]
pub struct ScalarDiffFemKernel<T> {
    scalar: GatherKey,
    diffusion_coefficient: GatherKey,
    grad_op: OperatorRequest,
    det_j: OperatorRequest,
    weights: Vec<T>,
    shape_functions: Vec<T>,
    spatial_dim: usize,
}

impl<T: Real> ScalarDiffFemKernel<T> {
    pub fn new(
        context: &KernelContext<T>,
        requirements: &mut DataRequirementSet<T>,
        scalar_name: &str,
        diffusion_coefficient_name: &str,
    ) -> Result<Self, ConfigurationError> {
        let variant = Variant::from_shifted(context.options.shifted_grad_op(scalar_name));
        let fem = context.master_element(Family::Fem)?;
        requirements.add_master_element(fem.clone());

        let d = context.spatial_dim();
        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, d, CoordinatesType::Current);
        let scalar = requirements.add_gathered_nodal_field(&context.nodal_field(scalar_name)?, 1);
        let diffusion_coefficient =
            requirements.add_gathered_nodal_field(&context.nodal_field(diffusion_coefficient_name)?, 1);

        Ok(Self {
            scalar,
            diffusion_coefficient,
            grad_op: requirements.add_geometric_operator(OperatorKind::FemGradOp, &coordinates, variant),
            det_j: requirements.add_geometric_operator(OperatorKind::FemDetJ, &coordinates, variant),
            weights: fem.ip_weights().to_vec(),
            shape_functions: tabulate_shape_functions(fem.as_ref(), variant),
            spatial_dim: d,
        })
    }
}

impl<T: Real> Kernel<T> for ScalarDiffFemKernel<T> {
    fn dofs_per_node(&self) -> usize {
        1
    }

    fn execute(
        &self,
        mut lhs: DMatrixViewMut<T>,
        mut rhs: DVectorViewMut<T>,
        scratch: &ScratchViews<T>,
    ) -> eyre::Result<()> {
        let phi = scratch.gather(&self.scalar)?;
        let gamma = scratch.gather(&self.diffusion_coefficient)?;
        let dndx = scratch.operator(&self.grad_op)?;
        let det_j = scratch.operator(&self.det_j)?;
        let n = phi.shape()[0];
        let d = self.spatial_dim;

        for (ip, &w) in self.weights.iter().enumerate() {
            let gamma_ip = interpolate(&self.shape_functions, ip, &gamma);
            let ip_factor = gamma_ip * det_j.at(ip) * w;

            for ir in 0..n {
                let mut rhs_sum = T::zero();
                for ic in 0..n {
                    let mut lhs_sum = T::zero();
                    for j in 0..d {
                        let fac = dndx.at3(ip, ir, j) * dndx.at3(ip, ic, j);
                        lhs_sum += fac;
                        rhs_sum += fac * phi.at(ic);
                    }
                    lhs[(ir, ic)] += lhs_sum * ip_factor;
                }
                rhs[ir] -= rhs_sum * ip_factor;
            }
        }
        Ok(())
    }
}
