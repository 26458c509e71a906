use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::kernel::{interpolate, tabulate_shape_functions, Kernel, KernelContext};
use crate::requests::{CoordinatesType, DataRequirementSet, GatherKey};
use crate::scratch::ScratchViews;
use crate::Real;
use nalgebra::{DMatrixViewMut, DVectorViewMut};

/// Control-volume advection and diffusion of a nodal scalar across sub-control surfaces.
///
/// The mass flow through each surface is computed from the interpolated density and velocity,
/// and the advected value is the central interpolation of `φ`. Every surface adds equal and
/// opposite fluxes to its two adjacent nodes, so the residual sums to zero over the element.
#[derive(Debug, Clone)]
pub struct ScalarAdvDiffElemKernel<T> {
    scalar: GatherKey,
    diffusion_coefficient: GatherKey,
    density: GatherKey,
    velocity: GatherKey,
    area_vector: OperatorRequest,
    grad_op: OperatorRequest,
    adjacent_nodes: Vec<[usize; 2]>,
    shape_functions: Vec<T>,
    spatial_dim: usize,
}

impl<T: Real> ScalarAdvDiffElemKernel<T> {
    pub fn new(
        context: &KernelContext<T>,
        requirements: &mut DataRequirementSet<T>,
        scalar_name: &str,
        diffusion_coefficient_name: &str,
    ) -> Result<Self, ConfigurationError> {
        let shifted = context.options.shifted_grad_op(scalar_name);
        let scs = context.master_element(Family::Scs)?;
        requirements.add_master_element(scs.clone());

        let d = context.spatial_dim();
        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, d, CoordinatesType::Current);

        Ok(Self {
            scalar: requirements.add_gathered_nodal_field(&context.nodal_field(scalar_name)?, 1),
            diffusion_coefficient: requirements
                .add_gathered_nodal_field(&context.nodal_field(diffusion_coefficient_name)?, 1),
            density: requirements.add_gathered_nodal_field(&context.nodal_field("density")?, 1),
            velocity: requirements.add_gathered_nodal_field(&context.nodal_field("velocity")?, d),
            area_vector: requirements.add_geometric_operator(OperatorKind::ScsAreaVector, &coordinates, Variant::Exact),
            grad_op: requirements.add_geometric_operator(
                OperatorKind::ScsGradOp,
                &coordinates,
                Variant::from_shifted(shifted),
            ),
            adjacent_nodes: scs.adjacent_nodes().to_vec(),
            shape_functions: tabulate_shape_functions(scs.as_ref(), Variant::from_shifted(shifted)),
            spatial_dim: d,
        })
    }
}

impl<T: Real> Kernel<T> for ScalarAdvDiffElemKernel<T> {
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
        let density = scratch.gather(&self.density)?;
        let velocity = scratch.gather(&self.velocity)?;
        let area = scratch.operator(&self.area_vector)?;
        let dndx = scratch.operator(&self.grad_op)?;
        let n = phi.shape()[0];
        let d = self.spatial_dim;

        for (ip, &[il, ir]) in self.adjacent_nodes.iter().enumerate() {
            let rho_ip = interpolate(&self.shape_functions, ip, &density);
            let mut mdot = T::zero();
            for j in 0..d {
                let u_j = (0..n).fold(T::zero(), |acc, ic| {
                    acc + self.shape_functions[ip * n + ic] * velocity.at2(ic, j)
                });
                mdot += rho_ip * u_j * area.at2(ip, j);
            }

            let phi_ip = interpolate(&self.shape_functions, ip, &phi);
            rhs[il] -= mdot * phi_ip;
            rhs[ir] += mdot * phi_ip;

            let gamma_ip = interpolate(&self.shape_functions, ip, &gamma);
            let mut q_diff = T::zero();
            for ic in 0..n {
                let advection = mdot * self.shape_functions[ip * n + ic];
                let diffusion = -gamma_ip * (0..d).fold(T::zero(), |acc, j| acc + dndx.at3(ip, ic, j) * area.at2(ip, j));
                q_diff += diffusion * phi.at(ic);

                lhs[(il, ic)] += advection + diffusion;
                lhs[(ir, ic)] -= advection + diffusion;
            }
            rhs[il] -= q_diff;
            rhs[ir] += q_diff;
        }
        Ok(())
    }
}
