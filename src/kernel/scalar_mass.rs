use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::field::{FieldId, FieldState};
use crate::kernel::{interpolate, tabulate_shape_functions, Kernel, KernelContext};
use crate::requests::{CoordinatesType, DataRequirementSet, GatherKey};
use crate::scratch::ScratchViews;
use crate::time_integrator::TimeIntegrator;
use crate::Real;
use nalgebra::{DMatrixViewMut, DVectorViewMut};

/// Backward-difference time derivative `∂(ρφ)/∂t` integrated over sub-control volumes.
///
/// The contribution of each sub-control volume is assigned to its node. With `lumped` the
/// shape functions are evaluated at the nodes, which makes the mass matrix diagonal.
#[derive(Debug, Clone)]
pub struct ScalarMassElemKernel<T> {
    /// `φ` at states `New`, `Old` and `OldOld`.
    scalar: [GatherKey; 3],
    density: [GatherKey; 3],
    scv_volume: OperatorRequest,
    ip_node_map: Vec<usize>,
    shape_functions: Vec<T>,
    dt: T,
    gammas: [T; 3],
}

/// Keys of the three time levels. For first order integration the oldest level is never used,
/// so fields with two states are accepted.
fn state_gathers<T: Real>(
    context: &KernelContext<T>,
    requirements: &mut DataRequirementSet<T>,
    field: &FieldId,
) -> Result<[GatherKey; 3], ConfigurationError> {
    let old = context.fields.field_of_state(field, FieldState::Old)?;
    let old_old = if context.options.time_order > 1 {
        context.fields.field_of_state(field, FieldState::OldOld)?
    } else {
        old.clone()
    };
    Ok([field, &old, &old_old].map(|state| requirements.add_gathered_nodal_field(state, 1)))
}

impl<T: Real> ScalarMassElemKernel<T> {
    pub fn new(
        context: &KernelContext<T>,
        requirements: &mut DataRequirementSet<T>,
        scalar_name: &str,
        density_name: &str,
        lumped: bool,
    ) -> Result<Self, ConfigurationError> {
        let scv = context.master_element(Family::Scv)?;
        requirements.add_master_element(scv.clone());

        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, context.spatial_dim(), CoordinatesType::Current);
        let scalar = state_gathers(context, requirements, &context.nodal_field(scalar_name)?)?;
        let density = state_gathers(context, requirements, &context.nodal_field(density_name)?)?;

        Ok(Self {
            scalar,
            density,
            scv_volume: requirements.add_geometric_operator(OperatorKind::ScvVolume, &coordinates, Variant::Exact),
            ip_node_map: scv.ip_node_map().to_vec(),
            shape_functions: tabulate_shape_functions(scv.as_ref(), Variant::from_shifted(lumped)),
            dt: T::one(),
            gammas: [T::one(), -T::one(), T::zero()],
        })
    }
}

impl<T: Real> Kernel<T> for ScalarMassElemKernel<T> {
    fn dofs_per_node(&self) -> usize {
        1
    }

    fn setup(&mut self, time_integrator: &TimeIntegrator<T>) {
        self.dt = time_integrator.time_step();
        self.gammas = [
            time_integrator.gamma1(),
            time_integrator.gamma2(),
            time_integrator.gamma3(),
        ];
    }

    fn execute(
        &self,
        mut lhs: DMatrixViewMut<T>,
        mut rhs: DVectorViewMut<T>,
        scratch: &ScratchViews<T>,
    ) -> eyre::Result<()> {
        let gather = |key: &GatherKey| scratch.gather(key);
        let phi = [gather(&self.scalar[0])?, gather(&self.scalar[1])?, gather(&self.scalar[2])?];
        let rho = [gather(&self.density[0])?, gather(&self.density[1])?, gather(&self.density[2])?];
        let scv_volume = scratch.operator(&self.scv_volume)?;
        let n = phi[0].shape()[0];
        let [gamma1, gamma2, gamma3] = self.gammas;

        for (ip, &nn) in self.ip_node_map.iter().enumerate() {
            let q = phi.map(|view| interpolate(&self.shape_functions, ip, &view));
            let r = rho.map(|view| interpolate(&self.shape_functions, ip, &view));
            let scv = scv_volume.at(ip);

            rhs[nn] -= (gamma1 * r[0] * q[0] + gamma2 * r[1] * q[1] + gamma3 * r[2] * q[2]) / self.dt * scv;
            let lhs_fac = gamma1 * r[0] / self.dt * scv;
            for ic in 0..n {
                lhs[(nn, ic)] += self.shape_functions[ip * n + ic] * lhs_fac;
            }
        }
        Ok(())
    }
}
