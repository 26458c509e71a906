use super::{tangential, unit_normal, WALL_FRICTION_VELOCITY_BIP, WALL_NORMAL_DISTANCE_BIP, WALL_VELOCITY_BC};
use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::field::EntityRank;
use crate::kernel::{interpolate, tabulate_shape_functions, Kernel, KernelContext};
use crate::requests::{CoordinatesType, DataRequirementSet, GatherKey};
use crate::scratch::ScratchViews;
use crate::Real;
use nalgebra::{convert, DMatrixViewMut, DVectorViewMut, Vector3};

/// Wall shear stress of the momentum equation on a wall boundary, from the friction velocity
/// computed by [`WallFrictionVelocityAlgorithm`](super::WallFrictionVelocityAlgorithm).
///
/// The shear is `λ (u_t - u_bc,t)` with `λ = μ |a| / y` in the viscous sublayer and
/// `λ = ρ κ uτ |a| / ln(E y+)` in the log layer, where `_t` denotes the component tangential to
/// the wall. With a nonzero ODE factor, `λ` is blended with the shear `ρ uτ²` of the ODE
/// closure. The kernel assembles a vector system with one row per velocity component.
#[derive(Debug, Clone)]
pub struct MomentumWallFunctionKernel<T> {
    velocity: GatherKey,
    wall_velocity: GatherKey,
    density: GatherKey,
    viscosity: GatherKey,
    wall_distance: GatherKey,
    friction_velocity: GatherKey,
    area_vector: OperatorRequest,
    ip_node_map: Vec<usize>,
    shape_functions: Vec<T>,
    kappa: T,
    elog: T,
    yplus_crit: T,
    ode_factor: T,
    spatial_dim: usize,
}

impl<T: Real> MomentumWallFunctionKernel<T> {
    pub fn new(context: &KernelContext<T>, requirements: &mut DataRequirementSet<T>) -> Result<Self, ConfigurationError> {
        let face = context.master_element(Family::FaceCvfem)?;
        requirements.add_master_element(face.clone());
        let q = face.num_integration_points();
        let d = context.spatial_dim();

        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, d, CoordinatesType::Current);
        let face_field = |name: &str| context.fields.get_field(name, EntityRank::Face);
        let options = &context.options.wall_function;

        Ok(Self {
            velocity: requirements.add_gathered_nodal_field(&context.nodal_field("velocity")?, d),
            wall_velocity: requirements.add_gathered_nodal_field(&context.nodal_field(WALL_VELOCITY_BC)?, d),
            density: requirements.add_gathered_nodal_field(&context.nodal_field("density")?, 1),
            viscosity: requirements.add_gathered_nodal_field(&context.nodal_field("viscosity")?, 1),
            wall_distance: requirements.add_face_field(&face_field(WALL_NORMAL_DISTANCE_BIP)?, q),
            friction_velocity: requirements.add_face_field(&face_field(WALL_FRICTION_VELOCITY_BIP)?, q),
            area_vector: requirements.add_geometric_operator(OperatorKind::FaceAreaVector, &coordinates, Variant::Exact),
            ip_node_map: face.ip_node_map().to_vec(),
            shape_functions: tabulate_shape_functions(face.as_ref(), Variant::Exact),
            kappa: convert(options.kappa),
            elog: convert(options.elog),
            yplus_crit: convert(options.yplus_crit),
            ode_factor: convert(options.ode_factor),
            spatial_dim: d,
        })
    }
}

impl<T: Real> Kernel<T> for MomentumWallFunctionKernel<T> {
    fn dofs_per_node(&self) -> usize {
        self.spatial_dim
    }

    fn execute(
        &self,
        mut lhs: DMatrixViewMut<T>,
        mut rhs: DVectorViewMut<T>,
        scratch: &ScratchViews<T>,
    ) -> eyre::Result<()> {
        let velocity = scratch.gather(&self.velocity)?;
        let wall_velocity = scratch.gather(&self.wall_velocity)?;
        let density = scratch.gather(&self.density)?;
        let viscosity = scratch.gather(&self.viscosity)?;
        let wall_distance = scratch.gather(&self.wall_distance)?;
        let friction_velocity = scratch.gather(&self.friction_velocity)?;
        let area = scratch.operator(&self.area_vector)?;
        let n = velocity.shape()[0];
        let d = self.spatial_dim;
        let one = T::one();

        for (ip, &nn) in self.ip_node_map.iter().enumerate() {
            let (area_magnitude, normal) = unit_normal(area.row(ip));
            let rho = interpolate(&self.shape_functions, ip, &density);
            let mu = interpolate(&self.shape_functions, ip, &viscosity);
            let mut u = Vector3::zeros();
            let mut u_bc = Vector3::zeros();
            for j in 0..d {
                for ic in 0..n {
                    let r = self.shape_functions[ip * n + ic];
                    u[j] += r * velocity.at2(ic, j);
                    u_bc[j] += r * wall_velocity.at2(ic, j);
                }
            }

            let y = wall_distance.at2(0, ip);
            let utau = friction_velocity.at2(0, ip);
            let yplus = rho * y * utau / mu;
            let mut lambda = if yplus > self.yplus_crit {
                rho * self.kappa * utau / (self.elog * yplus).ln() * area_magnitude
            } else {
                mu / y * area_magnitude
            };
            lambda = lambda * (one - self.ode_factor) + self.ode_factor * rho * utau * utau * area_magnitude;

            let u_tan = tangential(&u, &normal);
            let u_bc_tan = tangential(&u_bc, &normal);
            let normalization = (one - self.ode_factor) + self.ode_factor * (u_tan - u_bc_tan).norm();
            if normalization <= T::zero() {
                continue;
            }
            let normalize_fac = one / normalization;

            for i in 0..d {
                let row = nn * d + i;
                rhs[row] -= lambda * (u_tan[i] - u_bc_tan[i]) * normalize_fac;
                for ic in 0..n {
                    let r = self.shape_functions[ip * n + ic];
                    for j in 0..d {
                        let delta = if i == j { one } else { T::zero() };
                        lhs[(row, ic * d + j)] += lambda * r * (delta - normal[i] * normal[j]) * normalize_fac;
                    }
                }
            }
        }
        Ok(())
    }
}
