use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::kernel::{Kernel, KernelContext};
use crate::nodal::{DUAL_NODAL_VOLUME, DUDX, TURBULENT_VISCOSITY};
use crate::requests::{CoordinatesType, DataRequirementSet, GatherKey};
use crate::scratch::ScratchViews;
use crate::Real;
use nalgebra::{convert, DMatrixViewMut, DVectorViewMut};
use numeric_literals::replace_float_literals;

/// Production and dissipation of the one-equation subgrid-scale kinetic energy model.
///
/// All terms are lumped to the node of each sub-control volume. Production is limited to
/// `tke_prod_limit_ratio` times the dissipation.
#[derive(Debug, Clone)]
pub struct TurbKineticEnergyKsgsSrcElemKernel<T> {
    tke: GatherKey,
    density: GatherKey,
    turbulent_viscosity: GatherKey,
    dual_nodal_volume: GatherKey,
    c_epsilon: GatherKey,
    velocity_gradient: GatherKey,
    viscosity: GatherKey,
    /// Only registered when the low-Reynolds term is active.
    dsqrtk_sq: Option<GatherKey>,
    scv_volume: OperatorRequest,
    ip_node_map: Vec<usize>,
    low_re_factor: T,
    production_limit_ratio: T,
    spatial_dim: usize,
}

impl<T: Real> TurbKineticEnergyKsgsSrcElemKernel<T> {
    pub fn new(context: &KernelContext<T>, requirements: &mut DataRequirementSet<T>) -> Result<Self, ConfigurationError> {
        let scv = context.master_element(Family::Scv)?;
        requirements.add_master_element(scv.clone());

        let d = context.spatial_dim();
        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, d, CoordinatesType::Current);
        let mut scalar = |name: &str| -> Result<GatherKey, ConfigurationError> {
            Ok(requirements.add_gathered_nodal_field(&context.nodal_field(name)?, 1))
        };

        let low_re_factor = context.options.low_re_ksgs_factor;
        Ok(Self {
            tke: scalar("turbulent_ke")?,
            density: scalar("density")?,
            turbulent_viscosity: scalar(TURBULENT_VISCOSITY)?,
            dual_nodal_volume: scalar(DUAL_NODAL_VOLUME)?,
            c_epsilon: scalar("c_epsilon")?,
            viscosity: scalar("viscosity")?,
            dsqrtk_sq: if low_re_factor > 0.0 {
                Some(scalar("dsqrtk_dx_sq")?)
            } else {
                None
            },
            velocity_gradient: requirements.add_gathered_nodal_tensor(&context.nodal_field(DUDX)?, d, d),
            scv_volume: requirements.add_geometric_operator(OperatorKind::ScvVolume, &coordinates, Variant::Exact),
            ip_node_map: scv.ip_node_map().to_vec(),
            low_re_factor: convert(low_re_factor),
            production_limit_ratio: convert(context.options.tke_prod_limit_ratio),
            spatial_dim: d,
        })
    }
}

impl<T: Real> Kernel<T> for TurbKineticEnergyKsgsSrcElemKernel<T> {
    fn dofs_per_node(&self) -> usize {
        1
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn execute(
        &self,
        mut lhs: DMatrixViewMut<T>,
        mut rhs: DVectorViewMut<T>,
        scratch: &ScratchViews<T>,
    ) -> eyre::Result<()> {
        let tke = scratch.gather(&self.tke)?;
        let density = scratch.gather(&self.density)?;
        let tvisc = scratch.gather(&self.turbulent_viscosity)?;
        let volume = scratch.gather(&self.dual_nodal_volume)?;
        let c_eps = scratch.gather(&self.c_epsilon)?;
        let gju = scratch.gather(&self.velocity_gradient)?;
        let visc = scratch.gather(&self.viscosity)?;
        let dsqrtk_sq = self.dsqrtk_sq.as_ref().map(|key| scratch.gather(key)).transpose()?;
        let scv_volume = scratch.operator(&self.scv_volume)?;
        let d = self.spatial_dim;

        for (ip, &nn) in self.ip_node_map.iter().enumerate() {
            let mut pk = T::zero();
            for i in 0..d {
                for j in 0..d {
                    pk += gju.at3(nn, i, j) * (gju.at3(nn, i, j) + gju.at3(nn, j, i));
                }
            }
            pk *= tvisc.at(nn);

            let k = tke.at(nn);
            let tke_fac = if d == 2 {
                c_eps.at(nn) * density.at(nn) * (k / volume.at(nn)).sqrt()
            } else {
                c_eps.at(nn) * density.at(nn) * k.sqrt() / volume.at(nn).cbrt()
            };

            let mut dk = tke_fac * k;
            if let Some(dsqrtk_sq) = &dsqrtk_sq {
                dk += self.low_re_factor * 2.0 * visc.at(nn) * dsqrtk_sq.at(nn);
            }
            pk = pk.min(self.production_limit_ratio * dk);

            let scv = scv_volume.at(ip);
            rhs[nn] += (pk - dk) * scv;
            lhs[(nn, nn)] += 1.5 * tke_fac * scv;
        }
        Ok(())
    }
}
