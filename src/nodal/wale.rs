use super::{check_components, DUAL_NODAL_VOLUME, DUDX, TURBULENT_VISCOSITY};
use crate::error::ConfigurationError;
use crate::field::{EntityRank, FieldId, FieldRegistry};
use crate::options::SolutionOptions;
use crate::Real;
use log::debug;
use nalgebra::convert;
use numeric_literals::replace_float_literals;

/// Wall-adapting local eddy viscosity, evaluated node by node from the nodal velocity gradient.
///
/// The filter width is the `d`-th root of the dual nodal volume, so both `dudx` and
/// `dual_nodal_volume` must be current.
#[derive(Debug, Clone)]
pub struct TurbViscWaleAlgorithm<T> {
    dudx: FieldId,
    density: FieldId,
    dual_nodal_volume: FieldId,
    turbulent_viscosity: FieldId,
    cw: T,
    spatial_dim: usize,
}

impl<T: Real> TurbViscWaleAlgorithm<T> {
    pub fn new(
        fields: &FieldRegistry<T>,
        options: &SolutionOptions,
        spatial_dim: usize,
    ) -> Result<Self, ConfigurationError> {
        let nodal = |name: &str, components: usize| -> Result<FieldId, ConfigurationError> {
            let field = fields.get_field(name, EntityRank::Node)?;
            check_components(fields, &field, components)?;
            Ok(field)
        };
        Ok(Self {
            dudx: nodal(DUDX, spatial_dim * spatial_dim)?,
            density: nodal("density", 1)?,
            dual_nodal_volume: nodal(DUAL_NODAL_VOLUME, 1)?,
            turbulent_viscosity: nodal(TURBULENT_VISCOSITY, 1)?,
            cw: convert(options.wale_cw),
            spatial_dim,
        })
    }

    /// Turbulent viscosity of one node from its row-major velocity gradient.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn nodal_viscosity(&self, dudx: &[T], density: T, dual_nodal_volume: T) -> T {
        let d = self.spatial_dim;
        let g = |i: usize, j: usize| dudx[i * d + j];

        let mut gkk_sq = 0.0;
        for m in 0..d {
            for n in 0..d {
                gkk_sq += g(m, n) * g(n, m);
            }
        }

        let mut sij_sq = 0.0;
        let mut sijd_sq = 0.0;
        for i in 0..d {
            for j in 0..d {
                let sij = 0.5 * (g(i, j) + g(j, i));
                let (gij_sq, gji_sq) = (0..d).fold((0.0, 0.0), |(ij, ji), l| {
                    (ij + g(i, l) * g(l, j), ji + g(j, l) * g(l, i))
                });
                let delta = if i == j { 1.0 } else { 0.0 };
                let sijd = 0.5 * (gij_sq + gji_sq) - delta / 3.0 * gkk_sq;
                sij_sq += sij * sij;
                sijd_sq += sijd * sijd;
            }
        }

        let small = 1.0e-8;
        let filter = dual_nodal_volume.powf(T::one() / convert(d as f64));
        let ls = self.cw * filter;
        let numerator = sijd_sq.powf(1.5) + small * small;
        let denominator = sij_sq.powf(2.5) + sijd_sq.powf(1.25) + small;
        density * ls * ls * numerator / denominator
    }

    /// Overwrites `turbulent_viscosity` at every node.
    pub fn execute(&self, fields: &mut FieldRegistry<T>) {
        let dudx = fields.values(&self.dudx).to_vec();
        let density = fields.values(&self.density).to_vec();
        let volume = fields.values(&self.dual_nodal_volume).to_vec();
        let stride = self.spatial_dim * self.spatial_dim;
        fields.fill_with(&self.turbulent_viscosity, |node, value| {
            value[0] = self.nodal_viscosity(&dudx[node * stride..(node + 1) * stride], density[node], volume[node]);
        });
        debug!("Updated WALE turbulent viscosity at {} nodes", density.len());
    }
}
