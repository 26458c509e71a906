//! The kernel protocol and the concrete kernels shipped with the crate.
//!
//! A kernel registers the data it needs into the [`DataRequirementSet`] of its part when it is
//! constructed, and keeps the returned keys. During assembly it reads the staged buffers
//! through those keys and adds its contribution to the local system of the entity. Kernels
//! must only accumulate: no kernel can assume that another kernel of the same entity has or
//! has not run.
//!
//! [`DataRequirementSet`]: crate::requests::DataRequirementSet
use crate::catalog::{Family, Variant};
use crate::error::ConfigurationError;
use crate::field::{EntityRank, FieldId, FieldRegistry};
use crate::master_element::{MasterElement, MasterElementRepository};
use crate::options::SolutionOptions;
use crate::scratch::{ScratchViews, View};
use crate::time_integrator::TimeIntegrator;
use crate::topology::Topology;
use crate::Real;
use nalgebra::{DMatrixViewMut, DVectorViewMut};
use std::sync::Arc;

mod scalar_adv_diff;
mod scalar_diff_fem;
mod scalar_mass;
mod tke_ksgs_src;

pub use scalar_adv_diff::ScalarAdvDiffElemKernel;
pub use scalar_diff_fem::ScalarDiffFemKernel;
pub use scalar_mass::ScalarMassElemKernel;
pub use tke_ksgs_src::TurbKineticEnergyKsgsSrcElemKernel;

pub trait Kernel<T: Real>: Send + Sync {
    /// Number of unknowns per node in the local system the kernel writes to.
    fn dofs_per_node(&self) -> usize;

    /// Refreshes constants that depend on the time step. Called once per step, before any
    /// entity is assembled.
    fn setup(&mut self, _time_integrator: &TimeIntegrator<T>) {}

    /// Adds the contribution of the current entity to `lhs` and `rhs`.
    fn execute(&self, lhs: DMatrixViewMut<T>, rhs: DVectorViewMut<T>, scratch: &ScratchViews<T>) -> eyre::Result<()>;
}

/// What a kernel constructor may consult while registering its requirements.
#[derive(Debug, Copy, Clone)]
pub struct KernelContext<'a, T: Real> {
    pub fields: &'a FieldRegistry<T>,
    pub options: &'a SolutionOptions,
    pub master_elements: &'a MasterElementRepository<T>,
    /// Topology of the entities of the part the kernel is registered on.
    pub topology: Topology,
}

impl<'a, T: Real> KernelContext<'a, T> {
    pub fn new(
        fields: &'a FieldRegistry<T>,
        options: &'a SolutionOptions,
        master_elements: &'a MasterElementRepository<T>,
        topology: Topology,
    ) -> Self {
        Self {
            fields,
            options,
            master_elements,
            topology,
        }
    }

    pub fn master_element(&self, family: Family) -> Result<Arc<dyn MasterElement<T>>, ConfigurationError> {
        self.master_elements.get(self.topology, family)
    }

    pub fn nodal_field(&self, name: &str) -> Result<FieldId, ConfigurationError> {
        self.fields.get_field(name, EntityRank::Node)
    }

    pub fn coordinates(&self) -> Result<FieldId, ConfigurationError> {
        self.nodal_field(&self.options.coordinates_name)
    }

    pub fn spatial_dim(&self) -> usize {
        self.topology.spatial_dim()
    }
}

/// Shape function values `N[ip * n + a]` of `element` in the given variant.
pub(crate) fn tabulate_shape_functions<T: Real>(
    element: &dyn MasterElement<T>,
    variant: Variant,
) -> Vec<T> {
    let mut values = vec![T::zero(); element.num_integration_points() * element.nodes_per_entity()];
    element.shape_fcn(variant, &mut values);
    values
}

/// Interpolates a nodal scalar at one integration point.
pub(crate) fn interpolate<T: Real>(shape_functions: &[T], ip: usize, nodal: &View<T>) -> T {
    let n = nodal.shape()[0];
    (0..n).fold(T::zero(), |acc, a| acc + shape_functions[ip * n + a] * nodal.at(a))
}
