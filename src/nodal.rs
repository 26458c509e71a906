//! Node-centred fields assembled from element and face data.
//!
//! A [`NodalFieldDriver`] owns the algorithms that contribute to one nodal field. It zeroes the
//! field, lets every algorithm add the contributions of the owned entities of its part, and
//! finally synchronizes the field so that shared nodes hold the sum over all ranks.
//!
//! The dual nodal volume must be assembled before any nodal gradient, since gradient
//! contributions are normalized by it.
use crate::error::{ConfigurationError, StagingError};
use crate::field::{FieldId, FieldRegistry};
use crate::layout::ScratchLayout;
use crate::mesh::Mesh;
use crate::requests::{DataRequirementSet, FinalizedRequirements};
use crate::scratch::{ElementScratch, ScratchViews};
use crate::stager::ElementStager;
use crate::Real;
use eyre::WrapErr;
use log::debug;

mod dual_volume;
mod gradient;
mod wale;

pub use dual_volume::DualNodalVolumeAlgorithm;
pub use gradient::NodalGradientAlgorithm;
pub use wale::TurbViscWaleAlgorithm;

pub const DUAL_NODAL_VOLUME: &str = "dual_nodal_volume";
pub const DUDX: &str = "dudx";
pub const TURBULENT_VISCOSITY: &str = "turbulent_viscosity";

/// An algorithm that adds the contributions of one part to a nodal field.
pub trait NodalAlgorithm<T: Real>: Send + Sync {
    fn part_name(&self) -> &str;

    /// Adds the contributions of the owned entities of the part. Never zeroes the target.
    fn assemble(&self, mesh: &Mesh<T>, fields: &mut FieldRegistry<T>) -> eyre::Result<()>;
}

/// Zeroes, assembles and synchronizes one nodal field.
pub struct NodalFieldDriver<T: Real> {
    target: FieldId,
    algorithms: Vec<Box<dyn NodalAlgorithm<T>>>,
}

impl<T: Real> NodalFieldDriver<T> {
    pub fn new(target: FieldId) -> Self {
        Self {
            target,
            algorithms: Vec::new(),
        }
    }

    pub fn target(&self) -> &FieldId {
        &self.target
    }

    pub fn add_algorithm(&mut self, algorithm: impl NodalAlgorithm<T> + 'static) {
        self.algorithms.push(Box::new(algorithm));
    }

    pub fn num_algorithms(&self) -> usize {
        self.algorithms.len()
    }

    pub fn execute(&self, mesh: &Mesh<T>, fields: &mut FieldRegistry<T>) -> eyre::Result<()> {
        fields.fill(&self.target, T::zero());
        for algorithm in &self.algorithms {
            algorithm
                .assemble(mesh, fields)
                .wrap_err_with(|| format!("Failed to assemble '{}' on part '{}'", self.target, algorithm.part_name()))?;
        }
        fields.synchronize(&self.target);
        debug!("Assembled nodal field '{}' from {} algorithms", self.target, self.algorithms.len());
        Ok(())
    }
}

/// Finalized requirements of one part whose entities scatter into a nodal field.
#[derive(Debug)]
struct NodalScatter<T: Real> {
    part_name: String,
    requirements: FinalizedRequirements<T>,
    layout: ScratchLayout,
    target: FieldId,
    components: usize,
}

impl<T: Real> NodalScatter<T> {
    fn new(
        part_name: &str,
        requirements: DataRequirementSet<T>,
        target: FieldId,
        components: usize,
    ) -> Result<Self, ConfigurationError> {
        let requirements = requirements.finalize()?;
        let layout = ScratchLayout::plan(&requirements);
        Ok(Self {
            part_name: part_name.to_string(),
            requirements,
            layout,
            target,
            components,
        })
    }

    /// Stages every owned entity of the part and adds the node-major values computed by
    /// `contributions` to the target field.
    fn assemble(
        &self,
        mesh: &Mesh<T>,
        fields: &mut FieldRegistry<T>,
        mut contributions: impl FnMut(&ScratchViews<T>, &mut [T]) -> eyre::Result<()>,
    ) -> eyre::Result<()> {
        let part = mesh.part(&self.part_name)?;
        if part.topology() != self.requirements.topology() {
            return Err(StagingError::TopologyMismatch {
                part: self.part_name.clone(),
                expected: self.requirements.topology(),
                found: part.topology(),
            }
            .into());
        }

        let stager = ElementStager::new(&self.requirements, &self.layout);
        let mut scratch = ElementScratch::new(&self.layout);
        let mut local = vec![T::zero(); part.topology().num_nodes() * self.components];
        for entity in part.owned_entities() {
            stager
                .stage(entity, fields, &mut scratch)
                .wrap_err_with(|| format!("Failed to stage entity {} of part '{}'", entity.id, self.part_name))?;
            local.fill(T::zero());
            contributions(&scratch.views(&self.layout), &mut local)?;
            for (&node, values) in entity.nodes.iter().zip(local.chunks_exact(self.components)) {
                for (target, &value) in fields.field_data_mut(&self.target, node).iter_mut().zip(values) {
                    *target += value;
                }
            }
        }
        Ok(())
    }
}

/// Checks that a nodal field stores `expected` values per node.
fn check_components<T: Real>(
    fields: &FieldRegistry<T>,
    field: &FieldId,
    expected: usize,
) -> Result<(), ConfigurationError> {
    let available = fields.meta(field).scalars_per_entity();
    if available != expected {
        return Err(ConfigurationError::InvalidOption {
            name: field.name().to_string(),
            reason: format!("{} values per node are needed, but the field stores {}", expected, available),
        });
    }
    Ok(())
}
