use super::{check_components, NodalAlgorithm, NodalScatter, DUAL_NODAL_VOLUME};
use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::field::FieldRegistry;
use crate::kernel::KernelContext;
use crate::mesh::Mesh;
use crate::requests::{CoordinatesType, DataRequirementSet};
use crate::Real;

/// Sums the sub-control volumes of an element part into `dual_nodal_volume`.
#[derive(Debug)]
pub struct DualNodalVolumeAlgorithm<T: Real> {
    scatter: NodalScatter<T>,
    scv_volume: OperatorRequest,
    ip_node_map: Vec<usize>,
}

impl<T: Real> DualNodalVolumeAlgorithm<T> {
    pub fn new(context: &KernelContext<T>, part_name: &str) -> Result<Self, ConfigurationError> {
        let scv = context.master_element(Family::Scv)?;
        let mut requirements = DataRequirementSet::new();
        requirements.add_master_element(scv.clone());
        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, context.spatial_dim(), CoordinatesType::Current);
        let scv_volume = requirements.add_geometric_operator(OperatorKind::ScvVolume, &coordinates, Variant::Exact);

        let target = context.nodal_field(DUAL_NODAL_VOLUME)?;
        check_components(context.fields, &target, 1)?;
        Ok(Self {
            scatter: NodalScatter::new(part_name, requirements, target, 1)?,
            scv_volume,
            ip_node_map: scv.ip_node_map().to_vec(),
        })
    }
}

impl<T: Real> NodalAlgorithm<T> for DualNodalVolumeAlgorithm<T> {
    fn part_name(&self) -> &str {
        &self.scatter.part_name
    }

    fn assemble(&self, mesh: &Mesh<T>, fields: &mut FieldRegistry<T>) -> eyre::Result<()> {
        self.scatter.assemble(mesh, fields, |scratch, local| {
            let volumes = scratch.operator(&self.scv_volume)?;
            for (ip, &node) in self.ip_node_map.iter().enumerate() {
                local[node] += volumes.at(ip);
            }
            Ok(())
        })
    }
}
