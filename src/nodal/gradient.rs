use super::{check_components, NodalAlgorithm, NodalScatter, DUAL_NODAL_VOLUME};
use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::field::FieldRegistry;
use crate::kernel::{tabulate_shape_functions, KernelContext};
use crate::mesh::Mesh;
use crate::requests::{CoordinatesType, DataRequirementSet, GatherKey};
use crate::Real;
use eyre::eyre;

/// Green-Gauss nodal gradient of a nodal scalar or vector field.
///
/// On element parts, the value interpolated at each sub-control surface is weighted by the
/// area vector and added to the node on the left of the surface and subtracted from the node
/// on the right. On face parts, the boundary sub-faces close the control volumes. Every
/// contribution is divided by the dual nodal volume of the receiving node.
///
/// The gradient of a field with `m` components is stored row-major: component `i * d + j`
/// holds `∂q_i / ∂x_j`.
#[derive(Debug)]
pub struct NodalGradientAlgorithm<T: Real> {
    scatter: NodalScatter<T>,
    field: GatherKey,
    dual_nodal_volume: GatherKey,
    area_vector: OperatorRequest,
    shape_functions: Vec<T>,
    /// Receiving node of `+q a` and, for interior surfaces, of `-q a`, per integration point.
    receivers: Vec<(usize, Option<usize>)>,
    num_components: usize,
    spatial_dim: usize,
}

impl<T: Real> NodalGradientAlgorithm<T> {
    /// Creates the gradient algorithm on `part_name`, an element part or a boundary face
    /// part depending on the context topology.
    ///
    /// The shifted shape functions are used when `options.shifted_grad_op` is set for
    /// `field_name`.
    pub fn new(
        context: &KernelContext<T>,
        part_name: &str,
        field_name: &str,
        gradient_name: &str,
    ) -> Result<Self, ConfigurationError> {
        let (family, kind) = if context.topology.is_face() {
            (Family::FaceCvfem, OperatorKind::FaceAreaVector)
        } else {
            (Family::Scs, OperatorKind::ScsAreaVector)
        };
        let element = context.master_element(family)?;
        let d = context.spatial_dim();

        let field = context.nodal_field(field_name)?;
        let num_components = context.fields.meta(&field).scalars_per_entity();
        let gradient = context.nodal_field(gradient_name)?;
        check_components(context.fields, &gradient, num_components * d)?;
        let dual_nodal_volume = context.nodal_field(DUAL_NODAL_VOLUME)?;

        let mut requirements = DataRequirementSet::new();
        requirements.add_master_element(element.clone());
        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, d, CoordinatesType::Current);
        let field = requirements.add_gathered_nodal_field(&field, num_components);
        let dual_nodal_volume = requirements.add_gathered_nodal_field(&dual_nodal_volume, 1);
        let area_vector = requirements.add_geometric_operator(kind, &coordinates, Variant::Exact);

        let receivers = if family == Family::Scs {
            element
                .adjacent_nodes()
                .iter()
                .map(|&[left, right]| (left, Some(right)))
                .collect()
        } else {
            element.ip_node_map().iter().map(|&node| (node, None)).collect()
        };
        let variant = Variant::from_shifted(context.options.shifted_grad_op(field_name));

        Ok(Self {
            scatter: NodalScatter::new(part_name, requirements, gradient, num_components * d)?,
            field,
            dual_nodal_volume,
            area_vector,
            shape_functions: tabulate_shape_functions(element.as_ref(), variant),
            receivers,
            num_components,
            spatial_dim: d,
        })
    }
}

impl<T: Real> NodalAlgorithm<T> for NodalGradientAlgorithm<T> {
    fn part_name(&self) -> &str {
        &self.scatter.part_name
    }

    fn assemble(&self, mesh: &Mesh<T>, fields: &mut FieldRegistry<T>) -> eyre::Result<()> {
        let m = self.num_components;
        let d = self.spatial_dim;
        let stride = m * d;
        self.scatter.assemble(mesh, fields, |scratch, local| {
            let q = scratch.gather(&self.field)?;
            let volume = scratch.gather(&self.dual_nodal_volume)?;
            let area = scratch.operator(&self.area_vector)?;
            let n = q.shape()[0];

            let inverse_volume = |a: usize| {
                let v = volume.at(a);
                if v > T::zero() {
                    Ok(T::one() / v)
                } else {
                    Err(eyre!(
                        "dual nodal volume of node {} is not positive; it must be assembled before the gradient",
                        scratch.nodes()[a]
                    ))
                }
            };

            for (ip, &(left, right)) in self.receivers.iter().enumerate() {
                let inv_left = inverse_volume(left)?;
                let inv_right = right.map(inverse_volume).transpose()?;
                for i in 0..m {
                    let q_ip = (0..n).fold(T::zero(), |acc, a| acc + self.shape_functions[ip * n + a] * q.at2(a, i));
                    for j in 0..d {
                        let flux = q_ip * area.at2(ip, j);
                        local[left * stride + i * d + j] += flux * inv_left;
                        if let (Some(right), Some(inv_right)) = (right, inv_right) {
                            local[right * stride + i * d + j] -= flux * inv_right;
                        }
                    }
                }
            }
            Ok(())
        })
    }
}
