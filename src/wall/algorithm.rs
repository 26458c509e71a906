use super::{tangential, unit_normal, WALL_FRICTION_VELOCITY_BIP, WALL_NORMAL_DISTANCE_BIP, WALL_VELOCITY_BC};
use crate::catalog::{Family, OperatorKind, OperatorRequest, Variant};
use crate::error::{ConfigurationError, StagingError};
use crate::field::{EntityRank, FieldId, FieldRegistry};
use crate::kernel::{interpolate, tabulate_shape_functions, KernelContext};
use crate::layout::ScratchLayout;
use crate::mesh::Mesh;
use crate::requests::{CoordinatesType, DataRequirementSet, FinalizedRequirements, GatherKey};
use crate::scratch::{ElementScratch, ScratchViews};
use crate::stager::ElementStager;
use crate::wall::friction::{ConvergenceReport, WallFrictionSolver, WallPointState};
use crate::Real;
use eyre::WrapErr;
use log::info;
use nalgebra::Vector3;

/// Computes the friction velocity at every integration point of a wall part.
///
/// The boundary faces are staged like any other entities. The tangential velocity relative to
/// the wall is evaluated at each face integration point, all points are solved together, and
/// the result is written to the face field `wall_friction_velocity_bip`.
#[derive(Debug)]
pub struct WallFrictionVelocityAlgorithm<T: Real> {
    part_name: String,
    requirements: FinalizedRequirements<T>,
    layout: ScratchLayout,
    velocity: GatherKey,
    wall_velocity: GatherKey,
    density: GatherKey,
    viscosity: GatherKey,
    wall_distance: GatherKey,
    area_vector: OperatorRequest,
    friction_velocity: FieldId,
    shape_functions: Vec<T>,
    num_ips: usize,
    solver: WallFrictionSolver<T>,
}

impl<T: Real> WallFrictionVelocityAlgorithm<T> {
    /// Creates the algorithm for the face part `part_name`. The context topology must be the
    /// face topology of the part.
    pub fn new(context: &KernelContext<T>, part_name: &str) -> Result<Self, ConfigurationError> {
        let face = context.master_element(Family::FaceCvfem)?;
        let num_ips = face.num_integration_points();
        let d = context.spatial_dim();

        let mut requirements = DataRequirementSet::new();
        requirements.add_master_element(face.clone());
        let coordinates = context.coordinates()?;
        requirements.add_coordinates_field(&coordinates, d, CoordinatesType::Current);
        let velocity = requirements.add_gathered_nodal_field(&context.nodal_field("velocity")?, d);
        let wall_velocity = requirements.add_gathered_nodal_field(&context.nodal_field(WALL_VELOCITY_BC)?, d);
        let density = requirements.add_gathered_nodal_field(&context.nodal_field("density")?, 1);
        let viscosity = requirements.add_gathered_nodal_field(&context.nodal_field("viscosity")?, 1);
        let wall_distance = requirements.add_face_field(
            &context.fields.get_field(WALL_NORMAL_DISTANCE_BIP, EntityRank::Face)?,
            num_ips,
        );
        let area_vector = requirements.add_geometric_operator(OperatorKind::FaceAreaVector, &coordinates, Variant::Exact);

        let friction_velocity = context.fields.get_field(WALL_FRICTION_VELOCITY_BIP, EntityRank::Face)?;
        let available = context.fields.meta(&friction_velocity).scalars_per_entity();
        if available < num_ips {
            return Err(ConfigurationError::InvalidOption {
                name: WALL_FRICTION_VELOCITY_BIP.to_string(),
                reason: format!("{} values per face are needed, but the field stores {}", num_ips, available),
            });
        }

        let requirements = requirements.finalize()?;
        let layout = ScratchLayout::plan(&requirements);
        Ok(Self {
            part_name: part_name.to_string(),
            requirements,
            layout,
            velocity,
            wall_velocity,
            density,
            viscosity,
            wall_distance,
            area_vector,
            friction_velocity,
            shape_functions: tabulate_shape_functions(face.as_ref(), Variant::Exact),
            num_ips,
            solver: WallFrictionSolver::from_options(&context.options.wall_function)?,
        })
    }

    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    pub fn solver(&self) -> &WallFrictionSolver<T> {
        &self.solver
    }

    fn wall_points(&self, scratch: &ScratchViews<T>, points: &mut Vec<WallPointState<T>>) -> Result<(), StagingError> {
        let velocity = scratch.gather(&self.velocity)?;
        let wall_velocity = scratch.gather(&self.wall_velocity)?;
        let density = scratch.gather(&self.density)?;
        let viscosity = scratch.gather(&self.viscosity)?;
        let wall_distance = scratch.gather(&self.wall_distance)?;
        let area = scratch.operator(&self.area_vector)?;
        let [n, d, _] = velocity.shape();

        for ip in 0..self.num_ips {
            let (_, normal) = unit_normal(area.row(ip));
            let mut relative = Vector3::zeros();
            for j in 0..d {
                relative[j] = (0..n).fold(T::zero(), |acc, ic| {
                    acc + self.shape_functions[ip * n + ic] * (velocity.at2(ic, j) - wall_velocity.at2(ic, j))
                });
            }
            points.push(WallPointState::new(
                tangential(&relative, &normal).norm(),
                wall_distance.at2(0, ip),
                interpolate(&self.shape_functions, ip, &density),
                interpolate(&self.shape_functions, ip, &viscosity),
            ));
        }
        Ok(())
    }

    /// Solves for the friction velocity on all locally owned faces and synchronizes the result.
    ///
    /// Unconverged points are reported, not fatal, unless strict convergence was requested.
    pub fn execute(&self, mesh: &Mesh<T>, fields: &mut FieldRegistry<T>) -> eyre::Result<ConvergenceReport> {
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
        let mut points = Vec::with_capacity(part.num_entities() * self.num_ips);
        let mut faces = Vec::with_capacity(part.num_entities());
        for face in part.owned_entities() {
            stager
                .stage(face, fields, &mut scratch)
                .wrap_err_with(|| format!("Failed to stage face {} of part '{}'", face.id, self.part_name))?;
            self.wall_points(&scratch.views(&self.layout), &mut points)?;
            faces.push(face.id);
        }

        let report = self.solver.solve_points(&mut points)?;
        for (&face, face_points) in faces.iter().zip(points.chunks_exact(self.num_ips)) {
            let values = fields.field_data_mut(&self.friction_velocity, face);
            for (value, point) in values.iter_mut().zip(face_points) {
                *value = point.utau;
            }
        }
        fields.synchronize(&self.friction_velocity);

        info!(
            "Wall friction velocity on part '{}': {} points, {} unconverged, max residual {:e}, max {} iterations",
            self.part_name, report.total, report.unconverged, report.max_residual, report.max_iterations
        );
        Ok(report)
    }
}
