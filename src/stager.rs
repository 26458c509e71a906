//! Filling scratch buffers for one entity.
use crate::catalog::{Family, ImplicitKind, ImplicitRequest, OperatorKind, OperatorRequest};
use crate::error::StagingError;
use crate::field::{EntityRank, FieldId, FieldRegistry};
use crate::layout::{BufferKey, ScratchLayout, Slot};
use crate::master_element::MasterElement;
use crate::mesh::EntityRef;
use crate::requests::{FinalizedRequirements, GatherKey};
use crate::scratch::ElementScratch;
use crate::Real;
use std::sync::Arc;

/// Gathers field values and evaluates geometric operators into an [`ElementScratch`].
///
/// Each buffer of the layout is written exactly once per entity. Geometric operators are
/// evaluated from buffers placed before them, so shared intermediate results are never
/// recomputed.
#[derive(Debug, Copy, Clone)]
pub struct ElementStager<'a, T: Real> {
    requirements: &'a FinalizedRequirements<T>,
    layout: &'a ScratchLayout,
}

impl<'a, T: Real> ElementStager<'a, T> {
    pub fn new(requirements: &'a FinalizedRequirements<T>, layout: &'a ScratchLayout) -> Self {
        Self { requirements, layout }
    }

    pub fn stage(
        &self,
        entity: EntityRef<'_>,
        fields: &FieldRegistry<T>,
        scratch: &mut ElementScratch<T>,
    ) -> Result<(), StagingError> {
        let expected = self.requirements.sizing().nodes_per_entity;
        if entity.nodes.len() != expected {
            return Err(StagingError::NodeCountMismatch {
                entity: entity.id,
                expected,
                found: entity.nodes.len(),
            });
        }
        scratch.prepare(self.layout, entity.id, entity.nodes);

        for (key, slot) in self.layout.buffers() {
            let (inputs, rest) = scratch.data_mut().split_at_mut(slot.offset);
            let out = &mut rest[..slot.len];
            match key {
                BufferKey::Gather(gather) => self.gather(gather, &entity, fields, out)?,
                BufferKey::Implicit(implicit) => self.compute_implicit(implicit, inputs, out)?,
                BufferKey::Operator(request) => self.compute_operator(request, inputs, out)?,
            }
        }
        Ok(())
    }

    fn gather(
        &self,
        key: &GatherKey,
        entity: &EntityRef<'_>,
        fields: &FieldRegistry<T>,
        out: &mut [T],
    ) -> Result<(), StagingError> {
        let meta = fields.meta(&key.field);
        if meta.rank != key.rank {
            return Err(StagingError::RankMismatch {
                field: key.field.to_string(),
                expected: key.rank,
                found: meta.rank,
            });
        }
        if meta.dim1 < key.dim1 || meta.dim2 < key.dim2 {
            return Err(StagingError::ComponentMismatch {
                field: key.field.to_string(),
                requested: key.dim1 * key.dim2,
                available: meta.scalars_per_entity(),
            });
        }

        let stride = key.dim1 * key.dim2;
        let copy = |source: &[T], target: &mut [T]| {
            for i in 0..key.dim1 {
                for j in 0..key.dim2 {
                    target[i * key.dim2 + j] = source[i * meta.dim2 + j];
                }
            }
        };
        match key.rank {
            EntityRank::Node => {
                for (&node, target) in entity.nodes.iter().zip(out.chunks_exact_mut(stride)) {
                    copy(fields.field_data(&key.field, node), target);
                }
            }
            EntityRank::Element | EntityRank::Face => copy(fields.field_data(&key.field, entity.id), out),
        }
        Ok(())
    }

    fn master_element(&self, family: Family) -> Result<&Arc<dyn MasterElement<T>>, StagingError> {
        self.requirements
            .master_element(family)
            .ok_or_else(|| StagingError::MissingBuffer {
                buffer: format!("{:?} master element", family),
            })
    }

    fn input<'s>(&self, inputs: &'s [T], key: BufferKey) -> Result<&'s [T], StagingError> {
        match self.layout.slot(&key) {
            Some(slot) if slot.offset + slot.len <= inputs.len() => Ok(&inputs[slot.range()]),
            _ => Err(StagingError::MissingBuffer { buffer: key.to_string() }),
        }
    }

    fn coordinates<'s>(&self, inputs: &'s [T], coordinates: &FieldId) -> Result<&'s [T], StagingError> {
        let key = GatherKey {
            field: coordinates.clone(),
            rank: EntityRank::Node,
            dim1: self.requirements.sizing().spatial_dim,
            dim2: 1,
        };
        self.input(inputs, BufferKey::Gather(key))
    }

    fn compute_implicit(&self, implicit: &ImplicitRequest, inputs: &[T], out: &mut [T]) -> Result<(), StagingError> {
        let element = self.master_element(implicit.family)?;
        match implicit.kind {
            ImplicitKind::Derivatives => element.reference_derivatives(implicit.variant, out),
            ImplicitKind::Determinants => {
                let coords = self.coordinates(inputs, &implicit.coordinates)?;
                let deriv = self.input(
                    inputs,
                    BufferKey::Implicit(ImplicitRequest {
                        kind: ImplicitKind::Derivatives,
                        ..implicit.clone()
                    }),
                )?;
                element.jacobian_determinants(coords, deriv, out);
            }
        }
        Ok(())
    }

    fn compute_operator(&self, request: &OperatorRequest, inputs: &[T], out: &mut [T]) -> Result<(), StagingError> {
        let element = self.master_element(request.family)?;
        let implicit = |kind| {
            BufferKey::Implicit(ImplicitRequest {
                coordinates: request.coordinates.clone(),
                family: request.family,
                variant: request.variant,
                kind,
            })
        };
        let coords = self.coordinates(inputs, &request.coordinates)?;
        let deriv = self.input(inputs, implicit(ImplicitKind::Derivatives))?;

        use OperatorKind::*;
        match request.kind {
            ScsAreaVector | FaceAreaVector => element.area_vectors(coords, deriv, out),
            ScsGradOp | ScvGradOp | FemGradOp => element.gradient_operator(coords, deriv, out),
            ScsMetric | FemMetric => element.metric_tensors(coords, deriv, out),
            FaceNormal => element.unit_normals(coords, deriv, out),
            ScvVolume => {
                let det_j = self.input(inputs, implicit(ImplicitKind::Determinants))?;
                element.volumes(det_j, out)
            }
            FemDetJ | FaceDetJ => Ok(()),
        }
    }

    /// Copies a staged gather back into field storage.
    pub fn scatter_gathered(
        &self,
        key: &GatherKey,
        scratch: &ElementScratch<T>,
        fields: &mut FieldRegistry<T>,
    ) -> Result<(), StagingError> {
        let buffer = BufferKey::Gather(key.clone());
        let &Slot { offset, len, .. } = self
            .layout
            .slot(&buffer)
            .ok_or_else(|| StagingError::MissingBuffer { buffer: buffer.to_string() })?;
        let staged = &scratch.data()[offset..offset + len];
        let field_dim2 = fields.meta(&key.field).dim2;
        let stride = key.dim1 * key.dim2;

        let mut write = |entity: usize, source: &[T]| {
            let target = fields.field_data_mut(&key.field, entity);
            for i in 0..key.dim1 {
                for j in 0..key.dim2 {
                    target[i * field_dim2 + j] = source[i * key.dim2 + j];
                }
            }
        };
        match key.rank {
            EntityRank::Node => {
                for (&node, source) in scratch.nodes().iter().zip(staged.chunks_exact(stride)) {
                    write(node, source);
                }
            }
            EntityRank::Element | EntityRank::Face => write(scratch.entity(), staged),
        }
        Ok(())
    }
}
