//! Aggregation of the data all kernels of one part need per entity.
//!
//! Kernels register field gathers and geometric operators into a shared [`DataRequirementSet`]
//! while they are constructed. Registration is idempotent, so a quantity requested by several
//! kernels is stored (and later computed) once. [`DataRequirementSet::finalize`] validates the
//! combination and resolves the implicit dependencies of the operators.
use crate::catalog::{implicit_requests, Family, ImplicitRequest, OperatorKind, OperatorRequest, Variant};
use crate::error::ConfigurationError;
use crate::field::{EntityRank, FieldId};
use crate::layout::BufferKey;
use crate::master_element::MasterElement;
use crate::topology::Topology;
use crate::Real;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Number of scalars appended to every scratch buffer.
pub const SCRATCH_PADDING: usize = 8;

/// A gather of `dim1 * dim2` scalars per node (or per entity) of one field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GatherKey {
    pub field: FieldId,
    pub rank: EntityRank,
    pub dim1: usize,
    pub dim2: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoordinatesType {
    Current,
    Model,
}

/// Whether the entities of a requirement set are elements or boundary faces.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataMode {
    Element,
    Face,
}

impl DataMode {
    /// Rank of the entities visited in this mode.
    pub fn entity_rank(&self) -> EntityRank {
        match self {
            DataMode::Element => EntityRank::Element,
            DataMode::Face => EntityRank::Face,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataRequirementSet<T: Real> {
    master_elements: BTreeMap<Family, Arc<dyn MasterElement<T>>>,
    rejected_master_elements: Vec<Topology>,
    gathers: BTreeSet<GatherKey>,
    coordinates: BTreeMap<CoordinatesType, FieldId>,
    operators: BTreeSet<OperatorRequest>,
}

impl<T: Real> Default for DataRequirementSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> DataRequirementSet<T> {
    pub fn new() -> Self {
        Self {
            master_elements: BTreeMap::new(),
            rejected_master_elements: Vec::new(),
            gathers: BTreeSet::new(),
            coordinates: BTreeMap::new(),
            operators: BTreeSet::new(),
        }
    }

    /// Registers the master element of one integration family.
    ///
    /// A second master element for the same family is ignored if it has the same topology;
    /// otherwise it is remembered and reported by [`finalize`](Self::finalize).
    pub fn add_master_element(&mut self, element: Arc<dyn MasterElement<T>>) {
        match self.master_elements.get(&element.family()) {
            Some(existing) if existing.topology() != element.topology() => {
                self.rejected_master_elements.push(element.topology());
            }
            Some(_) => {}
            None => {
                self.master_elements.insert(element.family(), element);
            }
        }
    }

    pub fn master_element(&self, family: Family) -> Option<&Arc<dyn MasterElement<T>>> {
        self.master_elements.get(&family)
    }

    /// Requests `dim1 * dim2` scalars of `field` per entity of `rank`.
    ///
    /// Node rank gathers one value per node of the entity, in local connectivity order. Element
    /// and face rank gather from the entity itself.
    pub fn add_gather(&mut self, field: &FieldId, rank: EntityRank, dim1: usize, dim2: usize) -> GatherKey {
        let key = GatherKey {
            field: field.clone(),
            rank,
            dim1,
            dim2,
        };
        self.gathers.insert(key.clone());
        key
    }

    pub fn add_gathered_nodal_field(&mut self, field: &FieldId, dim1: usize) -> GatherKey {
        self.add_gather(field, EntityRank::Node, dim1, 1)
    }

    pub fn add_gathered_nodal_tensor(&mut self, field: &FieldId, dim1: usize, dim2: usize) -> GatherKey {
        self.add_gather(field, EntityRank::Node, dim1, dim2)
    }

    pub fn add_face_field(&mut self, field: &FieldId, dim1: usize) -> GatherKey {
        self.add_gather(field, EntityRank::Face, dim1, 1)
    }

    pub fn add_element_field(&mut self, field: &FieldId, dim1: usize) -> GatherKey {
        self.add_gather(field, EntityRank::Element, dim1, 1)
    }

    /// Registers the coordinate field for a coordinates type and gathers it.
    pub fn add_coordinates_field(&mut self, field: &FieldId, dim: usize, coordinates_type: CoordinatesType) -> GatherKey {
        self.coordinates.insert(coordinates_type, field.clone());
        self.add_gathered_nodal_field(field, dim)
    }

    pub fn coordinates(&self, coordinates_type: CoordinatesType) -> Option<&FieldId> {
        self.coordinates.get(&coordinates_type)
    }

    pub fn add_geometric_operator(&mut self, kind: OperatorKind, coordinates: &FieldId, variant: Variant) -> OperatorRequest {
        self.add_operator_request(OperatorRequest::new(kind, coordinates.clone(), variant))
    }

    pub fn add_operator_request(&mut self, request: OperatorRequest) -> OperatorRequest {
        self.operators.insert(request.clone());
        request
    }

    pub fn gathers(&self) -> impl Iterator<Item = &GatherKey> {
        self.gathers.iter()
    }

    pub fn operators(&self) -> impl Iterator<Item = &OperatorRequest> {
        self.operators.iter()
    }

    fn data_mode(&self) -> Result<DataMode, ConfigurationError> {
        let (face, element): (Vec<Family>, Vec<Family>) =
            self.master_elements.keys().copied().partition(|family| family.is_face());
        match (face.is_empty(), element.is_empty()) {
            (false, false) => Err(ConfigurationError::ConflictingDataMode { face, element }),
            (true, false) => Ok(DataMode::Element),
            (false, true) => Ok(DataMode::Face),
            (true, true) => match self.gathers.iter().find(|key| key.rank == EntityRank::Node) {
                Some(key) => Err(ConfigurationError::AmbiguousNodeCount {
                    field: key.field.to_string(),
                }),
                None => Err(ConfigurationError::MissingDataMode),
            },
        }
    }

    /// Validates the requests and computes the scratch sizing.
    pub fn finalize(self) -> Result<FinalizedRequirements<T>, ConfigurationError> {
        let data_mode = self.data_mode()?;
        let entity_rank = data_mode.entity_rank();
        if let Some(key) = self
            .gathers
            .iter()
            .find(|key| key.rank != EntityRank::Node && key.rank != entity_rank)
        {
            return Err(ConfigurationError::GatherRankMismatch {
                field: key.field.to_string(),
                rank: key.rank,
                data_mode,
            });
        }

        let mut elements = self.master_elements.values();
        let topology = elements
            .next()
            .map(|element| element.topology())
            .ok_or(ConfigurationError::MissingDataMode)?;
        for element in elements {
            if element.nodes_per_entity() != topology.num_nodes() || element.spatial_dim() != topology.spatial_dim() {
                return Err(ConfigurationError::InconsistentTopology {
                    expected: topology,
                    found: element.topology(),
                });
            }
        }
        if let Some(&found) = self.rejected_master_elements.first() {
            return Err(ConfigurationError::InconsistentTopology {
                expected: topology,
                found,
            });
        }

        for request in &self.operators {
            if !self.master_elements.contains_key(&request.family) {
                return Err(ConfigurationError::MissingMasterElement {
                    operator: request.kind,
                    family: request.family,
                });
            }
        }

        let spatial_dim = topology.spatial_dim();
        let mut gathers = self.gathers;
        for request in &self.operators {
            gathers.insert(GatherKey {
                field: request.coordinates.clone(),
                rank: EntityRank::Node,
                dim1: spatial_dim,
                dim2: 1,
            });
        }
        let implicit: BTreeSet<ImplicitRequest> = self.operators.iter().flat_map(implicit_requests).collect();

        let sizing = ScratchSizing {
            topology,
            nodes_per_entity: topology.num_nodes(),
            spatial_dim,
            reference_dim: topology.reference_dim(),
            num_ips: self
                .master_elements
                .iter()
                .map(|(&family, element)| (family, element.num_integration_points()))
                .collect(),
        };

        let mut finalized = FinalizedRequirements {
            data_mode,
            master_elements: self.master_elements,
            gathers: gathers.into_iter().collect(),
            coordinates: self.coordinates,
            operators: self.operators.into_iter().collect(),
            implicit: implicit.into_iter().collect(),
            sizing,
            total_scalars: 0,
        };
        finalized.total_scalars = finalized
            .buffer_keys()
            .map(|key| finalized.sizing.extent(&key))
            .sum::<usize>()
            + SCRATCH_PADDING;

        debug!(
            "Finalized {:?} requirements for {:?}: {} gathers, {} operators, {} implicit buffers, {} scalars",
            finalized.data_mode,
            topology,
            finalized.gathers.len(),
            finalized.operators.len(),
            finalized.implicit.len(),
            finalized.total_scalars
        );
        Ok(finalized)
    }
}

/// Entity shape used to size scratch buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchSizing {
    pub topology: Topology,
    pub nodes_per_entity: usize,
    pub spatial_dim: usize,
    pub reference_dim: usize,
    /// Integration point count per registered family.
    pub num_ips: BTreeMap<Family, usize>,
}

impl ScratchSizing {
    fn ips(&self, family: Family) -> usize {
        self.num_ips.get(&family).copied().unwrap_or(0)
    }

    pub fn shape(&self, key: &BufferKey) -> [usize; 3] {
        let n = self.nodes_per_entity;
        match key {
            BufferKey::Gather(gather) => match gather.rank {
                EntityRank::Node => [n, gather.dim1, gather.dim2],
                EntityRank::Element | EntityRank::Face => [1, gather.dim1, gather.dim2],
            },
            BufferKey::Implicit(implicit) => implicit.shape(self.ips(implicit.family), n, self.reference_dim),
            BufferKey::Operator(request) => request.kind.shape(self.ips(request.family), n, self.spatial_dim),
        }
    }

    pub fn extent(&self, key: &BufferKey) -> usize {
        self.shape(key).iter().product()
    }
}

/// The validated, deduplicated requirements of one part.
#[derive(Debug, Clone)]
pub struct FinalizedRequirements<T: Real> {
    data_mode: DataMode,
    master_elements: BTreeMap<Family, Arc<dyn MasterElement<T>>>,
    gathers: Vec<GatherKey>,
    coordinates: BTreeMap<CoordinatesType, FieldId>,
    operators: Vec<OperatorRequest>,
    implicit: Vec<ImplicitRequest>,
    sizing: ScratchSizing,
    total_scalars: usize,
}

impl<T: Real> FinalizedRequirements<T> {
    pub fn data_mode(&self) -> DataMode {
        self.data_mode
    }

    pub fn topology(&self) -> Topology {
        self.sizing.topology
    }

    pub fn sizing(&self) -> &ScratchSizing {
        &self.sizing
    }

    pub fn master_element(&self, family: Family) -> Option<&Arc<dyn MasterElement<T>>> {
        self.master_elements.get(&family)
    }

    pub fn gathers(&self) -> &[GatherKey] {
        &self.gathers
    }

    pub fn coordinates(&self, coordinates_type: CoordinatesType) -> Option<&FieldId> {
        self.coordinates.get(&coordinates_type)
    }

    pub fn operators(&self) -> &[OperatorRequest] {
        &self.operators
    }

    pub fn implicit_requests(&self) -> &[ImplicitRequest] {
        &self.implicit
    }

    /// Total scalars of a scratch buffer, including [`SCRATCH_PADDING`].
    pub fn total_scalars(&self) -> usize {
        self.total_scalars
    }

    /// Coordinate fields used by geometric operators, in order.
    pub fn operator_coordinates(&self) -> impl Iterator<Item = &FieldId> {
        let unique: BTreeSet<&FieldId> = self.implicit.iter().map(|implicit| &implicit.coordinates).collect();
        unique.into_iter()
    }

    /// Every buffer that needs scratch space, in layout order: gathers, then for each coordinate
    /// field its implicit buffers followed by its operators.
    pub fn buffer_keys(&self) -> impl Iterator<Item = BufferKey> + '_ {
        let gathers = self.gathers.iter().cloned().map(BufferKey::Gather);
        let geometry = self.operator_coordinates().flat_map(move |coordinates| {
            let implicit = self
                .implicit
                .iter()
                .filter(move |implicit| &implicit.coordinates == coordinates)
                .cloned()
                .map(BufferKey::Implicit);
            let operators = self
                .operators
                .iter()
                .filter(move |request| &request.coordinates == coordinates && request.kind.has_buffer())
                .cloned()
                .map(BufferKey::Operator);
            implicit.chain(operators)
        });
        gathers.chain(geometry)
    }
}
