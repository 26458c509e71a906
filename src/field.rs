//! In-memory field registry.
//!
//! Fields are named, rank-specific arrays of `dim1 * dim2` scalars per entity, optionally with
//! several time levels ("states"). Handles ([`FieldId`]) are resolved once when kernels are
//! registered and then used for all data access.
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::Real;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityRank {
    Node,
    Element,
    Face,
}

/// Time level of a field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldState {
    /// The level being solved for, `n + 1`.
    New,
    /// `n`
    Old,
    /// `n - 1`
    OldOld,
}

impl FieldState {
    pub fn index(&self) -> usize {
        match self {
            FieldState::New => 0,
            FieldState::Old => 1,
            FieldState::OldOld => 2,
        }
    }
}

/// Handle to one state of a registered field.
///
/// The handle carries the field name so that error messages can identify the field without
/// access to the registry. Ordering is by registration index, then state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId {
    index: usize,
    state: FieldState,
    name: Arc<str>,
}

impl FieldId {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FieldState {
        self.state
    }
}

impl Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            FieldState::New => write!(f, "{}", self.name),
            state => write!(f, "{}[{:?}]", self.name, state),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    pub rank: EntityRank,
    pub dim1: usize,
    pub dim2: usize,
    pub num_states: usize,
}

impl FieldMeta {
    pub fn scalars_per_entity(&self) -> usize {
        self.dim1 * self.dim2
    }
}

#[derive(Debug, Clone)]
struct FieldStorage<T> {
    meta: FieldMeta,
    states: Vec<Vec<T>>,
    synchronizations: usize,
}

#[derive(Debug, Clone)]
pub struct FieldRegistry<T> {
    num_nodes: usize,
    num_elements: usize,
    num_faces: usize,
    fields: Vec<FieldStorage<T>>,
    lookup: FxHashMap<(String, EntityRank), usize>,
}

impl<T: Real> FieldRegistry<T> {
    /// Creates an empty registry sized for the entities of `mesh`.
    pub fn new(mesh: &Mesh<T>) -> Self {
        Self {
            num_nodes: mesh.num_nodes(),
            num_elements: mesh.num_entities(EntityRank::Element),
            num_faces: mesh.num_entities(EntityRank::Face),
            fields: Vec::new(),
            lookup: FxHashMap::default(),
        }
    }

    /// Creates a registry with a nodal coordinates field initialized from the mesh.
    pub fn with_coordinates(mesh: &Mesh<T>, coordinates_name: &str) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new(mesh);
        let dim = mesh.spatial_dim();
        let coordinates = registry.declare_field(coordinates_name, EntityRank::Node, dim, 1, 1)?;
        registry.fields[coordinates.index].states[0].copy_from_slice(mesh.coordinates());
        Ok(registry)
    }

    fn num_entities(&self, rank: EntityRank) -> usize {
        match rank {
            EntityRank::Node => self.num_nodes,
            EntityRank::Element => self.num_elements,
            EntityRank::Face => self.num_faces,
        }
    }

    /// Declares a zero-initialized field.
    ///
    /// Declaring a field that already exists with the same layout returns the existing handle.
    pub fn declare_field(
        &mut self,
        name: &str,
        rank: EntityRank,
        dim1: usize,
        dim2: usize,
        num_states: usize,
    ) -> Result<FieldId, ConfigurationError> {
        if !(1..=3).contains(&num_states) {
            return Err(ConfigurationError::InvalidOption {
                name: format!("{}.num_states", name),
                reason: format!("expected 1, 2 or 3 states, got {}", num_states),
            });
        }
        let meta = FieldMeta {
            name: name.to_string(),
            rank,
            dim1,
            dim2,
            num_states,
        };

        if let Some(&index) = self.lookup.get(&(name.to_string(), rank)) {
            return if self.fields[index].meta == meta {
                Ok(self.handle(index, FieldState::New))
            } else {
                Err(ConfigurationError::IncompatibleRedeclaration { name: name.to_string() })
            };
        }

        let len = self.num_entities(rank) * meta.scalars_per_entity();
        let index = self.fields.len();
        self.fields.push(FieldStorage {
            states: vec![vec![T::zero(); len]; meta.num_states],
            meta,
            synchronizations: 0,
        });
        self.lookup.insert((name.to_string(), rank), index);
        Ok(self.handle(index, FieldState::New))
    }

    fn handle(&self, index: usize, state: FieldState) -> FieldId {
        FieldId {
            index,
            state,
            name: Arc::from(self.fields[index].meta.name.as_str()),
        }
    }

    /// Looks up the `New` state of a field.
    pub fn get_field(&self, name: &str, rank: EntityRank) -> Result<FieldId, ConfigurationError> {
        self.lookup
            .get(&(name.to_string(), rank))
            .map(|&index| self.handle(index, FieldState::New))
            .ok_or_else(|| ConfigurationError::UnknownField {
                name: name.to_string(),
                rank,
            })
    }

    pub fn field_of_state(&self, field: &FieldId, state: FieldState) -> Result<FieldId, ConfigurationError> {
        let meta = self.meta(field);
        if state.index() < meta.num_states {
            Ok(self.handle(field.index, state))
        } else {
            Err(ConfigurationError::UnknownFieldState {
                name: meta.name.clone(),
                state,
                num_states: meta.num_states,
            })
        }
    }

    pub fn meta(&self, field: &FieldId) -> &FieldMeta {
        &self.fields[field.index].meta
    }

    /// The scalars stored for `entity`.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is out of bounds for the field's rank.
    pub fn field_data(&self, field: &FieldId, entity: usize) -> &[T] {
        let storage = &self.fields[field.index];
        let n = storage.meta.scalars_per_entity();
        &storage.states[field.state.index()][n * entity..n * (entity + 1)]
    }

    pub fn field_data_mut(&mut self, field: &FieldId, entity: usize) -> &mut [T] {
        let storage = &mut self.fields[field.index];
        let n = storage.meta.scalars_per_entity();
        &mut storage.states[field.state.index()][n * entity..n * (entity + 1)]
    }

    /// All values of one state, entity-major.
    pub fn values(&self, field: &FieldId) -> &[T] {
        &self.fields[field.index].states[field.state.index()]
    }

    pub fn fill(&mut self, field: &FieldId, value: T) {
        self.fields[field.index].states[field.state.index()].fill(value);
    }

    /// Sets every entity's values with `f(entity, values)`.
    pub fn fill_with(&mut self, field: &FieldId, mut f: impl FnMut(usize, &mut [T])) {
        let storage = &mut self.fields[field.index];
        let n = storage.meta.scalars_per_entity();
        if n == 0 {
            return;
        }
        for (entity, values) in storage.states[field.state.index()].chunks_exact_mut(n).enumerate() {
            f(entity, values);
        }
    }

    /// Shifts all multi-state fields one level back in time, keeping `New` as the initial guess
    /// of the next step.
    pub fn rotate_states(&mut self) {
        for storage in &mut self.fields {
            for state in (1..storage.meta.num_states).rev() {
                let (newer, older) = storage.states.split_at_mut(state);
                older[0].copy_from_slice(&newer[state - 1]);
            }
        }
    }

    /// Makes shared and ghosted copies of the field consistent.
    ///
    /// The registry is process-local, so there is nothing to exchange; the call is only
    /// counted.
    pub fn synchronize(&mut self, field: &FieldId) {
        self.fields[field.index].synchronizations += 1;
    }

    pub fn synchronization_count(&self, field: &FieldId) -> usize {
        self.fields[field.index].synchronizations
    }
}
