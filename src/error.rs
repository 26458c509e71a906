//! Error types.
//!
//! Errors are split by when they can occur. A [`ConfigurationError`] is raised while kernels and
//! algorithms are registered and built, before any element is visited. A [`StagingError`] means
//! that the data registered at build time does not agree with the mesh seen at run time. Both
//! are fatal. A [`ConvergenceError`] is only produced when strict convergence of the wall
//! friction velocity has been requested.
use crate::catalog::{Family, OperatorKind};
use crate::field::{EntityRank, FieldState};
use crate::requests::DataMode;
use crate::topology::Topology;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("requirement set mixes face master elements ({face:?}) with element master elements ({element:?})")]
    ConflictingDataMode { face: Vec<Family>, element: Vec<Family> },
    #[error(
        "nodal gather of field '{field}' requested, but no element or face master element \
         was registered, so the node count is unknown"
    )]
    AmbiguousNodeCount { field: String },
    #[error("requirement set has neither an element nor a face master element")]
    MissingDataMode,
    #[error("field '{field}' is gathered from rank {rank:?}, which is not visited in {data_mode:?} mode")]
    GatherRankMismatch { field: String, rank: EntityRank, data_mode: DataMode },
    #[error("operator {operator:?} requires a {family:?} master element, but none was registered")]
    MissingMasterElement { operator: OperatorKind, family: Family },
    #[error("master elements disagree on topology: {expected:?} and {found:?}")]
    InconsistentTopology { expected: Topology, found: Topology },
    #[error("no {family:?} master element exists for topology {topology:?}")]
    UnsupportedMasterElement { topology: Topology, family: Family },
    #[error("unknown field '{name}' on rank {rank:?}")]
    UnknownField { name: String, rank: EntityRank },
    #[error("field '{name}' is already declared with a different layout")]
    IncompatibleRedeclaration { name: String },
    #[error("field '{name}' has no state {state:?} (it has {num_states} states)")]
    UnknownFieldState { name: String, state: FieldState, num_states: usize },
    #[error("unknown part '{name}'")]
    UnknownPart { name: String },
    #[error("invalid connectivity for part '{part}': {reason}")]
    InvalidConnectivity { part: String, reason: String },
    #[error("{feature} is not supported with {context}")]
    UnsupportedCombination { feature: String, context: String },
    #[error("an algorithm of kind {kind} is already registered on part '{part}'")]
    DuplicateAlgorithm { kind: String, part: String },
    #[error(
        "kernel {kernel} assembles {found} dofs per node, but the algorithm on part '{part}' \
         assembles {expected}"
    )]
    DofMismatch { part: String, kernel: String, expected: usize, found: usize },
    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StagingError {
    #[error("entity {entity} has {found} nodes, but the scratch layout expects {expected}")]
    NodeCountMismatch { entity: usize, expected: usize, found: usize },
    #[error("field '{field}' lives on rank {found:?}, but was gathered as rank {expected:?}")]
    RankMismatch { field: String, expected: EntityRank, found: EntityRank },
    #[error(
        "field '{field}' has {available} components per entity, \
         but {requested} were requested"
    )]
    ComponentMismatch { field: String, requested: usize, available: usize },
    #[error("degenerate Jacobian (determinant {determinant}) at integration point {ip}")]
    DegenerateJacobian { ip: usize, determinant: f64 },
    #[error("no scratch buffer was planned for {buffer}")]
    MissingBuffer { buffer: String },
    #[error("operator {operator} cannot be evaluated by a {family:?} master element")]
    UnsupportedOperator { operator: String, family: Family },
    #[error("part '{part}' has topology {found:?}, but the algorithm was built for {expected:?}")]
    TopologyMismatch { part: String, expected: Topology, found: Topology },
    #[error("local system of size {found} does not match {expected} rows")]
    LocalSystemMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "wall friction velocity failed to converge at {unconverged} of {total} points \
     (max residual {max_residual})"
)]
pub struct ConvergenceError {
    pub unconverged: usize,
    pub total: usize,
    pub max_residual: f64,
}
