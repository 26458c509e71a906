//! Element-kernel data staging and assembly for unstructured control-volume finite element and
//! finite element solvers.
//!
//! Kernels declare what they need (gathered fields, master elements and geometric operators)
//! into a [`requests::DataRequirementSet`]. The requirements of all kernels of an algorithm are
//! merged and finalized once, a [`layout::ScratchLayout`] is planned from them, and
//! [`stager::ElementStager`] fills one scratch buffer per entity before every kernel runs on it.
//!
//! The [`wall`] module adds the friction velocity solve of wall-function boundaries, and
//! [`nodal`] assembles dual nodal volumes, Green-Gauss nodal gradients and the WALE viscosity.
pub mod algorithm;
pub mod catalog;
pub mod equation_system;
pub mod error;
pub mod field;
pub mod kernel;
pub mod layout;
pub mod linear_system;
pub mod master_element;
pub mod mesh;
pub mod nodal;
pub mod options;
pub mod requests;
pub mod scratch;
pub mod stager;
pub mod time_integrator;
pub mod topology;
pub mod wall;

pub mod optimize {
    pub use fenris_kernels_optimize::*;
}

pub use fenris_kernels_optimize::Real;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
