use nalgebra::RealField;

/// Scalar functions and numerical differentiation
pub mod calculus;
/// Bounded Newton iteration for scalar equations
pub mod newton;

/// Floating-point scalar usable by the optimization routines.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
