//! Wall functions: friction velocity at wall integration points, and the momentum wall shear
//! kernel that consumes it.
use crate::Real;
use nalgebra::Vector3;

mod algorithm;
mod friction;
mod momentum;

pub use algorithm::WallFrictionVelocityAlgorithm;
pub use friction::{ConvergenceReport, UtauSolution, WallFrictionSolver, WallPointState, WallRegime};
pub use momentum::MomentumWallFunctionKernel;

pub const WALL_VELOCITY_BC: &str = "wall_velocity_bc";
pub const WALL_NORMAL_DISTANCE_BIP: &str = "wall_normal_distance_bip";
pub const WALL_FRICTION_VELOCITY_BIP: &str = "wall_friction_velocity_bip";

/// Magnitude and unit normal of an area vector with `d` components.
fn unit_normal<T: Real>(area: &[T]) -> (T, Vector3<T>) {
    let mut a = Vector3::zeros();
    a.as_mut_slice()[..area.len()].copy_from_slice(area);
    let magnitude = a.norm();
    if magnitude > T::zero() {
        (magnitude, a / magnitude)
    } else {
        (magnitude, a)
    }
}

/// Component of `v` tangential to the plane with unit normal `n`, `(I - n nᵀ) v`.
fn tangential<T: Real>(v: &Vector3<T>, n: &Vector3<T>) -> Vector3<T> {
    v - n * n.dot(v)
}
