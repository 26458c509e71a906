//! User-facing solution options.
//!
//! Options are plain serde structs. Every field has a default, so partial configurations
//! deserialize into a complete set of options.
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolutionOptions {
    /// Name of the nodal model coordinates field.
    pub coordinates_name: String,
    /// Per-field choice of the shifted (lumped) gradient operator, keyed by field name.
    pub shifted_grad_op: BTreeMap<String, bool>,
    /// Whether interior terms are discretized edge by edge instead of element by element.
    pub edge_based: bool,
    /// Upper bound of turbulence production relative to dissipation.
    pub tke_prod_limit_ratio: f64,
    /// Factor of the low-Reynolds dissipation term in the SGS kinetic energy equation. Zero
    /// disables the term.
    pub low_re_ksgs_factor: f64,
    /// Model constant `Cw` of the WALE turbulent viscosity.
    pub wale_cw: f64,
    pub time_order: usize,
    /// Number of entities per parallel work item.
    pub parallel_chunk_size: usize,
    pub wall_function: WallFunctionOptions,
}

impl Default for SolutionOptions {
    fn default() -> Self {
        Self {
            coordinates_name: "coordinates".to_string(),
            shifted_grad_op: BTreeMap::new(),
            edge_based: false,
            tke_prod_limit_ratio: 1000.0,
            low_re_ksgs_factor: 0.0,
            wale_cw: 0.325,
            time_order: 2,
            parallel_chunk_size: 256,
            wall_function: WallFunctionOptions::default(),
        }
    }
}

impl SolutionOptions {
    pub fn shifted_grad_op(&self, field_name: &str) -> bool {
        self.shifted_grad_op.get(field_name).copied().unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |name: &str, reason: &str| {
            Err(ConfigurationError::InvalidOption {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.time_order != 1 && self.time_order != 2 {
            return invalid("time_order", "must be 1 or 2");
        }
        if self.parallel_chunk_size == 0 {
            return invalid("parallel_chunk_size", "must be positive");
        }
        if !(self.tke_prod_limit_ratio > 0.0) {
            return invalid("tke_prod_limit_ratio", "must be positive");
        }
        if self.low_re_ksgs_factor < 0.0 {
            return invalid("low_re_ksgs_factor", "must not be negative");
        }
        if !(self.wale_cw > 0.0) {
            return invalid("wale_cw", "must be positive");
        }
        self.wall_function.validate()
    }
}

/// Parameters of the wall friction velocity computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallFunctionOptions {
    /// von Kármán constant.
    pub kappa: f64,
    /// Log-law offset `E`.
    pub elog: f64,
    /// `y+` separating the viscous sublayer from the log layer.
    pub yplus_crit: f64,
    pub max_iterations: usize,
    /// Absolute tolerance of the friction velocity residual.
    pub tolerance: f64,
    /// Blending between the log-law (`0`) and the equilibrium ODE (`1`) closure.
    pub ode_factor: f64,
    /// Fail the assembly if any wall point does not converge.
    pub strict_convergence: bool,
    /// Van Driest damping constant `A+` of the ODE closure.
    pub damping_constant: f64,
    /// Number of Simpson intervals used to integrate the ODE closure.
    pub ode_intervals: usize,
}

impl Default for WallFunctionOptions {
    fn default() -> Self {
        Self {
            kappa: 0.41,
            elog: 9.8,
            yplus_crit: 11.63,
            max_iterations: 40,
            tolerance: 1e-7,
            ode_factor: 0.0,
            strict_convergence: false,
            damping_constant: 26.0,
            ode_intervals: 64,
        }
    }
}

impl WallFunctionOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |name: &str, reason: &str| {
            Err(ConfigurationError::InvalidOption {
                name: format!("wall_function.{}", name),
                reason: reason.to_string(),
            })
        };
        if !(self.kappa > 0.0) || !(self.elog > 0.0) {
            return invalid("kappa", "log-law constants must be positive");
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations", "must be positive");
        }
        if !(self.tolerance > 0.0) {
            return invalid("tolerance", "must be positive");
        }
        if !(0.0..=1.0).contains(&self.ode_factor) {
            return invalid("ode_factor", "must lie in [0, 1]");
        }
        if self.ode_intervals == 0 || self.ode_intervals % 2 != 0 {
            return invalid("ode_intervals", "must be a positive even number");
        }
        Ok(())
    }
}
