use crate::error::ConfigurationError;
use crate::Real;
use numeric_literals::replace_float_literals;

/// Backward-difference time integration state shared by all kernels of a step.
///
/// A time derivative is approximated as `(γ1 φ^{n+1} + γ2 φ^n + γ3 φ^{n-1}) / Δt`. The first
/// step always uses first order, since no older state is available.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeIntegrator<T> {
    time: T,
    step_count: usize,
    dt: T,
    dt_prev: T,
    order: usize,
    gammas: [T; 3],
}

impl<T: Real> TimeIntegrator<T> {
    pub fn new(dt: T, order: usize) -> Result<Self, ConfigurationError> {
        if order != 1 && order != 2 {
            return Err(ConfigurationError::InvalidOption {
                name: "time_order".to_string(),
                reason: format!("only first and second order are supported, got {}", order),
            });
        }
        if !(dt > T::zero()) {
            return Err(ConfigurationError::InvalidOption {
                name: "dt".to_string(),
                reason: "time step must be positive".to_string(),
            });
        }
        Ok(Self {
            time: T::zero(),
            step_count: 0,
            dt,
            dt_prev: dt,
            order,
            gammas: [T::one(), -T::one(), T::zero()],
        })
    }

    pub fn time(&self) -> T {
        self.time
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn time_step(&self) -> T {
        self.dt
    }

    pub fn previous_time_step(&self) -> T {
        self.dt_prev
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn gamma1(&self) -> T {
        self.gammas[0]
    }

    pub fn gamma2(&self) -> T {
        self.gammas[1]
    }

    pub fn gamma3(&self) -> T {
        self.gammas[2]
    }

    /// Completes the current step and prepares the next one with step size `dt`.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn advance(&mut self, dt: T) {
        self.time += self.dt;
        self.step_count += 1;
        self.dt_prev = self.dt;
        self.dt = dt;

        if self.order == 2 {
            let tau = self.dt / self.dt_prev;
            self.gammas = [(1.0 + 2.0 * tau) / (1.0 + tau), -(1.0 + tau), tau * tau / (1.0 + tau)];
        }
    }
}
