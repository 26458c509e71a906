use crate::error::{ConfigurationError, ConvergenceError};
use crate::options::WallFunctionOptions;
use crate::Real;
use fenris_kernels_optimize::calculus::ScalarFunctionBuilder;
use fenris_kernels_optimize::newton::{newton, NewtonError, NewtonResult, NewtonSettings};
use log::warn;
use nalgebra::convert;

/// Near-wall closure that produced a friction velocity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WallRegime {
    /// Viscous sublayer, `u = uτ² y / ν`.
    Viscous,
    /// Logarithmic layer, `u = (uτ / κ) ln(E y uτ / ν)`.
    LogLaw,
    /// Equilibrium mixing-length ODE.
    Ode,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct UtauSolution<T> {
    pub utau: T,
    pub iterations: usize,
    /// Absolute residual of the wall law at `utau`.
    pub residual: T,
    pub converged: bool,
    pub regime: WallRegime,
}

/// Inputs and result of the friction velocity computation at one wall integration point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WallPointState<T> {
    /// Magnitude of the velocity tangential to the wall, relative to the wall velocity.
    pub tangential_velocity: T,
    pub wall_distance: T,
    pub density: T,
    pub viscosity: T,
    pub utau: T,
    pub iterations: usize,
    pub residual: T,
    pub converged: bool,
}

impl<T: Real> WallPointState<T> {
    pub fn new(tangential_velocity: T, wall_distance: T, density: T, viscosity: T) -> Self {
        Self {
            tangential_velocity,
            wall_distance,
            density,
            viscosity,
            utau: T::zero(),
            iterations: 0,
            residual: T::zero(),
            converged: false,
        }
    }
}

/// Summary of one friction velocity solve over many points.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ConvergenceReport {
    pub total: usize,
    pub unconverged: usize,
    pub max_residual: f64,
    pub max_iterations: usize,
}

impl ConvergenceReport {
    pub fn is_converged(&self) -> bool {
        self.unconverged == 0
    }

    pub fn merge(&mut self, other: &ConvergenceReport) {
        self.total += other.total;
        self.unconverged += other.unconverged;
        self.max_residual = self.max_residual.max(other.max_residual);
        self.max_iterations = self.max_iterations.max(other.max_iterations);
    }

    pub fn to_error(&self) -> ConvergenceError {
        ConvergenceError {
            unconverged: self.unconverged,
            total: self.total,
            max_residual: self.max_residual,
        }
    }
}

/// Solves wall laws for the friction velocity `uτ`.
#[derive(Debug, Clone, PartialEq)]
pub struct WallFrictionSolver<T> {
    kappa: T,
    elog: T,
    yplus_crit: T,
    damping_constant: T,
    ode_factor: T,
    ode_intervals: usize,
    strict_convergence: bool,
    settings: NewtonSettings<T>,
}

impl<T: Real> WallFrictionSolver<T> {
    pub fn from_options(options: &WallFunctionOptions) -> Result<Self, ConfigurationError> {
        options.validate()?;
        Ok(Self {
            kappa: convert(options.kappa),
            elog: convert(options.elog),
            yplus_crit: convert(options.yplus_crit),
            damping_constant: convert(options.damping_constant),
            ode_factor: convert(options.ode_factor),
            ode_intervals: options.ode_intervals,
            strict_convergence: options.strict_convergence,
            settings: NewtonSettings {
                max_iterations: options.max_iterations,
                tolerance: convert(options.tolerance),
                lower_bound: Some(T::zero()),
            },
        })
    }

    pub fn ode_factor(&self) -> T {
        self.ode_factor
    }

    pub fn kappa(&self) -> T {
        self.kappa
    }

    pub fn elog(&self) -> T {
        self.elog
    }

    pub fn yplus_crit(&self) -> T {
        self.yplus_crit
    }

    fn invalid_input(tangential_velocity: T) -> UtauSolution<T> {
        UtauSolution {
            utau: T::zero(),
            iterations: 0,
            residual: tangential_velocity.abs(),
            converged: false,
            regime: WallRegime::Viscous,
        }
    }

    fn from_newton(result: Result<NewtonResult<T>, NewtonError<T>>, initial: T, regime: WallRegime) -> UtauSolution<T> {
        match result {
            Ok(result) => UtauSolution {
                utau: result.solution,
                iterations: result.iterations,
                residual: result.residual,
                converged: true,
                regime,
            },
            Err(NewtonError::MaximumIterationsReached(last)) => UtauSolution {
                utau: last.solution,
                iterations: last.iterations,
                residual: last.residual,
                converged: false,
                regime,
            },
            Err(NewtonError::DegenerateDerivative { iteration, x }) => UtauSolution {
                utau: if x.is_finite() { x } else { initial },
                iterations: iteration,
                residual: T::max_value().unwrap_or_else(T::one),
                converged: false,
                regime,
            },
        }
    }

    /// Friction velocity from the log law, or from the viscous sublayer relation when the
    /// resulting `y+` does not exceed the critical value.
    pub fn compute_utau(&self, tangential_velocity: T, wall_distance: T, density: T, viscosity: T) -> UtauSolution<T> {
        let nu = viscosity / density;
        let u = tangential_velocity.abs();
        if !(wall_distance > T::zero()) || !(nu > T::zero()) || !u.is_finite() {
            return Self::invalid_input(u);
        }

        let viscous = (nu * u / wall_distance).sqrt();
        if viscous * wall_distance / nu <= self.yplus_crit {
            return UtauSolution {
                utau: viscous,
                iterations: 1,
                residual: T::zero(),
                converged: true,
                regime: WallRegime::Viscous,
            };
        }

        let (kappa, elog) = (self.kappa, self.elog);
        let log_arg = move |utau: T| elog * wall_distance * utau / nu;
        let function = ScalarFunctionBuilder::with_function(move |utau: T| utau / kappa * log_arg(utau).ln() - u)
            .with_derivative(move |utau: T| (log_arg(utau).ln() + T::one()) / kappa);
        Self::from_newton(newton(function, viscous, &self.settings), viscous, WallRegime::LogLaw)
    }

    /// Velocity at distance `y` of an equilibrium boundary layer with friction velocity `utau`,
    /// `∫ ρ uτ² / (μ + μ_t) dy'` with the damped mixing-length viscosity
    /// `μ_t = ρ κ y' uτ (1 - exp(-y'+ / A))²`, integrated with the composite Simpson rule.
    pub fn ode_velocity(&self, utau: T, wall_distance: T, density: T, viscosity: T) -> T {
        let nu = viscosity / density;
        let integrand = |y: T| {
            let yplus = y * utau / nu;
            let damping = T::one() - (-yplus / self.damping_constant).exp();
            let mu_t = density * self.kappa * y * utau * damping * damping;
            density * utau * utau / (viscosity + mu_t)
        };

        let n = self.ode_intervals;
        let h = wall_distance / T::from_usize(n).expect("Must be able to fit usize in T");
        let (two, four): (T, T) = (convert(2.0), convert(4.0));
        let mut sum = integrand(T::zero()) + integrand(wall_distance);
        for i in 1..n {
            let y = h * T::from_usize(i).expect("Must be able to fit usize in T");
            let weight = if i % 2 == 1 { four } else { two };
            sum += weight * integrand(y);
        }
        sum * h / convert(3.0)
    }

    /// Friction velocity of the equilibrium ODE closure, found by Newton iteration with a
    /// finite difference derivative from `initial_guess`.
    pub fn compute_utau_ode(
        &self,
        tangential_velocity: T,
        wall_distance: T,
        density: T,
        viscosity: T,
        initial_guess: T,
    ) -> UtauSolution<T> {
        let u = tangential_velocity.abs();
        if !(wall_distance > T::zero()) || !(viscosity / density > T::zero()) || !u.is_finite() {
            return Self::invalid_input(u);
        }
        let function = ScalarFunctionBuilder::with_function(|utau: T| {
            self.ode_velocity(utau, wall_distance, density, viscosity) - u
        });
        let x0 = if initial_guess > T::zero() { initial_guess } else { T::one() };
        Self::from_newton(newton(function, x0, &self.settings), x0, WallRegime::Ode)
    }

    /// Computes the friction velocity of every point, blending log law and ODE closure by the
    /// ODE factor. Unconverged points keep their last iterate.
    ///
    /// Non-convergence is logged and reported. It is only an error with strict convergence.
    pub fn solve_points(&self, points: &mut [WallPointState<T>]) -> Result<ConvergenceReport, ConvergenceError> {
        let mut report = ConvergenceReport {
            total: points.len(),
            ..Default::default()
        };
        let blend = self.ode_factor;

        for point in points.iter_mut() {
            let (u, y, rho, mu) = (point.tangential_velocity, point.wall_distance, point.density, point.viscosity);
            let log_law = self.compute_utau(u, y, rho, mu);
            let solution = if blend > T::zero() {
                let ode = self.compute_utau_ode(u, y, rho, mu, log_law.utau);
                UtauSolution {
                    utau: (T::one() - blend) * log_law.utau + blend * ode.utau,
                    iterations: log_law.iterations + ode.iterations,
                    residual: log_law.residual.max(ode.residual),
                    converged: log_law.converged && ode.converged,
                    regime: WallRegime::Ode,
                }
            } else {
                log_law
            };

            point.utau = solution.utau;
            point.iterations = solution.iterations;
            point.residual = solution.residual;
            point.converged = solution.converged;

            if !solution.converged {
                report.unconverged += 1;
            }
            report.max_residual = report
                .max_residual
                .max(solution.residual.to_subset().unwrap_or(f64::INFINITY));
            report.max_iterations = report.max_iterations.max(solution.iterations);
        }

        if !report.is_converged() {
            warn!(
                "Wall friction velocity did not converge at {} of {} points (max residual {:e})",
                report.unconverged, report.total, report.max_residual
            );
            if self.strict_convergence {
                return Err(report.to_error());
            }
        }
        Ok(report)
    }
}
