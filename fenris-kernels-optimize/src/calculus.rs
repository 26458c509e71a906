use crate::Real;
use numeric_literals::replace_float_literals;

/// A real-valued function of a single real variable.
pub trait ScalarFunction<T: Real> {
    fn eval(&mut self, x: T) -> T;
}

impl<T, X> ScalarFunction<T> for &mut X
where
    T: Real,
    X: ScalarFunction<T>,
{
    fn eval(&mut self, x: T) -> T {
        X::eval(self, x)
    }
}

/// A scalar function that can also provide its derivative.
pub trait DifferentiableScalarFunction<T: Real>: ScalarFunction<T> {
    fn derivative(&mut self, x: T) -> T;
}

impl<T, X> DifferentiableScalarFunction<T> for &mut X
where
    T: Real,
    X: DifferentiableScalarFunction<T>,
{
    fn derivative(&mut self, x: T) -> T {
        X::derivative(self, x)
    }
}

#[derive(Debug, Clone)]
pub struct ScalarFunctionBuilder;

/// Analytic derivative attached to a [`ConcreteScalarFunction`].
#[derive(Debug, Clone)]
pub struct Derivative<D>(D);

/// A scalar function assembled from closures.
///
/// Without an explicit derivative (`D = ()`), the derivative is approximated by central
/// differences with relative step `step`.
#[derive(Debug, Clone)]
pub struct ConcreteScalarFunction<F, D, T> {
    function: F,
    derivative: D,
    step: T,
}

impl ScalarFunctionBuilder {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn with_function<F, T>(function: F) -> ConcreteScalarFunction<F, (), T>
    where
        T: Real,
        F: FnMut(T) -> T,
    {
        ConcreteScalarFunction {
            function,
            derivative: (),
            step: 1e-7,
        }
    }
}

impl<F, T: Real> ConcreteScalarFunction<F, (), T> {
    pub fn with_derivative<D>(self, derivative: D) -> ConcreteScalarFunction<F, Derivative<D>, T>
    where
        D: FnMut(T) -> T,
    {
        ConcreteScalarFunction {
            function: self.function,
            derivative: Derivative(derivative),
            step: self.step,
        }
    }

    /// Sets the relative step used for the finite difference derivative.
    pub fn with_relative_step(self, step: T) -> Self {
        Self { step, ..self }
    }
}

impl<F, D, T> ScalarFunction<T> for ConcreteScalarFunction<F, D, T>
where
    T: Real,
    F: FnMut(T) -> T,
{
    fn eval(&mut self, x: T) -> T {
        (self.function)(x)
    }
}

impl<F, T> DifferentiableScalarFunction<T> for ConcreteScalarFunction<F, (), T>
where
    T: Real,
    F: FnMut(T) -> T,
{
    fn derivative(&mut self, x: T) -> T {
        let h = self.step * x.abs().max(T::one());
        approximate_derivative(&mut self.function, x, h)
    }
}

impl<F, D, T> DifferentiableScalarFunction<T> for ConcreteScalarFunction<F, Derivative<D>, T>
where
    T: Real,
    F: FnMut(T) -> T,
    D: FnMut(T) -> T,
{
    fn derivative(&mut self, x: T) -> T {
        (self.derivative.0)(x)
    }
}

/// Approximates `f'(x)` with a second-order central difference of width `2h`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn approximate_derivative<T, F>(mut f: F, x: T, h: T) -> T
where
    T: Real,
    F: FnMut(T) -> T,
{
    (f(x + h) - f(x - h)) / (2.0 * h)
}
