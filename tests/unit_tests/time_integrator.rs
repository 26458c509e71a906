use fenris_kernels::error::ConfigurationError;
use fenris_kernels::time_integrator::TimeIntegrator;
use matrixcompare::assert_scalar_eq;

#[test]
fn first_step_is_first_order() {
    let integrator = TimeIntegrator::new(0.1, 2).unwrap();
    assert_eq!(integrator.step_count(), 0);
    assert_eq!(integrator.time(), 0.0);
    assert_eq!(
        [integrator.gamma1(), integrator.gamma2(), integrator.gamma3()],
        [1.0, -1.0, 0.0]
    );
}

#[test]
fn second_order_coefficients_follow_step_ratio() {
    let mut integrator = TimeIntegrator::new(0.1, 2).unwrap();
    integrator.advance(0.1);
    assert_eq!(integrator.step_count(), 1);
    assert_scalar_eq!(integrator.time(), 0.1, comp = abs, tol = 1e-15);
    assert_scalar_eq!(integrator.gamma1(), 1.5, comp = abs, tol = 1e-14);
    assert_scalar_eq!(integrator.gamma2(), -2.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(integrator.gamma3(), 0.5, comp = abs, tol = 1e-14);

    integrator.advance(0.05);
    assert_eq!(integrator.time_step(), 0.05);
    assert_eq!(integrator.previous_time_step(), 0.1);
    assert_scalar_eq!(integrator.time(), 0.2, comp = abs, tol = 1e-15);
    assert_scalar_eq!(integrator.gamma1(), 4.0 / 3.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(integrator.gamma2(), -1.5, comp = abs, tol = 1e-14);
    assert_scalar_eq!(integrator.gamma3(), 1.0 / 6.0, comp = abs, tol = 1e-14);

    // The coefficients are consistent: they differentiate constants to zero
    let sum = integrator.gamma1() + integrator.gamma2() + integrator.gamma3();
    assert_scalar_eq!(sum, 0.0, comp = abs, tol = 1e-14);
}

#[test]
fn first_order_coefficients_never_change() {
    let mut integrator = TimeIntegrator::new(0.1, 1).unwrap();
    for dt in [0.1, 0.2, 0.05] {
        integrator.advance(dt);
        assert_eq!(
            [integrator.gamma1(), integrator.gamma2(), integrator.gamma3()],
            [1.0, -1.0, 0.0]
        );
    }
    assert_eq!(integrator.step_count(), 3);
    assert_eq!(integrator.order(), 1);
}

#[test]
fn invalid_integrators_are_rejected() {
    for (dt, order) in [(0.1, 3), (0.1, 0), (0.0, 2), (-0.1, 1)] {
        assert!(matches!(
            TimeIntegrator::new(dt, order),
            Err(ConfigurationError::InvalidOption { .. })
        ));
    }
}
