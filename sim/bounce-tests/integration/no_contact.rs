//! On a trajectory that never touches a surface, the analytic,
//! finite-difference and zeroth-order gradients agree.

use approx::assert_relative_eq;
use bounce_core::{IntegratorStrategy, Rollout};
use bounce_grad::{
    check_grad_analytic, launch_tangent, numerical_gradient, GradientTriad, ZerothOrderEstimator,
};
use bounce_types::{BufferId, ExperimentConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::FRAC_PI_4;

/// Launched upward from y = 1 with zero gravity: never reaches the ground.
fn upward(theta: f64) -> ExperimentConfig {
    ExperimentConfig::bounce_once().with_launch_angle(theta, 5.0)
}

/// Free flight under gravity towards a target, no surfaces at all.
fn ballistic() -> ExperimentConfig {
    let mut config = ExperimentConfig::ground_wall();
    config.ground = false;
    config.wall_x = None;
    config
}

#[test]
fn test_analytic_matches_finite_difference_for_every_integrator() {
    for integrator in [
        IntegratorStrategy::SemiImplicit,
        IntegratorStrategy::SymplecticPenalty,
        IntegratorStrategy::position_based(),
    ] {
        let mut config = ballistic();
        if integrator.is_library_adapter() {
            config = config.into_soft_contact();
        }
        let mut rollout = Rollout::from_config(&config, integrator).unwrap();
        let triad = GradientTriad::compute(&mut rollout, config.eps).unwrap();
        assert!(
            !triad.position.unstable && !triad.velocity.unstable,
            "{} disagrees on a smooth trajectory: {triad:?}",
            integrator.name()
        );
        if integrator.has_control_channel() {
            assert!(!triad.control.unstable, "{triad:?}");
        }
        assert_eq!(rollout.contact_episodes(), 0);
    }
}

#[test]
fn test_library_control_stand_in_is_cleared_each_step() {
    // The accumulated force of state 1 is cleared before it is read, so
    // re-running cannot see a perturbation of it; the tape still reports
    // the sensitivity of the value the integrator read.
    let config = ballistic().into_soft_contact();
    let mut rollout = Rollout::from_config(&config, IntegratorStrategy::SemiImplicit).unwrap();
    let buffer = rollout.control_buffer();
    let analytic = check_grad_analytic(&mut rollout, buffer).unwrap();
    let numerical = numerical_gradient(&mut rollout, buffer, config.eps).unwrap();
    assert_eq!(numerical, nalgebra::Vector3::zeros());
    assert!(analytic.norm() > 0.0);
}

#[test]
fn test_three_estimators_agree_on_theta_gradient() {
    let theta = FRAC_PI_4;
    let std = 0.05;
    let config = upward(theta);
    let mut rollout = Rollout::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
    let estimator = ZerothOrderEstimator::new(std, 5.0).unwrap();

    // First order: project ∂L/∂v0 on the launch tangent.
    let v_grad = check_grad_analytic(&mut rollout, BufferId::velocity(0)).unwrap();
    let analytic = 5.0 * launch_tangent(theta).dot(&v_grad.xy());

    // Central difference in θ.
    let eps = config.eps;
    let plus = estimator.loss_at(&mut rollout, theta + eps).unwrap();
    let minus = estimator.loss_at(&mut rollout, theta - eps).unwrap();
    let numerical = (plus - minus) / (2.0 * eps);

    // Zeroth order.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let zo = estimator
        .theta_gradient(&mut rollout, theta, 4000, &mut rng)
        .unwrap();

    // L(θ) = 1 + 5 sin θ
    assert_relative_eq!(analytic, 5.0 * theta.cos(), epsilon = 1e-8);
    assert_relative_eq!(numerical, analytic, epsilon = 1e-6);
    assert!(
        (zo.estimate - analytic).abs() < 5.0 * zo.standard_error + 0.01,
        "zeroth order {zo:?} vs analytic {analytic}"
    );
}
