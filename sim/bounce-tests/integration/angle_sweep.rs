//! Launching straight up versus straight down onto the ground.
//!
//! Upward the particle never touches anything and the final height grows
//! one-for-one with the initial height. Downward it bounces once; the
//! gradient is still well defined away from the contact switch and the
//! analytic and finite-difference estimates agree.

use approx::assert_relative_eq;
use bounce_core::{IntegratorStrategy, Rollout};
use bounce_grad::{check_grad_analytic, numerical_gradient, GradientCheck, DEFAULT_TOLERANCE};
use bounce_types::{BufferId, ExperimentConfig};
use std::f64::consts::FRAC_PI_2;

fn launched(theta: f64) -> Rollout {
    let config = ExperimentConfig::bounce_once().with_launch_angle(theta, 5.0);
    Rollout::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap()
}

#[test]
fn test_upward_launch_never_touches() {
    let mut rollout = launched(FRAC_PI_2);
    let loss = rollout.compute_loss().unwrap();
    assert_relative_eq!(loss, 6.0, epsilon = 1e-9);
    assert_eq!(rollout.contact_episodes(), 0);

    let dx0 = check_grad_analytic(&mut rollout, BufferId::position(0)).unwrap();
    assert_relative_eq!(dx0.y, 1.0, epsilon = 1e-12);
    assert!(dx0.y > 0.0);
}

#[test]
fn test_downward_launch_bounces_once() {
    let mut rollout = launched(-FRAC_PI_2);
    let loss = rollout.compute_loss().unwrap();
    assert_eq!(rollout.contact_episodes(), 1);
    assert!(loss > 1.0, "the bounce should end above the start: {loss}");

    let analytic = check_grad_analytic(&mut rollout, BufferId::position(0)).unwrap();
    let numerical = numerical_gradient(&mut rollout, BufferId::position(0), 1e-4).unwrap();
    assert_relative_eq!(analytic.y, -1.8652, epsilon = 1e-3);
    assert_relative_eq!(numerical.y, analytic.y, epsilon = 1e-5);

    let check = GradientCheck::run(&mut rollout, BufferId::velocity(0), 1e-4, DEFAULT_TOLERANCE)
        .unwrap();
    assert!(!check.unstable, "{check:?}");
    assert_relative_eq!(check.analytic.y, -1.1245, epsilon = 1e-3);
}

#[test]
fn test_every_integrator_bounces_downward_launch() {
    let config = ExperimentConfig::bounce_once();
    for (integrator, config) in [
        (IntegratorStrategy::SemiImplicit, config.clone().into_soft_contact()),
        (IntegratorStrategy::SymplecticPenalty, config.clone()),
        (IntegratorStrategy::position_based(), config),
    ] {
        let mut rollout = Rollout::from_config(&config, integrator).unwrap();
        let loss = rollout.compute_loss().unwrap();
        assert_eq!(rollout.contact_episodes(), 1, "{}", integrator.name());
        assert!(loss > 1.0, "{}: {loss}", integrator.name());
    }
}
