//! Central differences leave the rollout exactly as they found it.

use bounce_core::{IntegratorStrategy, Rollout};
use bounce_grad::{check_grad_numerical, numerical_gradient, GradientCheck};
use bounce_types::{BufferId, ExperimentConfig, SimError};

fn rollout() -> Rollout {
    Rollout::from_config(
        &ExperimentConfig::bounce_once(),
        IntegratorStrategy::SymplecticPenalty,
    )
    .unwrap()
}

#[test]
fn test_perturbed_buffers_are_restored_bit_for_bit() {
    let mut rollout = rollout();
    let baseline = rollout.compute_loss().unwrap();
    let buffers = [
        BufferId::position(0),
        BufferId::velocity(0),
        rollout.control_buffer(),
    ];
    let before: Vec<_> = buffers.iter().map(|&b| rollout.buffer(b).unwrap()).collect();

    for &buffer in &buffers {
        numerical_gradient(&mut rollout, buffer, 1e-4).unwrap();
    }

    let after: Vec<_> = buffers.iter().map(|&b| rollout.buffer(b).unwrap()).collect();
    assert_eq!(before, after);
    assert_eq!(rollout.compute_loss().unwrap().to_bits(), baseline.to_bits());
}

#[test]
fn test_failed_evaluation_still_restores() {
    let mut rollout = rollout();
    let before = rollout.buffer(BufferId::velocity(0)).unwrap();
    let err = check_grad_numerical(&mut rollout, BufferId::velocity(0), 1, f64::NAN).unwrap_err();
    assert!(err.is_diverged());
    assert_eq!(rollout.buffer(BufferId::velocity(0)).unwrap(), before);
}

#[test]
fn test_invalid_addresses_are_rejected() {
    let mut rollout = rollout();
    assert_eq!(
        check_grad_numerical(&mut rollout, BufferId::position(0), 3, 1e-4).unwrap_err(),
        SimError::ComponentOutOfRange(3)
    );
    assert!(matches!(
        check_grad_numerical(&mut rollout, BufferId::position(10_000), 0, 1e-4).unwrap_err(),
        SimError::StateIndexOutOfRange { .. }
    ));
}

#[test]
fn test_gradient_check_flags_disagreement() {
    let ok = GradientCheck::compare(
        BufferId::position(0),
        bounce_types::Vector3::new(1.0, 2.0, 0.0),
        bounce_types::Vector3::new(1.0, 2.001, 0.0),
        1e-2,
    );
    assert!(!ok.unstable);
    let bad = GradientCheck::compare(
        BufferId::position(0),
        bounce_types::Vector3::new(1.0, 2.0, 0.0),
        bounce_types::Vector3::new(1.0, -2.0, 0.0),
        1e-2,
    );
    assert!(bad.unstable);
}
