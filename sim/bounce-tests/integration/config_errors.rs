//! Misconfigurations fail at construction, and the tape rejects queries it
//! cannot answer.

use bounce_core::{IntegratorStrategy, Rollout, Tape};
use bounce_grad::AngleSweep;
use bounce_types::{BufferId, ExperimentConfig, SimError, SoftContactParams};

#[test]
fn test_library_integrator_rejects_penalty_constants() {
    let err = Rollout::from_config(&ExperimentConfig::bounce_once(), IntegratorStrategy::SemiImplicit)
        .unwrap_err();
    assert!(matches!(err, SimError::ConfigurationMismatch { .. }));
    assert!(err.to_string().contains("semi_implicit"));
}

#[test]
fn test_custom_integrators_reject_soft_constants() {
    let config =
        ExperimentConfig::bounce_once().with_soft_contact(SoftContactParams::with_stiffness(1.0e4));
    for integrator in [
        IntegratorStrategy::SymplecticPenalty,
        IntegratorStrategy::position_based(),
    ] {
        let err = Rollout::from_config(&config, integrator).unwrap_err();
        assert!(matches!(err, SimError::ConfigurationMismatch { .. }));
    }
}

#[test]
fn test_mismatch_is_fatal_for_sweeps() {
    let err = AngleSweep::from_config(&ExperimentConfig::ground_wall(), IntegratorStrategy::SemiImplicit)
        .unwrap_err();
    assert!(err.is_config_error());
}

#[test]
fn test_invalid_parameters_are_rejected() {
    let config = ExperimentConfig::bounce_once();
    let bad_relaxation = IntegratorStrategy::PositionBased {
        relaxation: 0.0,
        iterations: 2,
    };
    assert!(Rollout::from_config(&config, bad_relaxation)
        .unwrap_err()
        .is_config_error());

    let mut zero_time = config;
    zero_time.simulation_time = 0.0;
    assert!(Rollout::from_config(&zero_time, IntegratorStrategy::SymplecticPenalty)
        .unwrap_err()
        .is_config_error());
}

#[test]
fn test_library_states_have_no_control_channel() {
    let config = ExperimentConfig::bounce_once().into_soft_contact();
    let mut rollout = Rollout::from_config(&config, IntegratorStrategy::SemiImplicit).unwrap();
    assert_eq!(
        rollout.buffer(BufferId::external_force(0)).unwrap_err(),
        SimError::MissingControlChannel { state: 0 }
    );

    let mut tape = Tape::new();
    tape.record(&mut rollout).unwrap();
    tape.backward().unwrap();
    assert_eq!(
        tape.gradient_of(BufferId::external_force(0)).unwrap_err(),
        SimError::UnrecordedInput {
            buffer: BufferId::external_force(0)
        }
    );
    assert!(tape.gradient_of(BufferId::accumulated_force(1)).is_ok());
}

#[test]
fn test_gradient_queries_need_a_reverse_pass() {
    let mut rollout =
        Rollout::from_config(&ExperimentConfig::bounce_once(), IntegratorStrategy::SymplecticPenalty)
            .unwrap();
    let mut tape = Tape::new();
    assert_eq!(tape.backward().unwrap_err(), SimError::EmptyTape);

    tape.record(&mut rollout).unwrap();
    assert_eq!(
        tape.gradient_of(BufferId::position(0)).unwrap_err(),
        SimError::BackwardNotRun
    );
    tape.backward().unwrap();
    let beyond = BufferId::position(rollout.steps() + 1);
    assert_eq!(
        tape.gradient_of(beyond).unwrap_err(),
        SimError::UnrecordedInput { buffer: beyond }
    );
}
