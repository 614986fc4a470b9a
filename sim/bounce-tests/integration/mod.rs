//! Integration tests for the bounce-* crates.
//!
//! These tests exercise the full estimator stack on real rollouts:
//! - Agreement of all three estimators on smooth trajectories
//! - Deterministic re-runs and tape reuse
//! - Finite-difference rollback
//! - The contact discontinuity and the single-bounce scenarios
//! - Configuration errors and sweep failure handling

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

pub mod angle_sweep;
pub mod config_errors;
pub mod contact_edge;
pub mod determinism;
pub mod finite_difference;
pub mod no_contact;
pub mod sweep_driver;
