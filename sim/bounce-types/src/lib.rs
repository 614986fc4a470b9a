//! Core types for contact-rich particle gradient studies.
//!
//! This crate provides the data layer shared by the rollout engine and the
//! gradient estimators:
//!
//! - [`SimulationState`] - Position, velocity and force buffers of one step
//! - [`BufferId`] - Identity of one buffer within a trajectory
//! - [`Model`] / [`ModelBuilder`] - Immutable scene parameters
//! - [`ContactParameters`] - Penalty or soft-contact constants
//! - [`Objective`] - Terminal reduction to a scalar
//! - [`ExperimentConfig`] - Resolved experiment configuration
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no stepping logic and no
//! contact response; those live in `bounce-contact` and `bounce-core`.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: up
//! - Z: out of plane
//!
//! # Example
//!
//! ```
//! use bounce_types::{BufferId, SimulationState};
//! use nalgebra::Vector3;
//!
//! let mut state = SimulationState::zeroed(false);
//! state.position = Vector3::new(0.0, 1.0, 0.0);
//!
//! assert_eq!(BufferId::position(0).to_string(), "state[0].position");
//! assert!(state.is_finite());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::cast_precision_loss,       // usize to f64 is fine for step counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod config;
mod error;
mod model;
mod objective;
mod state;

pub use config::ExperimentConfig;
pub use error::SimError;
pub use model::{
    ContactParameters, Model, ModelBuilder, Particle, PenaltyParams, SoftContactParams, Wall,
};
pub use objective::Objective;
pub use state::{BufferField, BufferId, SimulationState};

pub use nalgebra::Vector3;

/// Result type for rollout and gradient operations.
pub type Result<T> = std::result::Result<T, SimError>;
