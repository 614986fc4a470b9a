//! Rollout engine and differentiation tape for a bouncing particle.
//!
//! # Layer 0
//!
//! This crate advances one particle through a fixed number of steps and
//! differentiates the result. It has no I/O and no randomness; estimators
//! that perturb and re-run rollouts live in `bounce-grad`.
//!
//! # Components
//!
//! - [`TrajectoryStore`] - `steps + 1` pre-allocated states, reset in place
//! - [`IntegratorStrategy`] - How one state advances to the next
//! - [`Rollout`] - Drives the store and reduces the terminal state to a loss
//! - [`Tape`] - Records a rollout and runs the reverse pass
//!
//! # Step Sequence
//!
//! ```text
//! for i in 0..steps:
//!     clear f_i
//!     if library integrator: f_i += collide(x_i, v_i)
//!     (x_{i+1}, v_{i+1}) = step(x_i, v_i, f_i, u_i)
//! L = objective(x_steps)
//! ```
//!
//! # Example
//!
//! ```
//! use bounce_core::{IntegratorStrategy, Rollout, Tape};
//! use bounce_types::{BufferId, ExperimentConfig};
//!
//! let config = ExperimentConfig::bounce_once();
//! let mut rollout = Rollout::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
//!
//! let loss = rollout.compute_loss().unwrap();
//! assert!(loss > 0.0);
//!
//! let mut tape = Tape::new();
//! tape.record(&mut rollout).unwrap();
//! tape.backward().unwrap();
//! let dl_dv0 = tape.gradient_of(BufferId::velocity(0)).unwrap();
//! assert!(dl_dv0.y.is_finite());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn, // nalgebra constructors aren't const
    clippy::cast_precision_loss,  // usize to f64 is fine for step counts
    clippy::missing_errors_doc,   // Error docs added where non-obvious
    clippy::many_single_char_names, // x, v, f, u, s follow the math
)]

pub mod integrators;
mod rollout;
mod scene;
mod store;
mod tape;

pub use integrators::{IntegratorStrategy, StepAdjoint, StepInputs};
pub use rollout::Rollout;
pub use scene::Scene;
pub use store::TrajectoryStore;
pub use tape::Tape;
