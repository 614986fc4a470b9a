//! Gradient estimators for contact-rich particle rollouts.
//!
//! Three independent estimates of the same gradient:
//!
//! | Estimator | Source | Needs a differentiable rollout |
//! |-----------|--------|--------------------------------|
//! | Analytic | [`check_grad_analytic`], reverse pass over a tape | yes |
//! | Finite difference | [`check_grad_numerical`], two re-runs per component | no |
//! | Zeroth order | [`ZerothOrderEstimator`], Gaussian smoothing over the launch angle | no |
//!
//! Near a contact event the first two disagree; that disagreement is
//! reported through [`GradientCheck::unstable`] and a `warn` event, not as
//! an error.
//!
//! # Example
//!
//! ```
//! use bounce_core::{IntegratorStrategy, Rollout};
//! use bounce_grad::GradientTriad;
//! use bounce_types::ExperimentConfig;
//!
//! let mut config = ExperimentConfig::bounce_once();
//! config.init_vel = [0.0, 1.0, 0.0]; // moving away from the ground
//! let mut rollout = Rollout::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
//!
//! let triad = GradientTriad::compute(&mut rollout, config.eps).unwrap();
//! assert!(!triad.any_unstable());
//! ```
//!
//! # Features
//!
//! - `parallel`: evaluate sweep samples on a rayon pool. Results are
//!   identical with or without it.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss, // usize to f64 for sample counts
    clippy::missing_errors_doc,  // Error docs added where non-obvious
)]

mod finite_diff;
mod report;
mod sweep;
mod zeroth_order;

pub use finite_diff::{
    check_grad_analytic, check_grad_numerical, numerical_gradient, GradientCheck, GradientTriad,
    DEFAULT_TOLERANCE,
};
pub use report::{LandscapePoint, SweepRecord, SweepReport};
pub use sweep::{linspace, AngleSweep, SweepJob};
pub use zeroth_order::{
    angular, launch_tangent, launch_velocity, ThetaGradient, ZerothOrderEstimator,
    ZerothOrderSample,
};
