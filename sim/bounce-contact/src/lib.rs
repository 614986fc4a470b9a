//! Contact response for a sphere against ground and wall planes.
//!
//! # Layer 0
//!
//! This crate sits between the pure data in `bounce-types` and the rollout
//! engine in `bounce-core`. It knows nothing about time stepping: it maps a
//! particle position and velocity to a force and to the force's Jacobian.
//!
//! # Contact Laws
//!
//! | Law | Used by | Normal | Tangential |
//! |-----|---------|--------|------------|
//! | [`PenaltyContact`] | custom integrators | `k d + c max(-v_n, 0)` | `mu F_n` |
//! | [`SoftContact`] | library integrators | `ke d + kd max(-v_n, 0)` | `min(kf abs(v_t), mu ke d)` |
//!
//! The force is exactly zero for `d <= 0`. The detection margin of soft
//! contact widens the candidate set but never produces force.
//!
//! # Example
//!
//! ```
//! use bounce_contact::{ContactFamily, ContactResponse, SurfaceSet};
//! use bounce_types::{ContactParameters, ModelBuilder, PenaltyParams};
//! use nalgebra::Vector3;
//!
//! let model = ModelBuilder::new()
//!     .add_particle(Vector3::new(0.0, 0.05, 0.0), Vector3::zeros(), 1.0)
//!     .contact(ContactParameters::penalty(PenaltyParams::spring(1.0e4)))
//!     .finalize()
//!     .unwrap();
//!
//! let response =
//!     ContactResponse::resolve("symplectic_penalty", ContactFamily::Penalty, &model.contact)
//!         .unwrap();
//! let surfaces = SurfaceSet::from_model(&model);
//! let force = response.total_force(&surfaces, model.radius, &model.particle.position, &Vector3::zeros());
//!
//! assert!(force.y > 0.0);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn, // nalgebra constructors aren't const
    clippy::missing_errors_doc,   // Error docs added where non-obvious
)]

mod law;
mod response;
mod surface;

pub use law::{ContactForce, ContactJacobian, ContactLaw, PenaltyContact, SoftContact};
pub use response::{collide, Contact, ContactFamily, ContactResponse, ContactSet};
pub use surface::{Surface, SurfaceKind, SurfaceSet, MAX_SURFACES};
