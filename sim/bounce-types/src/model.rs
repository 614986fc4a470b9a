//! Scene parameters for a single-particle rollout.
//!
//! A [`Model`] is built once per rollout with [`ModelBuilder::finalize`] and is
//! immutable afterwards. It owns the particle's initial conditions, the
//! contact geometry (ground plane, optional vertical wall), gravity and the
//! raw contact constants. Which set of contact constants is legal depends on
//! the integrator variant; that check happens when the rollout is built.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{Result, SimError, SimulationState};

/// Initial conditions of the simulated particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Initial position (m).
    pub position: Vector3<f64>,
    /// Initial velocity (m/s).
    pub velocity: Vector3<f64>,
    /// Mass (kg).
    pub mass: f64,
}

impl Particle {
    /// Create a particle.
    #[must_use]
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, mass: f64) -> Self {
        Self {
            position,
            velocity,
            mass,
        }
    }
}

/// Fixed-stiffness penalty constants used by custom integrators.
///
/// ```text
/// F_n = stiffness * d + damping * max(-v_n, 0)
/// |F_t| = friction * F_n
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyParams {
    /// Penalty stiffness `kn` (N/m).
    pub stiffness: f64,
    /// Normal damping (N·s/m). Zero for a pure spring.
    pub damping: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
}

impl PenaltyParams {
    /// Pure spring with the given stiffness.
    #[must_use]
    pub fn spring(stiffness: f64) -> Self {
        Self {
            stiffness,
            damping: 0.0,
            friction: 0.0,
        }
    }

    /// Set the Coulomb friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Set the normal damping.
    #[must_use]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }
}

/// Soft-contact constants used by library-style integrators.
///
/// Missing fields deserialize to their defaults, so a config block may name
/// only the constants it changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftContactParams {
    /// Elastic stiffness `ke` (N/m).
    pub ke: f64,
    /// Normal damping `kd` (N·s/m).
    pub kd: f64,
    /// Regularised friction stiffness `kf` (N·s/m).
    pub kf: f64,
    /// Friction coefficient.
    pub mu: f64,
    /// Detection margin (m). Surfaces closer than this are reported as
    /// contact candidates; force is still zero until penetration.
    pub margin: f64,
}

impl SoftContactParams {
    /// Soft contact with stiffness `ke` and the remaining constants at their defaults.
    #[must_use]
    pub fn with_stiffness(ke: f64) -> Self {
        Self {
            ke,
            ..Self::default()
        }
    }
}

impl Default for SoftContactParams {
    fn default() -> Self {
        Self {
            ke: 1.0e4,
            kd: 10.0,
            kf: 0.0,
            mu: 0.0,
            margin: 10.0,
        }
    }
}

/// Raw contact constants as configured.
///
/// Exactly one of the two blocks must be set, and it must be the one that
/// matches the integrator variant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContactParameters {
    /// Penalty constants (custom integrators only).
    pub penalty: Option<PenaltyParams>,
    /// Soft-contact constants (library integrators only).
    pub soft: Option<SoftContactParams>,
}

impl ContactParameters {
    /// Penalty contact only.
    #[must_use]
    pub fn penalty(params: PenaltyParams) -> Self {
        Self {
            penalty: Some(params),
            soft: None,
        }
    }

    /// Soft contact only.
    #[must_use]
    pub fn soft(params: SoftContactParams) -> Self {
        Self {
            penalty: None,
            soft: Some(params),
        }
    }
}

/// A vertical wall at `x = x`, facing the side the particle starts on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    /// Wall plane coordinate along X (m).
    pub x: f64,
    /// Outward unit normal, `(-1, 0, 0)` or `(1, 0, 0)`.
    pub normal: Vector3<f64>,
}

/// Immutable scene parameters for one rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// The particle's initial conditions.
    pub particle: Particle,
    /// Particle radius (m).
    pub radius: f64,
    /// Ground plane height, `None` for no ground.
    pub ground: Option<f64>,
    /// Optional vertical wall.
    pub wall: Option<Wall>,
    /// Gravity acceleration (m/s²).
    pub gravity: Vector3<f64>,
    /// Contact constants.
    pub contact: ContactParameters,
}

impl Model {
    /// Inverse particle mass.
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        1.0 / self.particle.mass
    }

    /// State 0 for this model: the particle's initial position and velocity.
    #[must_use]
    pub fn initial_state(&self, has_control_channel: bool) -> SimulationState {
        let mut state = SimulationState::zeroed(has_control_channel);
        state.position = self.particle.position;
        state.velocity = self.particle.velocity;
        state
    }

    /// Validate physical parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.particle.mass.is_finite() && self.particle.mass > 0.0) {
            return Err(SimError::invalid_config(format!(
                "particle mass must be positive, got {}",
                self.particle.mass
            )));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(SimError::invalid_config(format!(
                "particle radius must be positive, got {}",
                self.radius
            )));
        }
        if self.ground.is_some_and(|y| !y.is_finite()) {
            return Err(SimError::invalid_config("ground height must be finite"));
        }
        if self.wall.is_some_and(|w| !w.x.is_finite()) {
            return Err(SimError::invalid_config("wall position must be finite"));
        }
        let vectors = [
            self.particle.position,
            self.particle.velocity,
            self.gravity,
        ];
        if vectors.iter().any(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(SimError::invalid_config(
                "initial conditions and gravity must be finite",
            ));
        }
        if let Some(p) = self.contact.penalty {
            if !(p.stiffness >= 0.0 && p.damping >= 0.0 && p.friction >= 0.0) {
                return Err(SimError::invalid_config(
                    "penalty constants must be non-negative",
                ));
            }
        }
        if let Some(s) = self.contact.soft {
            if !(s.ke >= 0.0 && s.kd >= 0.0 && s.kf >= 0.0 && s.mu >= 0.0 && s.margin >= 0.0) {
                return Err(SimError::invalid_config(
                    "soft contact constants must be non-negative",
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`Model`].
///
/// # Example
///
/// ```
/// use bounce_types::{ContactParameters, ModelBuilder, PenaltyParams};
/// use nalgebra::Vector3;
///
/// let model = ModelBuilder::new()
///     .add_particle(Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 5.0, 0.0), 1.0)
///     .zero_gravity()
///     .contact(ContactParameters::penalty(PenaltyParams::spring(1.0e4)))
///     .finalize()
///     .unwrap();
///
/// assert_eq!(model.ground, Some(0.0));
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    particle: Option<Particle>,
    radius: f64,
    ground: Option<f64>,
    wall_x: Option<f64>,
    gravity: Vector3<f64>,
    contact: ContactParameters,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// New builder: ground at `y = 0`, Earth gravity along `-Y`, radius 0.1 m.
    #[must_use]
    pub fn new() -> Self {
        Self {
            particle: None,
            radius: 0.1,
            ground: Some(0.0),
            wall_x: None,
            gravity: Vector3::new(0.0, -9.80665, 0.0),
            contact: ContactParameters::default(),
        }
    }

    /// Set the particle's initial conditions.
    #[must_use]
    pub fn add_particle(mut self, position: Vector3<f64>, velocity: Vector3<f64>, mass: f64) -> Self {
        self.particle = Some(Particle::new(position, velocity, mass));
        self
    }

    /// Set the particle radius.
    #[must_use]
    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Place the ground plane at height `y`.
    #[must_use]
    pub fn ground(mut self, y: f64) -> Self {
        self.ground = Some(y);
        self
    }

    /// Remove the ground plane.
    #[must_use]
    pub fn no_ground(mut self) -> Self {
        self.ground = None;
        self
    }

    /// Add a vertical wall at `x`.
    #[must_use]
    pub fn wall(mut self, x: f64) -> Self {
        self.wall_x = Some(x);
        self
    }

    /// Set gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the contact constants.
    #[must_use]
    pub fn contact(mut self, contact: ContactParameters) -> Self {
        self.contact = contact;
        self
    }

    /// Build the immutable model.
    ///
    /// The wall normal points towards the side of the wall the particle
    /// starts on.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if no particle was added or a
    /// physical parameter is out of range.
    pub fn finalize(self) -> Result<Model> {
        let particle = self
            .particle
            .ok_or_else(|| SimError::invalid_config("no particle added to model"))?;

        let wall = self.wall_x.map(|x| {
            let sign = if particle.position.x <= x { -1.0 } else { 1.0 };
            Wall {
                x,
                normal: Vector3::new(sign, 0.0, 0.0),
            }
        });

        let model = Model {
            particle,
            radius: self.radius,
            ground: self.ground,
            wall,
            gravity: self.gravity,
            contact: self.contact,
        };
        model.validate()?;
        Ok(model)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn particle_builder() -> ModelBuilder {
        ModelBuilder::new().add_particle(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros(), 2.0)
    }

    #[test]
    fn test_finalize_requires_particle() {
        let err = ModelBuilder::new().finalize().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_inv_mass_and_initial_state() {
        let model = particle_builder().finalize().unwrap();
        assert_relative_eq!(model.inv_mass(), 0.5);

        let state = model.initial_state(true);
        assert_eq!(state.position.y, 1.0);
        assert!(state.has_control_channel());
    }

    #[test]
    fn test_wall_faces_particle() {
        let left = particle_builder().wall(1.5).finalize().unwrap();
        assert_eq!(left.wall.unwrap().normal.x, -1.0);

        let right = particle_builder().wall(-1.5).finalize().unwrap();
        assert_eq!(right.wall.unwrap().normal.x, 1.0);
    }

    #[test]
    fn test_rejects_bad_mass() {
        let err = ModelBuilder::new()
            .add_particle(Vector3::zeros(), Vector3::zeros(), 0.0)
            .finalize()
            .unwrap_err();
        assert!(err.to_string().contains("mass"));
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        let err = particle_builder().radius(0.0).finalize().unwrap_err();
        assert!(err.to_string().contains("radius"));

        let err = particle_builder().ground(f64::NAN).finalize().unwrap_err();
        assert!(err.to_string().contains("ground"));

        let err = particle_builder().wall(f64::INFINITY).finalize().unwrap_err();
        assert!(err.to_string().contains("wall"));
    }

    #[test]
    fn test_partial_soft_block_uses_defaults() {
        let soft: SoftContactParams = serde_json::from_str(r#"{ "ke": 5000.0 }"#).unwrap();
        assert_eq!(soft.ke, 5000.0);
        assert_eq!(soft.kd, SoftContactParams::default().kd);
        assert_eq!(soft.margin, SoftContactParams::default().margin);
    }

    #[test]
    fn test_rejects_negative_stiffness() {
        let err = particle_builder()
            .contact(ContactParameters::penalty(PenaltyParams::spring(-1.0)))
            .finalize()
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
