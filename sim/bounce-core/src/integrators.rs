//! Integrator strategies and their reverse-mode adjoints.
//!
//! Every strategy advances one [`SimulationState`] to the next. They differ
//! in where contact force comes from and whether the state carries an
//! external control channel:
//!
//! | Strategy | Contact | Control channel |
//! |----------|---------|-----------------|
//! | [`IntegratorStrategy::SemiImplicit`] | soft law, pre-step `collide` | no |
//! | [`IntegratorStrategy::SymplecticPenalty`] | penalty law inside the step | yes |
//! | [`IntegratorStrategy::PositionBased`] | compliant position projection | yes |
//!
//! # Example
//!
//! ```
//! use bounce_core::{IntegratorStrategy, Scene};
//! use bounce_types::{ContactParameters, ModelBuilder, PenaltyParams, SimulationState};
//! use nalgebra::Vector3;
//!
//! let model = ModelBuilder::new()
//!     .add_particle(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros(), 1.0)
//!     .contact(ContactParameters::penalty(PenaltyParams::spring(1.0e4)))
//!     .finalize()
//!     .unwrap();
//! let integrator = IntegratorStrategy::SymplecticPenalty;
//! let scene = Scene::new(&model, &integrator).unwrap();
//!
//! let from = model.initial_state(true);
//! let mut to = SimulationState::zeroed(true);
//! integrator.step(&scene, &from, &mut to, 0.01);
//!
//! // Falling under gravity
//! assert!(to.velocity.y < 0.0);
//! ```

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use bounce_contact::{ContactFamily, Surface};
use bounce_types::{Result, SimError, SimulationState};

use crate::Scene;

/// Stepping policy for one rollout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegratorStrategy {
    /// Library-style semi-implicit Euler.
    ///
    /// Contact forces are accumulated by a `collide` pass before the step.
    SemiImplicit,
    /// Custom symplectic Euler with an in-step penalty contact force and an
    /// external control force.
    #[default]
    SymplecticPenalty,
    /// Custom position-based step: predict with external forces, then
    /// project the predicted position out of each penetrated surface.
    PositionBased {
        /// Fraction of the compliant correction applied per projection.
        relaxation: f64,
        /// Projection sweeps per step.
        iterations: usize,
    },
}

/// Snapshot of the buffers a step reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInputs {
    /// Position of the source state.
    pub position: Vector3<f64>,
    /// Velocity of the source state.
    pub velocity: Vector3<f64>,
    /// Accumulated force of the source state.
    pub force: Vector3<f64>,
    /// External control force, zero without a control channel.
    pub control: Vector3<f64>,
}

impl StepInputs {
    /// Capture the inputs of `state`.
    #[must_use]
    pub fn capture(state: &SimulationState) -> Self {
        Self {
            position: state.position,
            velocity: state.velocity,
            force: state.accumulated_force,
            control: state.external_force.unwrap_or_else(Vector3::zeros),
        }
    }
}

/// Adjoints of the step inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepAdjoint {
    /// `∂L/∂x_i`.
    pub position: Vector3<f64>,
    /// `∂L/∂v_i`.
    pub velocity: Vector3<f64>,
    /// `∂L/∂f_i`.
    pub force: Vector3<f64>,
    /// `∂L/∂u_i`.
    pub control: Vector3<f64>,
}

impl IntegratorStrategy {
    /// Position-based step with full relaxation and two projection sweeps.
    #[must_use]
    pub fn position_based() -> Self {
        Self::PositionBased {
            relaxation: 1.0,
            iterations: 2,
        }
    }

    /// Stable identifier used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SemiImplicit => "semi_implicit",
            Self::SymplecticPenalty => "symplectic_penalty",
            Self::PositionBased { .. } => "position_based",
        }
    }

    /// Whether states carry an `external_force` buffer.
    #[must_use]
    pub fn has_control_channel(&self) -> bool {
        !self.is_library_adapter()
    }

    /// Whether contacts are resolved by a pre-step `collide` pass.
    #[must_use]
    pub fn is_library_adapter(&self) -> bool {
        matches!(self, Self::SemiImplicit)
    }

    /// Contact constants this strategy expects.
    #[must_use]
    pub fn contact_family(&self) -> ContactFamily {
        if self.is_library_adapter() {
            ContactFamily::Soft
        } else {
            ContactFamily::Penalty
        }
    }

    /// Check strategy-specific parameters.
    pub fn validate(&self) -> Result<()> {
        if let Self::PositionBased {
            relaxation,
            iterations,
        } = *self
        {
            if !(relaxation > 0.0 && relaxation <= 1.0) {
                return Err(SimError::invalid_config(format!(
                    "relaxation must be in (0, 1], got {relaxation}"
                )));
            }
            if iterations == 0 {
                return Err(SimError::invalid_config(
                    "position-based integrator needs at least one iteration",
                ));
            }
        }
        Ok(())
    }

    /// Advance `from` by `dt`, writing position and velocity of `to`.
    ///
    /// `to.accumulated_force` is cleared first. `to.external_force` is left
    /// untouched.
    pub fn step(&self, scene: &Scene, from: &SimulationState, to: &mut SimulationState, dt: f64) {
        to.clear_forces();
        let inputs = StepInputs::capture(from);
        let (position, velocity) = self.advance(scene, &inputs, dt);
        to.position = position;
        to.velocity = velocity;
    }

    /// Pure step map `(x, v, f, u) -> (x', v')`.
    #[must_use]
    pub fn advance(
        &self,
        scene: &Scene,
        inputs: &StepInputs,
        dt: f64,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let w = scene.inv_mass;
        match *self {
            Self::SemiImplicit => {
                let v = inputs.velocity + (inputs.force * w + scene.gravity) * dt;
                (inputs.position + v * dt, v)
            }
            Self::SymplecticPenalty => {
                let total = inputs.force
                    + inputs.control
                    + scene.contact_force(&inputs.position, &inputs.velocity);
                let v = inputs.velocity + (total * w + scene.gravity) * dt;
                (inputs.position + v * dt, v)
            }
            Self::PositionBased {
                relaxation,
                iterations,
            } => {
                let v_pred = inputs.velocity
                    + ((inputs.force + inputs.control) * w + scene.gravity) * dt;
                let mut x = inputs.position + v_pred * dt;
                let s = projection_factor(scene, relaxation, dt);
                for _ in 0..iterations {
                    for (_, surface) in scene.surfaces.iter() {
                        project(surface, scene.radius, s, &mut x);
                    }
                }
                (x, (x - inputs.position) / dt)
            }
        }
    }

    /// Reverse-mode adjoint of [`advance`](Self::advance).
    ///
    /// Given `∂L/∂x'` and `∂L/∂v'`, returns `∂L` with respect to each input.
    #[must_use]
    pub fn adjoint(
        &self,
        scene: &Scene,
        inputs: &StepInputs,
        dt: f64,
        adj_position: &Vector3<f64>,
        adj_velocity: &Vector3<f64>,
    ) -> StepAdjoint {
        let w = scene.inv_mass;
        match *self {
            Self::SemiImplicit => {
                let tv = adj_velocity + adj_position * dt;
                StepAdjoint {
                    position: *adj_position,
                    velocity: tv,
                    force: tv * (dt * w),
                    control: Vector3::zeros(),
                }
            }
            Self::SymplecticPenalty => {
                let tv = adj_velocity + adj_position * dt;
                let adj_total = tv * (dt * w);
                let jac = scene.response.total_jacobian(
                    &scene.surfaces,
                    scene.radius,
                    &inputs.position,
                    &inputs.velocity,
                );
                StepAdjoint {
                    position: adj_position + jac.position.transpose() * adj_total,
                    velocity: tv + jac.velocity.transpose() * adj_total,
                    force: adj_total,
                    control: adj_total,
                }
            }
            Self::PositionBased {
                relaxation,
                iterations,
            } => {
                let s = projection_factor(scene, relaxation, dt);

                // Replay the projections to find which ones were active.
                let v_pred = inputs.velocity
                    + ((inputs.force + inputs.control) * w + scene.gravity) * dt;
                let mut x = inputs.position + v_pred * dt;
                let mut active: Vec<Vector3<f64>> = Vec::new();
                for _ in 0..iterations {
                    for (_, surface) in scene.surfaces.iter() {
                        if project(surface, scene.radius, s, &mut x) {
                            active.push(surface.normal);
                        }
                    }
                }

                // v' = (x' - x) / dt
                let mut adj_x = adj_position + adj_velocity / dt;
                for n in active.iter().rev() {
                    adj_x -= n * (s * n.dot(&adj_x));
                }
                let adj_total = adj_x * (dt * dt * w);
                StepAdjoint {
                    position: adj_x - adj_velocity / dt,
                    velocity: adj_x * dt,
                    force: adj_total,
                    control: adj_total,
                }
            }
        }
    }
}

/// Fraction of the penetration removed by one compliant projection.
///
/// With compliance `1/k`, the XPBD update for a single particle against a
/// static plane is `Δx = n d (k dt² w) / (k dt² w + 1)`.
fn projection_factor(scene: &Scene, relaxation: f64, dt: f64) -> f64 {
    let stiffness = scene.response.stiffness() * dt * dt * scene.inv_mass;
    relaxation * stiffness / (stiffness + 1.0)
}

/// Push `x` out of `surface` by `s` times its penetration. Returns whether it moved.
fn project(surface: &Surface, radius: f64, s: f64, x: &mut Vector3<f64>) -> bool {
    let depth = surface.penetration(x, radius);
    if depth > 0.0 {
        *x += surface.normal * (depth * s);
        true
    } else {
        false
    }
}
