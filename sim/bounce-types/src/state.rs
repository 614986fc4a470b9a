//! Per-step particle state and buffer addressing.
//!
//! A rollout is a sequence of [`SimulationState`] slots. Every 3-vector a
//! state owns is a *buffer* that can be perturbed by the finite-difference
//! checker or differentiated by the tape; [`BufferId`] names one of them.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One time slice of a particle rollout.
///
/// Positions use the Y-up convention: the ground plane is horizontal in XZ
/// and gravity (when enabled) points along `-Y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Particle position (m).
    pub position: Vector3<f64>,
    /// Particle velocity (m/s).
    pub velocity: Vector3<f64>,
    /// Forces accumulated for the current step (N). Cleared every step.
    pub accumulated_force: Vector3<f64>,
    /// Exogenous control force (N), present only for integrators with a
    /// control channel.
    pub external_force: Option<Vector3<f64>>,
}

impl SimulationState {
    /// Create a zero-initialized state.
    #[must_use]
    pub fn zeroed(has_control_channel: bool) -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            accumulated_force: Vector3::zeros(),
            external_force: has_control_channel.then(Vector3::zeros),
        }
    }

    /// Whether this state carries an external-force channel.
    #[must_use]
    pub fn has_control_channel(&self) -> bool {
        self.external_force.is_some()
    }

    /// Zero the accumulated force.
    pub fn clear_forces(&mut self) {
        self.accumulated_force = Vector3::zeros();
    }

    /// Zero every buffer in place. The control channel stays allocated.
    pub fn reset(&mut self) {
        self.position = Vector3::zeros();
        self.velocity = Vector3::zeros();
        self.accumulated_force = Vector3::zeros();
        if let Some(u) = self.external_force.as_mut() {
            *u = Vector3::zeros();
        }
    }

    /// Immutable access to one buffer.
    ///
    /// Returns `None` for [`BufferField::ExternalForce`] on a state without
    /// a control channel.
    #[must_use]
    pub fn buffer(&self, field: BufferField) -> Option<&Vector3<f64>> {
        match field {
            BufferField::Position => Some(&self.position),
            BufferField::Velocity => Some(&self.velocity),
            BufferField::AccumulatedForce => Some(&self.accumulated_force),
            BufferField::ExternalForce => self.external_force.as_ref(),
        }
    }

    /// Mutable access to one buffer.
    pub fn buffer_mut(&mut self, field: BufferField) -> Option<&mut Vector3<f64>> {
        match field {
            BufferField::Position => Some(&mut self.position),
            BufferField::Velocity => Some(&mut self.velocity),
            BufferField::AccumulatedForce => Some(&mut self.accumulated_force),
            BufferField::ExternalForce => self.external_force.as_mut(),
        }
    }

    /// Check that position and velocity are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|x| x.is_finite()) && self.velocity.iter().all(|x| x.is_finite())
    }
}

/// Which buffer of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferField {
    /// [`SimulationState::position`].
    Position,
    /// [`SimulationState::velocity`].
    Velocity,
    /// [`SimulationState::accumulated_force`].
    AccumulatedForce,
    /// [`SimulationState::external_force`].
    ExternalForce,
}

impl BufferField {
    /// Lower-case name used in logs and error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Velocity => "velocity",
            Self::AccumulatedForce => "accumulated_force",
            Self::ExternalForce => "external_force",
        }
    }
}

/// Identity of one buffer within a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferId {
    /// Index of the owning state.
    pub state: usize,
    /// Which field of that state.
    pub field: BufferField,
}

impl BufferId {
    /// Create a buffer identity.
    #[must_use]
    pub const fn new(state: usize, field: BufferField) -> Self {
        Self { state, field }
    }

    /// Position of state `i`.
    #[must_use]
    pub const fn position(state: usize) -> Self {
        Self::new(state, BufferField::Position)
    }

    /// Velocity of state `i`.
    #[must_use]
    pub const fn velocity(state: usize) -> Self {
        Self::new(state, BufferField::Velocity)
    }

    /// Accumulated force of state `i`.
    #[must_use]
    pub const fn accumulated_force(state: usize) -> Self {
        Self::new(state, BufferField::AccumulatedForce)
    }

    /// External force of state `i`.
    #[must_use]
    pub const fn external_force(state: usize) -> Self {
        Self::new(state, BufferField::ExternalForce)
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "state[{}].{}", self.state, self.field.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_control_channel() {
        let plain = SimulationState::zeroed(false);
        assert!(!plain.has_control_channel());
        assert!(plain.buffer(BufferField::ExternalForce).is_none());

        let controlled = SimulationState::zeroed(true);
        assert!(controlled.has_control_channel());
        assert_eq!(
            controlled.buffer(BufferField::ExternalForce),
            Some(&Vector3::zeros())
        );
    }

    #[test]
    fn test_reset_keeps_channel() {
        let mut state = SimulationState::zeroed(true);
        state.position = Vector3::new(1.0, 2.0, 3.0);
        state.external_force = Some(Vector3::new(4.0, 0.0, 0.0));

        state.reset();

        assert_eq!(state.position, Vector3::zeros());
        assert_eq!(state.external_force, Some(Vector3::zeros()));
    }

    #[test]
    fn test_buffer_mut_writes_through() {
        let mut state = SimulationState::zeroed(false);
        state.buffer_mut(BufferField::Velocity).unwrap().y = 5.0;
        assert_eq!(state.velocity.y, 5.0);
    }

    #[test]
    fn test_is_finite() {
        let mut state = SimulationState::zeroed(false);
        assert!(state.is_finite());
        state.velocity.x = f64::NAN;
        assert!(!state.is_finite());
    }
}
