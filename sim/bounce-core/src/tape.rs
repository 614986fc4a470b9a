//! Reverse-mode differentiation tape.
//!
//! A [`Tape`] records one forward rollout as a list of operations, each with
//! a snapshot of the values it read. [`Tape::backward`] walks the list in
//! reverse and accumulates the adjoint of every buffer the rollout read.
//!
//! # Lifecycle
//!
//! ```text
//! record ──▶ backward ──▶ gradient_of ...
//!               ▲    │
//!               │    ▼
//!        reset_accumulators        reset ──▶ record ...
//! ```
//!
//! A tape refuses to record over old operations and refuses to run a second
//! reverse pass over un-reset gradients. Silent accumulation across uses is
//! therefore impossible.
//!
//! # Force buffers
//!
//! `accumulated_force` is cleared at the start of every step and the clear
//! is not recorded. Its gradient is the sensitivity of the objective to the
//! value the integrator read, after contact forces were added.

use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;
use tracing::debug;

use bounce_types::{BufferId, Objective, Result, SimError};

use crate::{IntegratorStrategy, Rollout, Scene, StepInputs};

/// One recorded operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TapeOp {
    /// Pre-step contact pass: `f_i += contact(x_i, v_i)`.
    Collide {
        state: usize,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    },
    /// Integrator step `i -> i + 1`.
    Step {
        from: usize,
        to: usize,
        dt: f64,
        has_control_channel: bool,
        inputs: StepInputs,
    },
    /// Objective evaluated on the terminal position.
    TerminalLoss {
        state: usize,
        position: Vector3<f64>,
        objective: Objective,
    },
}

impl TapeOp {
    /// Buffers this operation reads.
    fn reads(&self) -> impl Iterator<Item = BufferId> {
        let mut ids = [None; 4];
        match *self {
            Self::Collide { state, .. } => {
                ids[0] = Some(BufferId::position(state));
                ids[1] = Some(BufferId::velocity(state));
                ids[2] = Some(BufferId::accumulated_force(state));
            }
            Self::Step {
                from,
                has_control_channel,
                ..
            } => {
                ids[0] = Some(BufferId::position(from));
                ids[1] = Some(BufferId::velocity(from));
                ids[2] = Some(BufferId::accumulated_force(from));
                if has_control_channel {
                    ids[3] = Some(BufferId::external_force(from));
                }
            }
            Self::TerminalLoss { state, .. } => {
                ids[0] = Some(BufferId::position(state));
            }
        }
        ids.into_iter().flatten()
    }
}

/// Dynamics the recorded rollout ran with.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Recording {
    integrator: IntegratorStrategy,
    scene: Scene,
    loss: f64,
}

/// Record of one rollout, sufficient for a reverse pass.
///
/// # Example
///
/// ```
/// use bounce_core::{IntegratorStrategy, Rollout, Tape};
/// use bounce_types::{BufferId, ExperimentConfig};
///
/// let config = ExperimentConfig::bounce_once();
/// let mut rollout = Rollout::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
///
/// let mut tape = Tape::new();
/// tape.record(&mut rollout).unwrap();
/// tape.backward().unwrap();
///
/// let dl_dx0 = tape.gradient_of(BufferId::position(0)).unwrap();
/// assert!(dl_dx0.y.is_finite());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Tape {
    ops: Vec<TapeOp>,
    reads: HashSet<BufferId>,
    recording: Option<Recording>,
    gradients: HashMap<BufferId, Vector3<f64>>,
    backward_run: bool,
}

impl Tape {
    /// Create an empty tape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Objective value of the recorded rollout.
    #[must_use]
    pub fn loss(&self) -> Option<f64> {
        self.recording.map(|r| r.loss)
    }

    /// Whether a reverse pass has populated the gradients.
    #[must_use]
    pub fn has_gradients(&self) -> bool {
        self.backward_run
    }

    /// Run `rollout` once, recording every operation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TapeNotReset`] if the tape already holds a
    /// recording, or any error of [`Rollout::compute_loss`].
    pub fn record(&mut self, rollout: &mut Rollout) -> Result<f64> {
        if !self.ops.is_empty() || self.backward_run {
            return Err(SimError::TapeNotReset);
        }
        let loss = match rollout.run(Some(&mut *self)) {
            Ok(loss) => loss,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        self.recording = Some(Recording {
            integrator: *rollout.integrator(),
            scene: *rollout.scene(),
            loss,
        });
        debug!(ops = self.ops.len(), buffers = self.reads.len(), loss, "tape recorded");
        Ok(loss)
    }

    pub(crate) fn push(&mut self, op: TapeOp) {
        self.reads.extend(op.reads());
        self.ops.push(op);
    }

    /// Reverse pass seeded with `∂L/∂L = 1`.
    ///
    /// # Errors
    ///
    /// - [`SimError::EmptyTape`] if nothing was recorded.
    /// - [`SimError::TapeNotReset`] if gradients from an earlier pass have not
    ///   been cleared with [`reset_accumulators`](Self::reset_accumulators).
    pub fn backward(&mut self) -> Result<()> {
        let Some(recording) = self.recording else {
            return Err(SimError::EmptyTape);
        };
        if self.backward_run {
            return Err(SimError::TapeNotReset);
        }

        let Recording {
            integrator, scene, ..
        } = recording;
        let adj = &mut self.gradients;

        for op in self.ops.iter().rev() {
            match *op {
                TapeOp::TerminalLoss {
                    state,
                    position,
                    objective,
                } => {
                    accumulate(adj, BufferId::position(state), objective.gradient(&position));
                }
                TapeOp::Step {
                    from,
                    to,
                    dt,
                    has_control_channel,
                    inputs,
                } => {
                    let adj_x = adjoint_of(adj, BufferId::position(to));
                    let adj_v = adjoint_of(adj, BufferId::velocity(to));
                    let step = integrator.adjoint(&scene, &inputs, dt, &adj_x, &adj_v);
                    accumulate(adj, BufferId::position(from), step.position);
                    accumulate(adj, BufferId::velocity(from), step.velocity);
                    accumulate(adj, BufferId::accumulated_force(from), step.force);
                    if has_control_channel {
                        accumulate(adj, BufferId::external_force(from), step.control);
                    }
                }
                TapeOp::Collide {
                    state,
                    position,
                    velocity,
                } => {
                    let adj_f = adjoint_of(adj, BufferId::accumulated_force(state));
                    let jac = scene.response.total_jacobian(
                        &scene.surfaces,
                        scene.radius,
                        &position,
                        &velocity,
                    );
                    accumulate(adj, BufferId::position(state), jac.position.transpose() * adj_f);
                    accumulate(adj, BufferId::velocity(state), jac.velocity.transpose() * adj_f);
                }
            }
        }

        self.backward_run = true;
        debug!(buffers = self.gradients.len(), "reverse pass complete");
        Ok(())
    }

    /// Gradient of the objective with respect to `buffer`.
    ///
    /// # Errors
    ///
    /// - [`SimError::BackwardNotRun`] before [`backward`](Self::backward).
    /// - [`SimError::UnrecordedInput`] if the rollout never read `buffer`.
    pub fn gradient_of(&self, buffer: BufferId) -> Result<Vector3<f64>> {
        if !self.backward_run {
            return Err(SimError::BackwardNotRun);
        }
        if !self.reads.contains(&buffer) {
            return Err(SimError::UnrecordedInput { buffer });
        }
        Ok(self
            .gradients
            .get(&buffer)
            .copied()
            .unwrap_or_else(Vector3::zeros))
    }

    /// Zero all gradients, keeping the recording for another reverse pass.
    pub fn reset_accumulators(&mut self) {
        self.gradients.clear();
        self.backward_run = false;
    }

    /// Discard the recording and all gradients.
    pub fn reset(&mut self) {
        self.ops.clear();
        self.reads.clear();
        self.recording = None;
        self.reset_accumulators();
    }
}

fn adjoint_of(adj: &HashMap<BufferId, Vector3<f64>>, id: BufferId) -> Vector3<f64> {
    adj.get(&id).copied().unwrap_or_else(Vector3::zeros)
}

fn accumulate(adj: &mut HashMap<BufferId, Vector3<f64>>, id: BufferId, g: Vector3<f64>) {
    *adj.entry(id).or_insert_with(Vector3::zeros) += g;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bounce_types::ExperimentConfig;

    fn rollout(config: &ExperimentConfig, integrator: IntegratorStrategy) -> Rollout {
        Rollout::from_config(config, integrator).unwrap()
    }

    fn free_flight() -> ExperimentConfig {
        let mut config = ExperimentConfig::bounce_once();
        config.init_vel = [1.0, 2.0, 0.0];
        config.gravity = [0.0, -9.80665, 0.0];
        config.init_pos = [0.0, 5.0, 0.0];
        config
    }

    #[test]
    fn test_free_flight_gradients() {
        let mut rollout = rollout(&free_flight(), IntegratorStrategy::SymplecticPenalty);
        let mut tape = Tape::new();
        tape.record(&mut rollout).unwrap();
        tape.backward().unwrap();

        // y_T = y0 + vy0 T + ..., so ∂y_T/∂y0 = 1 and ∂y_T/∂vy0 = T.
        let dx = tape.gradient_of(BufferId::position(0)).unwrap();
        let dv = tape.gradient_of(BufferId::velocity(0)).unwrap();
        assert_relative_eq!(dx, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(dv.y, 1.0, epsilon = 1e-9);
        assert_relative_eq!(dv.x, 0.0, epsilon = 1e-12);

        // Force at state 0 acts over all 480 steps: ∂y_T/∂u0 = T dt / m.
        let du = tape.gradient_of(BufferId::external_force(0)).unwrap();
        assert_relative_eq!(du.y, 1.0 / 480.0, epsilon = 1e-12);
    }

    #[test]
    fn test_loss_matches_compute_loss() {
        let config = ExperimentConfig::bounce_once();
        let mut a = rollout(&config, IntegratorStrategy::SymplecticPenalty);
        let mut b = rollout(&config, IntegratorStrategy::SymplecticPenalty);
        let mut tape = Tape::new();
        let recorded = tape.record(&mut a).unwrap();
        assert_eq!(recorded.to_bits(), b.compute_loss().unwrap().to_bits());
        assert_eq!(tape.loss(), Some(recorded));
    }

    #[test]
    fn test_gradient_before_backward() {
        let mut rollout = rollout(&free_flight(), IntegratorStrategy::SymplecticPenalty);
        let mut tape = Tape::new();
        tape.record(&mut rollout).unwrap();
        assert_eq!(
            tape.gradient_of(BufferId::position(0)).unwrap_err(),
            SimError::BackwardNotRun
        );
    }

    #[test]
    fn test_backward_on_empty_tape() {
        assert_eq!(Tape::new().backward().unwrap_err(), SimError::EmptyTape);
    }

    #[test]
    fn test_unrecorded_input() {
        let config = free_flight().into_soft_contact();
        let mut rollout = rollout(&config, IntegratorStrategy::SemiImplicit);
        let mut tape = Tape::new();
        tape.record(&mut rollout).unwrap();
        tape.backward().unwrap();

        let err = tape.gradient_of(BufferId::external_force(0)).unwrap_err();
        assert_eq!(
            err,
            SimError::UnrecordedInput {
                buffer: BufferId::external_force(0)
            }
        );
        assert!(tape.gradient_of(BufferId::position(9999)).is_err());
    }

    #[test]
    fn test_reuse_without_reset_is_rejected() {
        let mut rollout = rollout(&free_flight(), IntegratorStrategy::SymplecticPenalty);
        let mut tape = Tape::new();
        tape.record(&mut rollout).unwrap();
        assert_eq!(tape.record(&mut rollout).unwrap_err(), SimError::TapeNotReset);

        tape.backward().unwrap();
        assert_eq!(tape.backward().unwrap_err(), SimError::TapeNotReset);
    }

    #[test]
    fn test_reset_accumulators_reproduces_gradient() {
        let mut rollout = rollout(&ExperimentConfig::bounce_once(), IntegratorStrategy::SymplecticPenalty);
        let mut tape = Tape::new();
        tape.record(&mut rollout).unwrap();
        tape.backward().unwrap();
        let first = tape.gradient_of(BufferId::velocity(0)).unwrap();

        // Perturbed re-runs must not leak into the recorded snapshot.
        rollout
            .set_buffer_component(BufferId::position(0), 1, 3.0)
            .unwrap();
        rollout.compute_loss().unwrap();

        tape.reset_accumulators();
        tape.backward().unwrap();
        let second = tape.gradient_of(BufferId::velocity(0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_allows_new_recording() {
        let mut rollout = rollout(&free_flight(), IntegratorStrategy::SymplecticPenalty);
        let mut tape = Tape::new();
        tape.record(&mut rollout).unwrap();
        tape.backward().unwrap();
        tape.reset();
        assert!(tape.is_empty());
        assert!(!tape.has_gradients());
        tape.record(&mut rollout).unwrap();
    }

    #[test]
    fn test_library_force_gradient_through_collide() {
        let config = ExperimentConfig::bounce_once().into_soft_contact();
        let mut rollout = rollout(&config, IntegratorStrategy::SemiImplicit);
        let mut tape = Tape::new();
        tape.record(&mut rollout).unwrap();
        tape.backward().unwrap();

        let df = tape.gradient_of(rollout.control_buffer()).unwrap();
        assert!(df.y.is_finite());
        assert!(df.y != 0.0);
    }
}
