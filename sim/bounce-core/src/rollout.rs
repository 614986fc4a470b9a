//! The rollout engine.
//!
//! A [`Rollout`] owns one trajectory store and drives it through `steps`
//! integrator calls, then reduces the terminal position to the objective.
//! It is re-run in place by the finite-difference and zeroth-order
//! estimators, so every run reads state 0 as it currently is and overwrites
//! states `1..=steps`.

use nalgebra::Vector3;
use tracing::debug;

use bounce_contact::collide;
use bounce_types::{
    BufferId, ExperimentConfig, Model, Objective, Result, SimError, SimulationState,
};

use crate::tape::TapeOp;
use crate::{IntegratorStrategy, Scene, StepInputs, Tape, TrajectoryStore};

/// One particle rollout with its pre-allocated trajectory.
#[derive(Debug, Clone)]
pub struct Rollout {
    model: Model,
    integrator: IntegratorStrategy,
    scene: Scene,
    store: TrajectoryStore,
    objective: Objective,
    steps: usize,
    dt: f64,
    loss: f64,
}

impl Rollout {
    /// Build a rollout of `steps` steps of size `dt`.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidTimestep`] if `dt` is not positive and finite.
    /// - [`SimError::InvalidConfig`] for zero steps or invalid model parameters.
    /// - [`SimError::ConfigurationMismatch`] if the model's contact constants
    ///   do not belong to the integrator's family.
    pub fn new(
        model: Model,
        integrator: IntegratorStrategy,
        objective: Objective,
        steps: usize,
        dt: f64,
    ) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidTimestep(dt));
        }
        if steps == 0 {
            return Err(SimError::invalid_config("rollout needs at least one step"));
        }
        model.validate()?;
        integrator.validate()?;
        let scene = Scene::new(&model, &integrator)?;

        let mut store = TrajectoryStore::allocate(steps + 1, integrator.has_control_channel());
        *store.state_mut(0)? = model.initial_state(integrator.has_control_channel());

        debug!(
            integrator = integrator.name(),
            steps,
            dt,
            surfaces = scene.surfaces.len(),
            "rollout allocated"
        );

        Ok(Self {
            model,
            integrator,
            scene,
            store,
            objective,
            steps,
            dt,
            loss: 0.0,
        })
    }

    /// Build a rollout from an experiment configuration.
    pub fn from_config(config: &ExperimentConfig, integrator: IntegratorStrategy) -> Result<Self> {
        Self::new(
            config.model()?,
            integrator,
            config.objective(),
            config.steps,
            config.dt(),
        )
    }

    /// The scene model.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The integrator strategy.
    #[must_use]
    pub fn integrator(&self) -> &IntegratorStrategy {
        &self.integrator
    }

    /// Resolved per-step constants.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The terminal objective.
    #[must_use]
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Number of integrator steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Step size.
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Objective value of the last run.
    #[must_use]
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// The trajectory store.
    #[must_use]
    pub fn store(&self) -> &TrajectoryStore {
        &self.store
    }

    /// State `index`.
    pub fn state(&self, index: usize) -> Result<&SimulationState> {
        self.store.state(index)
    }

    /// Overwrite the initial position and velocity.
    ///
    /// The model is updated too, so [`reinitialize`](Self::reinitialize)
    /// restores these values.
    pub fn set_initial_conditions(&mut self, position: Vector3<f64>, velocity: Vector3<f64>) {
        self.model.particle.position = position;
        self.model.particle.velocity = velocity;
        if let Ok(state) = self.store.state_mut(0) {
            state.position = position;
            state.velocity = velocity;
        }
    }

    /// Zero the whole trajectory in place and reload state 0 from the model.
    pub fn reinitialize(&mut self) {
        self.store.reset();
        if let Ok(state) = self.store.state_mut(0) {
            *state = self.model.initial_state(self.integrator.has_control_channel());
        }
    }

    /// The buffer that carries the control input.
    ///
    /// Custom integrators read `external_force` of state 0. Library
    /// integrators have no control channel; their stand-in is the
    /// accumulated force of state 1.
    #[must_use]
    pub fn control_buffer(&self) -> BufferId {
        if self.integrator.has_control_channel() {
            BufferId::external_force(0)
        } else {
            BufferId::accumulated_force(1)
        }
    }

    /// Read one buffer.
    pub fn buffer(&self, id: BufferId) -> Result<Vector3<f64>> {
        self.store.buffer(id).copied()
    }

    /// Read one component of a buffer.
    pub fn buffer_component(&self, id: BufferId, component: usize) -> Result<f64> {
        check_component(component)?;
        Ok(self.store.buffer(id)?[component])
    }

    /// Write one component of a buffer.
    pub fn set_buffer_component(&mut self, id: BufferId, component: usize, value: f64) -> Result<()> {
        check_component(component)?;
        self.store.buffer_mut(id)?[component] = value;
        Ok(())
    }

    /// Positions of every state, in order.
    #[must_use]
    pub fn trajectory(&self) -> Vec<Vector3<f64>> {
        self.store.iter().map(|s| s.position).collect()
    }

    /// Number of separate intervals during which the particle penetrates a surface.
    #[must_use]
    pub fn contact_episodes(&self) -> usize {
        let mut episodes = 0;
        let mut touching = false;
        for state in self.store.iter() {
            let now = self
                .scene
                .surfaces
                .iter()
                .any(|(_, s)| s.penetration(&state.position, self.scene.radius) > 0.0);
            if now && !touching {
                episodes += 1;
            }
            touching = now;
        }
        episodes
    }

    /// Run the rollout and return the objective.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Diverged`] if the terminal state or the objective
    /// is not finite.
    pub fn compute_loss(&mut self) -> Result<f64> {
        self.run(None)
    }

    /// Forward pass, optionally recording into `tape`.
    pub(crate) fn run(&mut self, mut tape: Option<&mut Tape>) -> Result<f64> {
        self.loss = 0.0;
        let scene = self.scene;

        for i in 0..self.steps {
            let (from, to) = self.store.pair_mut(i)?;
            from.clear_forces();

            if self.integrator.is_library_adapter() {
                let contacts = collide(
                    &scene.response,
                    &scene.surfaces,
                    scene.radius,
                    &from.position,
                    &from.velocity,
                );
                if let Some(tape) = tape.as_deref_mut() {
                    tape.push(TapeOp::Collide {
                        state: i,
                        position: from.position,
                        velocity: from.velocity,
                    });
                }
                from.accumulated_force += contacts.total_force();
            }

            if let Some(tape) = tape.as_deref_mut() {
                tape.push(TapeOp::Step {
                    from: i,
                    to: i + 1,
                    dt: self.dt,
                    has_control_channel: from.has_control_channel(),
                    inputs: StepInputs::capture(from),
                });
            }
            self.integrator.step(&scene, from, to, self.dt);
        }

        let terminal = self.store.last()?;
        if !terminal.is_finite() {
            return Err(SimError::diverged(format!(
                "non-finite terminal state after {} steps",
                self.steps
            )));
        }
        if let Some(tape) = tape.as_deref_mut() {
            tape.push(TapeOp::TerminalLoss {
                state: self.steps,
                position: terminal.position,
                objective: self.objective,
            });
        }

        self.loss += self.objective.evaluate(&terminal.position);
        if !self.loss.is_finite() {
            return Err(SimError::diverged("non-finite objective"));
        }
        debug!(
            integrator = self.integrator.name(),
            loss = self.loss,
            "rollout complete"
        );
        Ok(self.loss)
    }
}

fn check_component(component: usize) -> Result<()> {
    if component < 3 {
        Ok(())
    } else {
        Err(SimError::ComponentOutOfRange(component))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bounce_once(integrator: IntegratorStrategy) -> Rollout {
        let mut config = ExperimentConfig::bounce_once();
        if integrator.is_library_adapter() {
            config = config.into_soft_contact();
        }
        Rollout::from_config(&config, integrator).unwrap()
    }

    #[test]
    fn test_allocates_steps_plus_one() {
        let rollout = bounce_once(IntegratorStrategy::SymplecticPenalty);
        assert_eq!(rollout.store().len(), 481);
        assert!(rollout.store().has_control_channel());
        assert_eq!(
            rollout.state(0).unwrap().position,
            Vector3::new(0.0, 1.0, 0.0)
        );
    }

    #[test]
    fn test_library_states_have_no_control_channel() {
        let rollout = bounce_once(IntegratorStrategy::SemiImplicit);
        assert!(!rollout.store().has_control_channel());
        assert_eq!(rollout.control_buffer(), BufferId::accumulated_force(1));
    }

    #[test]
    fn test_mismatch_detected_at_construction() {
        let config = ExperimentConfig::bounce_once();
        let err = Rollout::from_config(&config, IntegratorStrategy::SemiImplicit).unwrap_err();
        assert!(matches!(err, SimError::ConfigurationMismatch { .. }));

        let soft = config.into_soft_contact();
        let err = Rollout::from_config(&soft, IntegratorStrategy::SymplecticPenalty).unwrap_err();
        assert!(matches!(err, SimError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn test_invalid_timestep() {
        let model = ExperimentConfig::bounce_once().model().unwrap();
        let err = Rollout::new(
            model,
            IntegratorStrategy::SymplecticPenalty,
            Objective::Height,
            10,
            0.0,
        )
        .unwrap_err();
        assert_eq!(err, SimError::InvalidTimestep(0.0));
    }

    #[test]
    fn test_free_flight_matches_closed_form() {
        let mut config = ExperimentConfig::bounce_once();
        config.init_vel = [0.0, 1.0, 0.0];
        let mut rollout = Rollout::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
        let loss = rollout.compute_loss().unwrap();
        assert_relative_eq!(loss, 2.0, epsilon = 1e-9);
        assert_eq!(rollout.contact_episodes(), 0);
    }

    #[test]
    fn test_bounce_reverses_velocity() {
        for integrator in [
            IntegratorStrategy::SemiImplicit,
            IntegratorStrategy::SymplecticPenalty,
            IntegratorStrategy::position_based(),
        ] {
            let mut rollout = bounce_once(integrator);
            rollout.compute_loss().unwrap();
            let last = rollout.state(rollout.steps()).unwrap();
            assert!(last.velocity.y > 0.0, "{} did not bounce", integrator.name());
            assert_eq!(rollout.contact_episodes(), 1);
        }
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let mut rollout = bounce_once(IntegratorStrategy::SymplecticPenalty);
        let first = rollout.compute_loss().unwrap();
        rollout.reinitialize();
        let second = rollout.compute_loss().unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_control_force_changes_outcome() {
        let mut rollout = bounce_once(IntegratorStrategy::SymplecticPenalty);
        let base = rollout.compute_loss().unwrap();
        rollout
            .set_buffer_component(rollout.control_buffer(), 1, -500.0)
            .unwrap();
        // A downward kick at step 0 means a faster bounce and a higher finish.
        let pushed = rollout.compute_loss().unwrap();
        assert!(pushed > base + 0.5);
    }

    #[test]
    fn test_buffer_component_errors() {
        let mut rollout = bounce_once(IntegratorStrategy::SemiImplicit);
        assert_eq!(
            rollout
                .set_buffer_component(BufferId::position(0), 3, 1.0)
                .unwrap_err(),
            SimError::ComponentOutOfRange(3)
        );
        assert_eq!(
            rollout.buffer(BufferId::external_force(0)).unwrap_err(),
            SimError::MissingControlChannel { state: 0 }
        );
    }

    #[test]
    fn test_divergence_reported() {
        let mut rollout = bounce_once(IntegratorStrategy::SymplecticPenalty);
        rollout
            .set_buffer_component(BufferId::velocity(0), 0, f64::NAN)
            .unwrap();
        assert!(rollout.compute_loss().unwrap_err().is_diverged());
    }

    #[test]
    fn test_trajectory_length() {
        let mut rollout = bounce_once(IntegratorStrategy::position_based());
        rollout.compute_loss().unwrap();
        let path = rollout.trajectory();
        assert_eq!(path.len(), 481);
        assert_eq!(path[0], Vector3::new(0.0, 1.0, 0.0));
    }
}
