//! Experiment configuration.
//!
//! [`ExperimentConfig`] is the resolved configuration object every driver
//! works from. It deserializes from JSON with every field optional, so a
//! file only needs to name what differs from the preset it is merged onto.

use std::path::PathBuf;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    ContactParameters, Model, ModelBuilder, Objective, PenaltyParams, Result, SimError,
    SoftContactParams,
};

/// Resolved configuration for one experiment.
///
/// # Example
///
/// ```
/// use bounce_types::ExperimentConfig;
///
/// let config = ExperimentConfig::bounce_once();
/// assert_eq!(config.steps, 480);
/// assert!((config.dt() - 1.0 / 480.0).abs() < 1e-15);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Experiment name, used for output file names.
    pub name: String,
    /// Directory for produced artifacts.
    pub result_dir: PathBuf,
    /// Simulated horizon (s).
    pub simulation_time: f64,
    /// Number of integrator steps over the horizon.
    pub steps: usize,
    /// Finite-difference perturbation.
    pub eps: f64,
    /// Initial position.
    pub init_pos: [f64; 3],
    /// Initial velocity.
    pub init_vel: [f64; 3],
    /// Particle mass (kg).
    pub mass: f64,
    /// Particle radius (m).
    pub radius: f64,
    /// Gravity (m/s²).
    pub gravity: [f64; 3],
    /// Whether the ground plane exists.
    pub ground: bool,
    /// Ground plane height (m).
    pub ground_height: f64,
    /// Vertical wall position, if any.
    pub wall_x: Option<f64>,
    /// Target point. When set the objective is the negative squared
    /// distance to it, otherwise the final height.
    pub target: Option<[f64; 3]>,
    /// Penalty stiffness for custom integrators.
    pub customized_kn: Option<f64>,
    /// Penalty damping for custom integrators.
    pub customized_kd: f64,
    /// Penalty friction coefficient for custom integrators.
    pub customized_mu: f64,
    /// Soft-contact constants for library integrators.
    pub soft_contact: Option<SoftContactParams>,
    /// Samples per baseline angle when noise is enabled.
    pub num_samples: usize,
    /// Standard deviation of the launch-angle noise. `None` disables sampling.
    pub noise: Option<f64>,
    /// Launch speed `u` for angle sweeps (m/s).
    pub speed: f64,
    /// Number of baseline angles in a sweep.
    pub num_thetas: usize,
    /// Seed of the sweep's random stream.
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::bounce_once()
    }
}

impl ExperimentConfig {
    /// Single bounce on the ground, zero gravity, final-height objective.
    #[must_use]
    pub fn bounce_once() -> Self {
        Self {
            name: "bounce_once".to_string(),
            result_dir: PathBuf::from("results"),
            simulation_time: 1.0,
            steps: 480,
            eps: 1e-4,
            init_pos: [0.0, 1.0, 0.0],
            init_vel: [0.0, -5.0, 0.0],
            mass: 1.0,
            radius: 0.1,
            gravity: [0.0, 0.0, 0.0],
            ground: true,
            ground_height: 0.0,
            wall_x: None,
            target: None,
            customized_kn: Some(1.0e4),
            customized_kd: 0.0,
            customized_mu: 0.0,
            soft_contact: None,
            num_samples: 1,
            noise: None,
            speed: 5.0,
            num_thetas: 10,
            seed: 123,
        }
    }

    /// Ground and wall with a target point, for launch-angle sweeps.
    #[must_use]
    pub fn ground_wall() -> Self {
        Self {
            name: "ground_wall".to_string(),
            init_pos: [-1.0, 1.0, 0.0],
            init_vel: [5.0, 0.0, 0.0],
            gravity: [0.0, -9.80665, 0.0],
            wall_x: Some(1.0),
            target: Some([-2.0, 1.0, 0.0]),
            num_samples: 2,
            noise: Some(0.2),
            seed: 0,
            ..Self::bounce_once()
        }
    }

    /// Integrator timestep: `simulation_time / steps`.
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.simulation_time / self.steps as f64
    }

    /// Number of noisy samples per baseline angle (1 when noise is disabled).
    #[must_use]
    pub fn samples_per_theta(&self) -> usize {
        if self.noise.is_some() {
            self.num_samples
        } else {
            1
        }
    }

    /// Set the initial velocity from a launch angle in the XY plane.
    #[must_use]
    pub fn with_launch_angle(mut self, theta: f64, speed: f64) -> Self {
        self.init_vel = [theta.cos() * speed, theta.sin() * speed, 0.0];
        self
    }

    /// Use library-style soft contact instead of the penalty constants.
    #[must_use]
    pub fn with_soft_contact(mut self, params: SoftContactParams) -> Self {
        self.soft_contact = Some(params);
        self.customized_kn = None;
        self
    }

    /// Prepare the contact constants for library integrators.
    ///
    /// An existing soft block wins and `customized_kn` is dropped. Otherwise
    /// `customized_kn` becomes `ke` and the other soft constants keep their
    /// defaults.
    #[must_use]
    pub fn into_soft_contact(mut self) -> Self {
        if self.soft_contact.is_some() {
            self.customized_kn = None;
            return self;
        }
        let params = self
            .customized_kn
            .map_or_else(SoftContactParams::default, SoftContactParams::with_stiffness);
        self.with_soft_contact(params)
    }

    /// Contact constants as configured.
    #[must_use]
    pub fn contact_parameters(&self) -> ContactParameters {
        ContactParameters {
            penalty: self.customized_kn.map(|kn| {
                PenaltyParams::spring(kn)
                    .with_damping(self.customized_kd)
                    .with_friction(self.customized_mu)
            }),
            soft: self.soft_contact,
        }
    }

    /// Terminal objective implied by the configuration.
    #[must_use]
    pub fn objective(&self) -> Objective {
        match self.target {
            Some(target) => Objective::TargetDistance {
                target: Vector3::from(target),
            },
            None => Objective::Height,
        }
    }

    /// Build the scene model.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the resulting model is invalid.
    pub fn model(&self) -> Result<Model> {
        self.validate()?;
        let mut builder = ModelBuilder::new()
            .add_particle(
                Vector3::from(self.init_pos),
                Vector3::from(self.init_vel),
                self.mass,
            )
            .radius(self.radius)
            .gravity(Vector3::from(self.gravity))
            .contact(self.contact_parameters());
        builder = if self.ground {
            builder.ground(self.ground_height)
        } else {
            builder.no_ground()
        };
        if let Some(x) = self.wall_x {
            builder = builder.wall(x);
        }
        builder.finalize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(SimError::invalid_config("steps must be at least 1"));
        }
        if !(self.simulation_time.is_finite() && self.simulation_time > 0.0) {
            return Err(SimError::invalid_config(format!(
                "simulation_time must be positive, got {}",
                self.simulation_time
            )));
        }
        let dt = self.dt();
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidTimestep(dt));
        }
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(SimError::invalid_config(format!(
                "eps must be positive, got {}",
                self.eps
            )));
        }
        if let Some(std) = self.noise {
            if !(std.is_finite() && std > 0.0) {
                return Err(SimError::invalid_config(format!(
                    "noise standard deviation must be positive, got {std}"
                )));
            }
            if self.num_samples == 0 {
                return Err(SimError::invalid_config(
                    "num_samples must be at least 1 when noise is enabled",
                ));
            }
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(SimError::invalid_config(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(SimError::invalid_config(format!(
                "mass must be positive, got {}",
                self.mass
            )));
        }
        if !self.ground_height.is_finite() || self.wall_x.is_some_and(|x| !x.is_finite()) {
            return Err(SimError::invalid_config(
                "ground_height and wall_x must be finite",
            ));
        }
        if !(all_finite(&self.init_pos) && all_finite(&self.init_vel) && all_finite(&self.gravity)) {
            return Err(SimError::invalid_config(
                "init_pos, init_vel and gravity must be finite",
            ));
        }
        if self.target.is_some_and(|t| !all_finite(&t)) {
            return Err(SimError::invalid_config("target must be finite"));
        }
        if !self.speed.is_finite() {
            return Err(SimError::invalid_config("speed must be finite"));
        }
        Ok(())
    }
}

fn all_finite(xs: &[f64]) -> bool {
    xs.iter().all(|x| x.is_finite())
}
