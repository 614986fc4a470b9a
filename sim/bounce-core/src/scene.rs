//! Per-rollout constants resolved from the model.

use nalgebra::Vector3;

use bounce_contact::{ContactResponse, SurfaceSet};
use bounce_types::{Model, Result};

use crate::IntegratorStrategy;

/// Everything an integrator step needs besides the states themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scene {
    /// Inverse particle mass.
    pub inv_mass: f64,
    /// Gravity acceleration.
    pub gravity: Vector3<f64>,
    /// Particle radius.
    pub radius: f64,
    /// Ground and wall planes.
    pub surfaces: SurfaceSet,
    /// Contact law matching the integrator.
    pub response: ContactResponse,
}

impl Scene {
    /// Bake the model for the given integrator.
    ///
    /// # Errors
    ///
    /// Returns [`bounce_types::SimError::ConfigurationMismatch`] when the
    /// model's contact constants belong to the other integrator family.
    pub fn new(model: &Model, integrator: &IntegratorStrategy) -> Result<Self> {
        let response = ContactResponse::resolve(
            integrator.name(),
            integrator.contact_family(),
            &model.contact,
        )?;
        Ok(Self {
            inv_mass: model.inv_mass(),
            gravity: model.gravity,
            radius: model.radius,
            surfaces: SurfaceSet::from_model(model),
            response,
        })
    }

    /// Summed contact force at a position and velocity.
    #[must_use]
    pub fn contact_force(&self, position: &Vector3<f64>, velocity: &Vector3<f64>) -> Vector3<f64> {
        self.response
            .total_force(&self.surfaces, self.radius, position, velocity)
    }
}
