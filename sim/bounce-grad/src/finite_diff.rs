//! Central finite differences and their comparison with the tape.
//!
//! ```text
//! ∂L/∂b_c ≈ (L(b_c + ε) - L(b_c - ε)) / 2ε
//! ```
//!
//! Each probe re-runs the whole rollout in place. The perturbed component
//! is restored when the probe ends, including on error.

use nalgebra::Vector3;
use serde::Serialize;
use tracing::warn;

use bounce_core::{Rollout, Tape};
use bounce_types::{BufferId, Result};

/// Relative disagreement above which a check is reported as unstable.
pub const DEFAULT_TOLERANCE: f64 = 1e-2;

/// Scoped write to one buffer component, undone on drop.
struct Perturbation<'a> {
    rollout: &'a mut Rollout,
    buffer: BufferId,
    component: usize,
    original: f64,
}

impl<'a> Perturbation<'a> {
    fn new(rollout: &'a mut Rollout, buffer: BufferId, component: usize) -> Result<Self> {
        let original = rollout.buffer_component(buffer, component)?;
        Ok(Self {
            rollout,
            buffer,
            component,
            original,
        })
    }

    /// Run the rollout with the component set to `original + delta`.
    fn loss_at(&mut self, delta: f64) -> Result<f64> {
        self.rollout
            .set_buffer_component(self.buffer, self.component, self.original + delta)?;
        self.rollout.compute_loss()
    }
}

impl Drop for Perturbation<'_> {
    fn drop(&mut self) {
        // The address was validated in `new`, so this cannot fail.
        let _ = self
            .rollout
            .set_buffer_component(self.buffer, self.component, self.original);
    }
}

/// Central-difference derivative of the loss with respect to one component.
///
/// The component holds its original value again when this returns.
///
/// # Errors
///
/// Returns addressing errors for invalid buffers or components, and
/// [`bounce_types::SimError::Diverged`] if either probe diverges.
pub fn check_grad_numerical(
    rollout: &mut Rollout,
    buffer: BufferId,
    component: usize,
    eps: f64,
) -> Result<f64> {
    let mut probe = Perturbation::new(rollout, buffer, component)?;
    let y1 = probe.loss_at(-eps)?;
    let y2 = probe.loss_at(eps)?;
    Ok((y2 - y1) / (2.0 * eps))
}

/// Central-difference gradient with respect to all three components.
pub fn numerical_gradient(rollout: &mut Rollout, buffer: BufferId, eps: f64) -> Result<Vector3<f64>> {
    let mut grad = Vector3::zeros();
    for c in 0..3 {
        grad[c] = check_grad_numerical(rollout, buffer, c, eps)?;
    }
    Ok(grad)
}

/// Reverse-mode gradient from a fresh tape.
pub fn check_grad_analytic(rollout: &mut Rollout, buffer: BufferId) -> Result<Vector3<f64>> {
    let mut tape = Tape::new();
    tape.record(rollout)?;
    tape.backward()?;
    tape.gradient_of(buffer)
}

/// Analytic and numerical gradients of one buffer, side by side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientCheck {
    /// The differentiated buffer.
    pub buffer: BufferId,
    /// Reverse-mode gradient.
    pub analytic: Vector3<f64>,
    /// Central-difference gradient.
    pub numerical: Vector3<f64>,
    /// `max |analytic - numerical|`.
    pub abs_diff: f64,
    /// `abs_diff / max(|analytic|, |numerical|, 1)`.
    pub rel_diff: f64,
    /// Disagreement beyond tolerance. Expected near contact.
    pub unstable: bool,
}

impl GradientCheck {
    /// Compare two estimates of the same gradient.
    #[must_use]
    pub fn compare(
        buffer: BufferId,
        analytic: Vector3<f64>,
        numerical: Vector3<f64>,
        tolerance: f64,
    ) -> Self {
        let finite = analytic.iter().chain(numerical.iter()).all(|x| x.is_finite());
        let abs_diff = if finite {
            (analytic - numerical).amax()
        } else {
            f64::NAN
        };
        let scale = analytic.amax().max(numerical.amax()).max(1.0);
        let rel_diff = abs_diff / scale;
        let unstable = !finite || rel_diff > tolerance;
        if unstable {
            warn!(
                %buffer,
                analytic = ?analytic.as_slice(),
                numerical = ?numerical.as_slice(),
                rel_diff,
                "numerical instability: analytic and finite-difference gradients disagree"
            );
        }
        Self {
            buffer,
            analytic,
            numerical,
            abs_diff,
            rel_diff,
            unstable,
        }
    }

    /// Run both estimators on `rollout` and compare them.
    pub fn run(rollout: &mut Rollout, buffer: BufferId, eps: f64, tolerance: f64) -> Result<Self> {
        let analytic = check_grad_analytic(rollout, buffer)?;
        let numerical = numerical_gradient(rollout, buffer, eps)?;
        Ok(Self::compare(buffer, analytic, numerical, tolerance))
    }
}

/// Gradient checks for initial position, initial velocity and control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientTriad {
    /// Objective value at the unperturbed inputs.
    pub loss: f64,
    /// `∂L/∂x_0`.
    pub position: GradientCheck,
    /// `∂L/∂v_0`.
    pub velocity: GradientCheck,
    /// `∂L/∂u`, on [`Rollout::control_buffer`].
    pub control: GradientCheck,
}

impl GradientTriad {
    /// Check all three gradients on `rollout`.
    pub fn compute(rollout: &mut Rollout, eps: f64) -> Result<Self> {
        let loss = rollout.compute_loss()?;
        let control = rollout.control_buffer();
        Ok(Self {
            loss,
            position: GradientCheck::run(rollout, BufferId::position(0), eps, DEFAULT_TOLERANCE)?,
            velocity: GradientCheck::run(rollout, BufferId::velocity(0), eps, DEFAULT_TOLERANCE)?,
            control: GradientCheck::run(rollout, control, eps, DEFAULT_TOLERANCE)?,
        })
    }

    /// Whether any of the three checks disagreed.
    #[must_use]
    pub fn any_unstable(&self) -> bool {
        self.position.unstable || self.velocity.unstable || self.control.unstable
    }
}
