//! Stochastic zeroth-order gradient estimation over a launch angle.
//!
//! The launch velocity is `u (cos θ, sin θ, 0)`. For a noise sample
//! `δ ~ N(0, σ²)` and perturbed angle `θ' = θ + δ`, each sample reports
//! two vector estimates along the angular tangent `(-sin θ', cos θ')`:
//!
//! ```text
//! score function:  δ / σ² · u · L(θ') · (-sin θ', cos θ')
//! smoothed:                 u · L(θ') · (-sin θ', cos θ')
//! ```
//!
//! Both are reduced to an angle with [`angular`]. They never touch the tape,
//! so they stay meaningful across contact events.

use nalgebra::{Vector2, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use bounce_core::Rollout;
use bounce_types::{Result, SimError};

/// Launch velocity for angle `theta` and speed `speed`.
#[must_use]
pub fn launch_velocity(theta: f64, speed: f64) -> Vector3<f64> {
    Vector3::new(theta.cos() * speed, theta.sin() * speed, 0.0)
}

/// `∂ launch_velocity / ∂θ` divided by the speed.
#[must_use]
pub fn launch_tangent(theta: f64) -> Vector2<f64> {
    Vector2::new(-theta.sin(), theta.cos())
}

/// Angle of a planar vector, `atan2(y, x)`.
#[must_use]
pub fn angular(v: &Vector2<f64>) -> f64 {
    v.y.atan2(v.x)
}

/// One evaluated noise sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZerothOrderSample {
    /// Baseline angle.
    pub theta: f64,
    /// Noise draw `δ`.
    pub noise: f64,
    /// `θ + δ`.
    pub theta_noisy: f64,
    /// `L(θ + δ)`.
    pub loss: f64,
    /// Score-function (likelihood-ratio) vector estimate.
    pub score_function: Vector2<f64>,
    /// Unweighted smoothed vector estimate.
    pub smoothed: Vector2<f64>,
}

impl ZerothOrderSample {
    /// Angular reduction of the smoothed estimate (`ZoG`).
    #[must_use]
    pub fn zog(&self) -> f64 {
        angular(&self.smoothed)
    }

    /// Angular reduction of the score-function estimate (`ZoG_old`).
    #[must_use]
    pub fn zog_old(&self) -> f64 {
        angular(&self.score_function)
    }
}

/// Scalar `dL/dθ` estimate with sample statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThetaGradient {
    /// `L(θ)`.
    pub value: f64,
    /// Mean of the per-sample estimates.
    pub estimate: f64,
    /// Sample variance, zero for a single sample.
    pub sample_variance: f64,
    /// `sqrt(sample_variance / num_samples)`.
    pub standard_error: f64,
    /// Number of samples.
    pub num_samples: usize,
}

/// Welford accumulator for mean and variance.
#[derive(Default)]
struct Welford {
    mean: f64,
    m2: f64,
    count: usize,
}

impl Welford {
    fn update(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
    }

    fn finalize(&self) -> (f64, f64, f64) {
        if self.count > 1 {
            let n = self.count as f64;
            let var = self.m2 / (n - 1.0);
            (self.mean, var, (var / n).sqrt())
        } else {
            (self.mean, 0.0, 0.0)
        }
    }
}

/// Gaussian-smoothing estimator over the launch angle at fixed speed.
#[derive(Debug, Clone, Copy)]
pub struct ZerothOrderEstimator {
    std: f64,
    speed: f64,
    distribution: Normal<f64>,
}

impl ZerothOrderEstimator {
    /// Create an estimator with noise standard deviation `std` and launch speed `speed`.
    ///
    /// `std = 0` gives noise-free samples; the score-function form is then
    /// undefined and reported as NaN.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] for a negative or non-finite
    /// `std`, or a non-finite `speed`.
    pub fn new(std: f64, speed: f64) -> Result<Self> {
        if !speed.is_finite() {
            return Err(SimError::invalid_config(format!(
                "launch speed must be finite, got {speed}"
            )));
        }
        let distribution = Normal::new(0.0, std)
            .ok()
            .filter(|_| std.is_finite() && std >= 0.0)
            .ok_or_else(|| {
                SimError::invalid_config(format!(
                    "noise standard deviation must be finite and non-negative, got {std}"
                ))
            })?;
        Ok(Self {
            std,
            speed,
            distribution,
        })
    }

    /// Noise standard deviation.
    #[must_use]
    pub fn std(&self) -> f64 {
        self.std
    }

    /// Launch speed.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Draw one noise sample.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.distribution.sample(rng)
    }

    /// Objective at launch angle `theta`, re-running `rollout` in place.
    pub fn loss_at(&self, rollout: &mut Rollout, theta: f64) -> Result<f64> {
        let position = rollout.model().particle.position;
        rollout.set_initial_conditions(position, launch_velocity(theta, self.speed));
        rollout.compute_loss()
    }

    /// Evaluate a sample for a given noise value.
    pub fn evaluate(&self, rollout: &mut Rollout, theta: f64, noise: f64) -> Result<ZerothOrderSample> {
        let theta_noisy = theta + noise;
        let loss = self.loss_at(rollout, theta_noisy)?;
        let smoothed = launch_tangent(theta_noisy) * (self.speed * loss);
        let score_function = if self.std > 0.0 {
            smoothed * (noise / (self.std * self.std))
        } else {
            Vector2::repeat(f64::NAN)
        };
        Ok(ZerothOrderSample {
            theta,
            noise,
            theta_noisy,
            loss,
            score_function,
            smoothed,
        })
    }

    /// Draw a noise value from `rng` and evaluate it.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rollout: &mut Rollout,
        theta: f64,
        rng: &mut R,
    ) -> Result<ZerothOrderSample> {
        let noise = self.draw(rng);
        self.evaluate(rollout, theta, noise)
    }

    /// Baseline-subtracted score-function estimate of `dL/dθ`.
    ///
    /// ```text
    /// ĝ = mean over k of (L(θ + δ_k) - L(θ)) δ_k / σ²
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] when `std` is zero or `samples`
    /// is zero, or the first rollout error.
    pub fn theta_gradient<R: Rng + ?Sized>(
        &self,
        rollout: &mut Rollout,
        theta: f64,
        samples: usize,
        rng: &mut R,
    ) -> Result<ThetaGradient> {
        if self.std <= 0.0 || samples == 0 {
            return Err(SimError::invalid_config(
                "theta gradient needs positive noise and at least one sample",
            ));
        }
        let value = self.loss_at(rollout, theta)?;
        let variance = self.std * self.std;
        let mut acc = Welford::default();
        for _ in 0..samples {
            let noise = self.draw(rng);
            let loss = self.loss_at(rollout, theta + noise)?;
            acc.update((loss - value) * noise / variance);
        }
        // Leave the rollout at the baseline angle.
        self.loss_at(rollout, theta)?;

        let (estimate, sample_variance, standard_error) = acc.finalize();
        Ok(ThetaGradient {
            value,
            estimate,
            sample_variance,
            standard_error,
            num_samples: samples,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bounce_core::IntegratorStrategy;
    use bounce_types::ExperimentConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn free_flight() -> Rollout {
        let mut config = ExperimentConfig::bounce_once();
        config.init_pos = [0.0, 5.0, 0.0];
        Rollout::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap()
    }

    #[test]
    fn test_launch_geometry() {
        assert_relative_eq!(launch_velocity(FRAC_PI_2, 5.0), Vector3::new(0.0, 5.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(launch_tangent(0.0), Vector2::new(0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(angular(&Vector2::new(-1.0, 0.0)), PI);
    }

    #[test]
    fn test_rejects_negative_noise() {
        assert!(ZerothOrderEstimator::new(-0.1, 5.0).unwrap_err().is_config_error());
        assert!(ZerothOrderEstimator::new(f64::NAN, 5.0).is_err());
        assert!(ZerothOrderEstimator::new(0.0, 5.0).is_ok());
    }

    #[test]
    fn test_sample_forms() {
        let estimator = ZerothOrderEstimator::new(0.2, 5.0).unwrap();
        let mut rollout = free_flight();
        let s = estimator.evaluate(&mut rollout, 0.3, 0.1).unwrap();

        assert_relative_eq!(s.theta_noisy, 0.4);
        // Zero gravity, no contact: L = y0 + u sin θ' T
        assert_relative_eq!(s.loss, 5.0 + 5.0 * 0.4_f64.sin(), epsilon = 1e-9);
        assert_relative_eq!(s.smoothed, launch_tangent(0.4) * (5.0 * s.loss), epsilon = 1e-12);
        assert_relative_eq!(s.score_function, s.smoothed * (0.1 / 0.04), epsilon = 1e-12);
        // Positive weight keeps the direction, so both angles agree.
        assert_relative_eq!(s.zog(), s.zog_old(), epsilon = 1e-12);
    }

    #[test]
    fn test_negative_noise_flips_score_function() {
        let estimator = ZerothOrderEstimator::new(0.2, 5.0).unwrap();
        let mut rollout = free_flight();
        let s = estimator.evaluate(&mut rollout, 0.3, -0.1).unwrap();

        assert_relative_eq!(s.theta_noisy, 0.2, epsilon = 1e-15);
        assert!(s.loss > 0.0);
        assert_relative_eq!(s.score_function, s.smoothed * (-0.1 / 0.04), epsilon = 1e-12);
        // The smoothed estimate points along the launch tangent.
        assert_relative_eq!(s.zog(), 0.2 + FRAC_PI_2, epsilon = 1e-12);
        // A negative weight turns the score-function estimate around.
        assert_relative_eq!(s.zog_old(), 0.2 + FRAC_PI_2 - PI, epsilon = 1e-12);
        assert_relative_eq!((s.zog() - s.zog_old()).abs(), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_noise_free_score_function_is_nan() {
        let estimator = ZerothOrderEstimator::new(0.0, 5.0).unwrap();
        let mut rollout = free_flight();
        let mut rng = StdRng::seed_from_u64(7);
        let s = estimator.sample(&mut rollout, 1.0, &mut rng).unwrap();
        assert_eq!(s.noise, 0.0);
        assert!(s.zog_old().is_nan());
        assert!(s.zog().is_finite());
    }

    #[test]
    fn test_draws_are_reproducible() {
        let estimator = ZerothOrderEstimator::new(0.2, 5.0).unwrap();
        let mut a = StdRng::seed_from_u64(0);
        let mut b = StdRng::seed_from_u64(0);
        let xs: Vec<f64> = (0..8).map(|_| estimator.draw(&mut a)).collect();
        let ys: Vec<f64> = (0..8).map(|_| estimator.draw(&mut b)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_theta_gradient_smooth_case() {
        // L(θ) = 5 + 5 sin θ, so dL/dθ = 5 cos θ and the smoothed
        // gradient is 5 cos θ exp(-σ²/2).
        let std = 0.05;
        let estimator = ZerothOrderEstimator::new(std, 5.0).unwrap();
        let mut rollout = free_flight();
        let mut rng = StdRng::seed_from_u64(42);
        let theta = 0.5;
        let g = estimator
            .theta_gradient(&mut rollout, theta, 8000, &mut rng)
            .unwrap();

        let expected = 5.0 * theta.cos() * (-std * std / 2.0).exp();
        assert!((g.estimate - expected).abs() < 5.0 * g.standard_error + 1e-3);
        assert!(g.standard_error < 0.15);
        assert_relative_eq!(rollout.loss(), g.value, epsilon = 1e-12);
    }
}
