//! Launch-angle sweep comparing first-order and zeroth-order gradients.
//!
//! For each baseline angle and each run, one noise value is drawn from a
//! single seeded stream, in order. Samples are then evaluated on private
//! clones of a template rollout, in parallel when the `parallel` feature is
//! enabled. The draw order never depends on evaluation order, so a sweep is
//! reproducible from its seed with or without the feature.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use bounce_core::{IntegratorStrategy, Rollout};
use bounce_types::{BufferId, ExperimentConfig, Result, SimError};

use crate::finite_diff::check_grad_analytic;
use crate::report::{LandscapePoint, SweepRecord, SweepReport};
use crate::zeroth_order::{launch_tangent, ZerothOrderEstimator};

/// `n` evenly spaced values from `start` to `end` inclusive.
#[must_use]
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// A noise draw assigned to one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepJob {
    /// Sample index within its angle.
    pub run: usize,
    /// Baseline angle.
    pub theta: f64,
    /// Noise value.
    pub noise: f64,
}

/// Angle sweep driver.
#[derive(Debug, Clone)]
pub struct AngleSweep {
    template: Rollout,
    estimator: ZerothOrderEstimator,
    thetas: Vec<f64>,
    runs: usize,
    seed: u64,
}

impl AngleSweep {
    /// Create a sweep over `thetas` with `runs` samples each.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] for an empty angle list or zero runs.
    pub fn new(
        template: Rollout,
        estimator: ZerothOrderEstimator,
        thetas: Vec<f64>,
        runs: usize,
        seed: u64,
    ) -> Result<Self> {
        if thetas.is_empty() {
            return Err(SimError::invalid_config("angle sweep needs at least one angle"));
        }
        if runs == 0 {
            return Err(SimError::invalid_config("angle sweep needs at least one run"));
        }
        Ok(Self {
            template,
            estimator,
            thetas,
            runs,
            seed,
        })
    }

    /// Sweep `num_thetas` angles over one full turn, as configured.
    ///
    /// # Errors
    ///
    /// Configuration errors are fatal, including
    /// [`SimError::ConfigurationMismatch`].
    pub fn from_config(config: &ExperimentConfig, integrator: IntegratorStrategy) -> Result<Self> {
        let template = Rollout::from_config(config, integrator)?;
        let estimator = ZerothOrderEstimator::new(config.noise.unwrap_or(0.0), config.speed)?;
        Self::new(
            template,
            estimator,
            linspace(-PI, PI, config.num_thetas),
            config.samples_per_theta(),
            config.seed,
        )
    }

    /// Baseline angles.
    #[must_use]
    pub fn thetas(&self) -> &[f64] {
        &self.thetas
    }

    /// Samples per angle.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// The estimator.
    #[must_use]
    pub fn estimator(&self) -> &ZerothOrderEstimator {
        &self.estimator
    }

    /// Draw every sample's noise from the seeded stream.
    #[must_use]
    pub fn draw_jobs(&self) -> Vec<SweepJob> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut jobs = Vec::with_capacity(self.thetas.len() * self.runs);
        for &theta in &self.thetas {
            for run in 0..self.runs {
                jobs.push(SweepJob {
                    run,
                    theta,
                    noise: self.estimator.draw(&mut rng),
                });
            }
        }
        jobs
    }

    /// Evaluate one job on a fresh clone of the template.
    ///
    /// Failures are logged and turned into a NaN record.
    #[must_use]
    pub fn evaluate(&self, job: &SweepJob) -> SweepRecord {
        let mut rollout = self.template.clone();
        match self.try_evaluate(&mut rollout, job) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    run = job.run,
                    theta = job.theta,
                    noise = job.noise,
                    error = %e,
                    "sweep sample failed"
                );
                SweepRecord::failed(job.run, job.theta, job.noise)
            }
        }
    }

    fn try_evaluate(&self, rollout: &mut Rollout, job: &SweepJob) -> Result<SweepRecord> {
        let sample = self.estimator.evaluate(rollout, job.theta, job.noise)?;
        let v_grad = check_grad_analytic(rollout, BufferId::velocity(0))?;
        let dl_dtheta =
            self.estimator.speed() * launch_tangent(sample.theta_noisy).dot(&v_grad.xy());
        Ok(SweepRecord {
            run: job.run,
            theta: job.theta,
            fog: v_grad.y.atan2(v_grad.x),
            zog: sample.zog(),
            zog_old: sample.zog_old(),
            cost: sample.loss,
            noise: job.noise,
            theta_noisy: sample.theta_noisy,
            dl_dtheta,
        })
    }

    /// Noise-free objective at one angle, NaN on failure.
    #[must_use]
    pub fn cost_at(&self, theta: f64) -> LandscapePoint {
        let mut rollout = self.template.clone();
        let cost = self
            .estimator
            .loss_at(&mut rollout, theta)
            .unwrap_or_else(|e| {
                warn!(theta, error = %e, "cost landscape point failed");
                f64::NAN
            });
        LandscapePoint { theta, cost }
    }

    /// Run the whole sweep.
    #[must_use]
    pub fn run(&self) -> SweepReport {
        let jobs = self.draw_jobs();
        info!(
            thetas = self.thetas.len(),
            runs = self.runs,
            std = self.estimator.std(),
            integrator = self.template.integrator().name(),
            "angle sweep started"
        );

        #[cfg(feature = "parallel")]
        let (records, landscape) = {
            use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
            let records: Vec<SweepRecord> = jobs.par_iter().map(|job| self.evaluate(job)).collect();
            let landscape: Vec<LandscapePoint> =
                self.thetas.par_iter().map(|&theta| self.cost_at(theta)).collect();
            (records, landscape)
        };

        #[cfg(not(feature = "parallel"))]
        let (records, landscape) = {
            let records: Vec<SweepRecord> = jobs.iter().map(|job| self.evaluate(job)).collect();
            let landscape: Vec<LandscapePoint> =
                self.thetas.iter().map(|&theta| self.cost_at(theta)).collect();
            (records, landscape)
        };

        let report = SweepReport { records, landscape };
        info!(
            samples = report.records.len(),
            failed = report.failed(),
            "angle sweep finished"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quick_config() -> ExperimentConfig {
        let mut config = ExperimentConfig::ground_wall();
        config.steps = 120;
        config.num_thetas = 5;
        config
    }

    #[test]
    fn test_linspace() {
        let xs = linspace(-PI, PI, 10);
        assert_eq!(xs.len(), 10);
        assert_eq!(xs[0], -PI);
        assert_relative_eq!(xs[9], PI, epsilon = 1e-12);
        assert_eq!(linspace(1.0, 2.0, 1), vec![1.0]);
        assert!(linspace(1.0, 2.0, 0).is_empty());
    }

    #[test]
    fn test_sweep_shape() {
        let sweep = AngleSweep::from_config(&quick_config(), IntegratorStrategy::SymplecticPenalty).unwrap();
        let report = sweep.run();
        assert_eq!(report.records.len(), 5 * 2);
        assert_eq!(report.landscape.len(), 5);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.records[1].run, 1);
        assert_eq!(report.records[2].theta, sweep.thetas()[1]);
    }

    #[test]
    fn test_sweep_is_reproducible() {
        let config = quick_config();
        let a = AngleSweep::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap().run();
        let b = AngleSweep::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap().run();
        for (x, y) in a.records.iter().zip(&b.records) {
            assert_eq!(x.noise.to_bits(), y.noise.to_bits());
            assert_eq!(x.cost.to_bits(), y.cost.to_bits());
            assert_eq!(x.fog.to_bits(), y.fog.to_bits());
        }
    }

    fn record_bits(r: &SweepRecord) -> [u64; 8] {
        [
            r.theta, r.fog, r.zog, r.zog_old, r.cost, r.noise, r.theta_noisy, r.dl_dtheta,
        ]
        .map(f64::to_bits)
    }

    #[test]
    fn test_evaluation_order_does_not_matter() {
        let config = quick_config();
        let sweep = AngleSweep::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
        let mut records: Vec<SweepRecord> =
            sweep.draw_jobs().iter().rev().map(|job| sweep.evaluate(job)).collect();
        records.reverse();

        let report = sweep.run();
        assert_eq!(report.records.len(), records.len());
        for (x, y) in report.records.iter().zip(&records) {
            assert_eq!(x.run, y.run);
            assert_eq!(record_bits(x), record_bits(y));
        }
        let mut landscape: Vec<LandscapePoint> =
            sweep.thetas().iter().rev().map(|&theta| sweep.cost_at(theta)).collect();
        landscape.reverse();
        for (x, y) in report.landscape.iter().zip(&landscape) {
            assert_eq!(x.theta.to_bits(), y.theta.to_bits());
            assert_eq!(x.cost.to_bits(), y.cost.to_bits());
        }
    }

    #[test]
    fn test_failed_sample_becomes_nan() {
        let config = quick_config();
        let sweep = AngleSweep::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
        let record = sweep.evaluate(&SweepJob {
            run: 0,
            theta: f64::NAN,
            noise: 0.1,
        });
        assert!(record.is_failed());
        assert!(record.fog.is_nan());
        assert_eq!(record.noise, 0.1);
    }

    #[test]
    fn test_mismatch_is_fatal() {
        let err = AngleSweep::from_config(&quick_config(), IntegratorStrategy::SemiImplicit).unwrap_err();
        assert!(matches!(err, SimError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn test_noise_free_sweep_samples_once() {
        let mut config = quick_config();
        config.noise = None;
        let sweep = AngleSweep::from_config(&config, IntegratorStrategy::SymplecticPenalty).unwrap();
        assert_eq!(sweep.runs(), 1);
        let report = sweep.run();
        for (record, point) in report.records.iter().zip(&report.landscape) {
            assert_eq!(record.noise, 0.0);
            assert_eq!(record.cost.to_bits(), point.cost.to_bits());
        }
    }
}
