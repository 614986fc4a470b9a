//! Configuration resolution: preset, then JSON file, then flags.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use bounce_core::IntegratorStrategy;
use bounce_types::ExperimentConfig;

/// Starting configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Single bounce on the ground, zero gravity
    BounceOnce,
    /// Ground and wall with a target point
    GroundWall,
}

/// Integrator choice on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IntegratorChoice {
    /// Library-style semi-implicit Euler with soft contact
    SemiImplicit,
    /// Custom symplectic Euler with penalty contact
    SymplecticPenalty,
    /// Custom position-based integrator
    PositionBased,
}

impl IntegratorChoice {
    fn strategy(self, relaxation: f64, iterations: usize) -> IntegratorStrategy {
        match self {
            Self::SemiImplicit => IntegratorStrategy::SemiImplicit,
            Self::SymplecticPenalty => IntegratorStrategy::SymplecticPenalty,
            Self::PositionBased => IntegratorStrategy::PositionBased {
                relaxation,
                iterations,
            },
        }
    }
}

/// Flags shared by every command.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Preset to start from
    #[arg(long, value_enum, default_value = "bounce-once")]
    preset: Preset,

    /// JSON file overriding preset fields
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Integrator variant
    #[arg(long, value_enum, default_value = "symplectic-penalty")]
    integrator: IntegratorChoice,

    /// Relaxation of the position-based integrator
    #[arg(long, default_value_t = 1.0)]
    relaxation: f64,

    /// Projection sweeps of the position-based integrator
    #[arg(long, default_value_t = 2)]
    iterations: usize,

    /// Number of integrator steps
    #[arg(long)]
    steps: Option<usize>,

    /// Simulated time in seconds
    #[arg(long)]
    simulation_time: Option<f64>,

    /// Finite-difference step
    #[arg(long)]
    eps: Option<f64>,

    /// Penalty stiffness (custom integrators) or soft-contact ke (library)
    #[arg(long)]
    kn: Option<f64>,

    /// Friction coefficient (penalty `customized_mu`, or soft-contact mu)
    #[arg(long)]
    mu: Option<f64>,

    /// Launch-angle noise standard deviation
    #[arg(long)]
    noise: Option<f64>,

    /// Samples per angle
    #[arg(long)]
    num_samples: Option<usize>,

    /// Number of baseline angles
    #[arg(long)]
    num_thetas: Option<usize>,

    /// Launch speed
    #[arg(long)]
    speed: Option<f64>,

    /// Noise seed
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory
    #[arg(long)]
    result_dir: Option<PathBuf>,
}

impl Settings {
    /// Resolve the configuration and integrator.
    pub fn resolve(&self) -> Result<(ExperimentConfig, IntegratorStrategy)> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let mut value: serde_json::Value = serde_json::to_value(self.preset())?;
                let overlay: serde_json::Value = serde_json::from_str(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                merge(&mut value, overlay);
                serde_json::from_value(value)
                    .with_context(|| format!("invalid configuration in {}", path.display()))?
            }
            None => self.preset(),
        };

        if let Some(steps) = self.steps {
            config.steps = steps;
        }
        if let Some(t) = self.simulation_time {
            config.simulation_time = t;
        }
        if let Some(eps) = self.eps {
            config.eps = eps;
        }
        if self.noise.is_some() {
            config.noise = self.noise;
        }
        if let Some(n) = self.num_samples {
            config.num_samples = n;
        }
        if let Some(n) = self.num_thetas {
            config.num_thetas = n;
        }
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(dir) = &self.result_dir {
            config.result_dir.clone_from(dir);
        }

        let integrator = self.integrator.strategy(self.relaxation, self.iterations);
        if integrator.is_library_adapter() {
            config = config.into_soft_contact();
        }
        // Contact flags go to whichever block the integrator reads.
        match config.soft_contact.as_mut() {
            Some(soft) => {
                if let Some(kn) = self.kn {
                    soft.ke = kn;
                }
                if let Some(mu) = self.mu {
                    soft.mu = mu;
                }
            }
            None => {
                if let Some(kn) = self.kn {
                    config.customized_kn = Some(kn);
                }
                if let Some(mu) = self.mu {
                    config.customized_mu = mu;
                }
            }
        }
        config.validate()?;
        Ok((config, integrator))
    }

    fn preset(&self) -> ExperimentConfig {
        match self.preset {
            Preset::BounceOnce => ExperimentConfig::bounce_once(),
            Preset::GroundWall => ExperimentConfig::ground_wall(),
        }
    }
}

/// Recursively overlay `overlay` onto `base`. Objects merge key by key;
/// anything else replaces.
fn merge(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use bounce_core::Rollout;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        Harness::parse_from(std::iter::once("bounce").chain(args.iter().copied())).settings
    }

    #[test]
    fn test_defaults_resolve_to_preset() {
        let (config, integrator) = parse(&[]).resolve().unwrap();
        assert_eq!(config, ExperimentConfig::bounce_once());
        assert_eq!(integrator, IntegratorStrategy::SymplecticPenalty);
    }

    #[test]
    fn test_flags_override() {
        let (config, _) = parse(&["--preset", "ground-wall", "--steps", "100", "--noise", "0.3"])
            .resolve()
            .unwrap();
        assert_eq!(config.steps, 100);
        assert_eq!(config.noise, Some(0.3));
        assert_eq!(config.wall_x, Some(1.0));
    }

    #[test]
    fn test_library_integrator_gets_soft_contact() {
        let (config, integrator) = parse(&["--integrator", "semi-implicit", "--kn", "2000"])
            .resolve()
            .unwrap();
        assert!(integrator.is_library_adapter());
        assert!(config.customized_kn.is_none());
        assert_eq!(config.soft_contact.unwrap().ke, 2000.0);
    }

    /// Write `contents` to a fresh file under the system temp directory.
    fn config_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bounce-{}-{name}.json", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_soft_contact_file_builds_library_rollout() {
        let path = config_file("soft", r#"{ "soft_contact": { "ke": 5000.0, "kf": 50.0 } }"#);
        let settings = parse(&[
            "--integrator",
            "semi-implicit",
            "--config",
            path.to_str().unwrap(),
            "--mu",
            "0.4",
        ]);
        let (config, integrator) = settings.resolve().unwrap();
        fs::remove_file(&path).unwrap();

        assert!(config.customized_kn.is_none());
        let soft = config.soft_contact.unwrap();
        assert_eq!(soft.ke, 5000.0);
        assert_eq!(soft.kf, 50.0);
        assert_eq!(soft.mu, 0.4);
        assert_eq!(soft.kd, bounce_types::SoftContactParams::default().kd);

        let mut rollout = Rollout::from_config(&config, integrator).unwrap();
        assert!(rollout.compute_loss().unwrap().is_finite());
    }

    #[test]
    fn test_mu_goes_to_penalty_for_custom_integrators() {
        let (config, integrator) = parse(&["--mu", "0.3"]).resolve().unwrap();
        assert!(!integrator.is_library_adapter());
        assert_eq!(config.customized_mu, 0.3);
        assert!(config.soft_contact.is_none());
        Rollout::from_config(&config, integrator).unwrap();
    }

    #[test]
    fn test_merge_nested() {
        let mut base = serde_json::json!({ "a": 1, "b": { "c": 2, "d": 3 } });
        merge(&mut base, serde_json::json!({ "b": { "d": 4 }, "e": 5 }));
        assert_eq!(base, serde_json::json!({ "a": 1, "b": { "c": 2, "d": 4 }, "e": 5 }));
    }
}
