//! `bounce check`: gradient triad of one rollout.

use std::fs::{self, File};
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use bounce_core::Rollout;
use bounce_grad::{GradientCheck, GradientTriad};

use crate::settings::Settings;

#[derive(Serialize)]
struct TrajectoryExport<'a> {
    integrator: &'a str,
    dt: f64,
    radius: f64,
    positions: Vec<[f64; 3]>,
}

/// Run the gradient check and print the results.
pub fn run(settings: &Settings, export: bool) -> Result<()> {
    let (config, integrator) = settings.resolve()?;
    let mut rollout = Rollout::from_config(&config, integrator)?;

    let triad = GradientTriad::compute(&mut rollout, config.eps)?;
    // Leave the store holding the unperturbed trajectory for export.
    rollout.compute_loss()?;

    println!("------------ {} ({}) ------------", config.name, integrator.name());
    println!("loss: {}", triad.loss);
    println!("contact episodes: {}", rollout.contact_episodes());
    print_check("initial position dL/dx0", &triad.position);
    print_check("initial velocity dL/dv0", &triad.velocity);
    print_check("control dL/du0", &triad.control);

    if triad.any_unstable() {
        info!("analytic and numerical gradients disagree; expected when the horizon contains a contact");
    }

    if export {
        fs::create_dir_all(&config.result_dir)
            .with_context(|| format!("failed to create {}", config.result_dir.display()))?;
        let path = config
            .result_dir
            .join(format!("{}_{}_trajectory.json", config.name, integrator.name()));
        let data = TrajectoryExport {
            integrator: integrator.name(),
            dt: rollout.dt(),
            radius: rollout.model().radius,
            positions: rollout.trajectory().iter().map(|p| [p.x, p.y, p.z]).collect(),
        };
        let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &data)?;
        out.flush()?;
        info!(path = %path.display(), "trajectory written");
    }

    Ok(())
}

fn print_check(label: &str, check: &GradientCheck) {
    println!("{label} [{}]", check.buffer);
    println!("  analytic:  {:?}", check.analytic.as_slice());
    println!("  numerical: {:?}", check.numerical.as_slice());
    if check.unstable {
        println!("  numerical instability (rel diff {:.3e})", check.rel_diff);
    }
}
