//! `bounce sweep`: launch-angle sweep.

use anyhow::{Context, Result};
use tracing::info;

use bounce_grad::AngleSweep;

use crate::settings::Settings;

/// Run the sweep and write its CSV and JSON.
pub fn run(settings: &Settings) -> Result<()> {
    let (config, integrator) = settings.resolve()?;
    let sweep = AngleSweep::from_config(&config, integrator)?;
    let report = sweep.run();

    let name = format!("{}_{}_sweep", config.name, integrator.name());
    let (csv, json) = report
        .save(&config.result_dir, &name)
        .with_context(|| format!("failed to write results to {}", config.result_dir.display()))?;

    println!("{:>8} {:>10} {:>10} {:>10}", "theta", "FoG", "ZoG", "cost");
    for r in &report.records {
        println!("{:>8.3} {:>10.4} {:>10.4} {:>10.4}", r.theta, r.fog, r.zog, r.cost);
    }
    info!(
        csv = %csv.display(),
        json = %json.display(),
        failed = report.failed(),
        "sweep written"
    );
    Ok(())
}
