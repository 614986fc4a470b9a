//! Sweep results and their CSV/JSON export.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// One sample of an angle sweep.
///
/// Fields that could not be computed because the sample failed are NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepRecord {
    /// Sample index within its baseline angle.
    pub run: usize,
    /// Baseline angle `θ`.
    pub theta: f64,
    /// Angle of the analytic `∂L/∂v_0`.
    #[serde(rename = "FoG")]
    pub fog: f64,
    /// Angle of the smoothed zeroth-order estimate.
    #[serde(rename = "ZoG")]
    pub zog: f64,
    /// Angle of the score-function zeroth-order estimate.
    #[serde(rename = "ZoG_old")]
    pub zog_old: f64,
    /// `L(θ + δ)`.
    pub cost: f64,
    /// Noise draw `δ`.
    pub noise: f64,
    /// `θ + δ`.
    pub theta_noisy: f64,
    /// Analytic `dL/dθ` at `θ + δ`.
    #[serde(rename = "dL_dtheta")]
    pub dl_dtheta: f64,
}

impl SweepRecord {
    /// Record for a sample whose rollout failed.
    #[must_use]
    pub fn failed(run: usize, theta: f64, noise: f64) -> Self {
        Self {
            run,
            theta,
            fog: f64::NAN,
            zog: f64::NAN,
            zog_old: f64::NAN,
            cost: f64::NAN,
            noise,
            theta_noisy: theta + noise,
            dl_dtheta: f64::NAN,
        }
    }

    /// Whether the sample's rollout failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.cost.is_nan()
    }
}

/// Noise-free objective at one baseline angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LandscapePoint {
    /// Baseline angle.
    pub theta: f64,
    /// `L(θ)`, NaN if the rollout failed.
    pub cost: f64,
}

/// Output of an angle sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    /// Per-sample records, ordered by angle then run.
    pub records: Vec<SweepRecord>,
    /// Deterministic cost landscape, one point per angle.
    pub landscape: Vec<LandscapePoint>,
}

impl SweepReport {
    /// CSV header line.
    pub const CSV_HEADER: &'static str =
        "run,theta,FoG,ZoG,ZoG_old,cost,noise,theta_noisy,dL_dtheta";

    /// Number of failed samples.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.is_failed()).count()
    }

    /// Write the per-sample records as CSV.
    pub fn write_csv<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "{}", Self::CSV_HEADER)?;
        for r in &self.records {
            writeln!(
                w,
                "{},{},{},{},{},{},{},{},{}",
                r.run, r.theta, r.fog, r.zog, r.zog_old, r.cost, r.noise, r.theta_noisy, r.dl_dtheta
            )?;
        }
        w.flush()
    }

    /// Write the whole report as pretty JSON. NaN is written as `null`.
    pub fn write_json<W: Write>(&self, w: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(w, self)
    }

    /// Write `<name>.csv` and `<name>.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path, name: &str) -> io::Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir)?;
        let csv = dir.join(format!("{name}.csv"));
        let json = dir.join(format!("{name}.json"));
        self.write_csv(BufWriter::new(File::create(&csv)?))?;
        let mut out = BufWriter::new(File::create(&json)?);
        self.write_json(&mut out)?;
        out.flush()?;
        Ok((csv, json))
    }
}
