//! Bouncing-particle gradient studies.
//!
//! # Commands
//!
//! - `bounce check` - Analytic vs finite-difference gradients of one rollout
//! - `bounce sweep` - Launch-angle sweep comparing first- and zeroth-order gradients
//!
//! Both start from a preset, overlay an optional JSON config file, then
//! overlay command-line flags. Set `RUST_LOG` to change verbosity.

mod check;
mod settings;
mod sweep;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use settings::Settings;

/// Gradient estimation through contact-rich particle dynamics
#[derive(Parser)]
#[command(name = "bounce")]
#[command(about = "Compare analytic, finite-difference and zeroth-order gradients", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check analytic against finite-difference gradients for one rollout
    Check {
        #[command(flatten)]
        settings: Settings,

        /// Skip writing the trajectory file
        #[arg(long)]
        no_export: bool,
    },

    /// Sweep the launch angle over one full turn
    Sweep {
        #[command(flatten)]
        settings: Settings,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            settings,
            no_export,
        } => check::run(&settings, !no_export),
        Commands::Sweep { settings } => sweep::run(&settings),
    }
}
