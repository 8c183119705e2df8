//! CLI entry point for drill-daq
//!
//! Provides command-line interface for:
//! - Running the acquisition rig until Ctrl+C or until the controller hangs up
//! - Checking the effective configuration
//!
//! # Usage
//!
//! Run the rig:
//! ```bash
//! drill-daq run --config config/drill_daq.toml --continuous
//! ```
//!
//! Print the merged configuration:
//! ```bash
//! DRILL_DAQ_ACQUISITION__GRACE_PERIOD_SECS=5.0 drill-daq check-config
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drill_daq::config::DEFAULT_CONFIG_PATH;
use drill_daq::hardware::{MockForceSensor, MockThermocouple};
use drill_daq::{logging, DrillRig, RigDevices, RigOptions, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Raw counts of noise added to the simulated axial channel
const SIMULATED_NOISE_COUNTS: f64 = 2_000.0;

#[derive(Parser)]
#[command(name = "drill-daq")]
#[command(
    about = "Force, temperature and shear-velocity logger for the drilling rig",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rig until Ctrl+C
    Run {
        /// Configuration file (TOML)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Echo every recorded force sample on stdout
        #[arg(short, long)]
        continuous: bool,

        /// Override the output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Load, validate and print the effective configuration
    CheckConfig {
        /// Configuration file (TOML)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            continuous,
            output_dir,
        } => run(&config, continuous, output_dir).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    let settings = Settings::load_from(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    settings.validate().context("validating configuration")?;
    Ok(settings)
}

async fn run(config: &Path, continuous: bool, output_dir: Option<PathBuf>) -> Result<()> {
    let mut settings = load_settings(config)?;
    if let Some(dir) = output_dir {
        settings.storage.output_dir = dir;
    }
    logging::init_from_settings(&settings)?;

    info!(
        name = %settings.application.name,
        controller = %settings.controller.command_addr(),
        output_dir = %settings.storage.output_dir.display(),
        "Starting drill rig"
    );

    // vendor drivers are not linked in; the rig runs against simulated devices
    let devices = RigDevices {
        force: Arc::new(MockForceSensor::with_axial(0.0).with_noise(SIMULATED_NOISE_COUNTS)),
        temperature: Arc::new(MockThermocouple::default()),
    };
    let options = RigOptions {
        echo_force: continuous,
        ..RigOptions::default()
    };

    let rig = DrillRig::connect(&settings, devices, options)
        .await
        .context("starting rig")?;

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Interrupt received");
        }
        _ = rig.wait() => {
            warn!("Controller link closed");
        }
    }

    let summary = rig.shutdown().await?;
    if let Some(path) = &summary.finalized {
        println!("Session file closed: {}", path.display());
    }
    summary.report.into_result()?;
    info!("Shutdown complete");
    Ok(())
}

fn check_config(config: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let rendered = toml::to_string_pretty(&settings).context("rendering configuration")?;
    println!("# effective configuration ({})", config.display());
    println!("{}", rendered);
    Ok(())
}
