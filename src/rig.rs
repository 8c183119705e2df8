//! Rig orchestration: startup probes, loop wiring, and graceful shutdown.
//!
//! # Startup
//!
//! 1. Validate [`Settings`].
//! 2. Probe the devices: one force reading becomes the calibration offset, one
//!    temperature reading proves the DAQ answers. Either failure aborts startup.
//! 3. Make sure the output directory exists.
//! 4. Spawn one task per loop: force, temperature, velocity (when linked),
//!    telemetry, and the command listener.
//!
//! # Shutdown
//!
//! [`DrillRig::shutdown`] clears the run flag, joins every loop with a bounded
//! timeout, then closes the session so an open file is finalized exactly once.

use crate::acquisition::{ForceLoop, TemperatureLoop, VelocityLoop};
use crate::calibration::Calibration;
use crate::config::Settings;
use crate::controller::{CommandListener, ControllerLinks, TelemetrySender};
use crate::data::storage::ensure_directory_exists;
use crate::data::{ColumnLayout, SinkManager, SystemClock, WallClock};
use crate::error::{AppResult, DaqError};
use crate::hardware::{ForceSensor, TemperatureSensor, ThermocoupleReading};
use crate::session::Session;
use crate::shutdown::{RunFlag, ShutdownReport, TaskGroup};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Device handles for the rig.
///
/// The force sensor is read by both the force loop and the telemetry sender; every
/// read goes through the sensor's own `&self` API.
#[derive(Clone)]
pub struct RigDevices {
    /// Force/torque sensor
    pub force: Arc<dyn ForceSensor>,
    /// Two-channel thermocouple DAQ
    pub temperature: Arc<dyn TemperatureSensor>,
}

/// Run-time options that do not belong in the configuration file.
#[derive(Clone)]
pub struct RigOptions {
    /// Print every recorded force sample on stdout
    pub echo_force: bool,
    /// Source of file-name timestamps
    pub clock: Arc<dyn WallClock>,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            echo_force: false,
            clock: Arc::new(SystemClock),
        }
    }
}

/// What [`DrillRig::shutdown`] did.
#[derive(Debug)]
pub struct ShutdownSummary {
    /// Per-loop join outcome
    pub report: ShutdownReport,
    /// File finalized by the shutdown path itself, if one was still open
    pub finalized: Option<PathBuf>,
}

/// Results of the startup probes.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    /// Zero-load calibration captured from the force sensor
    pub calibration: Calibration,
    /// First thermocouple reading
    pub temperatures: ThermocoupleReading,
}

/// Read each device once. Both reads are mandatory.
pub async fn probe_devices(devices: &RigDevices, unit_scale: f64) -> AppResult<ProbeResult> {
    let calibration = Calibration::capture(devices.force.as_ref(), unit_scale)
        .await
        .map_err(|e| DaqError::Device(format!("initial force reading failed: {}", e)))?;
    let temperatures = devices
        .temperature
        .read_channels()
        .await
        .map_err(|e| DaqError::Device(format!("initial temperature reading failed: {:#}", e)))?;
    info!(
        offset = calibration.offset(),
        temp_ch1 = temperatures.ch1,
        temp_ch2 = temperatures.ch2,
        "Devices answered startup probe"
    );
    Ok(ProbeResult {
        calibration,
        temperatures,
    })
}

/// Task name of the command listener.
const COMMAND_LOOP: &str = "command";

/// A running rig.
pub struct DrillRig {
    session: Session,
    run: RunFlag,
    tasks: TaskGroup,
    calibration: Calibration,
    join_timeout: Duration,
}

impl DrillRig {
    /// Connect to the controller, then [`start`](Self::start).
    ///
    /// The devices are probed before any connection attempt, so a dead sensor fails
    /// fast without waiting on the network.
    pub async fn connect(
        settings: &Settings,
        devices: RigDevices,
        options: RigOptions,
    ) -> AppResult<Self> {
        settings.validate()?;
        let probe = probe_devices(&devices, settings.acquisition.unit_scale).await?;
        let links = ControllerLinks::connect(&settings.controller).await?;
        Self::spawn(settings, devices, links, options, probe.calibration)
    }

    /// Start over already-open controller streams.
    pub async fn start(
        settings: &Settings,
        devices: RigDevices,
        links: ControllerLinks,
        options: RigOptions,
    ) -> AppResult<Self> {
        settings.validate()?;
        let probe = probe_devices(&devices, settings.acquisition.unit_scale).await?;
        Self::spawn(settings, devices, links, options, probe.calibration)
    }

    fn spawn(
        settings: &Settings,
        devices: RigDevices,
        links: ControllerLinks,
        options: RigOptions,
        calibration: Calibration,
    ) -> AppResult<Self> {
        let acquisition = &settings.acquisition;
        ensure_directory_exists(&settings.storage.output_dir)?;

        let layout = if links.velocity.is_some() {
            ColumnLayout::with_shear_velocity()
        } else {
            ColumnLayout::without_shear_velocity()
        };
        let sink = SinkManager::new(settings.storage.output_dir.clone(), layout, options.clock);
        let (session, handles) = Session::new(sink, acquisition.grace_period());

        let run = RunFlag::new();
        let mut tasks = TaskGroup::new();

        tasks.spawn(
            "force",
            ForceLoop::new(
                devices.force.clone(),
                calibration,
                handles.force,
                run.clone(),
                acquisition.force_period(),
                options.echo_force,
            )
            .run(),
        );
        tasks.spawn(
            "temperature",
            TemperatureLoop::new(
                devices.temperature,
                handles.temperature,
                run.clone(),
                acquisition.temperature_period(),
            )
            .run(),
        );
        match links.velocity {
            Some(stream) => tasks.spawn(
                "velocity",
                VelocityLoop::new(
                    stream,
                    handles.velocity,
                    run.clone(),
                    acquisition.velocity_read_timeout(),
                )
                .run(),
            ),
            None => info!("No velocity link, shear_velocity column disabled"),
        }
        tasks.spawn(
            "telemetry",
            TelemetrySender::new(
                links.telemetry,
                devices.force,
                calibration,
                run.clone(),
                acquisition.telemetry_period(),
            )
            .run(),
        );
        tasks.spawn(
            COMMAND_LOOP,
            CommandListener::new(
                links.commands,
                handles.controller,
                run.clone(),
                acquisition.command_read_timeout(),
            )
            .run(),
        );

        info!(
            loops = tasks.len(),
            output_dir = %settings.storage.output_dir.display(),
            grace_s = acquisition.grace_period_secs,
            "Rig running"
        );

        Ok(Self {
            session,
            run,
            tasks,
            calibration,
            join_timeout: settings.shutdown.join_timeout(),
        })
    }

    /// Shared session, for inspection.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Process-wide run flag.
    pub fn run_flag(&self) -> &RunFlag {
        &self.run
    }

    /// Calibration captured at startup.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Resolves once the command listener has exited: the controller hung up or the
    /// command socket failed. The other loops keep running until [`shutdown`](Self::shutdown).
    pub async fn wait(&self) {
        self.tasks.wait_for_exit(COMMAND_LOOP).await;
    }

    /// Stop every loop, join them, and finalize any open file.
    pub async fn shutdown(self) -> AppResult<ShutdownSummary> {
        info!("Shutting down rig");
        self.run.stop();
        let report = self.tasks.shutdown(self.join_timeout).await;
        if !report.timed_out().is_empty() {
            warn!(tasks = ?report.timed_out(), "Some loops were aborted");
        }
        let finalized = self.session.close().await?;
        if let Some(path) = &finalized {
            info!(path = %path.display(), "Open session file finalized on shutdown");
        }
        Ok(ShutdownSummary { report, finalized })
    }
}
