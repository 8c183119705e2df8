//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the rig.
//! Configuration is merged from:
//! 1. serde defaults (the reference rig: PLC at 192.168.0.2, ports 2000/3000)
//! 2. a TOML file (default `config/drill_daq.toml`, optional)
//! 3. Environment variables prefixed with `DRILL_DAQ_`, `__` separating sections
//!
//! # Example
//! ```no_run
//! use drill_daq::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Controller: {}", settings.controller.host);
//! # Ok::<(), drill_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/drill_daq.toml";

/// Shortest polling period a loop may be configured with.
pub const MIN_LOOP_PERIOD: Duration = Duration::from_millis(1);

/// Longest polling period a loop may be configured with.
pub const MAX_LOOP_PERIOD: Duration = Duration::from_secs(3600);

/// Upper bound on the post-stop grace period, in seconds.
pub const MAX_GRACE_PERIOD_SECS: f64 = 3600.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Controller (PLC) link settings
    pub controller: ControllerConfig,
    /// Sampling rates and unit conversion
    pub acquisition: AcquisitionConfig,
    /// Output file settings
    pub storage: StorageConfig,
    /// Shutdown coordination
    pub shutdown: ShutdownConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

/// Controller link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller host name or IP address
    pub host: String,
    /// Port carrying start/stop command frames
    pub command_port: u16,
    /// Port for the outbound force stream. Unset shares the command connection.
    pub telemetry_port: Option<u16>,
    /// Port carrying shear-velocity frames. Unset disables the velocity loop and column.
    pub velocity_port: Option<u16>,
    /// Per-attempt connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Number of connect attempts before giving up
    pub connect_attempts: u32,
    /// Delay between connect attempts in milliseconds
    pub connect_backoff_ms: u64,
}

/// Acquisition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Force loop rate
    pub force_rate_hz: f64,
    /// Temperature loop rate
    pub temperature_rate_hz: f64,
    /// Telemetry sender rate
    pub telemetry_rate_hz: f64,
    /// Command socket read timeout; also bounds how late the grace period is noticed
    pub command_read_timeout_ms: u64,
    /// Velocity socket read timeout
    pub velocity_read_timeout_ms: u64,
    /// Raw sensor counts per newton
    pub unit_scale: f64,
    /// Post-stop grace period in seconds
    pub grace_period_secs: f64,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving one CSV file per session
    pub output_dir: PathBuf,
}

/// Shutdown configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum wait per loop when joining on shutdown, in milliseconds
    pub join_timeout_ms: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "drill-daq".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.2".to_string(),
            command_port: 2000,
            telemetry_port: None,
            velocity_port: Some(3000),
            connect_timeout_ms: 5000,
            connect_attempts: 3,
            connect_backoff_ms: 500,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            force_rate_hz: 100.0,
            temperature_rate_hz: 10.0,
            telemetry_rate_hz: 65.0,
            command_read_timeout_ms: 100,
            velocity_read_timeout_ms: 10,
            unit_scale: 1_000_000.0,
            grace_period_secs: 11.0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 2000,
        }
    }
}

impl Settings {
    /// Load configuration from the default path and environment variables
    ///
    /// Environment variables override the file, e.g.
    /// `DRILL_DAQ_CONTROLLER__HOST=10.0.0.5`.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file falls back to defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings = Self::figment(path.as_ref()).extract()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DRILL_DAQ_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.controller.host.trim().is_empty() {
            return Err(DaqError::Configuration(
                "controller.host must not be empty".to_string(),
            ));
        }

        let mut ports = vec![self.controller.command_port];
        ports.extend(self.controller.telemetry_port);
        ports.extend(self.controller.velocity_port);
        let mut unique = ports.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != ports.len() {
            return Err(DaqError::Configuration(format!(
                "Controller ports must be distinct, got {:?}",
                ports
            )));
        }

        if self.controller.connect_attempts == 0 {
            return Err(DaqError::Configuration(
                "controller.connect_attempts must be at least 1".to_string(),
            ));
        }

        let rates = [
            ("force_rate_hz", self.acquisition.force_rate_hz),
            ("temperature_rate_hz", self.acquisition.temperature_rate_hz),
            ("telemetry_rate_hz", self.acquisition.telemetry_rate_hz),
        ];
        for (name, rate) in rates {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(DaqError::Configuration(format!(
                    "acquisition.{} must be positive, got {}",
                    name, rate
                )));
            }
            let period = 1.0 / rate;
            let allowed = MIN_LOOP_PERIOD.as_secs_f64()..=MAX_LOOP_PERIOD.as_secs_f64();
            if !allowed.contains(&period) {
                return Err(DaqError::Configuration(format!(
                    "acquisition.{} must give a period between {:?} and {:?}, got {}",
                    name, MIN_LOOP_PERIOD, MAX_LOOP_PERIOD, rate
                )));
            }
        }

        if !self.acquisition.unit_scale.is_finite() || self.acquisition.unit_scale == 0.0 {
            return Err(DaqError::Configuration(format!(
                "acquisition.unit_scale must be finite and non-zero, got {}",
                self.acquisition.unit_scale
            )));
        }

        let grace = self.acquisition.grace_period_secs;
        if !(grace.is_finite() && (0.0..=MAX_GRACE_PERIOD_SECS).contains(&grace)) {
            return Err(DaqError::Configuration(format!(
                "acquisition.grace_period_secs must be between 0 and {}, got {}",
                MAX_GRACE_PERIOD_SECS, grace
            )));
        }

        if self.acquisition.command_read_timeout_ms == 0
            || self.acquisition.velocity_read_timeout_ms == 0
        {
            return Err(DaqError::Configuration(
                "socket read timeouts must be at least 1 ms".to_string(),
            ));
        }

        Ok(())
    }
}

impl ControllerConfig {
    /// Address of the command socket
    pub fn command_addr(&self) -> String {
        format!("{}:{}", self.host, self.command_port)
    }

    /// Address of a dedicated telemetry socket, if configured
    pub fn telemetry_addr(&self) -> Option<String> {
        self.telemetry_port.map(|port| format!("{}:{}", self.host, port))
    }

    /// Address of the velocity socket, if configured
    pub fn velocity_addr(&self) -> Option<String> {
        self.velocity_port.map(|port| format!("{}:{}", self.host, port))
    }

    /// Per-attempt connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl AcquisitionConfig {
    /// Force loop period
    pub fn force_period(&self) -> Duration {
        period_from_rate(self.force_rate_hz)
    }

    /// Temperature loop period
    pub fn temperature_period(&self) -> Duration {
        period_from_rate(self.temperature_rate_hz)
    }

    /// Telemetry sender period
    pub fn telemetry_period(&self) -> Duration {
        period_from_rate(self.telemetry_rate_hz)
    }

    /// Post-stop grace period
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs_f64(self.grace_period_secs)
    }

    /// Command socket read timeout
    pub fn command_read_timeout(&self) -> Duration {
        Duration::from_millis(self.command_read_timeout_ms)
    }

    /// Velocity socket read timeout
    pub fn velocity_read_timeout(&self) -> Duration {
        Duration::from_millis(self.velocity_read_timeout_ms)
    }
}

impl ShutdownConfig {
    /// Bounded join timeout per loop
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

fn period_from_rate(rate_hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rate_hz)
}
