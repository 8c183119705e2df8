//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the acquisition engine.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures the rig can run into, from configuration and file I/O problems to
//! sensor and controller-link faults.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, raised while merging the TOML file and
//!   environment overrides.
//! - **`Configuration`**: Semantic errors that pass parsing but are logically wrong
//!   (zero sampling rate, duplicate ports, ...). Caught by `Settings::validate`.
//! - **`Io`** / **`Csv`**: Output file and socket I/O failures.
//! - **`Device`** / **`ShortForceVector`**: Force sensor or thermocouple DAQ failures.
//!   Fatal during startup probing, retried per iteration inside the polling loops.
//! - **`Connection`**: The controller could not be reached within the retry policy.
//! - **`Task`** / **`ShutdownFailed`**: Loop failures surfaced while joining tasks.
//!
//! By using `#[from]`, `DaqError` can be created from underlying error types with `?`.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by the acquisition engine.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration could not be loaded or merged.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but is not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or flushing failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Sensor or DAQ failure.
    #[error("Device error: {0}")]
    Device(String),

    /// The force sensor returned fewer components than the axial axis needs.
    #[error("Force vector has {0} component(s), axial force needs at least 3")]
    ShortForceVector(usize),

    /// The controller could not be reached.
    #[error("Failed to connect to controller at {addr}: {source}")]
    Connection {
        /// Address that was dialled.
        addr: String,
        /// Last connect error.
        #[source]
        source: std::io::Error,
    },

    /// A loop task panicked or was aborted.
    #[error("Task '{0}' failed: {1}")]
    Task(&'static str, String),

    /// One or more loops failed while shutting down.
    #[error("Shutdown failed with errors: {}", join_errors(.0))]
    ShutdownFailed(Vec<DaqError>),
}

fn join_errors(errors: &[DaqError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl From<anyhow::Error> for DaqError {
    fn from(value: anyhow::Error) -> Self {
        DaqError::Device(format!("{value:#}"))
    }
}

impl DaqError {
    /// Whether the error is a momentary I/O condition a polling loop should simply retry.
    pub fn is_transient(&self) -> bool {
        match self {
            DaqError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            DaqError::Device(_) | DaqError::ShortForceVector(_) => true,
            _ => false,
        }
    }
}
