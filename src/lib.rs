//! # Drill DAQ Core Library
//!
//! Acquisition engine for a bone-drilling test rig. It samples axial force, two
//! thermocouple channels, and the controller's shear-velocity stream, writes one
//! crash-safe CSV file per drilling session, and streams calibrated force back to
//! the PLC. Sessions are started and stopped by 2-byte command frames from the PLC.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: The force, temperature, and shear-velocity polling loops.
//! - **`calibration`**: Zero-load offset capture and raw-to-newton conversion.
//! - **`config`**: `figment`-based `Settings` (TOML file plus `DRILL_DAQ_` environment
//!   overrides) and validation.
//! - **`controller`**: PLC wire protocol, TCP links, the command listener, and the
//!   telemetry sender.
//! - **`data`**: Row model, file-name clock, and the CSV sink.
//! - **`error`**: The `DaqError` enum shared by the whole crate.
//! - **`error_recovery`**: Connect retry policy and per-loop failure tracking.
//! - **`hardware`**: Capability traits for the force sensor and thermocouple DAQ, plus
//!   simulated devices.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`rig`**: Startup probes, loop wiring, and graceful shutdown.
//! - **`session`**: The session state machine and its per-role handles.
//! - **`shutdown`**: Run flag and bounded task joins.

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod error_recovery;
pub mod hardware;
pub mod logging;
pub mod rig;
pub mod session;
pub mod shutdown;

pub use config::Settings;
pub use error::{AppResult, DaqError};
pub use rig::{DrillRig, RigDevices, RigOptions};
