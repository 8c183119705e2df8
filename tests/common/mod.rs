//! Shared fixtures for the rig integration tests.
#![allow(dead_code)]

use drill_daq::config::Settings;
use drill_daq::hardware::{MockForceSensor, MockThermocouple};
use drill_daq::rig::RigDevices;
use drill_daq::session::{Session, SessionPhase};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Raw axial reading at zero load, captured as the calibration offset.
pub const ZERO_LOAD: f64 = 5.0e6;

/// Raw counts per newton.
pub const UNIT_SCALE: f64 = 1.0e6;

/// Raw reading that calibrates to `newtons`.
pub fn raw_for(newtons: f64) -> f64 {
    ZERO_LOAD - newtons * UNIT_SCALE
}

/// Fast settings writing into `output_dir`.
pub fn fast_settings(output_dir: &Path, grace_secs: f64) -> Settings {
    let mut settings = Settings::default();
    settings.storage.output_dir = output_dir.to_path_buf();
    settings.acquisition.grace_period_secs = grace_secs;
    settings.acquisition.unit_scale = UNIT_SCALE;
    settings.acquisition.command_read_timeout_ms = 10;
    settings.acquisition.velocity_read_timeout_ms = 10;
    settings.shutdown.join_timeout_ms = 500;
    settings
}

/// Simulated devices at zero load.
pub fn mock_devices() -> (MockForceSensor, MockThermocouple, RigDevices) {
    let force = MockForceSensor::with_axial(ZERO_LOAD);
    let daq = MockThermocouple::new(37.0, 38.5);
    let devices = RigDevices {
        force: Arc::new(force.clone()),
        temperature: Arc::new(daq.clone()),
    };
    (force, daq, devices)
}

/// Poll the session phase until `wanted` holds or `limit` passes.
pub async fn wait_for_phase(
    session: &Session,
    limit: Duration,
    wanted: fn(SessionPhase) -> bool,
) -> SessionPhase {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let phase = session.phase().await;
        if wanted(phase) {
            return phase;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "phase condition not met within {:?}, last phase {:?}",
            limit,
            phase
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// A parsed session file row.
#[derive(Debug, Clone)]
pub struct Row {
    pub elapsed: f64,
    pub force: Option<f64>,
    pub velocity: Option<f64>,
    pub temp_ch1: Option<f64>,
    pub temp_ch2: Option<f64>,
    pub marker: String,
}

/// Read a session file written with the shear-velocity column.
pub fn read_rows(path: &Path) -> (Vec<String>, Vec<Row>) {
    let mut reader = csv::Reader::from_path(path).expect("session file should be readable");
    let header: Vec<String> = reader
        .headers()
        .expect("header row")
        .iter()
        .map(str::to_string)
        .collect();
    let has_velocity = header.iter().any(|h| h == "shear_velocity");
    let parse = |field: &str| -> Option<f64> {
        if field.is_empty() {
            None
        } else {
            Some(field.parse().expect("numeric field"))
        }
    };

    let rows = reader
        .records()
        .map(|record| {
            let record = record.expect("well-formed row");
            let fields: Vec<&str> = record.iter().collect();
            let (velocity, rest) = if has_velocity {
                (parse(fields[2]), &fields[3..])
            } else {
                (None, &fields[2..])
            };
            Row {
                elapsed: parse(fields[0]).expect("elapsed_time is always set"),
                force: parse(fields[1]),
                velocity,
                temp_ch1: parse(rest[0]),
                temp_ch2: parse(rest[1]),
                marker: rest[2].to_string(),
            }
        })
        .collect();
    (header, rows)
}
