//! Sparse log rows sharing one elapsed-time column.
//!
//! Force, temperature and marker rows all land in the same file. Each row fills the
//! columns its source owns and leaves the rest blank:
//!
//! | source      | elapsed_time | axial_force | shear_velocity | temp_ch1 | temp_ch2 | marker |
//! |-------------|--------------|-------------|----------------|----------|----------|--------|
//! | force       | x            | x           | x or blank     |          |          |        |
//! | temperature | x            |             |                | x        | x        |        |
//! | marker      | x            |             |                |          |          | x      |
//!
//! `shear_velocity` only exists when the rig runs with a velocity link.

use crate::hardware::ThermocoupleReading;

/// Marker text written when the controller ends a session.
pub const STOP_MARKER: &str = "stop received";

/// Which optional columns the output file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    shear_velocity: bool,
}

impl ColumnLayout {
    /// Layout including the `shear_velocity` column.
    pub fn with_shear_velocity() -> Self {
        Self {
            shear_velocity: true,
        }
    }

    /// Layout without the `shear_velocity` column.
    pub fn without_shear_velocity() -> Self {
        Self {
            shear_velocity: false,
        }
    }

    /// Whether the `shear_velocity` column is present.
    pub fn has_shear_velocity(&self) -> bool {
        self.shear_velocity
    }

    /// Header row.
    pub fn header(&self) -> Vec<&'static str> {
        let mut header = vec!["elapsed_time", "axial_force"];
        if self.shear_velocity {
            header.push("shear_velocity");
        }
        header.extend(["temp_ch1", "temp_ch2", "marker"]);
        header
    }
}

/// One row of the session log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    /// Seconds since the session started.
    pub elapsed_s: f64,
    /// Calibrated axial force in newtons.
    pub axial_force: Option<f64>,
    /// Shear velocity delivered with this force sample.
    pub shear_velocity: Option<f32>,
    /// Thermocouple channels in degrees Celsius.
    pub temperatures: Option<ThermocoupleReading>,
    /// Boundary marker text.
    pub marker: Option<&'static str>,
}

impl LogRow {
    /// Force sample, optionally carrying a fresh shear-velocity sample.
    pub fn force(elapsed_s: f64, axial_force: f64, shear_velocity: Option<f32>) -> Self {
        Self {
            elapsed_s,
            axial_force: Some(axial_force),
            shear_velocity,
            temperatures: None,
            marker: None,
        }
    }

    /// Temperature sample.
    pub fn temperature(elapsed_s: f64, reading: ThermocoupleReading) -> Self {
        Self {
            elapsed_s,
            axial_force: None,
            shear_velocity: None,
            temperatures: Some(reading),
            marker: None,
        }
    }

    /// Boundary marker.
    pub fn marker(elapsed_s: f64, text: &'static str) -> Self {
        Self {
            elapsed_s,
            axial_force: None,
            shear_velocity: None,
            temperatures: None,
            marker: Some(text),
        }
    }

    /// Render as CSV fields for `layout`. Blank fields are empty strings.
    pub fn to_record(&self, layout: ColumnLayout) -> Vec<String> {
        let mut record = Vec::with_capacity(6);
        record.push(self.elapsed_s.to_string());
        record.push(blank_or(self.axial_force));
        if layout.has_shear_velocity() {
            record.push(blank_or(self.shear_velocity));
        }
        record.push(blank_or(self.temperatures.map(|t| t.ch1)));
        record.push(blank_or(self.temperatures.map(|t| t.ch2)));
        record.push(self.marker.unwrap_or_default().to_string());
        record
    }
}

fn blank_or<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
