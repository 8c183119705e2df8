//! Zero-load calibration of the axial force channel.
//!
//! At startup, with no load on the drill, one raw axial reading is captured and kept
//! as the offset. Every later raw reading `r` becomes `(offset - r) / unit_scale`
//! newtons, so pushing into bone yields a positive force.

use crate::error::{AppResult, DaqError};
use crate::hardware::{axial_component, ForceSensor};
use tracing::info;

/// Immutable zero-force reference plus the counts-to-newtons scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    offset: f64,
    unit_scale: f64,
}

impl Calibration {
    /// Build from a known offset. `unit_scale` is raw counts per newton.
    pub fn new(offset: f64, unit_scale: f64) -> Self {
        Self { offset, unit_scale }
    }

    /// Capture the offset from one fresh sensor reading.
    ///
    /// Fails when the sensor cannot be read or returns fewer than three components;
    /// the rig cannot start without this reading.
    pub async fn capture<S>(sensor: &S, unit_scale: f64) -> AppResult<Self>
    where
        S: ForceSensor + ?Sized,
    {
        let vector = sensor.sample().await?;
        let offset =
            axial_component(&vector).ok_or(DaqError::ShortForceVector(vector.len()))?;
        info!(offset, unit_scale, "Captured zero-load force offset");
        Ok(Self::new(offset, unit_scale))
    }

    /// Zero-load raw reading.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Raw counts per newton.
    pub fn unit_scale(&self) -> f64 {
        self.unit_scale
    }

    /// Calibrated force in newtons for a raw axial reading.
    pub fn apply(&self, raw_axial: f64) -> f64 {
        (self.offset - raw_axial) / self.unit_scale
    }

    /// Calibrated force for a whole raw vector.
    pub fn apply_vector(&self, vector: &[f64]) -> AppResult<f64> {
        axial_component(vector)
            .map(|raw| self.apply(raw))
            .ok_or(DaqError::ShortForceVector(vector.len()))
    }

    /// Trigger the sensor and return the calibrated axial force.
    pub async fn read<S>(&self, sensor: &S) -> AppResult<f64>
    where
        S: ForceSensor + ?Sized,
    {
        let vector = sensor.sample().await?;
        self.apply_vector(&vector)
    }
}
