//! Sensor Capabilities
//!
//! The rig consumes two external devices, each through a narrow capability trait:
//!
//! - A six-axis force/torque sensor implements [`ForceSensor`]
//! - A thermocouple DAQ with two type-K channels implements [`TemperatureSensor`]
//!
//! Vendor protocols live behind these traits; the acquisition loops only ever see
//! "trigger and fetch the latest vector" and "read the latest two temperatures".
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn axial_sample<S: ForceSensor + ?Sized>(sensor: &S) -> anyhow::Result<f64> {
//!     sensor.trigger().await?;
//!     let vector = sensor.last_force().await?;
//!     axial_component(&vector).ok_or_else(|| anyhow::anyhow!("short vector"))
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

/// Index of the normal-axis (drilling direction) force in a force/torque vector.
pub const AXIAL_AXIS: usize = 2;

/// Capability: Force/Torque Sensing
///
/// # Contract
/// - `trigger()` requests a fresh sample from the device
/// - `last_force()` returns the most recent vector in raw sensor counts,
///   ordered `Fx, Fy, Fz, Tx, Ty, Tz`; only `Fz` is consumed
/// - Implementations use interior mutability; both methods take `&self`
#[async_trait]
pub trait ForceSensor: Send + Sync {
    /// Request a new reading
    async fn trigger(&self) -> Result<()>;

    /// Latest force/torque vector in raw counts
    async fn last_force(&self) -> Result<Vec<f64>>;

    /// Trigger and fetch in one call
    async fn sample(&self) -> Result<Vec<f64>> {
        self.trigger().await?;
        self.last_force().await
    }
}

/// Two thermocouple channel values in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermocoupleReading {
    /// Channel 1
    pub ch1: f64,
    /// Channel 2
    pub ch2: f64,
}

/// Capability: Temperature Sensing
///
/// # Contract
/// - `read_channels()` returns the latest sample of both channels
/// - Returns Err when the device handle is invalid or the read fails
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    /// Read the latest sample of both channels
    async fn read_channels(&self) -> Result<ThermocoupleReading>;
}

/// Axial force component of a raw vector, if the vector is long enough.
pub fn axial_component(vector: &[f64]) -> Option<f64> {
    vector.get(AXIAL_AXIS).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axial_component_is_third_entry() {
        assert_eq!(axial_component(&[1.0, 2.0, 3.0, 4.0]), Some(3.0));
        assert_eq!(axial_component(&[1.0, 2.0]), None);
        assert_eq!(axial_component(&[]), None);
    }
}
