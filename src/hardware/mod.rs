//! Hardware collaborators.
//!
//! Capability traits for the force/torque sensor and the thermocouple DAQ, plus
//! simulated implementations used by the tests and by bench runs.

pub mod capabilities;
pub mod mock;

pub use capabilities::{
    axial_component, ForceSensor, TemperatureSensor, ThermocoupleReading, AXIAL_AXIS,
};
pub use mock::{MockForceSensor, MockThermocouple};
