//! Mock Hardware Implementations
//!
//! Simulated devices for tests and for running the rig on a bench without the
//! force sensor or the thermocouple DAQ attached.
//!
//! # Available Mocks
//!
//! - `MockForceSensor` - settable raw force vector, optional noise, scripted readings,
//!   failure injection
//! - `MockThermocouple` - settable two-channel reading, failure injection
//!
//! Locks are `std::sync::Mutex`: they are never held across an `.await`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::hardware::capabilities::{ForceSensor, TemperatureSensor, ThermocoupleReading};

// =============================================================================
// MockForceSensor - Simulated Force/Torque Sensor
// =============================================================================

/// Mock six-axis force/torque sensor
///
/// Returns the configured vector on every read. Scripted readings queued with
/// [`MockForceSensor::push_axial`] are served first, one per trigger, before
/// falling back to the steady value.
///
/// # Example
///
/// ```rust,ignore
/// let sensor = MockForceSensor::with_axial(5_000_000.0);
/// sensor.push_axial(3_770_000.0);
/// assert_eq!(sensor.sample().await?[2], 3_770_000.0);
/// assert_eq!(sensor.sample().await?[2], 5_000_000.0);
/// ```
#[derive(Clone, Default)]
pub struct MockForceSensor {
    inner: Arc<ForceState>,
}

#[derive(Default)]
struct ForceState {
    current: Mutex<Vec<f64>>,
    scripted: Mutex<VecDeque<f64>>,
    noise_amplitude: Mutex<f64>,
    failing: AtomicBool,
    triggers: AtomicU64,
}

impl MockForceSensor {
    /// Sensor reporting an all-zero six-axis vector
    pub fn new() -> Self {
        Self::with_vector(vec![0.0; 6])
    }

    /// Sensor reporting the given raw axial force, other axes zero
    pub fn with_axial(raw_axial: f64) -> Self {
        Self::with_vector(vec![0.0, 0.0, raw_axial, 0.0, 0.0, 0.0])
    }

    /// Sensor reporting exactly `vector`
    pub fn with_vector(vector: Vec<f64>) -> Self {
        Self {
            inner: Arc::new(ForceState {
                current: Mutex::new(vector),
                ..Default::default()
            }),
        }
    }

    /// Add uniform noise of +/- `amplitude` counts to the axial component
    pub fn with_noise(self, amplitude: f64) -> Self {
        *lock(&self.inner.noise_amplitude) = amplitude.abs();
        self
    }

    /// Change the steady raw axial force
    pub fn set_axial(&self, raw_axial: f64) {
        let mut current = lock(&self.inner.current);
        if current.len() < 3 {
            current.resize(3, 0.0);
        }
        current[2] = raw_axial;
    }

    /// Replace the whole vector (a short vector simulates a malformed packet)
    pub fn set_vector(&self, vector: Vec<f64>) {
        *lock(&self.inner.current) = vector;
    }

    /// Queue a one-shot raw axial value, consumed by the next trigger
    pub fn push_axial(&self, raw_axial: f64) {
        lock(&self.inner.scripted).push_back(raw_axial);
    }

    /// Make every subsequent call fail (or recover)
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful triggers so far
    pub fn trigger_count(&self) -> u64 {
        self.inner.triggers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForceSensor for MockForceSensor {
    async fn trigger(&self) -> Result<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("MockForceSensor: simulated trigger failure"));
        }
        if let Some(next) = lock(&self.inner.scripted).pop_front() {
            self.set_axial(next);
        }
        self.inner.triggers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn last_force(&self) -> Result<Vec<f64>> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("MockForceSensor: simulated read failure"));
        }
        let mut vector = lock(&self.inner.current).clone();
        let amplitude = *lock(&self.inner.noise_amplitude);
        if amplitude > 0.0 {
            if let Some(axial) = vector.get_mut(2) {
                *axial += rand::thread_rng().gen_range(-amplitude..=amplitude);
            }
        }
        Ok(vector)
    }
}

// =============================================================================
// MockThermocouple - Simulated Two-Channel Thermocouple DAQ
// =============================================================================

/// Mock two-channel thermocouple DAQ
#[derive(Clone)]
pub struct MockThermocouple {
    reading: Arc<Mutex<ThermocoupleReading>>,
    failing: Arc<AtomicBool>,
    reads: Arc<AtomicU64>,
}

impl MockThermocouple {
    /// DAQ reporting the given channel temperatures
    pub fn new(ch1: f64, ch2: f64) -> Self {
        Self {
            reading: Arc::new(Mutex::new(ThermocoupleReading { ch1, ch2 })),
            failing: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Change the reported temperatures
    pub fn set(&self, ch1: f64, ch2: f64) {
        *lock(&self.reading) = ThermocoupleReading { ch1, ch2 };
    }

    /// Make every subsequent read fail (or recover)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful reads so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockThermocouple {
    fn default() -> Self {
        Self::new(22.0, 22.0)
    }
}

#[async_trait]
impl TemperatureSensor for MockThermocouple {
    async fn read_channels(&self) -> Result<ThermocoupleReading> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("MockThermocouple: invalid device handle"));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(*lock(&self.reading))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
