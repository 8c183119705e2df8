//! Temperature acquisition loop (~10 Hz).

use crate::error::AppResult;
use crate::error_recovery::FailureTracker;
use crate::hardware::TemperatureSensor;
use crate::session::TemperatureRecorder;
use crate::shutdown::{ticker, RunFlag};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Reads both thermocouple channels while a session is open and appends a row.
pub struct TemperatureLoop {
    sensor: Arc<dyn TemperatureSensor>,
    recorder: TemperatureRecorder,
    run: RunFlag,
    period: Duration,
}

impl TemperatureLoop {
    /// New loop polling every `period`.
    pub fn new(
        sensor: Arc<dyn TemperatureSensor>,
        recorder: TemperatureRecorder,
        run: RunFlag,
        period: Duration,
    ) -> Self {
        Self {
            sensor,
            recorder,
            run,
            period,
        }
    }

    /// Run until the flag is cleared. The DAQ is not touched while idle.
    pub async fn run(mut self) -> AppResult<()> {
        info!(period_ms = self.period.as_millis() as u64, "Temperature loop started");
        let mut ticker = ticker(self.period);
        let mut failures = FailureTracker::new("thermocouple DAQ");
        let mut rows = 0u64;

        while self.run.tick(&mut ticker).await {
            if !self.recorder.is_recording().await {
                continue;
            }

            let reading = match self.sensor.read_channels().await {
                Ok(reading) => reading,
                Err(e) => {
                    failures.failure(&format!("{:#}", e));
                    continue;
                }
            };

            // the session may have closed during the read; record() re-checks
            match self.recorder.record(reading).await {
                Ok(Some(_)) => {
                    failures.success();
                    rows += 1;
                }
                Ok(None) => {}
                Err(e) => failures.failure(&e),
            }
        }

        info!(rows, "Temperature loop stopped");
        Ok(())
    }
}
