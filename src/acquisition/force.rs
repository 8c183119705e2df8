//! Force acquisition loop (~100 Hz).

use crate::calibration::Calibration;
use crate::error::AppResult;
use crate::error_recovery::FailureTracker;
use crate::hardware::ForceSensor;
use crate::session::{ForceRecorder, ForceSample};
use crate::shutdown::{ticker, RunFlag};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Samples the force sensor every tick and appends a row while a session is open.
pub struct ForceLoop {
    sensor: Arc<dyn ForceSensor>,
    calibration: Calibration,
    recorder: ForceRecorder,
    run: RunFlag,
    period: Duration,
    echo: bool,
}

impl ForceLoop {
    /// New loop; `echo` prints every recorded sample on stdout.
    pub fn new(
        sensor: Arc<dyn ForceSensor>,
        calibration: Calibration,
        recorder: ForceRecorder,
        run: RunFlag,
        period: Duration,
        echo: bool,
    ) -> Self {
        Self {
            sensor,
            calibration,
            recorder,
            run,
            period,
            echo,
        }
    }

    /// Run until the flag is cleared. Sensor and write failures are retried next tick.
    pub async fn run(mut self) -> AppResult<()> {
        info!(period_ms = self.period.as_millis() as u64, echo = self.echo, "Force loop started");
        let mut ticker = ticker(self.period);
        let mut sensor_failures = FailureTracker::new("force sensor");
        let mut write_failures = FailureTracker::new("force row write");
        let mut rows = 0u64;

        while self.run.tick(&mut ticker).await {
            let force = match self.calibration.read(self.sensor.as_ref()).await {
                Ok(force) => {
                    sensor_failures.success();
                    force
                }
                Err(e) => {
                    sensor_failures.failure(&e);
                    continue;
                }
            };

            match self.recorder.record(force).await {
                Ok(Some(sample)) => {
                    write_failures.success();
                    rows += 1;
                    if self.echo {
                        println!("{}", echo_line(&sample));
                    }
                }
                Ok(None) => {}
                Err(e) => write_failures.failure(&e),
            }
        }

        info!(rows, "Force loop stopped");
        Ok(())
    }
}

/// Operator echo: elapsed seconds and force in newtons.
pub fn echo_line(sample: &ForceSample) -> String {
    format!("Time: {:.2} s, Force: {:.6} N", sample.elapsed_s, sample.axial_force)
}
