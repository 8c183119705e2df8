//! Outbound force telemetry.
//!
//! Streams the calibrated axial force to the controller at a fixed rate, whether or
//! not a session is open. Each frame is one big-endian `f32`.

use super::protocol::encode_f32;
use crate::calibration::Calibration;
use crate::error::AppResult;
use crate::error_recovery::FailureTracker;
use crate::hardware::ForceSensor;
use crate::shutdown::{ticker, RunFlag};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

/// Telemetry loop over an outbound stream.
pub struct TelemetrySender<W> {
    stream: W,
    sensor: Arc<dyn ForceSensor>,
    calibration: Calibration,
    run: RunFlag,
    period: Duration,
    frames_sent: u64,
}

impl<W> TelemetrySender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Sender writing to `stream` every `period`.
    pub fn new(
        stream: W,
        sensor: Arc<dyn ForceSensor>,
        calibration: Calibration,
        run: RunFlag,
        period: Duration,
    ) -> Self {
        Self {
            stream,
            sensor,
            calibration,
            run,
            period,
            frames_sent: 0,
        }
    }

    /// Run until stopped. Sensor errors skip the tick; a failed write ends the loop,
    /// since the controller side of the socket is gone.
    pub async fn run(mut self) -> AppResult<()> {
        info!(period_ms = self.period.as_millis() as u64, "Telemetry sender started");
        let mut ticker = ticker(self.period);
        let mut failures = FailureTracker::new("telemetry force read");

        while self.run.tick(&mut ticker).await {
            let force = match self.calibration.read(self.sensor.as_ref()).await {
                Ok(force) => {
                    failures.success();
                    force
                }
                Err(e) => {
                    failures.failure(&e);
                    continue;
                }
            };

            let frame = encode_f32(force as f32);
            let sent = tokio::select! {
                _ = self.run.stopped() => break,
                sent = write_frame(&mut self.stream, &frame) => sent,
            };
            if let Err(e) = sent {
                error!(
                    error = %e,
                    frames_sent = self.frames_sent,
                    "Telemetry write failed, stopping sender"
                );
                return Err(e.into());
            }
            self.frames_sent += 1;
        }

        let _ = self.stream.shutdown().await;
        info!(frames_sent = self.frames_sent, "Telemetry sender stopped");
        Ok(())
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, frame: &[u8]) -> std::io::Result<()> {
    stream.write_all(frame).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::protocol::decode_f32;
    use crate::hardware::MockForceSensor;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn streams_calibrated_force_as_big_endian_floats() {
        let sensor = MockForceSensor::with_axial(5.0e6 - 1.25e6);
        let calibration = Calibration::new(5.0e6, 1.0e6);
        let (stream, mut plc) = tokio::io::duplex(1024);
        let run = RunFlag::new();

        let sender = TelemetrySender::new(
            stream,
            Arc::new(sensor),
            calibration,
            run.clone(),
            Duration::from_millis(5),
        );
        let task = tokio::spawn(sender.run());

        let mut frame = [0u8; 4];
        for _ in 0..3 {
            plc.read_exact(&mut frame).await.unwrap();
            assert_eq!(decode_f32(&frame), Some(1.25));
        }

        run.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn sensor_failures_skip_ticks_without_stopping() {
        let sensor = MockForceSensor::with_axial(0.0);
        sensor.set_failing(true);
        let (stream, mut plc) = tokio::io::duplex(1024);
        let run = RunFlag::new();
        let task = tokio::spawn(
            TelemetrySender::new(
                stream,
                Arc::new(sensor.clone()),
                Calibration::new(0.0, 1.0),
                run.clone(),
                Duration::from_millis(5),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());
        sensor.set_failing(false);

        let mut frame = [0u8; 4];
        plc.read_exact(&mut frame).await.unwrap();
        assert_eq!(decode_f32(&frame), Some(0.0));

        run.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_peer_ends_the_sender_with_an_error() {
        let (stream, plc) = tokio::io::duplex(1024);
        drop(plc);
        let run = RunFlag::new();
        let result = TelemetrySender::new(
            stream,
            Arc::new(MockForceSensor::with_axial(0.0)),
            Calibration::new(0.0, 1.0),
            run,
            Duration::from_millis(5),
        )
        .run()
        .await;
        assert!(result.is_err());
    }
}
