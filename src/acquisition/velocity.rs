//! Shear-velocity acquisition loop.
//!
//! Reads 4-byte frames from the controller's velocity socket and publishes the latest
//! value for the force loop to pick up. It never writes rows itself.

use crate::controller::protocol::{decode_f32, FLOAT_FRAME_LEN};
use crate::error::{AppResult, DaqError};
use crate::session::VelocityPublisher;
use crate::shutdown::RunFlag;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Velocity loop over an inbound stream.
pub struct VelocityLoop<R> {
    stream: R,
    publisher: VelocityPublisher,
    run: RunFlag,
    read_timeout: Duration,
}

impl<R> VelocityLoop<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// New loop; each read waits at most `read_timeout`.
    pub fn new(
        stream: R,
        publisher: VelocityPublisher,
        run: RunFlag,
        read_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            publisher,
            run,
            read_timeout,
        }
    }

    /// Run until stopped or the controller hangs up.
    ///
    /// Each read is one frame; a read that does not return exactly four bytes is
    /// discarded as invalid.
    pub async fn run(mut self) -> AppResult<()> {
        info!(read_timeout_ms = self.read_timeout.as_millis() as u64, "Velocity loop started");
        let mut buf = [0u8; FLOAT_FRAME_LEN];
        let mut published = 0u64;
        let mut overwritten = 0u64;
        let mut discarded = 0u64;

        while self.run.is_running() {
            let read = tokio::select! {
                _ = self.run.stopped() => break,
                read = timeout(self.read_timeout, self.stream.read(&mut buf)) => read,
            };

            let n = match read {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    warn!("Controller closed the velocity connection");
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    let err = DaqError::from(e);
                    if err.is_transient() {
                        debug!(error = %err, "Transient velocity read error");
                        continue;
                    }
                    error!(error = %err, "Velocity socket read failed");
                    return Err(err);
                }
            };

            match decode_f32(&buf[..n]) {
                Some(velocity) => {
                    published += 1;
                    if self.publisher.publish(velocity).await {
                        overwritten += 1;
                    }
                }
                None => {
                    discarded += 1;
                    warn!(bytes = n, "Invalid velocity frame, discarding");
                }
            }
        }

        debug!(published, overwritten, discarded, "Velocity statistics");
        info!("Velocity loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::protocol::encode_f32;
    use crate::data::{ColumnLayout, SinkManager, SystemClock};
    use crate::session::Session;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn published_velocity_lands_in_next_force_row_once() {
        let dir = tempdir().unwrap();
        let sink = SinkManager::new(
            dir.path(),
            ColumnLayout::with_shear_velocity(),
            Arc::new(SystemClock),
        );
        let (_session, mut handles) = Session::new(sink, Duration::from_secs(11));
        handles.controller.begin().await.unwrap();

        let (mut plc, stream) = tokio::io::duplex(64);
        let run = RunFlag::new();
        let velocity =
            VelocityLoop::new(stream, handles.velocity, run.clone(), Duration::from_millis(5));
        let task = tokio::spawn(velocity.run());

        plc.write_all(&encode_f32(0.75)).await.unwrap();
        let mut first = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let sample = handles.force.record(1.0).await.unwrap().unwrap();
            if sample.shear_velocity.is_some() {
                first = sample.shear_velocity;
                break;
            }
        }
        assert_eq!(first, Some(0.75));
        let next = handles.force.record(1.0).await.unwrap().unwrap();
        assert_eq!(next.shear_velocity, None);

        drop(plc);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn short_frame_is_discarded() {
        let dir = tempdir().unwrap();
        let sink = SinkManager::new(
            dir.path(),
            ColumnLayout::with_shear_velocity(),
            Arc::new(SystemClock),
        );
        let (_session, mut handles) = Session::new(sink, Duration::from_secs(11));
        handles.controller.begin().await.unwrap();

        let (mut plc, stream) = tokio::io::duplex(64);
        let run = RunFlag::new();
        let velocity =
            VelocityLoop::new(stream, handles.velocity, run.clone(), Duration::from_millis(5));
        let mut force = handles.force;

        // driven on this task so the loop's events land in the test's log scope
        let (result, sample) = tokio::join!(velocity.run(), async {
            plc.write_all(&[0x3f, 0x80]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            let sample = force.record(1.0).await.unwrap().unwrap();
            run.stop();
            sample
        });

        result.unwrap();
        assert_eq!(sample.shear_velocity, None);
        assert!(logs_contain("Invalid velocity frame"));
    }
}
