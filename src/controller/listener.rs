//! Command listener: reads start/stop frames and drives the session state machine.

use super::protocol::{Command, FrameAssembler, COMMAND_FRAME_LEN};
use crate::error::{AppResult, DaqError};
use crate::session::{BeginOutcome, EndOutcome, SessionController};
use crate::shutdown::RunFlag;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Owns the command stream and the [`SessionController`].
///
/// Every iteration first checks the grace deadline, then waits for bytes until the
/// read timeout or the deadline, whichever comes first. A silent controller therefore
/// never delays finalization past the deadline.
pub struct CommandListener<R> {
    stream: R,
    controller: SessionController,
    run: RunFlag,
    read_timeout: Duration,
    assembler: FrameAssembler<COMMAND_FRAME_LEN>,
}

impl<R> CommandListener<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Listener over `stream`.
    pub fn new(
        stream: R,
        controller: SessionController,
        run: RunFlag,
        read_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            controller,
            run,
            read_timeout,
            assembler: FrameAssembler::new(),
        }
    }

    /// Run until the flag is cleared, the controller hangs up, or the socket fails.
    ///
    /// A grace period still running when the loop exits is waited out (or cut short
    /// by the run flag) before returning.
    pub async fn run(mut self) -> AppResult<()> {
        info!(read_timeout_ms = self.read_timeout.as_millis() as u64, "Command listener started");
        let mut buf = [0u8; 64];

        let result = loop {
            if !self.run.is_running() {
                break Ok(());
            }
            self.poll_tail().await;
            let deadline = self.controller.tail_deadline().await;

            let read = tokio::select! {
                _ = self.run.stopped() => break Ok(()),
                _ = sleep_until_deadline(deadline) => continue,
                read = timeout(self.read_timeout, self.stream.read(&mut buf)) => read,
            };

            let n = match read {
                // nothing arrived in time; go back and check the deadline
                Err(_) => continue,
                Ok(Ok(0)) => {
                    warn!("Controller closed the command connection");
                    break Ok(());
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    let err = DaqError::from(e);
                    if err.is_transient() {
                        debug!(error = %err, "Transient command read error");
                        continue;
                    }
                    error!(error = %err, "Command socket read failed");
                    break Err(err);
                }
            };

            for frame in self.assembler.push(&buf[..n]) {
                self.handle_frame(frame).await;
            }
        };

        if self.assembler.pending() > 0 {
            debug!(bytes = self.assembler.pending(), "Discarding partial command frame");
        }
        self.drain_tail().await;
        info!("Command listener stopped");
        result
    }

    async fn handle_frame(&mut self, frame: [u8; COMMAND_FRAME_LEN]) {
        match Command::decode(frame) {
            Some(Command::Begin) => match self.controller.begin().await {
                Ok(BeginOutcome::Started(path)) => {
                    debug!(path = %path.display(), "Begin handled")
                }
                Ok(BeginOutcome::AlreadyOpen(_)) => {}
                Err(e) => error!(error = %e, "Could not open session file, staying idle"),
            },
            Some(Command::End) => match self.controller.end().await {
                Ok(EndOutcome::TailStarted { elapsed_s, .. }) => {
                    debug!(elapsed_s, "End handled")
                }
                Ok(EndOutcome::Ignored(_)) => {}
                Err(e) => error!(error = %e, "Stop command failed"),
            },
            None => warn!(frame = ?frame, "Unknown command frame, ignoring"),
        }
    }

    async fn poll_tail(&mut self) {
        match self.controller.poll_tail().await {
            Ok(Some(path)) => info!(path = %path.display(), "Session file finalized"),
            Ok(None) => {}
            Err(e) => error!(error = %e, "Failed to finalize session file"),
        }
    }

    async fn drain_tail(&mut self) {
        let Some(deadline) = self.controller.tail_deadline().await else {
            return;
        };
        if self.run.is_running() {
            info!("Waiting out the grace period before exiting");
            tokio::select! {
                _ = self.run.stopped() => {}
                _ = sleep_until(deadline) => {}
            }
        }
        // when cut short by the run flag the shutdown path finalizes instead
        self.poll_tail().await;
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
