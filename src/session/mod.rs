//! Session state machine and the role handles that share it.
//!
//! One [`SessionState`] lives behind one `tokio::sync::Mutex` for the whole process.
//! [`Session::new`] hands out one non-`Clone` handle per role, so the field ownership
//! rules are enforced by who holds which handle:
//!
//! | handle                 | held by              | may change                                |
//! |------------------------|----------------------|-------------------------------------------|
//! | [`SessionController`]  | command listener     | phase, start time, file lifecycle         |
//! | [`ForceRecorder`]      | force loop           | appends force rows, clears velocity flag  |
//! | [`TemperatureRecorder`]| temperature loop     | appends temperature rows                  |
//! | [`VelocityPublisher`]  | velocity loop        | last shear velocity, sets velocity flag   |
//!
//! State machine:
//!
//! ```text
//!  Idle --begin--> Active --end--> ExtendedTail --deadline--> Idle
//!                         (marker row)             (finalize file)
//! ```
//!
//! Every method takes the lock once, does its work, and releases it before returning.
//! Nothing awaits while holding the lock.

mod state;

pub use state::SessionPhase;

use crate::data::{LogRow, SinkManager, STOP_MARKER};
use crate::error::AppResult;
use crate::hardware::ThermocoupleReading;
use state::SessionState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Shared session, retained by the orchestrator for inspection and the final close.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

/// The per-role handles returned by [`Session::new`].
pub struct SessionHandles {
    /// For the command listener
    pub controller: SessionController,
    /// For the force loop
    pub force: ForceRecorder,
    /// For the temperature loop
    pub temperature: TemperatureRecorder,
    /// For the velocity loop
    pub velocity: VelocityPublisher,
}

impl Session {
    /// Create the shared state in `Idle` and split it into role handles.
    pub fn new(sink: SinkManager, grace_period: Duration) -> (Session, SessionHandles) {
        let inner = Arc::new(Mutex::new(SessionState::new(sink, grace_period)));
        let session = Session {
            inner: inner.clone(),
        };
        let handles = SessionHandles {
            controller: SessionController {
                inner: inner.clone(),
            },
            force: ForceRecorder {
                inner: inner.clone(),
            },
            temperature: TemperatureRecorder {
                inner: inner.clone(),
            },
            velocity: VelocityPublisher { inner },
        };
        (session, handles)
    }

    /// Current phase.
    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }

    /// Path of the open file, if any.
    pub async fn current_path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .await
            .sink
            .current_path()
            .map(|p| p.to_path_buf())
    }

    /// Number of sessions started since process start.
    pub async fn sessions_started(&self) -> u64 {
        self.inner.lock().await.sessions_started
    }

    /// Shutdown path: finalize whatever is open and return to `Idle`.
    ///
    /// Idempotent; returns the finalized path only on the call that closed it.
    pub async fn close(&self) -> AppResult<Option<PathBuf>> {
        let mut state = self.inner.lock().await;
        if state.phase.is_logging() {
            info!(phase = state.phase.name(), "Closing session on shutdown");
        }
        state.phase = SessionPhase::Idle;
        state.started_at = None;
        state.sink.finalize()
    }
}

/// Outcome of a begin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A new file was opened.
    Started(PathBuf),
    /// A session was already open; nothing changed.
    AlreadyOpen(SessionPhase),
}

/// Outcome of an end command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndOutcome {
    /// Marker written, grace period running until `deadline`.
    TailStarted {
        /// Elapsed time stamped on the marker row.
        elapsed_s: f64,
        /// When the file will be finalized.
        deadline: Instant,
    },
    /// No active session; nothing changed.
    Ignored(SessionPhase),
}

/// Drives the state machine. Held only by the command listener.
pub struct SessionController {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionController {
    /// Idle -> Active: reset the start time and open a new file.
    ///
    /// Redundant begins (Active or ExtendedTail) are ignored and do not reset the
    /// start time. On a file error the state stays Idle.
    pub async fn begin(&mut self) -> AppResult<BeginOutcome> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Idle {
            warn!(phase = state.phase.name(), "Begin received while a session is open, ignoring");
            return Ok(BeginOutcome::AlreadyOpen(state.phase));
        }

        let path = state.sink.open()?;
        state.phase = SessionPhase::Active;
        state.started_at = Some(Instant::now());
        // a sample published before this session must not land in its first row
        state.velocity_fresh = false;
        state.sessions_started += 1;
        info!(
            session = state.sessions_started,
            path = %path.display(),
            "Session started"
        );
        Ok(BeginOutcome::Started(path))
    }

    /// Active -> ExtendedTail: write the stop marker and arm the grace deadline.
    ///
    /// A failed marker write is logged and the tail still starts, so the file is
    /// finalized on schedule.
    pub async fn end(&mut self) -> AppResult<EndOutcome> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Active {
            warn!(phase = state.phase.name(), "End received without an active session, ignoring");
            return Ok(EndOutcome::Ignored(state.phase));
        }

        let now = Instant::now();
        let elapsed_s = state.elapsed_at(now);
        if let Err(e) = state.sink.append(&LogRow::marker(elapsed_s, STOP_MARKER)) {
            warn!(error = %e, "Failed to write stop marker");
        }
        let deadline = now + state.grace_period;
        state.phase = SessionPhase::ExtendedTail { deadline };
        info!(
            elapsed_s,
            grace_s = state.grace_period.as_secs_f64(),
            "Stop received, extended logging started"
        );
        Ok(EndOutcome::TailStarted {
            elapsed_s,
            deadline,
        })
    }

    /// Non-blocking deadline check. Finalizes the file once the grace period is over.
    pub async fn poll_tail(&mut self) -> AppResult<Option<PathBuf>> {
        self.poll_tail_at(Instant::now()).await
    }

    async fn poll_tail_at(&mut self, now: Instant) -> AppResult<Option<PathBuf>> {
        let mut state = self.inner.lock().await;
        let SessionPhase::ExtendedTail { deadline } = state.phase else {
            return Ok(None);
        };
        if now < deadline {
            return Ok(None);
        }

        state.phase = SessionPhase::Idle;
        state.started_at = None;
        let path = state.sink.finalize()?;
        let late_ms = now.saturating_duration_since(deadline).as_millis() as u64;
        info!(elapsed_since_deadline_ms = late_ms, "Session finished");
        Ok(path)
    }

    /// Deadline of a running grace period.
    pub async fn tail_deadline(&self) -> Option<Instant> {
        match self.inner.lock().await.phase {
            SessionPhase::ExtendedTail { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Current phase.
    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }
}

/// A recorded force sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceSample {
    /// Seconds since session start.
    pub elapsed_s: f64,
    /// Calibrated axial force in newtons.
    pub axial_force: f64,
    /// Shear velocity attributed to this row.
    pub shear_velocity: Option<f32>,
}

/// Appends force rows. Held only by the force loop, the sole consumer of the
/// velocity freshness flag.
pub struct ForceRecorder {
    inner: Arc<Mutex<SessionState>>,
}

impl ForceRecorder {
    /// Append a force row if a session is open.
    ///
    /// A fresh velocity sample is taken and cleared in the same critical section, so
    /// it appears in exactly this row and never again. Returns `None` when idle.
    pub async fn record(&mut self, axial_force: f64) -> AppResult<Option<ForceSample>> {
        let mut state = self.inner.lock().await;
        if !state.is_recording() {
            return Ok(None);
        }

        let elapsed_s = state.elapsed_at(Instant::now());
        let shear_velocity = state.take_fresh_velocity();
        state
            .sink
            .append(&LogRow::force(elapsed_s, axial_force, shear_velocity))?;
        Ok(Some(ForceSample {
            elapsed_s,
            axial_force,
            shear_velocity,
        }))
    }
}

/// Appends temperature rows. Held only by the temperature loop.
pub struct TemperatureRecorder {
    inner: Arc<Mutex<SessionState>>,
}

impl TemperatureRecorder {
    /// Whether a session is open (the DAQ is only read then).
    pub async fn is_recording(&self) -> bool {
        self.inner.lock().await.is_recording()
    }

    /// Append a temperature row if a session is still open. Returns the elapsed time used.
    pub async fn record(&mut self, reading: ThermocoupleReading) -> AppResult<Option<f64>> {
        let mut state = self.inner.lock().await;
        if !state.is_recording() {
            return Ok(None);
        }
        let elapsed_s = state.elapsed_at(Instant::now());
        state.sink.append(&LogRow::temperature(elapsed_s, reading))?;
        Ok(Some(elapsed_s))
    }
}

/// Publishes shear-velocity samples. Held only by the velocity loop.
pub struct VelocityPublisher {
    inner: Arc<Mutex<SessionState>>,
}

impl VelocityPublisher {
    /// Store `velocity` as the latest sample and mark it fresh.
    ///
    /// Last value wins: returns `true` if an unconsumed sample was overwritten.
    pub async fn publish(&mut self, velocity: f32) -> bool {
        let mut state = self.inner.lock().await;
        let dropped = state.velocity_fresh;
        state.last_shear_velocity = Some(velocity);
        state.velocity_fresh = true;
        if dropped {
            debug!(velocity, "Unconsumed shear velocity overwritten");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnLayout, FixedClock, SystemClock, WallClock};
    use chrono::{Local, TimeZone};
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn session_in(dir: &TempDir, grace: Duration) -> (Session, SessionHandles) {
        let sink = SinkManager::new(
            dir.path(),
            ColumnLayout::with_shear_velocity(),
            Arc::new(SystemClock),
        );
        Session::new(sink, grace)
    }

    fn rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.records().map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn begin_opens_file_and_activates() {
        let dir = tempdir().unwrap();
        let (session, mut handles) = session_in(&dir, Duration::from_secs(11));

        let outcome = handles.controller.begin().await.unwrap();
        let BeginOutcome::Started(path) = outcome else {
            panic!("expected a new session");
        };
        assert!(path.exists());
        assert_eq!(session.phase().await, SessionPhase::Active);
        assert_eq!(session.current_path().await, Some(path));
        assert_eq!(session.sessions_started().await, 1);
    }

    #[tokio::test]
    async fn idle_recorders_write_nothing() {
        let dir = tempdir().unwrap();
        let (_session, mut handles) = session_in(&dir, Duration::from_secs(11));

        assert_eq!(handles.force.record(1.0).await.unwrap(), None);
        assert!(!handles.temperature.is_recording().await);
        assert_eq!(
            handles
                .temperature
                .record(ThermocoupleReading { ch1: 1.0, ch2: 2.0 })
                .await
                .unwrap(),
            None
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn redundant_begin_is_ignored_without_resetting_start() {
        let dir = tempdir().unwrap();
        let (session, mut handles) = session_in(&dir, Duration::from_secs(11));

        handles.controller.begin().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let outcome = handles.controller.begin().await.unwrap();
        assert_eq!(outcome, BeginOutcome::AlreadyOpen(SessionPhase::Active));

        let sample = handles.force.record(0.5).await.unwrap().unwrap();
        assert!(sample.elapsed_s >= 0.03, "start time was reset");
        assert_eq!(session.sessions_started().await, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn end_while_idle_is_ignored() {
        let dir = tempdir().unwrap();
        let (_session, mut handles) = session_in(&dir, Duration::from_secs(11));
        assert_eq!(
            handles.controller.end().await.unwrap(),
            EndOutcome::Ignored(SessionPhase::Idle)
        );
    }

    #[tokio::test]
    async fn end_writes_marker_then_tail_finalizes_after_deadline() {
        let dir = tempdir().unwrap();
        let grace = Duration::from_millis(200);
        let (session, mut handles) = session_in(&dir, grace);

        let BeginOutcome::Started(path) = handles.controller.begin().await.unwrap() else {
            panic!("expected a new session");
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let EndOutcome::TailStarted { elapsed_s, deadline } =
            handles.controller.end().await.unwrap()
        else {
            panic!("expected tail to start");
        };
        assert!(elapsed_s >= 0.02);
        assert_eq!(handles.controller.tail_deadline().await, Some(deadline));

        // second end during the tail is ignored
        assert!(matches!(
            handles.controller.end().await.unwrap(),
            EndOutcome::Ignored(SessionPhase::ExtendedTail { .. })
        ));
        // begin during the tail is ignored too
        assert!(matches!(
            handles.controller.begin().await.unwrap(),
            BeginOutcome::AlreadyOpen(SessionPhase::ExtendedTail { .. })
        ));

        // rows are still accepted during the tail
        assert!(handles.force.record(2.0).await.unwrap().is_some());
        assert_eq!(handles.controller.poll_tail().await.unwrap(), None);

        let finalized = handles
            .controller
            .poll_tail_at(deadline)
            .await
            .unwrap();
        assert_eq!(finalized, Some(path.clone()));
        assert_eq!(session.phase().await, SessionPhase::Idle);
        assert_eq!(handles.force.record(3.0).await.unwrap(), None);

        let records = rows(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][5], STOP_MARKER);
        assert_eq!(&records[1][1], "2");
    }

    #[tokio::test]
    async fn velocity_sample_is_delivered_at_most_once() {
        let dir = tempdir().unwrap();
        let (_session, mut handles) = session_in(&dir, Duration::from_secs(11));
        handles.controller.begin().await.unwrap();

        assert!(!handles.velocity.publish(1.0).await);
        assert!(handles.velocity.publish(2.0).await);
        assert!(handles.velocity.publish(3.0).await);

        let first = handles.force.record(0.1).await.unwrap().unwrap();
        let second = handles.force.record(0.2).await.unwrap().unwrap();
        assert_eq!(first.shear_velocity, Some(3.0));
        assert_eq!(second.shear_velocity, None);
    }

    #[tokio::test]
    async fn velocity_published_before_begin_is_not_attributed() {
        let dir = tempdir().unwrap();
        let (_session, mut handles) = session_in(&dir, Duration::from_secs(11));

        handles.velocity.publish(9.5).await;
        handles.controller.begin().await.unwrap();
        let sample = handles.force.record(0.1).await.unwrap().unwrap();
        assert_eq!(sample.shear_velocity, None);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let (session, mut handles) = session_in(&dir, Duration::from_secs(11));
        let BeginOutcome::Started(path) = handles.controller.begin().await.unwrap() else {
            panic!("expected a new session");
        };
        handles.force.record(1.5).await.unwrap();

        assert_eq!(session.close().await.unwrap(), Some(path.clone()));
        assert_eq!(session.close().await.unwrap(), None);
        assert_eq!(session.phase().await, SessionPhase::Idle);
        assert_eq!(rows(&path).len(), 1);
    }

    #[tokio::test]
    async fn sessions_in_the_same_second_get_unique_files() {
        let dir = tempdir().unwrap();
        let stamp = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let clock: Arc<dyn WallClock> = Arc::new(FixedClock(stamp));
        let sink = SinkManager::new(dir.path(), ColumnLayout::with_shear_velocity(), clock);
        let (session, mut handles) = Session::new(sink, Duration::ZERO);

        let mut paths = Vec::new();
        for _ in 0..3 {
            let BeginOutcome::Started(path) = handles.controller.begin().await.unwrap() else {
                panic!("expected a new session");
            };
            handles.force.record(1.0).await.unwrap();
            handles.controller.end().await.unwrap();
            assert_eq!(handles.controller.poll_tail().await.unwrap(), Some(path.clone()));
            paths.push(path);
        }

        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
        assert_eq!(session.sessions_started().await, 3);
        for path in &paths {
            assert!(std::fs::metadata(path).unwrap().len() > 0);
        }
    }
}
