//! Shared session state guarded by the session mutex.

use crate::data::SinkManager;
use std::time::Duration;
use tokio::time::Instant;

/// Where the session state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No file open, nothing is logged.
    Idle,
    /// File open, all loops append rows.
    Active,
    /// Stop received; loops keep appending until `deadline`, then the file is finalized.
    ExtendedTail {
        /// When the grace period ends.
        deadline: Instant,
    },
}

impl SessionPhase {
    /// Whether rows are being appended in this phase.
    pub fn is_logging(&self) -> bool {
        !matches!(self, SessionPhase::Idle)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Active => "active",
            SessionPhase::ExtendedTail { .. } => "extended_tail",
        }
    }
}

/// Every mutable field shared between the loops.
///
/// Writers per field:
/// - `phase`, `started_at`, `sink` lifecycle: the command listener (`SessionController`)
/// - `last_shear_velocity`, `velocity_fresh` = true: the velocity loop (`VelocityPublisher`)
/// - `velocity_fresh` = false: the force loop (`ForceRecorder`), or `begin`
pub(crate) struct SessionState {
    pub(crate) phase: SessionPhase,
    pub(crate) started_at: Option<Instant>,
    pub(crate) sink: SinkManager,
    pub(crate) grace_period: Duration,
    pub(crate) last_shear_velocity: Option<f32>,
    pub(crate) velocity_fresh: bool,
    pub(crate) sessions_started: u64,
}

impl SessionState {
    pub(crate) fn new(sink: SinkManager, grace_period: Duration) -> Self {
        Self {
            phase: SessionPhase::Idle,
            started_at: None,
            sink,
            grace_period,
            last_shear_velocity: None,
            velocity_fresh: false,
            sessions_started: 0,
        }
    }

    /// True when rows may be appended: a logging phase with an open file.
    pub(crate) fn is_recording(&self) -> bool {
        self.phase.is_logging() && self.sink.is_open()
    }

    /// Seconds since the session started, measured at `now`.
    pub(crate) fn elapsed_at(&self, now: Instant) -> f64 {
        self.started_at
            .map(|start| now.saturating_duration_since(start).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Read-and-clear of the freshness pair.
    pub(crate) fn take_fresh_velocity(&mut self) -> Option<f32> {
        if self.velocity_fresh {
            self.velocity_fresh = false;
            self.last_shear_velocity
        } else {
            None
        }
    }
}
