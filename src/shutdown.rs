//! Shutdown coordination.
//!
//! [`RunFlag`] is the process-wide run flag. Loops check [`RunFlag::is_running`] once
//! per iteration and race their interval sleep against [`RunFlag::stopped`], so a stop
//! wakes a sleeping loop at once instead of after its next tick.
//!
//! [`TaskGroup`] owns the spawned loops and joins each one with a bounded timeout,
//! aborting any that do not exit in time.

use crate::config::MIN_LOOP_PERIOD;
use crate::error::{AppResult, DaqError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Cooperative cancellation flag shared by every loop.
#[derive(Clone, Debug)]
pub struct RunFlag {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl RunFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(true);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Whether loops should keep going.
    pub fn is_running(&self) -> bool {
        *self.rx.borrow()
    }

    /// Ask every loop to exit. Idempotent.
    pub fn stop(&self) {
        self.tx.send_if_modified(|running| {
            let was_running = *running;
            *running = false;
            was_running
        });
    }

    /// Resolves once the flag has been cleared.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // the sender lives as long as any RunFlag clone, so this only errors if all are gone
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Wait for the next tick of `ticker`. Returns `false` as soon as the flag is
    /// cleared, waking the caller mid-sleep.
    pub async fn tick(&self, ticker: &mut Interval) -> bool {
        if !self.is_running() {
            return false;
        }
        tokio::select! {
            _ = self.stopped() => false,
            _ = ticker.tick() => self.is_running(),
        }
    }
}

/// Fixed-rate ticker for a polling loop. Late ticks are skipped, not bunched up.
///
/// Periods shorter than [`MIN_LOOP_PERIOD`] are raised to it.
pub fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period.max(MIN_LOOP_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of joining one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// Returned `Ok`.
    Completed,
    /// Returned an error.
    Failed(String),
    /// Panicked or was cancelled.
    Crashed(String),
    /// Did not finish within the join timeout and was aborted.
    TimedOut,
}

/// Per-task outcome of [`TaskGroup::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// `(task name, exit)` in spawn order.
    pub exits: Vec<(&'static str, TaskExit)>,
}

impl ShutdownReport {
    /// Names of the tasks that had to be aborted.
    pub fn timed_out(&self) -> Vec<&'static str> {
        self.exits
            .iter()
            .filter(|(_, exit)| *exit == TaskExit::TimedOut)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Whether every task finished cleanly.
    pub fn is_clean(&self) -> bool {
        self.exits
            .iter()
            .all(|(_, exit)| *exit == TaskExit::Completed)
    }

    /// Fold non-clean exits into one error.
    pub fn into_result(self) -> AppResult<()> {
        let errors: Vec<DaqError> = self
            .exits
            .into_iter()
            .filter_map(|(name, exit)| match exit {
                TaskExit::Completed => None,
                TaskExit::Failed(msg) | TaskExit::Crashed(msg) => Some(DaqError::Task(name, msg)),
                TaskExit::TimedOut => Some(DaqError::Task(
                    name,
                    "did not stop within the join timeout".to_string(),
                )),
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DaqError::ShutdownFailed(errors))
        }
    }
}

/// Names of the loops that have exited, in exit order.
type ExitedLoops = Arc<watch::Sender<Vec<&'static str>>>;

/// Records a loop's exit when dropped, so returns, panics and aborts all count.
struct ExitNotice {
    name: &'static str,
    exited: ExitedLoops,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let name = self.name;
        self.exited.send_modify(|names| names.push(name));
    }
}

/// The set of long-running loops.
pub struct TaskGroup {
    tasks: Vec<(&'static str, JoinHandle<AppResult<()>>)>,
    exited: ExitedLoops,
}

impl TaskGroup {
    /// Empty group.
    pub fn new() -> Self {
        let (exited, _) = watch::channel(Vec::new());
        Self {
            tasks: Vec::new(),
            exited: Arc::new(exited),
        }
    }

    /// Spawn a named loop onto the runtime.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        debug!(task = name, "Spawning loop");
        let notice = ExitNotice {
            name,
            exited: Arc::clone(&self.exited),
        };
        let handle = tokio::spawn(async move {
            let _notice = notice;
            task.await
        });
        self.tasks.push((name, handle));
    }

    /// Number of loops spawned.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no loop was spawned.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether the loop called `name` has exited.
    pub fn has_exited(&self, name: &str) -> bool {
        self.exited.borrow().iter().any(|exited| *exited == name)
    }

    /// Resolves once the loop called `name` has exited for any reason.
    ///
    /// Never resolves for a name that was not spawned.
    pub async fn wait_for_exit(&self, name: &str) {
        let mut exited = self.exited.subscribe();
        // the group holds the sender, so the channel cannot close under us
        let _ = exited
            .wait_for(|names| names.iter().any(|exited| *exited == name))
            .await;
    }

    /// Join every loop, waiting at most `join_timeout` for each.
    ///
    /// The caller is expected to have stopped the [`RunFlag`] first.
    pub async fn shutdown(self, join_timeout: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for (name, mut handle) in self.tasks {
            let exit = match timeout(join_timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => TaskExit::Completed,
                Ok(Ok(Err(e))) => {
                    error!(task = name, error = %e, "Loop ended with an error");
                    TaskExit::Failed(e.to_string())
                }
                Ok(Err(join_err)) => {
                    error!(task = name, error = %join_err, "Loop crashed");
                    TaskExit::Crashed(join_err.to_string())
                }
                Err(_) => {
                    warn!(
                        task = name,
                        timeout_ms = join_timeout.as_millis() as u64,
                        "Loop did not stop in time, aborting"
                    );
                    handle.abort();
                    TaskExit::TimedOut
                }
            };
            debug!(task = name, ?exit, "Loop joined");
            report.exits.push((name, exit));
        }
        info!(tasks = report.exits.len(), clean = report.is_clean(), "All loops joined");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn stop_wakes_sleeping_loop_immediately() {
        let flag = RunFlag::new();
        let loop_flag = flag.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = ticker(Duration::from_secs(60));
            let mut ticks = 0u32;
            while loop_flag.tick(&mut ticker).await {
                ticks += 1;
            }
            ticks
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let start = Instant::now();
        flag.stop();
        let ticks = handle.await.unwrap();
        assert_eq!(ticks, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_period_ticker_is_raised_to_the_minimum() {
        let mut ticker = ticker(Duration::ZERO);
        assert_eq!(ticker.period(), MIN_LOOP_PERIOD);
        ticker.tick().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let flag = RunFlag::new();
        assert!(flag.is_running());
        flag.stop();
        flag.stop();
        assert!(!flag.is_running());
        flag.stopped().await;
    }

    #[tokio::test]
    async fn wait_for_exit_resolves_when_the_named_loop_returns() {
        let flag = RunFlag::new();
        let mut group = TaskGroup::new();

        let (hang_up, closed) = tokio::sync::oneshot::channel::<()>();
        group.spawn("command", async move {
            let _ = closed.await;
            Ok(())
        });
        let other_flag = flag.clone();
        group.spawn("force", async move {
            other_flag.stopped().await;
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!group.has_exited("command"));

        drop(hang_up);
        tokio::time::timeout(Duration::from_secs(1), group.wait_for_exit("command"))
            .await
            .expect("command loop exit should be noticed");
        assert!(group.has_exited("command"));
        assert!(!group.has_exited("force"));

        flag.stop();
        let report = group.shutdown(Duration::from_millis(500)).await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn crashed_loop_counts_as_exited() {
        let mut group = TaskGroup::new();
        group.spawn("command", async {
            let socket: Option<()> = None;
            socket.expect("listener blew up");
            Ok(())
        });

        tokio::time::timeout(Duration::from_secs(1), group.wait_for_exit("command"))
            .await
            .expect("a panic should still be reported as an exit");
        let report = group.shutdown(Duration::from_millis(100)).await;
        assert!(matches!(report.exits[0], ("command", TaskExit::Crashed(_))));
    }

    #[tokio::test]
    async fn shutdown_reports_each_exit_kind() {
        let flag = RunFlag::new();
        let mut group = TaskGroup::new();

        let ok_flag = flag.clone();
        group.spawn("cooperative", async move {
            ok_flag.stopped().await;
            Ok(())
        });
        group.spawn("failing", async { Err(DaqError::Device("unplugged".into())) });
        group.spawn("stuck", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        assert_eq!(group.len(), 3);

        flag.stop();
        let start = Instant::now();
        let report = group.shutdown(Duration::from_millis(100)).await;
        assert!(start.elapsed() < Duration::from_secs(2));

        assert_eq!(report.exits[0], ("cooperative", TaskExit::Completed));
        assert!(matches!(report.exits[1], ("failing", TaskExit::Failed(_))));
        assert_eq!(report.exits[2], ("stuck", TaskExit::TimedOut));
        assert_eq!(report.timed_out(), vec!["stuck"]);
        assert!(!report.is_clean());

        match report.into_result() {
            Err(DaqError::ShutdownFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
