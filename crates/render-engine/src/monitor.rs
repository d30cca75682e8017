//! Periodic progress monitor for export jobs.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use reframe_common::error::{ReframeError, ReframeResult};

use crate::export::{ExportStatus, ProgressSource};

/// One observation delivered to the monitor callback.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorUpdate {
    /// Progress clamped to `[0, 1]`.
    pub progress: f64,
    pub status: ExportStatus,
    /// Time since the monitor started.
    pub elapsed: Duration,
    /// Remaining time extrapolated from progress so far.
    pub eta: Option<Duration>,
}

/// Why the monitor stopped ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Progress reached 1.0.
    Finished,
    /// The job reached a terminal status before full progress.
    Terminal(ExportStatus),
    /// `MonitorHandle::stop` was called.
    Stopped,
}

/// Summary returned once the monitor is done.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub ticks: u64,
    pub last_progress: f64,
    pub stop_reason: StopReason,
}

/// Polls a job's snapshot on a fixed interval from a single task.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMonitor {
    interval: Duration,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ProgressMonitor {
    /// A zero interval is raised to one millisecond.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `source` on the current runtime.
    ///
    /// Ticks never overlap: a slow callback delays the next tick and missed
    /// ticks are skipped.
    pub fn start<S, F>(&self, source: S, mut on_update: F) -> MonitorHandle
    where
        S: ProgressSource,
        F: FnMut(MonitorUpdate) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut ticks = 0u64;
            let mut last_progress = 0.0f64;

            let stop_reason = loop {
                tokio::select! {
                    biased;
                    _ = stopped(&mut stop_rx) => break StopReason::Stopped,
                    _ = ticker.tick() => {}
                }

                let snapshot = source.snapshot();
                let progress = if snapshot.progress.is_finite() {
                    snapshot.progress.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                ticks += 1;
                last_progress = progress;

                let elapsed = started.elapsed();
                on_update(MonitorUpdate {
                    progress,
                    status: snapshot.status,
                    elapsed,
                    eta: estimate_remaining(elapsed, progress),
                });

                if progress >= 1.0 {
                    break StopReason::Finished;
                }
                if snapshot.status.is_terminal() {
                    break StopReason::Terminal(snapshot.status);
                }
            };

            tracing::debug!(ticks, last_progress, reason = ?stop_reason, "Progress monitor stopped");
            MonitorSummary {
                ticks,
                last_progress,
                stop_reason,
            }
        });

        MonitorHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Control handle for a running monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<MonitorSummary>,
}

impl MonitorHandle {
    /// Ask the monitor to stop before its next tick. Safe to call repeatedly.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the monitor task to end.
    pub async fn join(self) -> ReframeResult<MonitorSummary> {
        self.task.await.map_err(|e| {
            ReframeError::Other(anyhow::Error::new(e).context("Progress monitor task failed"))
        })
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn estimate_remaining(elapsed: Duration, progress: f64) -> Option<Duration> {
    if progress <= 0.0 || progress >= 1.0 {
        return None;
    }
    let remaining = elapsed.as_secs_f64() / progress - elapsed.as_secs_f64();
    Some(Duration::from_secs_f64(remaining.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::JobSnapshot;
    use std::sync::{Arc, Mutex};

    /// Advances progress by a fixed step on every poll.
    struct SteppingSource {
        step: f64,
        state: Mutex<f64>,
    }

    impl ProgressSource for SteppingSource {
        fn snapshot(&self) -> JobSnapshot {
            let mut progress = self.state.lock().unwrap();
            *progress += self.step;
            JobSnapshot {
                status: ExportStatus::Exporting,
                progress: *progress,
                error: None,
            }
        }
    }

    struct FixedSource(JobSnapshot);

    impl ProgressSource for FixedSource {
        fn snapshot(&self) -> JobSnapshot {
            self.0.clone()
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<MonitorUpdate>>>, impl FnMut(MonitorUpdate) + Send + 'static) {
        let updates = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&updates);
        (updates, move |u| sink.lock().unwrap().push(u))
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_at_full_progress() {
        let (updates, callback) = recorder();
        let handle = ProgressMonitor::new(Duration::from_secs(1)).start(
            SteppingSource {
                step: 0.25,
                state: Mutex::new(0.0),
            },
            callback,
        );

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Finished);
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.last_progress, 1.0);

        let updates = updates.lock().unwrap();
        let progress: Vec<f64> = updates.iter().map(|u| u.progress).collect();
        assert_eq!(progress, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(updates[0].elapsed, Duration::ZERO);
        assert_eq!(updates[3].elapsed, Duration::from_secs(3));
        assert_eq!(updates[2].eta, Some(Duration::from_secs_f64(2.0 / 0.75 - 2.0)));
        assert_eq!(updates[3].eta, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_terminal_status() {
        let (updates, callback) = recorder();
        let handle = ProgressMonitor::default().start(
            FixedSource(JobSnapshot {
                status: ExportStatus::Failed,
                progress: 0.4,
                error: None,
            }),
            callback,
        );

        let summary = handle.join().await.unwrap();
        assert_eq!(
            summary.stop_reason,
            StopReason::Terminal(ExportStatus::Failed)
        );
        assert_eq!(summary.ticks, 1);
        assert_eq!(updates.lock().unwrap()[0].status, ExportStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_clamps_out_of_range_progress() {
        let (updates, callback) = recorder();
        let handle = ProgressMonitor::default().start(
            FixedSource(JobSnapshot {
                status: ExportStatus::Exporting,
                progress: 1.7,
                error: None,
            }),
            callback,
        );

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Finished);
        assert_eq!(updates.lock().unwrap()[0].progress, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_monitor() {
        let (updates, callback) = recorder();
        let handle = ProgressMonitor::new(Duration::from_millis(500)).start(
            FixedSource(JobSnapshot {
                status: ExportStatus::Exporting,
                progress: 0.1,
                error: None,
            }),
            callback,
        );

        tokio::time::sleep(Duration::from_millis(1200)).await;
        handle.stop();
        handle.stop();

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Stopped);
        assert_eq!(summary.ticks, 3);
        assert_eq!(updates.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_zero_interval_is_raised() {
        assert_eq!(
            ProgressMonitor::new(Duration::ZERO).interval(),
            Duration::from_millis(1)
        );
    }
}
