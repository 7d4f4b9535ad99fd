//! Self-rescheduling recurring tasks for Buzzwire.
//!
//! The engine runs three periodic sweeps for the process lifetime: the
//! buzz-accumulation-window check, the countdown tick, and the
//! clock-offset prober. None of them is hard-real-time — what matters is
//! that each sweep reschedules itself only after its own work completes,
//! so a slow sweep stretches its period instead of piling up overlapping
//! runs. Jitter therefore accumulates additively across iterations, which
//! is acceptable for deadlines that are only fairness-relevant.
//!
//! [`RecurringTask`] packages that loop with a cancellable handle, so the
//! owner (the server) can deterministically stop every sweep on teardown
//! instead of leaking detached timer callbacks.
//!
//! # Integration
//!
//! ```ignore
//! let sweep = RecurringTask::spawn("signal-windows", Duration::from_secs(1), move || {
//!     let state = Arc::clone(&state);
//!     async move {
//!         state.manager.lock().await.check_signal_windows();
//!     }
//! });
//! // ...
//! sweep.stop().await; // deterministic teardown
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A periodic background task that runs its work, then sleeps `interval`,
/// then runs again — until cancelled.
///
/// Dropping the handle does NOT stop the task (the sweep should survive a
/// careless drop); call [`RecurringTask::cancel`] or
/// [`RecurringTask::stop`] to end it.
pub struct RecurringTask {
    name: String,
    interval: Duration,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    runs: Arc<AtomicU64>,
}

impl RecurringTask {
    /// Spawns the recurring loop on the current Tokio runtime.
    ///
    /// `work` is a factory invoked once per iteration; the returned future
    /// is awaited to completion before the next interval starts counting.
    pub fn spawn<F, Fut>(name: &str, interval: Duration, mut work: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let runs = Arc::new(AtomicU64::new(0));
        let runs_in_task = Arc::clone(&runs);
        let task_name = name.to_string();

        let task = tokio::spawn(async move {
            debug!(task = %task_name, ?interval, "recurring task started");
            loop {
                work().await;
                runs_in_task.fetch_add(1, Ordering::Relaxed);
                trace!(task = %task_name, "recurring task iteration complete");

                // Sleep starts only after the work finished: jitter adds
                // up across iterations instead of causing overlap.
                tokio::select! {
                    stopped = async { shutdown_rx.wait_for(|stop| *stop).await.is_ok() } => {
                        if stopped {
                            break;
                        }
                        // The handle (and its sender) was dropped, so no
                        // stop signal can ever arrive: the task is detached
                        // and keeps its cadence.
                        tokio::time::sleep(interval).await;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!(task = %task_name, "recurring task stopped");
        });

        Self {
            name: name.to_string(),
            interval,
            shutdown,
            task,
            runs,
        }
    }

    /// Signals the task to stop after its current iteration or sleep.
    ///
    /// Idempotent; does not wait for the task to actually exit.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Cancels the task and waits for it to exit.
    pub async fn stop(self) {
        self.cancel();
        let _ = self.task.await;
    }

    /// Whether the underlying task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Completed iterations so far.
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// The task's diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured sleep between iterations.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for RecurringTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("runs", &self.run_count())
            .field("finished", &self.is_finished())
            .finish()
    }
}
