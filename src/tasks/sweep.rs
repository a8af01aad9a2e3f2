//! TTL Sweep Task
//!
//! Background task that periodically removes expired store entries.

use std::sync::Weak;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Something the sweep task can purge.
pub(crate) trait Sweep: Send + Sync + 'static {
    /// Removes up to `max` expired entries, returning how many were removed.
    fn sweep(&self, max: usize) -> usize;
}

// == Sweep Task ==
/// Owned handle to a running sweep task.
///
/// The shutdown sender is taken on the first [`stop`](SweepTask::stop), which
/// makes repeated stops no-ops. Dropping the handle also ends the task.
#[derive(Debug)]
pub struct SweepTask {
    started_at: Instant,
    interval: Duration,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Signals the task to stop. Returns true only for the call that sent the signal.
    pub fn stop(&self) -> bool {
        match self.shutdown.lock().take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Returns true once stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.lock().is_none()
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// When the task was started.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Interval between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Spawns a task that sweeps `target` every `interval`, removing at most
/// `batch` entries per wake.
///
/// The task holds only a weak reference, so it exits when the target is
/// dropped as well as when it is stopped. Returns None outside a tokio runtime.
pub(crate) fn spawn_sweep_task<S: Sweep>(
    target: Weak<S>,
    interval: Duration,
    batch: usize,
) -> Option<SweepTask> {
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!("No tokio runtime available, TTL sweep disabled; expired entries are removed lazily");
            return None;
        }
    };

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let handle = runtime.spawn(async move {
        info!(
            "Starting TTL sweep task with interval of {:?}, batch of {}",
            interval, batch
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("TTL sweep task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(target) = target.upgrade() else {
                        debug!("TTL sweep target dropped, stopping");
                        break;
                    };

                    let removed = target.sweep(batch);
                    if removed > 0 {
                        info!("TTL sweep: removed {} expired entries", removed);
                    } else {
                        debug!("TTL sweep: no expired entries found");
                    }
                }
            }
        }
    });

    Some(SweepTask {
        started_at: Instant::now(),
        interval,
        shutdown: Mutex::new(Some(shutdown_tx)),
        handle,
    })
}
