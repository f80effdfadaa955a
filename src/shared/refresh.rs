use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Live consumption figures of an active device
pub const CONSUMPTION_REFRESH: Duration = Duration::from_secs(5);
/// Running-time counter of an active device
pub const RUNNING_TIME_REFRESH: Duration = Duration::from_secs(1);
/// Dashboard summary
pub const DASHBOARD_REFRESH: Duration = Duration::from_secs(30);

/// Handle to a periodic task started with [`spawn_refresh`].
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stop the task and wait for an in-flight run to be abandoned
    pub async fn cancel(&mut self) {
        self.cancel_tx.send_replace(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                debug!(error = %e, "Refresh task ended abnormally");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// True once the task has stopped for any reason
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
    }
}

/// Run `task` immediately and then every `period` until cancelled.
///
/// Ticks missed while a run is slow are delayed rather than bursted. A run in
/// progress when the handle is cancelled is dropped at its next await point.
pub fn spawn_refresh<F, Fut>(period: Duration, mut task: F) -> RefreshHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *cancel_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel_rx.changed() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel_rx.changed() => break,
                        _ = task() => {}
                    }
                }
            }
        }
        debug!("Refresh task stopped");
    });

    RefreshHandle {
        cancel_tx,
        join: Some(join),
    }
}
