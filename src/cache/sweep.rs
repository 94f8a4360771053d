//! Background expiry sweep.
//!
//! Lazy expiry in `get`/`has` is what makes expiry precise; the sweep only
//! reclaims memory held by entries nobody touches again.

use std::sync::{Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::CacheState;

/// Owned handle to a running sweep task.
#[derive(Debug)]
pub(crate) struct SweepTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Spawn a sweep on the current tokio runtime.
    ///
    /// Returns `None` (with a warning) when called outside a runtime.
    pub(crate) fn spawn<V>(state: Weak<Mutex<CacheState<V>>>, period: Duration) -> Option<Self>
    where
        V: Clone + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    period_ms = period.as_millis() as u64,
                    "No tokio runtime available; background cache sweep disabled"
                );
                return None;
            }
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // skip first immediate tick

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Cache sweep cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(state) = state.upgrade() else {
                            debug!("Cache dropped, stopping sweep");
                            break;
                        };
                        let removed = state
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove_expired(Instant::now());
                        if removed > 0 {
                            debug!(removed = removed, "Swept expired cache entries");
                        }
                    }
                }
            }
        });

        Some(Self { cancel, handle })
    }

    /// Cancel the task. The next poll of the task observes the cancellation.
    pub(crate) fn stop(self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
