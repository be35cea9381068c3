//! Idle auto-lock timer.
//!
//! One timer exists per unlocked session. It wakes every check interval and
//! hands control to a callback, which decides whether the session has been
//! idle long enough to lock. Dropping the timer cancels it.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Whether more than `timeout` has passed since `last_activity`.
///
/// Exactly `timeout` of inactivity is not yet idle.
pub fn is_idle(last_activity: Instant, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(last_activity) > timeout
}

/// Handle to a running idle check task.
pub(crate) struct IdleTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl IdleTimer {
    /// Spawn the check loop. The first check runs one `period` from now.
    ///
    /// `check` receives the timer's cancellation token so it can re-test it
    /// after acquiring whatever lock it needs. Returning `true` ends the loop.
    pub(crate) fn arm<F, Fut>(period: Duration, mut check: F) -> Self
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticks.tick() => {
                        if check(task_token.clone()).await {
                            break;
                        }
                    }
                }
            }
        });

        Self { token, handle }
    }

    pub(crate) fn is_armed(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}
