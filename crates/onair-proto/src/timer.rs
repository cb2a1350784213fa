//! Recurring-timer handles.
//!
//! Every periodic job (console heartbeat, listener sync poll, listener
//! watchdog) owns one `TimerHandle`.  `start` is a no-op while the timer is
//! already running and `stop` is idempotent, so phase transitions can call
//! them unconditionally without tracking extra booleans.

use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::trace;

pub struct TimerHandle {
    name: &'static str,
    handle: Option<AbortHandle>,
}

impl TimerHandle {
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the ticking task.  `tick` runs once immediately and then every
    /// `period`; returning `false` ends the timer (consumer gone).
    pub fn start<F>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.is_running() {
            return;
        }
        let name = self.name;
        trace!("timer {}: start ({:?})", name, period);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !tick() {
                    trace!("timer {}: consumer gone", name);
                    break;
                }
            }
        });
        self.handle = Some(task.abort_handle());
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            trace!("timer {}: stop", self.name);
            handle.abort();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn start_is_noop_while_running_and_stop_is_idempotent() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut timer = TimerHandle::new("test");

        let c = counter.clone();
        timer.start(Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });
        assert!(timer.is_running());

        // Second start must not spawn a second ticking task.
        let c = counter.clone();
        timer.start(Duration::from_millis(1), move || {
            c.fetch_add(100, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());

        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks >= 1, "first timer ticked");
        assert!(ticks < 100, "second start was a no-op, got {}", ticks);

        let settled = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), settled, "stopped timers stay stopped");
    }

    #[tokio::test]
    async fn tick_returning_false_ends_the_timer() {
        let mut timer = TimerHandle::new("ends");
        timer.start(Duration::from_millis(5), || false);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!timer.is_running());
    }
}
