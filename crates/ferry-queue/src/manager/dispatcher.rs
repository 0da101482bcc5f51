//! The dispatch loop.
//!
//! Runs while the queue is non-empty. Each iteration waits for either the
//! interval tick or a wake-up (enqueue, slot release), then runs one
//! dispatch tick. The loop exits, clearing the running flag under the state
//! lock, as soon as a tick sees an empty queue; the next enqueue spawns a
//! fresh one.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, MissedTickBehavior};

use super::Inner;

pub(super) async fn run(manager: Weak<Inner>, notify: Arc<Notify>, period: Duration) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::debug!(target: "ferry.queue", period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "Dispatcher running");

    loop {
        // The first interval tick completes immediately.
        tokio::select! {
            _ = ticker.tick() => {}
            () = notify.notified() => {}
        }

        let Some(inner) = manager.upgrade() else {
            tracing::debug!(target: "ferry.queue", "Manager dropped; dispatcher exiting");
            return;
        };
        if !inner.tick(true).keep_running {
            break;
        }
    }

    tracing::debug!(target: "ferry.queue", "Queue drained; dispatcher stopped");
}
