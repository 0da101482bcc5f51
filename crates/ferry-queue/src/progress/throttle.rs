//! Progress throttling.
//!
//! Rate-limits `progressFile` events per unit so a chatty transfer cannot
//! flood subscribers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ferry_core::UnitId;

/// Default minimum spacing between two progress events of one unit.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Per-unit rate limiter for progress events.
///
/// The first report of a unit always passes, and so does its final report
/// (`loaded == size`), so observers never miss the 100% mark.
#[derive(Debug)]
pub struct ProgressThrottle {
    last_emit: HashMap<UnitId, Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a throttle with the given minimum interval.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: HashMap::new(),
            min_interval,
        }
    }

    /// Decide whether a report for `id` at `now` should be published.
    pub fn should_emit(&mut self, id: UnitId, now: Instant, is_final: bool) -> bool {
        match self.last_emit.get(&id) {
            Some(last) if !is_final && now.saturating_duration_since(*last) < self.min_interval => {
                false
            }
            _ => {
                self.last_emit.insert(id, now);
                true
            }
        }
    }

    /// Drop the history of `id` so its next report passes immediately.
    pub fn reset(&mut self, id: UnitId) {
        self.last_emit.remove(&id);
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.last_emit.clear();
    }

    /// Whether a report of `id` is on record.
    pub fn is_tracking(&self, id: UnitId) -> bool {
        self.last_emit.contains_key(&id)
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: UnitId = UnitId::new(1);
    const B: UnitId = UnitId::new(2);

    #[test]
    fn test_first_report_passes() {
        let mut throttle = ProgressThrottle::default();
        assert!(throttle.should_emit(A, Instant::now(), false));
    }

    #[test]
    fn test_respects_interval_per_unit() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50));
        let start = Instant::now();

        assert!(throttle.should_emit(A, start, false));
        assert!(!throttle.should_emit(A, start + Duration::from_millis(10), false));
        // Another unit has its own budget.
        assert!(throttle.should_emit(B, start + Duration::from_millis(10), false));
        assert!(throttle.should_emit(A, start + Duration::from_millis(60), false));
    }

    #[test]
    fn test_final_report_is_never_suppressed() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(10));
        let start = Instant::now();

        assert!(throttle.should_emit(A, start, false));
        assert!(!throttle.should_emit(A, start, false));
        assert!(throttle.should_emit(A, start, true));
    }

    #[test]
    fn test_reset_allows_immediate_emit() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(10));
        let start = Instant::now();

        throttle.should_emit(A, start, false);
        assert!(throttle.is_tracking(A));
        throttle.reset(A);
        assert!(!throttle.is_tracking(A));
        assert!(throttle.should_emit(A, start, false));
    }
}
