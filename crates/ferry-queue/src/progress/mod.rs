//! Progress reporting helpers.

mod throttle;

pub use throttle::{DEFAULT_PROGRESS_INTERVAL, ProgressThrottle};
