//! Common test utilities.
//!
//! Manually driven transfer units and an event recorder, shared by the
//! integration tests.

#![allow(dead_code)]

pub mod events;
pub mod units;

use ferry_queue::{FileCandidate, QueueConfig};

/// Config with `max` slots and defaults otherwise.
pub fn config(max: usize) -> QueueConfig {
    QueueConfig::builder()
        .max_connections(max)
        .build()
        .expect("valid test config")
}

/// `n` candidates named `file0.bin`, `file1.bin`, ...
pub fn files(n: usize) -> Vec<FileCandidate> {
    (0..n)
        .map(|i| FileCandidate::new(format!("file{i}.bin"), 100))
        .collect()
}
