//! Errors returned by queue manager operations.
//!
//! None of these are fatal: the manager stays usable after any of them.
//! Validation failures are not errors in this sense; they are reported as
//! data through [`ValidationError`](crate::validation::ValidationError).

use thiserror::Error;

use crate::settings::ConfigError;
use crate::unit::{UnitId, UnitStatus};

/// Error type for queue manager operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// No unit with this id is registered.
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    /// Event name not in the recognised set.
    #[error("Unknown event name: {0:?}")]
    UnknownEvent(String),

    /// Only pending units (ready, idle, check) can be enqueued.
    #[error("Unit {id} is {status}, not pending")]
    NotPending {
        /// The unit.
        id: UnitId,
        /// Its current status.
        status: UnitStatus,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
