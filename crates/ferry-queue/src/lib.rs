//! Bounded-concurrency transfer queue.
//!
//! Turns candidate files into a status-tracked upload pipeline: files are
//! validated, become transfer units, wait in a FIFO queue and are started
//! while slots remain. Observers follow along on an [`EventBus`].
//!
//! # Modules
//!
//! - `bus` - namespaced publish/subscribe registry
//! - `validator` - intake checks (count, extension, size, user predicate)
//! - `queue` - pure state machine for registry, queue and slots
//! - `manager` - [`TransferManager`], dispatcher task and completion sink
//! - `progress` - per-unit progress throttling
//!
//! # Example
//!
//! ```ignore
//! let config = QueueConfig::builder().max_connections(2).build()?;
//! let manager = TransferManager::new(config, Arc::new(MyUnitFactory));
//! manager.on("finish", |event| println!("{event:?}"))?;
//! manager.add_files([FileCandidate::new("a.jpg", 1024)]);
//! manager.start_upload();
//! ```

#![deny(unused_crate_dependencies)]

// Re-export core types for convenience
pub use ferry_core::{
    CompletionSink, Event, EventName, EventSpec, FileCandidate, FileErrorReason, GlobalStatus,
    IntoEventSpec, LeaseId, QueueConfig, QueueError, QueueResult, QueueSettings, QueueSnapshot,
    Reply, TransferOutcome, TransferUnit, UnitFactory, UnitHandle, UnitId, UnitInfo, UnitStatus,
    UploadErrorKind, ValidationError, ValidationErrorKind,
};

mod bus;
mod manager;
pub(crate) mod progress;
pub(crate) mod queue;
mod validator;

pub use bus::EventBus;
pub use manager::{TransferManager, TransferManagerDeps, build_transfer_manager};
pub use progress::ProgressThrottle;
pub use validator::{DefaultValidator, FileValidator, UserPredicate};

// Dev-dependencies used only by the integration tests
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;
