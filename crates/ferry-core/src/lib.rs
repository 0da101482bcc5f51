//! Core domain types and ports for the ferry transfer queue.
//!
//! Pure data and trait definitions: unit identity and status, validation
//! errors, configuration, the event vocabulary and the transfer unit port.
//! Nothing in this crate spawns tasks or performs I/O.

#![deny(unused_crate_dependencies)]

pub mod error;
pub mod events;
pub mod ports;
pub mod settings;
pub mod unit;
pub mod validation;

pub use error::{QueueError, QueueResult};
pub use events::{
    Event, EventName, EventSpec, FileErrorReason, IntoEventSpec, Reply, UploadErrorKind,
};
pub use ports::{CompletionSink, LeaseId, TransferOutcome, TransferUnit, UnitFactory, UnitHandle};
pub use settings::{
    ConfigError, DEFAULT_DISPATCH_INTERVAL, DEFAULT_MAX_CONNECTIONS, QueueConfig,
    QueueConfigBuilder, QueueSettings, normalize_extension, parse_size,
};
pub use unit::{
    FileCandidate, GlobalStatus, QueueSnapshot, UnitId, UnitInfo, UnitStatus, extension_of,
};
pub use validation::{ValidationError, ValidationErrorKind};
