//! Lifecycle events published on the event bus.
//!
//! # Structure
//!
//! - `name` - the closed set of recognised names and `name.namespace` specs
//! - this module - event payloads ([`Event`]) and subscriber replies ([`Reply`])
//!
//! Every [`Event`] variant maps to exactly one [`EventName`]; the payload
//! fields are the event's fixed argument list.
//!
//! # Wire Format
//!
//! Events serialize with a `type` tag matching the event name:
//!
//! ```json
//! { "type": "finishFile", "unit": { "id": 3, "name": "a.jpg", ... }, "message": null }
//! ```

mod name;

use serde::{Deserialize, Serialize};

use crate::settings::QueueConfig;
use crate::unit::{FileCandidate, UnitId, UnitInfo};
use crate::validation::ValidationError;

pub use name::{EventName, EventSpec, IntoEventSpec};

/// Discriminator carried by the `error` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadErrorKind {
    /// `enqueue_all` found no pending units.
    NoFiles,
    /// A `beforeUpload` subscriber vetoed the run.
    Aborted,
}

impl UploadErrorKind {
    /// Wire/log form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoFiles => "noFiles",
            Self::Aborted => "aborted",
        }
    }
}

/// Why a file ended up in `errorFile`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileErrorReason {
    /// Rejected at intake; no unit was created.
    Rejected {
        /// Every failed check.
        errors: Vec<ValidationError>,
    },
    /// The transfer itself failed.
    Transfer {
        /// Message reported by the transfer unit.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// A lifecycle event together with its arguments.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    /// The manager was built.
    Init {
        /// Effective configuration.
        config: QueueConfig,
    },
    /// Candidates passed validation and became units.
    Select {
        /// Newly created units.
        units: Vec<UnitInfo>,
    },
    /// Pre-flight check before a run; an explicit `false` aborts it.
    BeforeUpload {
        /// Units about to be queued.
        units: Vec<UnitInfo>,
    },
    /// A run starts with these units.
    Start {
        /// Units appended to the queue.
        units: Vec<UnitInfo>,
    },
    /// Per-unit pre-flight check; an explicit `false` skips the unit.
    BeforeUploadFile {
        /// Unit about to start.
        unit: UnitInfo,
    },
    /// A unit was handed a slot and started.
    StartFile {
        /// The started unit.
        unit: UnitInfo,
    },
    /// Aggregate progress over the registry.
    Progress {
        /// Bytes transferred across all units.
        loaded: u64,
        /// Total bytes across all units.
        total: u64,
        /// `loaded / total` in percent.
        percent: f64,
    },
    /// Progress of one unit.
    ProgressFile {
        /// The reporting unit.
        unit: UnitInfo,
        /// Bytes transferred.
        loaded: u64,
        /// Unit size.
        total: u64,
    },
    /// A unit finished successfully.
    FinishFile {
        /// The finished unit.
        unit: UnitInfo,
        /// Optional message from the transfer (e.g. server response).
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A file was rejected or its transfer failed.
    ErrorFile {
        /// Name/size/extension of the file.
        file: FileCandidate,
        /// Unit id, absent for files rejected at intake.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<UnitId>,
        /// What went wrong.
        reason: FileErrorReason,
    },
    /// Every unit is terminal; the run is over.
    Finish {
        /// Names of every registered unit, in id order.
        file_names: Vec<String>,
        /// The full registry.
        registry: Vec<UnitInfo>,
    },
    /// A run could not start.
    Error {
        /// Discriminator.
        kind: UploadErrorKind,
    },
    /// A unit began hashing its content.
    Md5Start {
        /// The hashing unit.
        unit: UnitInfo,
    },
    /// A unit finished hashing its content.
    Md5Done {
        /// The hashing unit.
        unit: UnitInfo,
        /// Hex digest.
        digest: String,
    },
    /// A unit is about to resize an image.
    BeforeImageResize {
        /// The resizing unit.
        unit: UnitInfo,
    },
    /// A unit resized an image.
    ImageResize {
        /// The resizing unit.
        unit: UnitInfo,
    },
    /// Pointer entered the drop zone.
    DragEnter,
    /// Pointer left the drop zone.
    DragLeave,
    /// Pointer moved over the drop zone.
    DragOver,
    /// Files were dropped.
    Drop {
        /// Dropped files, before validation.
        files: Vec<FileCandidate>,
    },
    /// A unit's row is about to be rendered.
    BeforeRenderFile {
        /// The unit being rendered.
        unit: UnitInfo,
    },
    /// A unit's row was rendered.
    AfterRenderFile {
        /// The rendered unit.
        unit: UnitInfo,
    },
}

impl Event {
    /// The name subscribers register under.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::Init { .. } => EventName::Init,
            Self::Select { .. } => EventName::Select,
            Self::BeforeUpload { .. } => EventName::BeforeUpload,
            Self::Start { .. } => EventName::Start,
            Self::BeforeUploadFile { .. } => EventName::BeforeUploadFile,
            Self::StartFile { .. } => EventName::StartFile,
            Self::Progress { .. } => EventName::Progress,
            Self::ProgressFile { .. } => EventName::ProgressFile,
            Self::FinishFile { .. } => EventName::FinishFile,
            Self::ErrorFile { .. } => EventName::ErrorFile,
            Self::Finish { .. } => EventName::Finish,
            Self::Error { .. } => EventName::Error,
            Self::Md5Start { .. } => EventName::Md5Start,
            Self::Md5Done { .. } => EventName::Md5Done,
            Self::BeforeImageResize { .. } => EventName::BeforeImageResize,
            Self::ImageResize { .. } => EventName::ImageResize,
            Self::DragEnter => EventName::DragEnter,
            Self::DragLeave => EventName::DragLeave,
            Self::DragOver => EventName::DragOver,
            Self::Drop { .. } => EventName::Drop,
            Self::BeforeRenderFile { .. } => EventName::BeforeRenderFile,
            Self::AfterRenderFile { .. } => EventName::AfterRenderFile,
        }
    }

    /// Build an `error` event.
    #[must_use]
    pub const fn error(kind: UploadErrorKind) -> Self {
        Self::Error { kind }
    }

    /// Build an `errorFile` event for a file rejected at intake.
    #[must_use]
    pub const fn rejected(file: FileCandidate, errors: Vec<ValidationError>) -> Self {
        Self::ErrorFile {
            file,
            id: None,
            reason: FileErrorReason::Rejected { errors },
        }
    }

    /// Build an `errorFile` event for a failed transfer.
    #[must_use]
    pub fn transfer_failed(unit: &UnitInfo, message: Option<String>) -> Self {
        Self::ErrorFile {
            file: FileCandidate {
                name: unit.name.clone(),
                size: unit.size,
                extension: unit.extension.clone(),
            },
            id: Some(unit.id),
            reason: FileErrorReason::Transfer { message },
        }
    }

    /// Build an aggregate `progress` event.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(loaded: u64, total: u64) -> Self {
        let percent = if total > 0 {
            (loaded.min(total) as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self::Progress {
            loaded,
            total,
            percent,
        }
    }
}

/// A subscriber's answer to an event.
///
/// Most subscribers have nothing to say (`Empty`); veto-style events treat
/// an explicit `Bool(false)` as "stop".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reply {
    /// No value; also returned when an event has no subscribers.
    #[default]
    Empty,
    /// An explicit boolean answer.
    Bool(bool),
}

impl Reply {
    /// `true` only for an explicit `false`.
    #[must_use]
    pub const fn is_veto(&self) -> bool {
        matches!(self, Self::Bool(false))
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<bool> for Reply {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Option<bool>> for Reply {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Empty, Self::Bool)
    }
}
