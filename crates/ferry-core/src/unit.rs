//! Transfer unit identity, status and read-only views.
//!
//! Pure data types with no I/O dependencies. The live unit (the thing that
//! actually moves bytes) is behind the [`TransferUnit`](crate::ports::TransferUnit)
//! port; everything here is what the queue tracks about it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a transfer unit.
///
/// Assigned monotonically by the queue manager and never reused within the
/// lifetime of one manager instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(u64);

impl UnitId {
    /// Wrap a raw id value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Lifecycle status of a single transfer unit.
///
/// ```text
/// IDLE -> READY -> QUEUED -> ACTIVE -> DONE
///                               |  \-> ERROR
///                               \----> READY (explicit stop)
/// ```
///
/// `CHECK` is a pending pseudo-state used while an existence/overwrite
/// decision is outstanding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Created, not yet validated.
    Idle,
    /// Validated and eligible for dispatch.
    Ready,
    /// Awaiting an existence/overwrite decision.
    Check,
    /// Sitting in the dispatch queue.
    Queued,
    /// Holding a slot and transferring.
    Active,
    /// Transfer finished successfully.
    Done,
    /// Transfer failed.
    Error,
}

impl UnitStatus {
    /// String form used in logs and snapshots.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Check => "check",
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// `DONE` and `ERROR` are terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Units in `READY`, `IDLE` or `CHECK` are collected by `enqueue_all`.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Ready | Self::Idle | Self::Check)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of the whole manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalStatus {
    /// Nothing dispatched yet (or the registry was cleared).
    #[default]
    Idle,
    /// At least one unit was dispatched and the run has not finished.
    Uploading,
    /// Every unit reached a terminal state after a dispatch cycle.
    Done,
}

/// A file offered to the queue, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCandidate {
    /// Display name (usually the file name).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Lowercase extension without the dot, empty when the name has none.
    pub extension: String,
}

impl FileCandidate {
    /// Create a candidate, deriving the extension from `name`.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        let extension = extension_of(&name);
        Self {
            name,
            size,
            extension,
        }
    }
}

/// Extract the lowercase extension (text after the last dot) from a name.
///
/// Returns an empty string for names without a dot or ending in one.
/// A leading dot alone (`.bashrc`) does not count as an extension.
#[must_use]
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(pos) => name[pos + 1..].to_ascii_lowercase(),
    }
}

/// Read-only view of a unit, used in events and snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    /// Unit identifier.
    pub id: UnitId,
    /// Display name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Lowercase extension.
    pub extension: String,
    /// Current status.
    pub status: UnitStatus,
    /// Disabled units are never dispatched.
    pub disabled: bool,
    /// Bytes reported as transferred.
    pub loaded: u64,
}

impl UnitInfo {
    /// Transfer progress in percent (0.0 - 100.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.size == 0 {
            return if self.status == UnitStatus::Done {
                100.0
            } else {
                0.0
            };
        }
        (self.loaded.min(self.size) as f64 / self.size as f64) * 100.0
    }
}

/// Point-in-time view of the whole queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Aggregate status.
    pub status: GlobalStatus,
    /// Free slots.
    pub slots: usize,
    /// Configured concurrency budget.
    pub max_connections: usize,
    /// Queued unit ids in dispatch (FIFO) order.
    pub queued: Vec<UnitId>,
    /// Every registered unit, in id order.
    pub units: Vec<UnitInfo>,
}

impl QueueSnapshot {
    /// Number of units currently holding a slot and transferring.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.status == UnitStatus::Active)
            .count()
    }
}
