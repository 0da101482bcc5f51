//! Queue entry and transition result types (internal implementation).
//!
//! For read-only views handed to observers, use [`UnitInfo`].

use ferry_core::{FileCandidate, LeaseId, UnitId, UnitInfo, UnitStatus};

/// What the queue tracks about one registered unit.
#[derive(Clone, Debug)]
pub struct UnitEntry {
    pub id: UnitId,
    pub name: String,
    pub size: u64,
    pub extension: String,
    pub status: UnitStatus,
    pub disabled: bool,
    pub loaded: u64,
    /// Lease of the current activation; `None` unless ACTIVE.
    pub lease: Option<LeaseId>,
}

impl UnitEntry {
    /// New IDLE entry for an accepted file.
    pub fn new(id: UnitId, file: &FileCandidate) -> Self {
        Self {
            id,
            name: file.name.clone(),
            size: file.size,
            extension: file.extension.clone(),
            status: UnitStatus::Idle,
            disabled: false,
            loaded: 0,
            lease: None,
        }
    }

    /// Bytes counted towards aggregate progress. DONE counts as complete.
    pub const fn counted_bytes(&self) -> u64 {
        match self.status {
            UnitStatus::Done => self.size,
            _ => self.loaded,
        }
    }

    pub fn info(&self) -> UnitInfo {
        UnitInfo {
            id: self.id,
            name: self.name.clone(),
            size: self.size,
            extension: self.extension.clone(),
            status: self.status,
            disabled: self.disabled,
            loaded: self.loaded,
        }
    }
}

/// A unit promoted to ACTIVE by a dispatch tick.
#[derive(Clone, Debug)]
pub struct Dispatched {
    pub lease: LeaseId,
    pub unit: UnitInfo,
}

/// Payload of the terminal `finish` event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedRun {
    pub file_names: Vec<String>,
    pub registry: Vec<UnitInfo>,
}

/// Effect of a completion report on the queue.
#[derive(Clone, Debug)]
pub enum Completion {
    /// The lease was not outstanding; nothing changed.
    Ignored,
    /// The slot was freed but the unit had already left ACTIVE
    /// (stopped, removed or re-dispatched).
    Released,
    /// An active unit aborted on its own and is READY again.
    Returned { unit: UnitInfo },
    /// An active unit reached DONE or ERROR.
    Settled {
        unit: UnitInfo,
        message: Option<String>,
        finished: Option<FinishedRun>,
    },
}

/// Effect of removing a unit from the registry.
#[derive(Clone, Debug)]
pub struct Removed {
    pub unit: UnitInfo,
    /// The unit was ACTIVE and must be told to stop.
    pub was_active: bool,
    pub finished: Option<FinishedRun>,
}
