//! Transfer queue state.
//!
//! This module provides a pure state machine for the registry, the FIFO
//! dispatch queue and slot accounting. The orchestrator
//! ([`TransferManager`](crate::TransferManager)) owns the locking, talks to
//! transfer units and publishes events.
//!
//! # Design
//!
//! - Pure synchronous state machine (no async, no IO, no tracing)
//! - Transitions return what happened so the caller can publish events
//! - Slots are derived from outstanding leases: `slots = max - leases`
//!
//! # Slot Semantics
//!
//! A lease is minted when a unit becomes ACTIVE and retired when the unit's
//! completion report arrives. Stopping or removing a unit does not retire
//! its lease; the slot comes back only when the unit reports. This keeps
//! `0 <= slots <= max_connections` without trusting units to be prompt.

mod types;

use std::collections::{BTreeMap, HashSet, VecDeque};

use ferry_core::{
    FileCandidate, GlobalStatus, LeaseId, QueueError, QueueResult, QueueSnapshot, TransferOutcome,
    UnitId, UnitInfo, UnitStatus,
};

pub use types::{Completion, Dispatched, FinishedRun, Removed, UnitEntry};

/// Registry, dispatch queue and slot budget.
///
/// This is a sync type with no internal locking; the caller
/// (`TransferManager`) is responsible for synchronization.
pub struct DispatchQueue {
    registry: BTreeMap<UnitId, UnitEntry>,
    fifo: VecDeque<UnitId>,
    leases: HashSet<LeaseId>,
    /// Queued units a tick is currently asking `beforeUploadFile` about.
    vetting: HashSet<UnitId>,
    max_connections: usize,
    status: GlobalStatus,
    next_unit: u64,
    next_lease: u64,
}

impl DispatchQueue {
    /// Create an empty queue with `max_connections` slots.
    pub fn new(max_connections: usize) -> Self {
        Self {
            registry: BTreeMap::new(),
            fifo: VecDeque::new(),
            leases: HashSet::new(),
            vetting: HashSet::new(),
            max_connections,
            status: GlobalStatus::Idle,
            next_unit: 1,
            next_lease: 1,
        }
    }

    /// Free slots.
    pub fn slots(&self) -> usize {
        self.max_connections.saturating_sub(self.leases.len())
    }

    pub const fn status(&self) -> GlobalStatus {
        self.status
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Number of units waiting in the dispatch queue.
    pub fn queued_len(&self) -> usize {
        self.fifo.len()
    }

    /// Register an accepted file as a new IDLE unit.
    pub fn register(&mut self, file: &FileCandidate) -> UnitId {
        let id = UnitId::new(self.next_unit);
        self.next_unit += 1;
        self.registry.insert(id, UnitEntry::new(id, file));
        id
    }

    /// IDLE → READY once a unit has been validated and wired up.
    pub fn mark_ready(&mut self, id: UnitId) -> QueueResult<UnitInfo> {
        let entry = self.entry_mut(id)?;
        if entry.status == UnitStatus::Idle {
            entry.status = UnitStatus::Ready;
        }
        Ok(entry.info())
    }

    pub fn unit(&self, id: UnitId) -> Option<UnitInfo> {
        self.registry.get(&id).map(UnitEntry::info)
    }

    /// Every unit, in id order.
    pub fn units(&self) -> Vec<UnitInfo> {
        self.registry.values().map(UnitEntry::info).collect()
    }

    /// Pending units (READY, IDLE or CHECK) not already queued, in id order.
    pub fn pending(&self) -> Vec<UnitInfo> {
        self.registry
            .values()
            .filter(|entry| entry.status.is_pending() && !self.fifo.contains(&entry.id))
            .map(UnitEntry::info)
            .collect()
    }

    /// Ids of every ACTIVE unit.
    pub fn active_ids(&self) -> Vec<UnitId> {
        self.registry
            .values()
            .filter(|entry| entry.status == UnitStatus::Active)
            .map(|entry| entry.id)
            .collect()
    }

    /// Append a pending unit to the queue.
    ///
    /// Returns `Ok(false)` when the unit is already queued. CHECK units are
    /// queued but stay in CHECK (and are skipped) until released.
    pub fn enqueue(&mut self, id: UnitId) -> QueueResult<bool> {
        if self.fifo.contains(&id) {
            self.entry(id)?;
            return Ok(false);
        }

        let entry = self.entry_mut(id)?;
        if !entry.status.is_pending() {
            return Err(QueueError::NotPending {
                id,
                status: entry.status,
            });
        }
        if entry.status != UnitStatus::Check {
            entry.status = UnitStatus::Queued;
        }
        self.fifo.push_back(id);
        Ok(true)
    }

    /// Reserve the units the next dispatch would promote.
    ///
    /// Scans the queue left to right, taking QUEUED, enabled units until
    /// the free slots are spoken for. Reserved units are not offered again
    /// until [`end_vetting`](Self::end_vetting) releases them, so a tick
    /// running while another one is vetting never sees the same units.
    pub fn begin_vetting(&mut self) -> Vec<UnitInfo> {
        let budget = self.slots().saturating_sub(self.vetting.len());
        let candidates: Vec<UnitInfo> = self
            .fifo
            .iter()
            .filter(|id| !self.vetting.contains(*id))
            .filter_map(|id| self.registry.get(id))
            .filter(|entry| Self::is_dispatchable(entry))
            .take(budget)
            .map(UnitEntry::info)
            .collect();
        self.vetting.extend(candidates.iter().map(|unit| unit.id));
        candidates
    }

    /// Release units reserved by [`begin_vetting`](Self::begin_vetting).
    pub fn end_vetting<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a UnitId>,
    {
        for id in ids {
            self.vetting.remove(id);
        }
    }

    /// Promote queued units to ACTIVE while slots remain.
    ///
    /// Only units in `allowed` are considered; others keep their place.
    /// Promoted units leave the queue; the remainder keeps FIFO order.
    pub fn begin_dispatch(&mut self, allowed: &HashSet<UnitId>) -> Vec<Dispatched> {
        let mut dispatched = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.fifo.len());

        while let Some(id) = self.fifo.pop_front() {
            let eligible = self.slots() > 0
                && allowed.contains(&id)
                && self.registry.get(&id).is_some_and(Self::is_dispatchable);
            if !eligible {
                remaining.push_back(id);
                continue;
            }

            let lease = LeaseId::new(self.next_lease);
            self.next_lease += 1;
            self.leases.insert(lease);

            if let Some(entry) = self.registry.get_mut(&id) {
                entry.status = UnitStatus::Active;
                entry.lease = Some(lease);
                entry.loaded = 0;
                dispatched.push(Dispatched {
                    lease,
                    unit: entry.info(),
                });
            }
        }
        self.fifo = remaining;

        if !dispatched.is_empty() {
            self.status = GlobalStatus::Uploading;
        }
        dispatched
    }

    /// Take a vetoed unit out of the queue and return it to READY.
    pub fn skip(&mut self, id: UnitId) -> Option<UnitInfo> {
        self.fifo.retain(|queued| *queued != id);
        let entry = self.registry.get_mut(&id)?;
        if entry.status == UnitStatus::Queued {
            entry.status = UnitStatus::Ready;
        }
        Some(entry.info())
    }

    /// Record progress for the current activation.
    ///
    /// Returns `None` for stale leases or units that are no longer ACTIVE.
    pub fn progress(&mut self, id: UnitId, lease: LeaseId, loaded: u64) -> Option<UnitInfo> {
        let entry = self.registry.get_mut(&id)?;
        if entry.lease != Some(lease) || entry.status != UnitStatus::Active {
            return None;
        }
        entry.loaded = loaded.min(entry.size);
        Some(entry.info())
    }

    /// Aggregate `(loaded, total)` bytes over the whole registry.
    pub fn aggregate(&self) -> (u64, u64) {
        self.registry.values().fold((0, 0), |(loaded, total), entry| {
            (
                loaded.saturating_add(entry.counted_bytes()),
                total.saturating_add(entry.size),
            )
        })
    }

    /// Apply a completion report.
    ///
    /// Always retires the lease (freeing its slot) if it was outstanding.
    /// Only the unit's current activation may change its status.
    pub fn complete(&mut self, id: UnitId, lease: LeaseId, outcome: &TransferOutcome) -> Completion {
        if !self.leases.remove(&lease) {
            return Completion::Ignored;
        }

        let Some(entry) = self.registry.get_mut(&id) else {
            return Completion::Released;
        };
        if entry.lease != Some(lease) || entry.status != UnitStatus::Active {
            return Completion::Released;
        }
        entry.lease = None;

        let message = match outcome {
            TransferOutcome::Done { message } => {
                entry.status = UnitStatus::Done;
                entry.loaded = entry.size;
                message.clone()
            }
            TransferOutcome::Failed { message } => {
                entry.status = UnitStatus::Error;
                Some(message.clone())
            }
            TransferOutcome::Stopped => {
                entry.status = UnitStatus::Ready;
                return Completion::Returned {
                    unit: entry.info(),
                };
            }
        };
        let unit = entry.info();

        Completion::Settled {
            unit,
            message,
            finished: self.settle(),
        }
    }

    /// Return an ACTIVE or queued unit to READY.
    ///
    /// Returns `Some` when the unit was ACTIVE and its transfer must be
    /// told to stop. The lease stays outstanding until the unit reports.
    pub fn stop(&mut self, id: UnitId) -> QueueResult<Option<UnitInfo>> {
        let was_queued = self.fifo.contains(&id);
        let entry = self.entry_mut(id)?;

        match entry.status {
            UnitStatus::Active => {
                entry.status = UnitStatus::Ready;
                entry.lease = None;
                Ok(Some(entry.info()))
            }
            UnitStatus::Queued | UnitStatus::Check if was_queued => {
                entry.status = UnitStatus::Ready;
                self.fifo.retain(|queued| *queued != id);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Set the `disabled` flag.
    ///
    /// Disabling an ACTIVE unit stops it the way [`stop`](Self::stop) does
    /// and returns `Some`; a disabled unit is never active.
    pub fn set_disabled(&mut self, id: UnitId, disabled: bool) -> QueueResult<Option<UnitInfo>> {
        let entry = self.entry_mut(id)?;
        entry.disabled = disabled;
        if disabled && entry.status == UnitStatus::Active {
            entry.status = UnitStatus::Ready;
            entry.lease = None;
            return Ok(Some(entry.info()));
        }
        Ok(None)
    }

    /// Park a pending or queued unit in CHECK.
    pub fn hold_for_check(&mut self, id: UnitId) -> QueueResult<UnitInfo> {
        let entry = self.entry_mut(id)?;
        match entry.status {
            UnitStatus::Ready | UnitStatus::Idle | UnitStatus::Queued | UnitStatus::Check => {
                entry.status = UnitStatus::Check;
                Ok(entry.info())
            }
            status => Err(QueueError::NotPending { id, status }),
        }
    }

    /// Leave CHECK: back to QUEUED if the unit kept its place, else READY.
    pub fn release_check(&mut self, id: UnitId) -> QueueResult<UnitInfo> {
        let was_queued = self.fifo.contains(&id);
        let entry = self.entry_mut(id)?;
        if entry.status == UnitStatus::Check {
            entry.status = if was_queued {
                UnitStatus::Queued
            } else {
                UnitStatus::Ready
            };
        }
        Ok(entry.info())
    }

    /// Remove a unit: first from the queue, then from the registry.
    ///
    /// If what remains is all terminal, the run is settled.
    pub fn remove(&mut self, id: UnitId) -> QueueResult<Removed> {
        self.entry(id)?;
        self.fifo.retain(|queued| *queued != id);
        let entry = self
            .registry
            .remove(&id)
            .ok_or(QueueError::UnknownUnit(id))?;

        let finished = if self.registry.is_empty() {
            self.status = GlobalStatus::Idle;
            None
        } else {
            self.settle()
        };

        Ok(Removed {
            was_active: entry.status == UnitStatus::Active,
            unit: entry.info(),
            finished,
        })
    }

    /// Drop every unit and reset the global status.
    ///
    /// Outstanding leases are kept; their slots return as units report.
    pub fn clear(&mut self) -> Vec<UnitEntry> {
        self.fifo.clear();
        self.status = GlobalStatus::Idle;
        std::mem::take(&mut self.registry).into_values().collect()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            status: self.status,
            slots: self.slots(),
            max_connections: self.max_connections,
            queued: self.fifo.iter().copied().collect(),
            units: self.units(),
        }
    }

    /// Finish the run if every registered unit is terminal.
    ///
    /// Fires at most once per run: only an UPLOADING queue can settle.
    fn settle(&mut self) -> Option<FinishedRun> {
        let all_terminal = !self.registry.is_empty()
            && self.registry.values().all(|entry| entry.status.is_terminal());
        if self.status != GlobalStatus::Uploading || !all_terminal {
            return None;
        }

        self.status = GlobalStatus::Done;
        let registry = self.units();
        Some(FinishedRun {
            file_names: registry.iter().map(|unit| unit.name.clone()).collect(),
            registry,
        })
    }

    const fn is_dispatchable(entry: &UnitEntry) -> bool {
        matches!(entry.status, UnitStatus::Queued) && !entry.disabled
    }

    fn entry(&self, id: UnitId) -> QueueResult<&UnitEntry> {
        self.registry.get(&id).ok_or(QueueError::UnknownUnit(id))
    }

    fn entry_mut(&mut self, id: UnitId) -> QueueResult<&mut UnitEntry> {
        self.registry
            .get_mut(&id)
            .ok_or(QueueError::UnknownUnit(id))
    }
}
