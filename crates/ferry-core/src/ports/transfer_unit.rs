//! Transfer unit port.
//!
//! A transfer unit is the thing that actually moves one file's bytes. The
//! queue manager never looks inside it; it calls [`TransferUnit::start`]
//! with a [`UnitHandle`] and waits for the handle to report back.
//!
//! # Completion Contract
//!
//! Every `start` call is paired with exactly one completion report, made by
//! consuming the handle with [`UnitHandle::finish`]. A handle dropped without
//! finishing reports a failure on its own, so a unit that panics or forgets
//! still releases its slot. Reports carry the [`LeaseId`] issued at start;
//! the manager ignores reports for leases it no longer recognises.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::unit::{FileCandidate, UnitId};

/// Identifies one activation of a unit.
///
/// A unit that is stopped and started again gets a new lease; reports from
/// the old activation are recognised as stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(u64);

impl LeaseId {
    /// Wrap a raw lease value.
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

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease#{}", self.0)
    }
}

/// How an activation ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Transfer succeeded.
    Done {
        /// Optional message (e.g. the server's response body).
        message: Option<String>,
    },
    /// Transfer failed; the unit goes to ERROR and is not retried.
    Failed {
        /// What went wrong.
        message: String,
    },
    /// Transfer was aborted after a stop request.
    Stopped,
}

/// Receives reports from running transfer units.
///
/// Implemented by the queue manager; units only ever see it through a
/// [`UnitHandle`].
pub trait CompletionSink: Send + Sync {
    /// Bytes transferred so far for this activation.
    fn progress(&self, id: UnitId, lease: LeaseId, loaded: u64);

    /// The activation ended. Called at most once per lease.
    fn complete(&self, id: UnitId, lease: LeaseId, outcome: TransferOutcome);

    /// Publish an auxiliary event (hashing, resizing) on behalf of a unit.
    fn publish(&self, event: Event);
}

/// A unit's connection back to the queue manager for one activation.
pub struct UnitHandle {
    id: UnitId,
    lease: LeaseId,
    sink: Arc<dyn CompletionSink>,
    finished: bool,
}

impl UnitHandle {
    /// Create a handle for one activation.
    pub fn new(id: UnitId, lease: LeaseId, sink: Arc<dyn CompletionSink>) -> Self {
        Self {
            id,
            lease,
            sink,
            finished: false,
        }
    }

    /// The unit this handle reports for.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// The activation this handle belongs to.
    #[must_use]
    pub const fn lease(&self) -> LeaseId {
        self.lease
    }

    /// Report bytes transferred so far.
    pub fn progress(&self, loaded: u64) {
        self.sink.progress(self.id, self.lease, loaded);
    }

    /// Publish an auxiliary event such as `md5Start`.
    pub fn emit(&self, event: Event) {
        self.sink.publish(event);
    }

    /// Report the end of this activation.
    pub fn finish(mut self, outcome: TransferOutcome) {
        self.finished = true;
        self.sink.complete(self.id, self.lease, outcome);
    }

    /// Shorthand for `finish(TransferOutcome::Done { message })`.
    pub fn done(self, message: Option<String>) {
        self.finish(TransferOutcome::Done { message });
    }

    /// Shorthand for `finish(TransferOutcome::Failed { .. })`.
    pub fn fail(self, message: impl Into<String>) {
        self.finish(TransferOutcome::Failed {
            message: message.into(),
        });
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("id", &self.id)
            .field("lease", &self.lease)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.sink.complete(
                self.id,
                self.lease,
                TransferOutcome::Failed {
                    message: "transfer abandoned".to_string(),
                },
            );
        }
    }
}

/// A live per-file transfer driven by the queue manager.
///
/// Neither method may block: `start` hands the work off (spawns a task,
/// registers a callback) and returns, `stop` only requests an abort.
pub trait TransferUnit: Send + Sync {
    /// Begin transferring. The unit owns `handle` until it finishes.
    fn start(&self, handle: UnitHandle);

    /// Request an abort of the current activation, if any.
    fn stop(&self);
}

/// Creates a transfer unit for each accepted file.
pub trait UnitFactory: Send + Sync {
    /// Build the unit for `file`, which was assigned `id`.
    fn create(&self, id: UnitId, file: &FileCandidate) -> Arc<dyn TransferUnit>;
}

impl<F> UnitFactory for F
where
    F: Fn(UnitId, &FileCandidate) -> Arc<dyn TransferUnit> + Send + Sync,
{
    fn create(&self, id: UnitId, file: &FileCandidate) -> Arc<dyn TransferUnit> {
        self(id, file)
    }
}
