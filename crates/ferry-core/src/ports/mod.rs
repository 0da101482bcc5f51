//! Port definitions (trait abstractions) for the queue's collaborators.
//!
//! Ports contain no implementation details and use only domain types.

pub mod transfer_unit;

pub use transfer_unit::{
    CompletionSink, LeaseId, TransferOutcome, TransferUnit, UnitFactory, UnitHandle,
};
