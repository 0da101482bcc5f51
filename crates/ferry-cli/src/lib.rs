//! `ferry` command-line interface.
//!
//! Composition root for the transfer queue: parses flags, layers
//! configuration, wires a [`TransferManager`](ferry_queue::TransferManager)
//! to the HTTP transfer unit and renders lifecycle events.

#![deny(unused_crate_dependencies)]

// Used by the binary only
use dotenvy as _;
use tracing_subscriber as _;

pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http_unit;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use commands::Commands;
pub use error::CliError;
pub use http_unit::{HttpTransferUnit, HttpUnitFactory};
pub use parser::{Cli, QueueArgs};
