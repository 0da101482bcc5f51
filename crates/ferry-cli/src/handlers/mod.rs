//! Command handlers.
//!
//! Each handler takes the resolved queue configuration plus its command's
//! arguments, and returns a [`CliError`](crate::error::CliError) whose exit
//! code `main` propagates.

pub mod check;
pub mod files;
pub mod upload;
