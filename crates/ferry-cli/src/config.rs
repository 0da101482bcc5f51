//! Layered queue configuration.
//!
//! Settings are read from an optional JSON file, then overridden by the
//! flag layer (which clap has already merged with `FERRY_*` environment
//! variables), then validated into a [`QueueConfig`].

use std::fs;
use std::path::Path;

use ferry_core::{QueueConfig, QueueSettings};

use crate::error::CliError;

/// Read a JSON settings file.
pub fn read_settings(path: &Path) -> Result<QueueSettings, CliError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("Cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}

/// File layer overlaid with `overrides`, validated.
pub fn resolve(file: Option<&Path>, overrides: &QueueSettings) -> Result<QueueConfig, CliError> {
    let mut settings = match file {
        Some(path) => read_settings(path)?,
        None => QueueSettings::default(),
    };
    settings.merge(overrides);
    tracing::debug!(?settings, "Resolved queue settings");
    Ok(settings.into_config()?)
}
