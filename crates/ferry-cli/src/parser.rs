//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options.

use std::path::PathBuf;

use clap::{Args, Parser};
use ferry_core::QueueSettings;

use crate::commands::Commands;

/// Command-line interface definition for the upload queue tool.
///
/// This is the top-level parser that handles global options and dispatches
/// to subcommands.
#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Upload files through a bounded-concurrency transfer queue")]
#[command(version)]
pub struct Cli {
    /// JSON file with queue settings
    #[arg(long = "config", env = "FERRY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub queue: QueueArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Queue settings given as flags or `FERRY_*` environment variables.
///
/// Anything set here overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct QueueArgs {
    /// Number of files transferred at the same time
    #[arg(long, env = "FERRY_MAX_CONNECTIONS", global = true)]
    pub max_connections: Option<usize>,

    /// Maximum number of files accepted
    #[arg(long, env = "FERRY_MAX_FILES", global = true)]
    pub max_files: Option<usize>,

    /// Maximum file size (e.g. "10mb", "1.5 GB")
    #[arg(long, env = "FERRY_MAX_FILE_SIZE", global = true)]
    pub max_file_size: Option<String>,

    /// Allowed extensions, comma separated (e.g. "jpg,png")
    #[arg(
        long = "allow-ext",
        env = "FERRY_ALLOW_EXT",
        value_delimiter = ',',
        global = true
    )]
    pub allow_ext: Vec<String>,

    /// Dispatch polling interval in milliseconds
    #[arg(long = "interval-ms", env = "FERRY_INTERVAL_MS", global = true)]
    pub interval_ms: Option<u64>,
}

impl QueueArgs {
    /// The flag layer as settings, with unset flags left empty.
    pub fn to_settings(&self) -> QueueSettings {
        QueueSettings {
            max_connections: self.max_connections,
            max_files: self.max_files,
            max_file_size: self.max_file_size.clone(),
            allowed_extensions: (!self.allow_ext.is_empty()).then(|| self.allow_ext.clone()),
            dispatch_interval_ms: self.interval_ms,
            auto_start: None,
        }
    }
}
