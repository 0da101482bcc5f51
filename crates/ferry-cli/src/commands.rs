//! Main commands enum.
//!
//! This module defines the available commands for the CLI tool.

use std::path::PathBuf;

use clap::Subcommand;
use reqwest::Url;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Upload files to an HTTP endpoint, one POST request per file
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Endpoint receiving the uploads
        #[arg(short, long, env = "FERRY_ENDPOINT")]
        endpoint: Url,

        /// Print lifecycle events as JSON lines instead of a progress bar
        #[arg(long)]
        json: bool,
    },

    /// Validate files against the configured limits without uploading
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
