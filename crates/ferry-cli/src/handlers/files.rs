//! Command-line paths to file candidates.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ferry_core::FileCandidate;

use crate::error::CliError;

/// A file given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Path as given.
    pub path: PathBuf,
    /// Name, size and extension used for validation.
    pub candidate: FileCandidate,
}

/// Stat every path. Fails on the first missing path, on directories and on
/// duplicate file names.
pub async fn resolve(paths: &[PathBuf]) -> Result<Vec<LocalFile>, CliError> {
    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(paths.len());

    for path in paths {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(CliError::Arguments(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = file_name(path)?;
        if !seen.insert(name.clone()) {
            return Err(CliError::Arguments(format!(
                "Duplicate file name {name:?}; upload it in a separate run"
            )));
        }

        files.push(LocalFile {
            path: path.clone(),
            candidate: FileCandidate::new(name, metadata.len()),
        });
    }
    Ok(files)
}

fn file_name(path: &Path) -> Result<String, CliError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| CliError::Arguments(format!("{} has no usable file name", path.display())))
}
