//! `ferry check`: validation without uploading.

use std::path::PathBuf;

use ferry_core::{FileCandidate, QueueConfig, ValidationError};
use ferry_queue::{DefaultValidator, FileValidator};

use super::files;
use crate::error::CliError;

/// Validate candidates in order, as a single intake batch would: every
/// accepted file counts toward `max_files` for the files after it.
pub fn check_candidates<'a, I>(config: &QueueConfig, candidates: I) -> Vec<(String, Vec<ValidationError>)>
where
    I: IntoIterator<Item = &'a FileCandidate>,
{
    let validator = DefaultValidator::new();
    let mut accepted = 0;
    candidates
        .into_iter()
        .map(|file| {
            let errors = validator.validate(file, accepted, config);
            if errors.is_empty() {
                accepted += 1;
            }
            (file.name.clone(), errors)
        })
        .collect()
}

pub async fn execute(config: &QueueConfig, paths: &[PathBuf]) -> Result<(), CliError> {
    let files = files::resolve(paths).await?;
    let results = check_candidates(config, files.iter().map(|f| &f.candidate));

    let mut rejected = 0;
    for (name, errors) in &results {
        if errors.is_empty() {
            println!("ok    {name}");
            continue;
        }
        rejected += 1;
        for error in errors {
            println!("fail  {name}  {}: {error}", error.kind().as_str());
        }
    }
    println!();
    println!("{} accepted, {rejected} rejected", results.len() - rejected);

    if rejected > 0 {
        return Err(CliError::Rejected(rejected));
    }
    Ok(())
}
