//! Candidate file validation.
//!
//! Validation is pure: it sees the candidate, the current registry size and
//! the configuration, and returns every failed check. An empty list means
//! the file is accepted.

use std::fmt;
use std::sync::Arc;

use ferry_core::{FileCandidate, QueueConfig, ValidationError};

/// User-supplied check. Returning `Some(message)` rejects the file.
pub type UserPredicate = Arc<dyn Fn(&FileCandidate) -> Option<String> + Send + Sync>;

/// Pluggable validation step run for every candidate before a unit exists.
pub trait FileValidator: Send + Sync {
    /// Run every check against `file`; `registered` is the current registry size.
    fn validate(
        &self,
        file: &FileCandidate,
        registered: usize,
        config: &QueueConfig,
    ) -> Vec<ValidationError>;
}

/// The standard four checks: count, extension, size and user predicate.
///
/// All checks run; none short-circuits another.
#[derive(Clone, Default)]
pub struct DefaultValidator {
    predicate: Option<UserPredicate>,
}

impl DefaultValidator {
    /// Validator without a user predicate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a user predicate.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FileCandidate) -> Option<String> + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }
}

impl FileValidator for DefaultValidator {
    fn validate(
        &self,
        file: &FileCandidate,
        registered: usize,
        config: &QueueConfig,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(max) = config.max_files() {
            if registered >= max {
                errors.push(ValidationError::MaxFiles { count: registered });
            }
        }

        if !config.allows_extension(&file.extension) {
            errors.push(ValidationError::AllowExtension {
                extension: file.extension.to_ascii_lowercase(),
            });
        }

        if let Some(limit) = config.max_file_size() {
            if file.size > limit {
                errors.push(ValidationError::FileSize {
                    size: file.size,
                    limit,
                });
            }
        }

        if let Some(message) = self.predicate.as_ref().and_then(|check| check(file)) {
            errors.push(ValidationError::UserError { message });
        }

        errors
    }
}

impl fmt::Debug for DefaultValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultValidator")
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
