//! Validation error taxonomy.
//!
//! A candidate file can fail any number of independent checks; each failed
//! check yields exactly one [`ValidationError`]. Rejected files never enter
//! the registry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminator for the four validation checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    /// Registry already holds `max_files` units.
    MaxFiles,
    /// Extension not in the allow-list.
    AllowExtension,
    /// File larger than `max_file_size`.
    FileSize,
    /// Rejected by the user-supplied predicate.
    UserError,
}

impl ValidationErrorKind {
    /// Wire/log form, e.g. `"ALLOW_EXTENSION"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MaxFiles => "MAX_FILES",
            Self::AllowExtension => "ALLOW_EXTENSION",
            Self::FileSize => "FILE_SIZE",
            Self::UserError => "USER_ERROR",
        }
    }
}

/// A single failed validation check, carrying the offending value.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationError {
    /// The registry is full.
    #[error("Too many files: {count} already selected")]
    MaxFiles {
        /// Registry size at the time of the check.
        count: usize,
    },

    /// The extension is not allowed.
    #[error("File extension not allowed: {extension:?}")]
    AllowExtension {
        /// The rejected (lowercase) extension.
        extension: String,
    },

    /// The file is too large.
    #[error("File too large: {size} bytes (limit {limit})")]
    FileSize {
        /// Size of the rejected file.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The user predicate returned an error message.
    #[error("{message}")]
    UserError {
        /// Message produced by the predicate.
        message: String,
    },
}

impl ValidationError {
    /// The check that failed.
    #[must_use]
    pub const fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::MaxFiles { .. } => ValidationErrorKind::MaxFiles,
            Self::AllowExtension { .. } => ValidationErrorKind::AllowExtension,
            Self::FileSize { .. } => ValidationErrorKind::FileSize,
            Self::UserError { .. } => ValidationErrorKind::UserError,
        }
    }

    /// The carried parameter rendered as a string (count, extension, size or message).
    #[must_use]
    pub fn param(&self) -> String {
        match self {
            Self::MaxFiles { count } => count.to_string(),
            Self::AllowExtension { extension } => extension.clone(),
            Self::FileSize { size, .. } => size.to_string(),
            Self::UserError { message } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_param() {
        let err = ValidationError::AllowExtension {
            extension: "png".into(),
        };
        assert_eq!(err.kind(), ValidationErrorKind::AllowExtension);
        assert_eq!(err.kind().as_str(), "ALLOW_EXTENSION");
        assert_eq!(err.param(), "png");

        let err = ValidationError::MaxFiles { count: 1 };
        assert_eq!(err.param(), "1");
    }

    #[test]
    fn test_serialization_tag() {
        let err = ValidationError::FileSize {
            size: 2048,
            limit: 1024,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "FILE_SIZE");
        assert_eq!(json["size"], 2048);
    }
}
