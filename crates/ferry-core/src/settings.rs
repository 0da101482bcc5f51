//! Queue configuration: validated config, builder and the serde settings form.
//!
//! [`QueueConfig`] is immutable once built and only obtainable through
//! [`QueueConfigBuilder::build`], which runs every normalisation step
//! (size parsing, extension cleanup) exactly once. [`QueueSettings`] is the
//! all-optional form read from files and environment; it is merged and then
//! turned into a config with [`QueueSettings::into_config`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default concurrency budget.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1;

/// Default dispatch polling interval.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_connections must be at least 1")]
    ZeroConnections,

    #[error("dispatch interval must be greater than zero")]
    ZeroInterval,

    #[error("Invalid size {0:?}: expected a number with optional b/kb/mb/gb/tb suffix")]
    InvalidSize(String),

    #[error("Invalid extension {0:?}")]
    InvalidExtension(String),
}

/// Parse a human-readable size into bytes.
///
/// Accepts a plain number (`"512"`) or a number followed by a base-1024
/// unit (`b`, `kb`, `mb`, `gb`, `tb`), case-insensitive, with optional
/// whitespace (`"1.5 GB"`). Fractional results are truncated.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let trimmed = input.trim();
    let invalid = || ConfigError::InvalidSize(input.to_string());

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        "t" | "tb" => 1 << 40,
        _ => return Err(invalid()),
    };

    if number.is_empty() {
        return Err(invalid());
    }

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier).ok_or_else(invalid);
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let bytes = (value * multiplier as f64) as u64;
    Ok(bytes)
}

/// Normalise an allow-list entry: trim, strip leading dots, lowercase.
pub fn normalize_extension(raw: &str) -> Result<String, ConfigError> {
    let ext = raw.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext.contains(['.', '/', '\\']) || ext.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidExtension(raw.to_string()));
    }
    Ok(ext)
}

/// Validated queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueConfig {
    max_connections: usize,
    max_files: Option<usize>,
    max_file_size: Option<u64>,
    allowed_extensions: Vec<String>,
    #[serde(with = "duration_millis")]
    dispatch_interval: Duration,
    auto_start: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_files: None,
            max_file_size: None,
            allowed_extensions: Vec::new(),
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
            auto_start: false,
        }
    }
}

impl QueueConfig {
    /// Start building a configuration from defaults.
    #[must_use]
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    /// Maximum number of concurrently active transfers.
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Maximum registry size, `None` for unlimited.
    #[must_use]
    pub const fn max_files(&self) -> Option<usize> {
        self.max_files
    }

    /// Maximum file size in bytes, `None` for unlimited.
    #[must_use]
    pub const fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    /// Normalised allow-list; empty means every extension is accepted.
    #[must_use]
    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Whether `extension` passes the allow-list (case-insensitive).
    #[must_use]
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions.is_empty()
            || self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }

    /// Dispatch loop fallback interval.
    #[must_use]
    pub const fn dispatch_interval(&self) -> Duration {
        self.dispatch_interval
    }

    /// Whether `add_files` immediately enqueues accepted files.
    #[must_use]
    pub const fn auto_start(&self) -> bool {
        self.auto_start
    }
}

/// Builder for [`QueueConfig`].
#[derive(Debug, Clone, Default)]
pub struct QueueConfigBuilder {
    max_connections: Option<usize>,
    max_files: Option<usize>,
    max_file_size: Option<String>,
    allowed_extensions: Vec<String>,
    dispatch_interval: Option<Duration>,
    auto_start: bool,
}

impl QueueConfigBuilder {
    /// Set the concurrency budget.
    #[must_use]
    pub const fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Limit the registry size.
    #[must_use]
    pub const fn max_files(mut self, max: usize) -> Self {
        self.max_files = Some(max);
        self
    }

    /// Limit the file size; accepts anything [`parse_size`] does.
    #[must_use]
    pub fn max_file_size(mut self, size: impl Into<String>) -> Self {
        self.max_file_size = Some(size.into());
        self
    }

    /// Limit the file size in bytes.
    #[must_use]
    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes.to_string());
        self
    }

    /// Add entries to the extension allow-list (`"jpg"`, `".PNG"`, ...).
    #[must_use]
    pub fn allow_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions
            .extend(extensions.into_iter().map(Into::into));
        self
    }

    /// Set the dispatch polling interval.
    #[must_use]
    pub const fn dispatch_interval(mut self, interval: Duration) -> Self {
        self.dispatch_interval = Some(interval);
        self
    }

    /// Enqueue accepted files as soon as they are added.
    #[must_use]
    pub const fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Validate and normalise into a [`QueueConfig`].
    pub fn build(self) -> Result<QueueConfig, ConfigError> {
        let max_connections = self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }

        let dispatch_interval = self.dispatch_interval.unwrap_or(DEFAULT_DISPATCH_INTERVAL);
        if dispatch_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        let max_file_size = self.max_file_size.as_deref().map(parse_size).transpose()?;

        let mut allowed_extensions = Vec::with_capacity(self.allowed_extensions.len());
        for raw in &self.allowed_extensions {
            let ext = normalize_extension(raw)?;
            if !allowed_extensions.contains(&ext) {
                allowed_extensions.push(ext);
            }
        }

        Ok(QueueConfig {
            max_connections,
            max_files: self.max_files,
            max_file_size,
            allowed_extensions,
            dispatch_interval,
            auto_start: self.auto_start,
        })
    }
}

/// File/environment form of the configuration.
///
/// All fields are optional to support layering; unset fields fall back to
/// the builder defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueSettings {
    /// Concurrency budget.
    pub max_connections: Option<usize>,
    /// Registry size limit.
    pub max_files: Option<usize>,
    /// Size limit as a human-readable string (`"10mb"`).
    pub max_file_size: Option<String>,
    /// Extension allow-list.
    pub allowed_extensions: Option<Vec<String>>,
    /// Dispatch interval in milliseconds.
    pub dispatch_interval_ms: Option<u64>,
    /// Enqueue on add.
    pub auto_start: Option<bool>,
}

impl QueueSettings {
    /// Overlay `other` onto `self`: every field set in `other` wins.
    pub fn merge(&mut self, other: &Self) {
        if let Some(max) = other.max_connections {
            self.max_connections = Some(max);
        }
        if let Some(max) = other.max_files {
            self.max_files = Some(max);
        }
        if let Some(ref size) = other.max_file_size {
            self.max_file_size = Some(size.clone());
        }
        if let Some(ref exts) = other.allowed_extensions {
            self.allowed_extensions = Some(exts.clone());
        }
        if let Some(ms) = other.dispatch_interval_ms {
            self.dispatch_interval_ms = Some(ms);
        }
        if let Some(auto) = other.auto_start {
            self.auto_start = Some(auto);
        }
    }

    /// Validate into a [`QueueConfig`].
    pub fn into_config(self) -> Result<QueueConfig, ConfigError> {
        let mut builder = QueueConfig::builder();
        if let Some(max) = self.max_connections {
            builder = builder.max_connections(max);
        }
        if let Some(max) = self.max_files {
            builder = builder.max_files(max);
        }
        if let Some(size) = self.max_file_size {
            builder = builder.max_file_size(size);
        }
        if let Some(exts) = self.allowed_extensions {
            builder = builder.allow_extensions(exts);
        }
        if let Some(ms) = self.dispatch_interval_ms {
            builder = builder.dispatch_interval(Duration::from_millis(ms));
        }
        if let Some(auto) = self.auto_start {
            builder = builder.auto_start(auto);
        }
        builder.build()
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}
