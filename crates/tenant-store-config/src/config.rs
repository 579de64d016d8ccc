// crates/tenant-store-config/src/config.rs
// ============================================================================
// Module: Tenant Store Configuration
// Description: Configuration model, loading, and validation for Tenant Store.
// Purpose: Provide strict, fail-fast config parsing with hard limits.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded either from process environment variables or from
//! a TOML file with strict size and path limits. A missing base connection
//! string is fatal at construction time so misconfigured deployments never
//! reach the first database call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::env::StoreEnv;
use crate::env::parse_bool;
use crate::env::parse_u64;
use crate::env::read_nonempty;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "tenant-store.toml";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 256 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum accepted connection string length.
const MAX_DATABASE_URL_LENGTH: usize = 4096;
/// Default sliding window in milliseconds for burst detection.
pub const DEFAULT_WINDOW_MS: u64 = 150;
/// Default number of identical reads that constitutes a burst.
pub const DEFAULT_THRESHOLD: u32 = 2;
/// Default window table size before stale eviction runs.
pub const DEFAULT_MAX_ENTRIES: usize = 500;
/// Default staleness multiple of the window used by eviction.
pub const DEFAULT_STALE_MULTIPLE: u32 = 2;
/// Default latency at which an operation is reported as slow.
pub const DEFAULT_SLOW_OPERATION_THRESHOLD_MS: u64 = 1_000;
/// Maximum accepted burst window in milliseconds.
const MAX_WINDOW_MS: u64 = 60_000;
/// Maximum accepted skip-frame prefixes.
const MAX_SKIP_FRAME_PREFIXES: usize = 64;

// ============================================================================
// SECTION: Modes
// ============================================================================

/// Process runtime mode.
///
/// # Invariants
/// - Only [`RuntimeMode::Development`] enables query instrumentation by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Local development; instrumentation active.
    Development,
    /// Automated test runs.
    Test,
    /// Production deployments.
    #[default]
    Production,
}

impl RuntimeMode {
    /// Parses a mode label case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unrecognized labels.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let value = raw.trim();
        if value.eq_ignore_ascii_case("development") {
            Ok(Self::Development)
        } else if value.eq_ignore_ascii_case("test") {
            Ok(Self::Test)
        } else if value.eq_ignore_ascii_case("production") {
            Ok(Self::Production)
        } else {
            Err(ConfigError::Invalid(format!(
                "mode must be development, test, or production (got {value})"
            )))
        }
    }

    /// Maps a `NODE_ENV` value onto a mode.
    ///
    /// Any label other than `development` or `test` (for example `staging`)
    /// selects [`RuntimeMode::Production`], leaving instrumentation inactive.
    #[must_use]
    pub fn from_node_env(raw: &str) -> Self {
        let value = raw.trim();
        if value.eq_ignore_ascii_case("development") {
            Self::Development
        } else if value.eq_ignore_ascii_case("test") {
            Self::Test
        } else {
            Self::Production
        }
    }

    /// Returns a stable label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

/// Destination for diagnostics emitted by the access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsMode {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Structured `tracing` events.
    Tracing,
    /// Diagnostics discarded.
    None,
}

impl DiagnosticsMode {
    /// Parses a diagnostics label case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unrecognized labels.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let value = raw.trim();
        if value.eq_ignore_ascii_case("stderr") {
            Ok(Self::Stderr)
        } else if value.eq_ignore_ascii_case("tracing") {
            Ok(Self::Tracing)
        } else if value.eq_ignore_ascii_case("none") {
            Ok(Self::None)
        } else {
            Err(ConfigError::Invalid(format!(
                "diagnostics must be stderr, tracing, or none (got {value})"
            )))
        }
    }
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Burst-detection tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentationConfig {
    /// Explicit on/off override; `None` derives from [`RuntimeMode`].
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Sliding window in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Occurrences within the window that trigger a warning.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Table size above which stale entries are evicted.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Multiple of the window after which an entry counts as stale.
    #[serde(default = "default_stale_multiple")]
    pub stale_multiple: u32,
    /// Additional frame prefixes skipped by the call-site resolver.
    #[serde(default)]
    pub skip_frame_prefixes: Vec<String>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            window_ms: DEFAULT_WINDOW_MS,
            threshold: DEFAULT_THRESHOLD,
            max_entries: DEFAULT_MAX_ENTRIES,
            stale_multiple: DEFAULT_STALE_MULTIPLE,
            skip_frame_prefixes: Vec::new(),
        }
    }
}

impl InstrumentationConfig {
    /// Returns whether instrumentation is active for the given mode.
    #[must_use]
    pub fn is_active(&self, mode: RuntimeMode) -> bool {
        self.enabled.unwrap_or(mode == RuntimeMode::Development)
    }

    /// Validates tunables.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 || self.window_ms > MAX_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "instrumentation.window_ms must be between 1 and {MAX_WINDOW_MS}"
            )));
        }
        if self.threshold < 2 {
            return Err(ConfigError::Invalid(
                "instrumentation.threshold must be at least 2".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "instrumentation.max_entries must be greater than zero".to_string(),
            ));
        }
        if self.stale_multiple == 0 {
            return Err(ConfigError::Invalid(
                "instrumentation.stale_multiple must be greater than zero".to_string(),
            ));
        }
        if self.skip_frame_prefixes.len() > MAX_SKIP_FRAME_PREFIXES {
            return Err(ConfigError::Invalid(format!(
                "instrumentation.skip_frame_prefixes exceeds {MAX_SKIP_FRAME_PREFIXES} entries"
            )));
        }
        if self.skip_frame_prefixes.iter().any(|prefix| prefix.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "instrumentation.skip_frame_prefixes entries must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tenant store configuration.
///
/// # Invariants
/// - After [`StoreConfig::validate`], `database_url` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Base connection string shared by every tenant.
    #[serde(default)]
    pub database_url: String,
    /// Runtime mode.
    #[serde(default)]
    pub mode: RuntimeMode,
    /// Attach the optional performance extension to handles.
    #[serde(default)]
    pub acceleration_enabled: bool,
    /// Latency at or above which an operation is reported as slow.
    #[serde(default = "default_slow_operation_threshold_ms")]
    pub slow_operation_threshold_ms: u64,
    /// Diagnostics destination.
    #[serde(default)]
    pub diagnostics: DiagnosticsMode,
    /// Burst-detection tunables.
    #[serde(default)]
    pub instrumentation: InstrumentationConfig,
}

impl StoreConfig {
    /// Creates a configuration with defaults around a base connection string.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            mode: RuntimeMode::default(),
            acceleration_enabled: false,
            slow_operation_threshold_ms: DEFAULT_SLOW_OPERATION_THRESHOLD_MS,
            diagnostics: DiagnosticsMode::default(),
            instrumentation: InstrumentationConfig::default(),
        }
    }

    /// Loads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `DATABASE_URL` is missing or any value is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the base connection string is missing or
    /// any value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let database_url = read_nonempty(&lookup, StoreEnv::DatabaseUrl)?
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        let mut config = Self::new(database_url);
        if let Some(mode) = read_nonempty(&lookup, StoreEnv::Mode)? {
            config.mode = RuntimeMode::parse(&mode)?;
        } else if let Some(node_env) = read_nonempty(&lookup, StoreEnv::NodeEnv)? {
            config.mode = RuntimeMode::from_node_env(&node_env);
        }
        if let Some(raw) = read_nonempty(&lookup, StoreEnv::AccelerationEnabled)? {
            config.acceleration_enabled = parse_bool(StoreEnv::AccelerationEnabled, &raw)?;
        }
        if let Some(raw) = read_nonempty(&lookup, StoreEnv::SlowOperationMs)? {
            config.slow_operation_threshold_ms = parse_u64(StoreEnv::SlowOperationMs, &raw)?;
        }
        if let Some(raw) = read_nonempty(&lookup, StoreEnv::Diagnostics)? {
            config.diagnostics = DiagnosticsMode::parse(&raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// When `path` is `None`, `TENANT_STORE_CONFIG` is consulted before the
    /// default `tenant-store.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDatabaseUrl`] when no base connection
    /// string is set, or [`ConfigError::Invalid`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        if url.len() > MAX_DATABASE_URL_LENGTH {
            return Err(ConfigError::Invalid("database_url exceeds max length".to_string()));
        }
        if url.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "database_url must not contain whitespace".to_string(),
            ));
        }
        self.instrumentation.validate()
    }

    /// Returns whether query instrumentation is active.
    #[must_use]
    pub fn instrumentation_active(&self) -> bool {
        self.instrumentation.is_active(self.mode)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Every variant is fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Base connection string absent.
    #[error("config error: DATABASE_URL is not set")]
    MissingDatabaseUrl,
    /// No async runtime available for background connects.
    #[error("config error: no tokio runtime available")]
    MissingRuntime,
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the default burst window.
const fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

/// Returns the default burst threshold.
const fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

/// Returns the default window table cap.
const fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

/// Returns the default staleness multiple.
const fn default_stale_multiple() -> u32 {
    DEFAULT_STALE_MULTIPLE
}

/// Returns the default slow-operation threshold.
const fn default_slow_operation_threshold_ms() -> u64 {
    DEFAULT_SLOW_OPERATION_THRESHOLD_MS
}

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Some(env_path) =
        read_nonempty(&|name: &str| std::env::var_os(name), StoreEnv::ConfigPath)?
    {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::InstrumentationConfig;
    use super::RuntimeMode;
    use super::StoreConfig;

    #[test]
    fn instrumentation_defaults_follow_mode() {
        let config = InstrumentationConfig::default();
        assert!(config.is_active(RuntimeMode::Development));
        assert!(!config.is_active(RuntimeMode::Production));
        assert!(!config.is_active(RuntimeMode::Test));
    }

    #[test]
    fn instrumentation_override_wins_over_mode() {
        let config = InstrumentationConfig {
            enabled: Some(true),
            ..InstrumentationConfig::default()
        };
        assert!(config.is_active(RuntimeMode::Production));
    }

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!(RuntimeMode::parse("Development").ok(), Some(RuntimeMode::Development));
        assert_eq!(RuntimeMode::parse(" TEST ").ok(), Some(RuntimeMode::Test));
        assert!(RuntimeMode::parse("staging").is_err());
    }

    #[test]
    fn node_env_labels_default_to_production() {
        assert_eq!(RuntimeMode::from_node_env("development"), RuntimeMode::Development);
        assert_eq!(RuntimeMode::from_node_env("staging"), RuntimeMode::Production);
        assert_eq!(RuntimeMode::from_node_env("prod"), RuntimeMode::Production);
    }

    #[test]
    fn whitespace_in_database_url_is_rejected() {
        let config = StoreConfig::new("postgres://host/db name");
        assert!(config.validate().is_err());
    }
}
