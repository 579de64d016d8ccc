// crates/tenant-store-config/src/env.rs
// ============================================================================
// Module: Tenant Store Environment
// Description: Environment variable names and strict value parsing.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8 and empty values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;

use crate::config::ConfigError;

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Environment keys recognized by the tenant store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEnv {
    /// Required base connection string.
    DatabaseUrl,
    /// Runtime mode (`development`, `test`, `production`).
    Mode,
    /// Fallback runtime mode variable.
    NodeEnv,
    /// Optional performance extension switch (`true`/`false` or `1`/`0`).
    AccelerationEnabled,
    /// Slow-operation threshold in milliseconds.
    SlowOperationMs,
    /// Diagnostics destination (`stderr`, `tracing`, `none`).
    Diagnostics,
    /// Optional TOML config path override.
    ConfigPath,
}

impl StoreEnv {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseUrl => "DATABASE_URL",
            Self::Mode => "TENANT_STORE_MODE",
            Self::NodeEnv => "NODE_ENV",
            Self::AccelerationEnabled => "ACCELERATION_ENABLED",
            Self::SlowOperationMs => "TENANT_STORE_SLOW_OPERATION_MS",
            Self::Diagnostics => "TENANT_STORE_DIAGNOSTICS",
            Self::ConfigPath => "TENANT_STORE_CONFIG",
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a variable through `lookup`, enforcing UTF-8 and rejecting blanks.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the value is not UTF-8 or is empty.
pub(crate) fn read_nonempty<F>(lookup: &F, key: StoreEnv) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let name = key.as_str();
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value =
        raw.into_string().map_err(|_| ConfigError::Invalid(format!("{name} must be valid UTF-8")))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{name} must not be empty")));
    }
    Ok(Some(value))
}

/// Parses a boolean literal.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the value is not a recognized literal.
pub(crate) fn parse_bool(key: StoreEnv, raw: &str) -> Result<bool, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        return Ok(false);
    }
    Err(ConfigError::Invalid(format!("{} must be 1, 0, true, or false", key.as_str())))
}

/// Parses a positive integer.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the value is non-numeric or zero.
pub(crate) fn parse_u64(key: StoreEnv, raw: &str) -> Result<u64, ConfigError> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a positive integer", key.as_str())))?;
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{} must be greater than zero", key.as_str())));
    }
    Ok(value)
}
