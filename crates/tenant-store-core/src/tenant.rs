// crates/tenant-store-core/src/tenant.rs
// ============================================================================
// Module: Tenant Keys
// Description: Validated tenant identifiers used as registry keys.
// Purpose: Keep tenant keys safe to embed in connection targets.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`TenantKey`] is either the reserved default tenant or an explicit
//! identifier limited to ASCII letters, digits, `_` and `-`. The length cap
//! matches the Postgres identifier limit since explicit tenants map onto a
//! schema of the same name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reserved key of the default tenant.
pub const DEFAULT_TENANT: &str = "default";
/// Maximum tenant key length in bytes.
pub const MAX_TENANT_KEY_LENGTH: usize = 63;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Tenant key validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantKeyError {
    /// Key was empty.
    #[error("tenant key must be non-empty")]
    Empty,
    /// Key exceeded [`MAX_TENANT_KEY_LENGTH`].
    #[error("tenant key exceeds {MAX_TENANT_KEY_LENGTH} bytes")]
    TooLong,
    /// Key contained a character outside `[A-Za-z0-9_-]`.
    #[error("tenant key contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Validated tenant identifier.
///
/// # Invariants
/// - Non-empty, at most [`MAX_TENANT_KEY_LENGTH`] bytes, `[A-Za-z0-9_-]` only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantKey(String);

impl TenantKey {
    /// Validates and wraps a tenant identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TenantKeyError`] when the identifier is empty, too long, or
    /// contains a disallowed character.
    pub fn new(raw: impl Into<String>) -> Result<Self, TenantKeyError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(TenantKeyError::Empty);
        }
        if raw.len() > MAX_TENANT_KEY_LENGTH {
            return Err(TenantKeyError::TooLong);
        }
        if let Some(bad) = raw.chars().find(|ch| !is_key_char(*ch)) {
            return Err(TenantKeyError::InvalidCharacter(bad));
        }
        Ok(Self(raw))
    }

    /// Returns the default tenant key.
    #[must_use]
    pub fn default_tenant() -> Self {
        Self(DEFAULT_TENANT.to_string())
    }

    /// Normalizes an optional key, mapping `None` to the default tenant.
    #[must_use]
    pub fn resolve(key: Option<&Self>) -> Self {
        key.cloned().unwrap_or_else(Self::default_tenant)
    }

    /// Returns true for the default tenant.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_TENANT
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for TenantKey {
    type Error = TenantKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for TenantKey {
    type Error = TenantKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantKey> for String {
    fn from(value: TenantKey) -> Self {
        value.0
    }
}

/// Returns true for characters allowed in tenant keys.
const fn is_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-')
}

#[cfg(test)]
mod tests {
    use super::MAX_TENANT_KEY_LENGTH;
    use super::TenantKey;
    use super::TenantKeyError;

    #[test]
    fn tenant_key_accepts_identifier_characters() {
        assert!(TenantKey::new("acme_corp-01").is_ok());
    }

    #[test]
    fn tenant_key_rejects_query_metacharacters() {
        assert_eq!(TenantKey::new("acme&x=1"), Err(TenantKeyError::InvalidCharacter('&')));
        assert_eq!(TenantKey::new("a b"), Err(TenantKeyError::InvalidCharacter(' ')));
    }

    #[test]
    fn tenant_key_rejects_empty_and_long() {
        assert_eq!(TenantKey::new(""), Err(TenantKeyError::Empty));
        let long = "a".repeat(MAX_TENANT_KEY_LENGTH + 1);
        assert_eq!(TenantKey::new(long), Err(TenantKeyError::TooLong));
    }

    #[test]
    fn explicit_default_is_the_default_tenant() {
        let key = TenantKey::new("default").ok();
        assert_eq!(key, Some(TenantKey::default_tenant()));
        assert!(TenantKey::resolve(None).is_default());
    }
}
