// crates/tenant-store-core/src/error.rs
// ============================================================================
// Module: Tenant Store Errors
// Description: Store-layer and instrumentation error types.
// Purpose: Keep store failures and swallowed instrumentation failures apart.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`StoreError`] is what handle callers see. [`InstrumentationError`] never
//! reaches callers; the middleware converts it into a diagnostic event.

use thiserror::Error;

/// Store-layer errors surfaced to callers of a client handle.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection could not be established or was lost.
    #[error("store connection error: {0}")]
    Connection(String),
    /// The store rejected or failed the operation.
    #[error("store operation error: {0}")]
    Operation(String),
    /// The driver does not support the requested action.
    #[error("store unsupported operation: {0}")]
    Unsupported(String),
    /// The driver could not construct a handle for the target.
    #[error("store construction error: {0}")]
    Construction(String),
    /// Internal coordination failure (poisoned lock, failed task).
    #[error("store internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns the message carried by the error without its category prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Connection(message)
            | Self::Operation(message)
            | Self::Unsupported(message)
            | Self::Construction(message)
            | Self::Internal(message) => message,
        }
    }
}

/// Failures inside the instrumentation layer.
///
/// These never reach operation results; they are logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentationError {
    /// Operation signature could not be built.
    #[error("instrumentation signature error: {0}")]
    Signature(String),
    /// Window table lock was poisoned.
    #[error("instrumentation window lock poisoned")]
    Poisoned,
}
