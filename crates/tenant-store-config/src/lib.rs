// crates/tenant-store-config/src/lib.rs
// ============================================================================
// Module: Tenant Store Config Library
// Description: Public API surface for tenant store configuration.
// Purpose: Expose the configuration model and its loaders.
// Dependencies: crate::{config, env}
// ============================================================================

//! ## Overview
//! Canonical configuration for the multi-tenant access layer: the base
//! connection string, runtime mode, optional acceleration, slow-operation
//! threshold, diagnostics destination, and burst-detection tunables.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::DEFAULT_MAX_ENTRIES;
pub use config::DEFAULT_SLOW_OPERATION_THRESHOLD_MS;
pub use config::DEFAULT_STALE_MULTIPLE;
pub use config::DEFAULT_THRESHOLD;
pub use config::DEFAULT_WINDOW_MS;
pub use config::DiagnosticsMode;
pub use config::InstrumentationConfig;
pub use config::RuntimeMode;
pub use config::StoreConfig;
pub use env::StoreEnv;
