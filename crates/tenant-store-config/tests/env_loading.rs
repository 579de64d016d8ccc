// crates/tenant-store-config/tests/env_loading.rs
// ============================================================================
// Module: Environment Loading Tests
// Description: Coverage for environment-backed configuration.
// Purpose: Ensure env parsing fails fast on missing or invalid inputs.
// ============================================================================

//! ## Overview
//! Environment lookups are injected through `StoreConfig::from_lookup`, so
//! tests never mutate process state.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::HashMap;
use std::ffi::OsString;

use tenant_store_config::ConfigError;
use tenant_store_config::DiagnosticsMode;
use tenant_store_config::RuntimeMode;
use tenant_store_config::StoreConfig;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn load(vars: &[(&str, &str)]) -> Result<StoreConfig, ConfigError> {
    let map: HashMap<String, OsString> =
        vars.iter().map(|(key, value)| ((*key).to_string(), OsString::from(*value))).collect();
    StoreConfig::from_lookup(|name| map.get(name).cloned())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn missing_database_url_is_fatal() {
    let result = load(&[("NODE_ENV", "development")]);
    assert_eq!(result, Err(ConfigError::MissingDatabaseUrl));
}

#[test]
fn blank_database_url_is_rejected() {
    let result = load(&[("DATABASE_URL", "   ")]);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn defaults_apply_when_only_database_url_is_set() {
    let config = load(&[("DATABASE_URL", "postgres://host/db")]).expect("config");
    assert_eq!(config.database_url, "postgres://host/db");
    assert_eq!(config.mode, RuntimeMode::Production);
    assert!(!config.acceleration_enabled);
    assert_eq!(config.diagnostics, DiagnosticsMode::Stderr);
    assert_eq!(config.instrumentation.window_ms, 150);
    assert_eq!(config.instrumentation.threshold, 2);
    assert_eq!(config.instrumentation.max_entries, 500);
    assert_eq!(config.instrumentation.stale_multiple, 2);
    assert!(!config.instrumentation_active());
}

#[test]
fn node_env_development_activates_instrumentation() {
    let config = load(&[("DATABASE_URL", "postgres://host/db"), ("NODE_ENV", "development")])
        .expect("config");
    assert_eq!(config.mode, RuntimeMode::Development);
    assert!(config.instrumentation_active());
}

#[test]
fn tenant_store_mode_takes_precedence_over_node_env() {
    let config = load(&[
        ("DATABASE_URL", "postgres://host/db"),
        ("NODE_ENV", "development"),
        ("TENANT_STORE_MODE", "production"),
    ])
    .expect("config");
    assert_eq!(config.mode, RuntimeMode::Production);
}

#[test]
fn unknown_node_env_falls_back_to_passthrough() {
    let config = load(&[("DATABASE_URL", "postgres://host/db"), ("NODE_ENV", "staging")])
        .expect("config");
    assert_eq!(config.mode, RuntimeMode::Production);
    assert!(!config.instrumentation_active());
}

#[test]
fn node_env_test_selects_test_mode() {
    let config =
        load(&[("DATABASE_URL", "postgres://host/db"), ("NODE_ENV", " Test ")]).expect("config");
    assert_eq!(config.mode, RuntimeMode::Test);
    assert!(!config.instrumentation_active());
}

#[test]
fn unknown_explicit_mode_is_rejected() {
    let result = load(&[("DATABASE_URL", "postgres://host/db"), ("TENANT_STORE_MODE", "staging")]);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn acceleration_accepts_boolean_literals() {
    for (raw, expected) in [("true", true), ("1", true), ("FALSE", false), ("0", false)] {
        let config =
            load(&[("DATABASE_URL", "postgres://host/db"), ("ACCELERATION_ENABLED", raw)])
                .expect("config");
        assert_eq!(config.acceleration_enabled, expected, "literal {raw}");
    }
    let result = load(&[("DATABASE_URL", "postgres://host/db"), ("ACCELERATION_ENABLED", "yes")]);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn slow_operation_threshold_must_be_positive() {
    let config = load(&[
        ("DATABASE_URL", "postgres://host/db"),
        ("TENANT_STORE_SLOW_OPERATION_MS", "250"),
    ])
    .expect("config");
    assert_eq!(config.slow_operation_threshold_ms, 250);
    let result =
        load(&[("DATABASE_URL", "postgres://host/db"), ("TENANT_STORE_SLOW_OPERATION_MS", "0")]);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn diagnostics_destination_is_parsed() {
    let config =
        load(&[("DATABASE_URL", "postgres://host/db"), ("TENANT_STORE_DIAGNOSTICS", "tracing")])
            .expect("config");
    assert_eq!(config.diagnostics, DiagnosticsMode::Tracing);
}

#[cfg(unix)]
#[test]
fn non_utf8_values_fail_closed() {
    use std::os::unix::ffi::OsStringExt;

    let result = StoreConfig::from_lookup(|name| {
        (name == "DATABASE_URL").then(|| OsString::from_vec(vec![0x70, 0xff, 0xfe]))
    });
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}
