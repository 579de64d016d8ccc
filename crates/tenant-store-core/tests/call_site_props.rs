// crates/tenant-store-core/tests/call_site_props.rs
// ============================================================================
// Module: Call Site Resolver Property Tests
// Description: Property coverage for stack-trace parsing.
// Purpose: Ensure arbitrary stack text never panics and app frames resolve.
// ============================================================================

//! ## Overview
//! Property tests feed generated stack text to `CallSiteResolver`: arbitrary
//! input must never panic, and a lone application frame must always resolve.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use tenant_store_core::CallSiteResolver;

const RESERVED_MODULES: &[&str] = &["std", "core", "alloc", "test", "tokio", "futures", "postgres"];

proptest! {
    #[test]
    fn resolver_never_panics_on_arbitrary_text(trace in ".{0,512}") {
        let _ = CallSiteResolver::default().resolve(&trace);
    }

    #[test]
    fn resolver_never_panics_on_frame_like_lines(
        lines in proptest::collection::vec("( {0,4}[0-9]{1,3}: [a-z:_<>{}]{0,24}| {0,8}at [a-z/._]{0,16}:[0-9]{0,5}:?[0-9]{0,3})", 0..12)
    ) {
        let trace = lines.join("\n");
        if let Some(site) = CallSiteResolver::default().resolve(&trace) {
            prop_assert!(site.line > 0);
            prop_assert!(!site.file.is_empty());
        }
    }

    #[test]
    fn first_application_frame_is_selected(
        module in "[a-z]{1,8}",
        file in "src/[a-z]{1,8}\\.rs",
        line in 1u32..100_000,
    ) {
        prop_assume!(!RESERVED_MODULES.contains(&module.as_str()));
        let trace = format!(
            "   0: std::backtrace::Backtrace::force_capture\n             at /rustc/x/library/std/src/backtrace.rs:1:1\n   1: tenant_store_core::instrument::QueryInstrumentation::observe\n             at ./src/instrument.rs:2:2\n   2: {module}::handler\n             at {file}:{line}:9\n   3: {module}::main\n             at src/main.rs:1:1"
        );
        let site = CallSiteResolver::default().resolve(&trace).unwrap();
        prop_assert_eq!(site.file, file);
        prop_assert_eq!(site.line, line);
        let expected = format!("{module}::handler");
        prop_assert_eq!(site.function.as_deref(), Some(expected.as_str()));
    }
}
