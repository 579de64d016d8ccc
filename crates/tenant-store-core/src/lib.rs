// crates/tenant-store-core/src/lib.rs
// ============================================================================
// Module: Tenant Store Core Library
// Description: Multi-tenant client registry and query-burst instrumentation.
// Purpose: Expose the registry, handles, middleware, and diagnostics.
// Dependencies: crate modules
// ============================================================================

//! ## Overview
//! Tenant store core hands each tenant one schema-scoped client handle and
//! watches the read traffic through those handles for bursts of identical
//! queries. Store drivers plug in through [`ConnectionFactory`] and
//! [`StoreConnection`]; diagnostics leave through [`DiagnosticSink`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod call_site;
pub mod clock;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod instrument;
pub mod operation;
pub mod registry;
pub mod tenant;
pub mod window;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use call_site::CallSite;
pub use call_site::CallSiteResolver;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use diagnostics::BurstWarning;
pub use diagnostics::CallSiteCount;
pub use diagnostics::ConnectionErrorEvent;
pub use diagnostics::DiagnosticEvent;
pub use diagnostics::DiagnosticSink;
pub use diagnostics::InstrumentationErrorEvent;
pub use diagnostics::MemoryDiagnosticSink;
pub use diagnostics::NoopDiagnosticSink;
pub use diagnostics::OperationErrorEvent;
pub use diagnostics::SlowOperationWarning;
pub use diagnostics::StderrDiagnosticSink;
pub use diagnostics::TeardownErrorEvent;
pub use diagnostics::TracingDiagnosticSink;
pub use diagnostics::sink_for;
pub use error::InstrumentationError;
pub use error::StoreError;
pub use handle::ClientHandle;
pub use handle::ClientHooks;
pub use handle::ConnectionFactory;
pub use handle::ConnectionOptions;
pub use handle::HandleStatus;
pub use handle::HookFn;
pub use handle::StoreConnection;
pub use instrument::BacktraceCapture;
pub use instrument::QueryInstrumentation;
pub use instrument::StackCapture;
pub use operation::ActionKind;
pub use operation::Operation;
pub use operation::OperationSignature;
pub use registry::TenantClientRegistry;
pub use registry::connection_target;
pub use tenant::DEFAULT_TENANT;
pub use tenant::TenantKey;
pub use tenant::TenantKeyError;
pub use window::OperationWindowTracker;
pub use window::WindowEntry;
pub use window::WindowSettings;
