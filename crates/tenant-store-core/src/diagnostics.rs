// crates/tenant-store-core/src/diagnostics.rs
// ============================================================================
// Module: Access Layer Diagnostics
// Description: Structured diagnostic events and sinks for the access layer.
// Purpose: Emit operator-facing warnings without affecting operation results.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Every non-fatal signal of the access layer (burst warnings, slow
//! operations, connection failures, swallowed instrumentation errors) is a
//! [`DiagnosticEvent`] delivered to a [`DiagnosticSink`]. Sinks must never
//! fail the caller: write errors are dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tenant_store_config::DiagnosticsMode;

use crate::operation::ActionKind;
use crate::operation::Operation;
use crate::operation::OperationSignature;
use crate::tenant::TenantKey;

// ============================================================================
// SECTION: Event Payloads
// ============================================================================

/// Aggregated call-site count inside a burst warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteCount {
    /// Source file path.
    pub file: String,
    /// Line number.
    pub line: u32,
    /// First function name seen at this location.
    pub function: Option<String>,
    /// Occurrences attributed to this location.
    pub count: u32,
}

/// Repeated identical read burst (N+1 signal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BurstWarning {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Operation signature key.
    pub signature: String,
    /// Entity name.
    pub model: String,
    /// Action kind.
    pub action: ActionKind,
    /// Canonical filter JSON.
    pub filter: String,
    /// Occurrences within the window.
    pub count: u32,
    /// Window size in milliseconds.
    pub window_ms: u64,
    /// Per-location breakdown in first-seen order.
    pub call_sites: Vec<CallSiteCount>,
}

impl BurstWarning {
    /// Creates a burst warning for a consumed window entry.
    #[must_use]
    pub fn new(
        signature: &OperationSignature,
        count: u32,
        window_ms: u64,
        call_sites: Vec<CallSiteCount>,
    ) -> Self {
        Self {
            timestamp_ms: timestamp_ms(),
            signature: signature.as_str().to_string(),
            model: signature.model().to_string(),
            action: signature.action(),
            filter: signature.filter().to_string(),
            count,
            window_ms,
            call_sites,
        }
    }

    /// Renders the call-site breakdown as `file:line xN, ...`.
    #[must_use]
    pub fn call_site_summary(&self) -> String {
        let mut summary = String::new();
        for (index, site) in self.call_sites.iter().enumerate() {
            if index > 0 {
                summary.push_str(", ");
            }
            let _ = write!(summary, "{}:{} x{}", site.file, site.line, site.count);
        }
        if summary.is_empty() {
            summary.push_str("unknown");
        }
        summary
    }
}

/// Single operation slower than the configured threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlowOperationWarning {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tenant key.
    pub tenant: String,
    /// Entity name.
    pub model: String,
    /// Action kind.
    pub action: ActionKind,
    /// Observed duration in milliseconds.
    pub duration_ms: u64,
    /// Configured threshold in milliseconds.
    pub threshold_ms: u64,
}

impl SlowOperationWarning {
    /// Creates a slow-operation warning.
    #[must_use]
    pub fn new(tenant: &TenantKey, operation: &Operation, duration_ms: u64, threshold_ms: u64) -> Self {
        Self {
            timestamp_ms: timestamp_ms(),
            tenant: tenant.as_str().to_string(),
            model: operation.model.clone(),
            action: operation.action,
            duration_ms,
            threshold_ms,
        }
    }
}

/// Initial connect of a tenant handle failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionErrorEvent {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tenant key.
    pub tenant: String,
    /// Failure message.
    pub message: String,
}

impl ConnectionErrorEvent {
    /// Creates a connection error event.
    #[must_use]
    pub fn new(tenant: &TenantKey, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: timestamp_ms(),
            tenant: tenant.as_str().to_string(),
            message: message.into(),
        }
    }
}

/// Operation returned an error from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationErrorEvent {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tenant key.
    pub tenant: String,
    /// Entity name.
    pub model: String,
    /// Action kind.
    pub action: ActionKind,
    /// Failure message.
    pub message: String,
}

impl OperationErrorEvent {
    /// Creates an operation error event.
    #[must_use]
    pub fn new(tenant: &TenantKey, operation: &Operation, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: timestamp_ms(),
            tenant: tenant.as_str().to_string(),
            model: operation.model.clone(),
            action: operation.action,
            message: message.into(),
        }
    }
}

/// Instrumentation failed internally and was swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentationErrorEvent {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Entity name.
    pub model: String,
    /// Action kind.
    pub action: ActionKind,
    /// Failure message.
    pub message: String,
}

impl InstrumentationErrorEvent {
    /// Creates an instrumentation error event.
    #[must_use]
    pub fn new(operation: &Operation, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: timestamp_ms(),
            model: operation.model.clone(),
            action: operation.action,
            message: message.into(),
        }
    }
}

/// Handle release failed during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownErrorEvent {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tenant key.
    pub tenant: String,
    /// Failure message.
    pub message: String,
}

impl TeardownErrorEvent {
    /// Creates a teardown error event.
    #[must_use]
    pub fn new(tenant: &TenantKey, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: timestamp_ms(),
            tenant: tenant.as_str().to_string(),
            message: message.into(),
        }
    }
}

/// Diagnostic event emitted by the access layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// Repeated identical read burst.
    BurstWarning(BurstWarning),
    /// Slow single operation.
    SlowOperation(SlowOperationWarning),
    /// Initial connect failure.
    ConnectionError(ConnectionErrorEvent),
    /// Store-level operation failure.
    OperationError(OperationErrorEvent),
    /// Swallowed instrumentation failure.
    InstrumentationError(InstrumentationErrorEvent),
    /// Release failure during teardown.
    TeardownError(TeardownErrorEvent),
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for diagnostic events.
pub trait DiagnosticSink: Send + Sync {
    /// Records a diagnostic event.
    fn record(&self, event: &DiagnosticEvent);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrDiagnosticSink;

impl DiagnosticSink for StderrDiagnosticSink {
    fn record(&self, event: &DiagnosticEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that emits `tracing` events with structured fields.
pub struct TracingDiagnosticSink;

impl DiagnosticSink for TracingDiagnosticSink {
    fn record(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::BurstWarning(warning) => tracing::warn!(
                target: "tenant_store::burst",
                signature = %warning.signature,
                model = %warning.model,
                action = warning.action.as_str(),
                filter = %warning.filter,
                count = warning.count,
                window_ms = warning.window_ms,
                call_sites = %warning.call_site_summary(),
                "repeated identical query burst detected"
            ),
            DiagnosticEvent::SlowOperation(warning) => tracing::warn!(
                target: "tenant_store::slow",
                tenant = %warning.tenant,
                model = %warning.model,
                action = warning.action.as_str(),
                duration_ms = warning.duration_ms,
                threshold_ms = warning.threshold_ms,
                "slow store operation"
            ),
            DiagnosticEvent::ConnectionError(error) => tracing::error!(
                target: "tenant_store::connect",
                tenant = %error.tenant,
                error = %error.message,
                "tenant client connect failed"
            ),
            DiagnosticEvent::OperationError(error) => tracing::error!(
                target: "tenant_store::operation",
                tenant = %error.tenant,
                model = %error.model,
                action = error.action.as_str(),
                error = %error.message,
                "store operation failed"
            ),
            DiagnosticEvent::InstrumentationError(error) => tracing::warn!(
                target: "tenant_store::instrumentation",
                model = %error.model,
                action = error.action.as_str(),
                error = %error.message,
                "query instrumentation failed"
            ),
            DiagnosticEvent::TeardownError(error) => tracing::error!(
                target: "tenant_store::teardown",
                tenant = %error.tenant,
                error = %error.message,
                "tenant client release failed"
            ),
        }
    }
}

/// Sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryDiagnosticSink {
    /// Captured events in arrival order.
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemoryDiagnosticSink {
    /// Creates an empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of captured events.
    #[must_use]
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns captured burst warnings.
    #[must_use]
    pub fn bursts(&self) -> Vec<BurstWarning> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DiagnosticEvent::BurstWarning(warning) => Some(warning),
                _ => None,
            })
            .collect()
    }

    /// Drops captured events.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl DiagnosticSink for MemoryDiagnosticSink {
    fn record(&self, event: &DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// No-op diagnostic sink.
pub struct NoopDiagnosticSink;

impl DiagnosticSink for NoopDiagnosticSink {
    fn record(&self, _event: &DiagnosticEvent) {}
}

/// Builds the sink selected by configuration.
#[must_use]
pub fn sink_for(mode: DiagnosticsMode) -> Arc<dyn DiagnosticSink> {
    match mode {
        DiagnosticsMode::Stderr => Arc::new(StderrDiagnosticSink),
        DiagnosticsMode::Tracing => Arc::new(TracingDiagnosticSink),
        DiagnosticsMode::None => Arc::new(NoopDiagnosticSink),
    }
}

/// Returns the current wall-clock time in milliseconds since epoch.
fn timestamp_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use serde_json::json;

    use super::BurstWarning;
    use super::CallSiteCount;
    use super::DiagnosticEvent;
    use crate::operation::ActionKind;
    use crate::operation::Operation;

    fn sample_warning() -> Option<BurstWarning> {
        let op = Operation::new("User", ActionKind::FindUnique, json!({"where": {"id": "1"}}));
        let signature = op.signature().ok()?;
        Some(BurstWarning::new(
            &signature,
            2,
            150,
            vec![
                CallSiteCount {
                    file: "src/a.rs".to_string(),
                    line: 3,
                    function: None,
                    count: 2,
                },
                CallSiteCount {
                    file: "src/b.rs".to_string(),
                    line: 9,
                    function: Some("b::run".to_string()),
                    count: 1,
                },
            ],
        ))
    }

    #[test]
    fn burst_event_serializes_with_event_tag() {
        let warning = sample_warning();
        assert!(warning.is_some());
        let Some(warning) = warning else { return };
        let payload = serde_json::to_value(DiagnosticEvent::BurstWarning(warning)).ok();
        let payload = payload.unwrap_or(Value::Null);
        assert_eq!(payload["event"], "burst_warning");
        assert_eq!(payload["model"], "User");
        assert_eq!(payload["action"], "findUnique");
        assert_eq!(payload["count"], 2);
        assert_eq!(payload["call_sites"][1]["function"], "b::run");
    }

    #[test]
    fn call_site_summary_lists_locations() {
        let summary = sample_warning().map(|warning| warning.call_site_summary());
        assert_eq!(summary.as_deref(), Some("src/a.rs:3 x2, src/b.rs:9 x1"));
    }
}
