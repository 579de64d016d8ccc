// crates/tenant-store-core/src/instrument.rs
// ============================================================================
// Module: Query Instrumentation
// Description: Pass-through middleware feeding read operations to the tracker.
// Purpose: Detect N+1 style bursts without altering operation results.
// Dependencies: tenant-store-config
// ============================================================================

//! ## Overview
//! [`QueryInstrumentation::intercept`] wraps every operation issued through a
//! client handle. When active, read-set operations are signed, attributed to
//! an application call site, and recorded in the [`OperationWindowTracker`]
//! before the wrapped operation proceeds. The wrapped result is always
//! returned unchanged; internal failures become diagnostics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::backtrace::Backtrace;
use std::future::Future;
use std::sync::Arc;

use tenant_store_config::InstrumentationConfig;
use tenant_store_config::StoreConfig;

use crate::call_site::CallSiteResolver;
use crate::clock::Clock;
use crate::diagnostics::BurstWarning;
use crate::diagnostics::DiagnosticEvent;
use crate::diagnostics::DiagnosticSink;
use crate::diagnostics::InstrumentationErrorEvent;
use crate::diagnostics::NoopDiagnosticSink;
use crate::operation::Operation;
use crate::window::OperationWindowTracker;
use crate::window::WindowSettings;

// ============================================================================
// SECTION: Stack Capture
// ============================================================================

/// Source of the current stack trace text.
pub trait StackCapture: Send + Sync {
    /// Captures the current stack as text.
    fn capture(&self) -> String;
}

/// Stack capture backed by [`Backtrace::force_capture`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCapture;

impl StackCapture for BacktraceCapture {
    fn capture(&self) -> String {
        Backtrace::force_capture().to_string()
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Query instrumentation middleware.
///
/// # Invariants
/// - Inactive instances never touch the tracker.
/// - Only read-set actions are recorded.
pub struct QueryInstrumentation {
    /// Whether operations are observed at all.
    active: bool,
    /// Burst tracker.
    tracker: OperationWindowTracker,
    /// Call-site resolver.
    resolver: CallSiteResolver,
    /// Stack source.
    stack: Arc<dyn StackCapture>,
    /// Destination for swallowed failures.
    sink: Arc<dyn DiagnosticSink>,
}

impl QueryInstrumentation {
    /// Creates middleware from instrumentation tuning.
    #[must_use]
    pub fn new(active: bool, config: &InstrumentationConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            active,
            tracker: OperationWindowTracker::new(WindowSettings::from(config), Arc::clone(&sink)),
            resolver: CallSiteResolver::new(config.skip_frame_prefixes.clone()),
            stack: Arc::new(BacktraceCapture),
            sink,
        }
    }

    /// Creates middleware whose activation follows the store configuration.
    #[must_use]
    pub fn from_config(config: &StoreConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self::new(config.instrumentation_active(), &config.instrumentation, sink)
    }

    /// Creates an inactive passthrough.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false, &InstrumentationConfig::default(), Arc::new(NoopDiagnosticSink))
    }

    /// Replaces the tracker clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tracker =
            OperationWindowTracker::with_clock(*self.tracker.settings(), Arc::clone(&self.sink), clock);
        self
    }

    /// Replaces the stack capture source.
    #[must_use]
    pub fn with_stack_capture(mut self, stack: Arc<dyn StackCapture>) -> Self {
        self.stack = stack;
        self
    }

    /// Returns true when operations are observed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the burst tracker.
    #[must_use]
    pub const fn tracker(&self) -> &OperationWindowTracker {
        &self.tracker
    }

    /// Records `operation` when it is an observed read.
    ///
    /// Returns the burst warning fired by this occurrence, if any.
    pub fn observe(&self, operation: &Operation) -> Option<BurstWarning> {
        if !self.active || !operation.action.is_instrumented_read() {
            return None;
        }
        let outcome = operation.signature().and_then(|signature| {
            let call_site = self.resolver.resolve(&self.stack.capture());
            self.tracker.record(&signature, call_site)
        });
        match outcome {
            Ok(warning) => warning,
            Err(err) => {
                self.sink.record(&DiagnosticEvent::InstrumentationError(InstrumentationErrorEvent::new(
                    operation,
                    err.to_string(),
                )));
                None
            }
        }
    }

    /// Observes `operation`, then runs `proceed` and returns its output.
    pub async fn intercept<F, Fut, T>(&self, operation: &Operation, proceed: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.observe(operation);
        proceed().await
    }
}
