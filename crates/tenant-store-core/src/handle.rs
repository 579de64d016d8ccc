// crates/tenant-store-core/src/handle.rs
// ============================================================================
// Module: Tenant Client Handles
// Description: Store connection seam and the per-tenant client handle.
// Purpose: Wrap a raw store connection with hooks and instrumentation.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! A [`ConnectionFactory`] builds raw [`StoreConnection`]s for a connection
//! target. The registry wraps each one in a [`ClientHandle`] that carries the
//! tenant key, the target, a tri-state [`HandleStatus`], typed
//! [`ClientHooks`], and the shared [`QueryInstrumentation`].
//!
//! ## Invariants
//! - A `Failed` handle rejects operations without reaching the store.
//! - Hooks observe operations; they never change results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::diagnostics::DiagnosticEvent;
use crate::diagnostics::DiagnosticSink;
use crate::diagnostics::OperationErrorEvent;
use crate::diagnostics::SlowOperationWarning;
use crate::error::StoreError;
use crate::instrument::QueryInstrumentation;
use crate::operation::Operation;
use crate::tenant::TenantKey;

// ============================================================================
// SECTION: Connection Seam
// ============================================================================

/// Options passed to the connection factory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Enables the optional query acceleration capability.
    pub acceleration_enabled: bool,
}

/// Raw store connection produced by a [`ConnectionFactory`].
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Establishes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the store is unreachable.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Releases the connection and its resources.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the release fails.
    async fn disconnect(&self) -> Result<(), StoreError>;

    /// Executes an operation and returns its JSON result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store rejects the operation.
    async fn execute(&self, operation: &Operation) -> Result<Value, StoreError>;
}

/// Builds raw store connections for a connection target.
pub trait ConnectionFactory: Send + Sync {
    /// Constructs a connection without connecting it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Construction`] when the target is unusable.
    fn create(
        &self,
        target: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn StoreConnection>, StoreError>;
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// Connection lifecycle state of a client handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleStatus {
    /// Initial connect has not completed.
    Pending,
    /// Initial connect succeeded.
    Ready,
    /// Initial connect failed or the handle was released.
    Failed(String),
}

// ============================================================================
// SECTION: Hooks
// ============================================================================

/// Typed hook callback.
pub type HookFn<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Per-handle operation hooks.
#[derive(Clone)]
pub struct ClientHooks {
    /// Latency at or above which `on_slow_operation` fires.
    pub slow_operation_threshold: Duration,
    /// Called for operations slower than the threshold.
    pub on_slow_operation: Option<HookFn<SlowOperationWarning>>,
    /// Called for operations that returned an error.
    pub on_error: Option<HookFn<OperationErrorEvent>>,
}

impl ClientHooks {
    /// Hooks that forward both events to `sink`.
    #[must_use]
    pub fn from_sink(slow_operation_threshold: Duration, sink: &Arc<dyn DiagnosticSink>) -> Self {
        let slow_sink = Arc::clone(sink);
        let error_sink = Arc::clone(sink);
        Self {
            slow_operation_threshold,
            on_slow_operation: Some(Arc::new(move |warning: &SlowOperationWarning| {
                slow_sink.record(&DiagnosticEvent::SlowOperation(warning.clone()));
            })),
            on_error: Some(Arc::new(move |event: &OperationErrorEvent| {
                error_sink.record(&DiagnosticEvent::OperationError(event.clone()));
            })),
        }
    }

    /// Hooks that do nothing.
    #[must_use]
    pub const fn noop() -> Self {
        Self {
            slow_operation_threshold: Duration::MAX,
            on_slow_operation: None,
            on_error: None,
        }
    }
}

// ============================================================================
// SECTION: Client Handle
// ============================================================================

/// Tenant-scoped client handle shared with callers.
///
/// # Invariants
/// - `tenant` and `target` never change after construction.
pub struct ClientHandle {
    /// Tenant key.
    tenant: TenantKey,
    /// Derived connection target.
    target: String,
    /// Raw store connection.
    connection: Arc<dyn StoreConnection>,
    /// Lifecycle state.
    status: RwLock<HandleStatus>,
    /// Operation hooks.
    hooks: ClientHooks,
    /// Shared instrumentation middleware.
    instrumentation: Arc<QueryInstrumentation>,
}

impl ClientHandle {
    /// Wraps a raw connection in `Pending` state.
    #[must_use]
    pub fn new(
        tenant: TenantKey,
        target: String,
        connection: Arc<dyn StoreConnection>,
        hooks: ClientHooks,
        instrumentation: Arc<QueryInstrumentation>,
    ) -> Self {
        Self {
            tenant,
            target,
            connection,
            status: RwLock::new(HandleStatus::Pending),
            hooks,
            instrumentation,
        }
    }

    /// Returns the tenant key.
    #[must_use]
    pub const fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// Returns the connection target this handle was built for.
    #[must_use]
    pub fn connection_target(&self) -> &str {
        &self.target
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn status(&self) -> HandleStatus {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Runs the initial connect and records its outcome.
    ///
    /// # Errors
    ///
    /// Returns the connect failure after marking the handle `Failed`.
    pub async fn connect(&self) -> Result<(), StoreError> {
        match self.connection.connect().await {
            Ok(()) => {
                self.set_status(HandleStatus::Ready);
                Ok(())
            }
            Err(err) => {
                self.set_status(HandleStatus::Failed(err.detail().to_string()));
                Err(err)
            }
        }
    }

    /// Executes an operation through instrumentation and hooks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] for a `Failed` handle, otherwise the
    /// store's own error unchanged.
    pub async fn execute(&self, operation: Operation) -> Result<Value, StoreError> {
        if let HandleStatus::Failed(message) = self.status() {
            return Err(StoreError::Connection(message));
        }
        let started = Instant::now();
        let result =
            self.instrumentation.intercept(&operation, || self.connection.execute(&operation)).await;
        let elapsed = started.elapsed();
        if elapsed >= self.hooks.slow_operation_threshold
            && let Some(hook) = &self.hooks.on_slow_operation
        {
            hook(&SlowOperationWarning::new(
                &self.tenant,
                &operation,
                duration_ms(elapsed),
                duration_ms(self.hooks.slow_operation_threshold),
            ));
        }
        if let Err(err) = &result
            && let Some(hook) = &self.hooks.on_error
        {
            hook(&OperationErrorEvent::new(&self.tenant, &operation, err.to_string()));
        }
        result
    }

    /// Disconnects the raw connection and marks the handle released.
    ///
    /// # Errors
    ///
    /// Returns the driver's disconnect failure.
    pub async fn release(&self) -> Result<(), StoreError> {
        let outcome = self.connection.disconnect().await;
        self.set_status(HandleStatus::Failed("handle released".to_string()));
        outcome
    }

    /// Replaces the lifecycle state.
    fn set_status(&self, status: HandleStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// Converts a duration to whole milliseconds, saturating.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
