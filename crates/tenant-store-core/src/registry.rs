// crates/tenant-store-core/src/registry.rs
// ============================================================================
// Module: Tenant Client Registry
// Description: Lazily built, tenant-keyed cache of client handles.
// Purpose: Give every tenant exactly one schema-scoped client handle.
// Dependencies: tenant-store-config, tokio
// ============================================================================

//! ## Overview
//! [`TenantClientRegistry`] maps tenant keys to [`ClientHandle`]s. The first
//! request for a tenant derives its connection target, builds a raw
//! connection through the [`ConnectionFactory`], caches the handle, and
//! connects it on a background task. Later requests return the cached handle.
//!
//! ## Invariants
//! - At most one handle exists per tenant key, including under concurrent
//!   first-time requests.
//! - `get_client` never awaits the network.
//! - Factory failures are returned and never cached.
//!
//! Security posture: tenant isolation relies on the derived `schema=` target;
//! tenant keys are validated by [`TenantKey`] before they reach this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;

use tenant_store_config::ConfigError;
use tenant_store_config::StoreConfig;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::diagnostics::ConnectionErrorEvent;
use crate::diagnostics::DiagnosticEvent;
use crate::diagnostics::DiagnosticSink;
use crate::diagnostics::TeardownErrorEvent;
use crate::diagnostics::sink_for;
use crate::error::StoreError;
use crate::handle::ClientHandle;
use crate::handle::ClientHooks;
use crate::handle::ConnectionFactory;
use crate::handle::ConnectionOptions;
use crate::handle::HandleStatus;
use crate::instrument::QueryInstrumentation;
use crate::tenant::TenantKey;

// ============================================================================
// SECTION: Connection Targets
// ============================================================================

/// Derives the connection target for a tenant.
///
/// The default tenant uses `base` unchanged; every other tenant appends
/// `schema=<tenant>` with `?` or `&` depending on whether `base` already
/// carries a query string.
#[must_use]
pub fn connection_target(base: &str, tenant: Option<&TenantKey>) -> String {
    let tenant = TenantKey::resolve(tenant);
    if tenant.is_default() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}schema={tenant}")
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Cached handle plus its pending initial connect.
struct ClientEntry {
    /// Shared handle.
    handle: Arc<ClientHandle>,
    /// Background connect task, awaited during teardown.
    connect_task: Option<JoinHandle<()>>,
}

/// Tenant-keyed registry of client handles.
///
/// # Invariants
/// - `clients` holds at most one entry per tenant key.
pub struct TenantClientRegistry {
    /// Base connection string.
    base_url: String,
    /// Options passed to the factory.
    options: ConnectionOptions,
    /// Raw connection factory.
    factory: Arc<dyn ConnectionFactory>,
    /// Shared instrumentation middleware.
    instrumentation: Arc<QueryInstrumentation>,
    /// Diagnostics destination.
    sink: Arc<dyn DiagnosticSink>,
    /// Hooks applied to new handles.
    hooks: ClientHooks,
    /// Runtime used for background connects.
    runtime: Handle,
    /// Cached entries by tenant.
    clients: RwLock<HashMap<TenantKey, ClientEntry>>,
}

impl TenantClientRegistry {
    /// Creates a registry from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDatabaseUrl`] when the base connection
    /// string is empty, [`ConfigError::Invalid`] for other invalid settings,
    /// and [`ConfigError::MissingRuntime`] outside a Tokio runtime.
    pub fn new(
        config: &StoreConfig,
        factory: Arc<dyn ConnectionFactory>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;
        let hooks = ClientHooks::from_sink(
            Duration::from_millis(config.slow_operation_threshold_ms),
            &sink,
        );
        Ok(Self {
            base_url: config.database_url.clone(),
            options: ConnectionOptions {
                acceleration_enabled: config.acceleration_enabled,
            },
            factory,
            instrumentation: Arc::new(QueryInstrumentation::from_config(config, Arc::clone(&sink))),
            sink,
            hooks,
            runtime,
            clients: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a registry whose diagnostics go where `config.diagnostics`
    /// points.
    ///
    /// # Errors
    ///
    /// Same as [`TenantClientRegistry::new`].
    pub fn from_config(
        config: &StoreConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self, ConfigError> {
        Self::new(config, factory, sink_for(config.diagnostics))
    }

    /// Replaces the instrumentation shared by handles created afterward.
    #[must_use]
    pub fn with_instrumentation(mut self, instrumentation: Arc<QueryInstrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Replaces the hooks applied to handles created afterward.
    #[must_use]
    pub fn with_hooks(mut self, hooks: ClientHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the shared instrumentation middleware.
    #[must_use]
    pub const fn instrumentation(&self) -> &Arc<QueryInstrumentation> {
        &self.instrumentation
    }

    /// Returns the handle for `tenant`, building it on first use.
    ///
    /// An absent key selects the default tenant. The initial connect runs in
    /// the background; use [`ClientHandle::status`] to observe it.
    ///
    /// # Errors
    ///
    /// Returns the factory's [`StoreError`] when construction fails, or
    /// [`StoreError::Internal`] when the registry lock is poisoned.
    pub fn get_client(&self, tenant: Option<&TenantKey>) -> Result<Arc<ClientHandle>, StoreError> {
        let tenant = TenantKey::resolve(tenant);
        {
            let clients = self.clients.read().map_err(|_| poisoned())?;
            if let Some(entry) = clients.get(&tenant) {
                return Ok(Arc::clone(&entry.handle));
            }
        }
        let mut clients = self.clients.write().map_err(|_| poisoned())?;
        if let Some(entry) = clients.get(&tenant) {
            return Ok(Arc::clone(&entry.handle));
        }
        let target = connection_target(&self.base_url, Some(&tenant));
        let connection = self.factory.create(&target, &self.options)?;
        let handle = Arc::new(ClientHandle::new(
            tenant.clone(),
            target,
            connection,
            self.hooks.clone(),
            Arc::clone(&self.instrumentation),
        ));
        let connect_task = self.spawn_connect(Arc::clone(&handle));
        clients.insert(
            tenant,
            ClientEntry {
                handle: Arc::clone(&handle),
                connect_task: Some(connect_task),
            },
        );
        Ok(handle)
    }

    /// Returns the connection target for `tenant` under this registry's base.
    #[must_use]
    pub fn get_connection_target(&self, tenant: Option<&TenantKey>) -> String {
        connection_target(&self.base_url, tenant)
    }

    /// Releases every cached handle and clears the registry.
    ///
    /// Pending connects are awaited before release. Release failures are
    /// reported to the sink. Returns the number of handles torn down; a second
    /// call returns zero.
    pub async fn disconnect_all(&self) -> usize {
        let mut drained: Vec<(TenantKey, ClientEntry)> = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            clients.drain().collect()
        };
        drained.sort_by(|left, right| left.0.cmp(&right.0));
        let released = drained.len();
        for (tenant, entry) in drained {
            if let Some(task) = entry.connect_task
                && let Err(err) = task.await
            {
                self.report_teardown(&tenant, format!("connect task failed: {err}"));
            }
            if let Err(err) = entry.handle.release().await {
                self.report_teardown(&tenant, err.to_string());
            }
        }
        released
    }

    /// Returns the number of cached tenants.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns the status of a cached tenant handle.
    #[must_use]
    pub fn status(&self, tenant: Option<&TenantKey>) -> Option<HandleStatus> {
        let tenant = TenantKey::resolve(tenant);
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.get(&tenant).map(|entry| entry.handle.status())
    }

    /// Spawns the initial connect for a new handle.
    fn spawn_connect(&self, handle: Arc<ClientHandle>) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        self.runtime.spawn(async move {
            if let Err(err) = handle.connect().await {
                sink.record(&DiagnosticEvent::ConnectionError(ConnectionErrorEvent::new(
                    handle.tenant(),
                    err.detail(),
                )));
            }
        })
    }

    /// Reports a teardown failure for `tenant`.
    fn report_teardown(&self, tenant: &TenantKey, message: String) {
        self.sink.record(&DiagnosticEvent::TeardownError(TeardownErrorEvent::new(tenant, message)));
    }
}

/// Error for a poisoned registry lock.
fn poisoned() -> StoreError {
    StoreError::Internal("tenant registry lock poisoned".to_string())
}
