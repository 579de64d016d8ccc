// crates/tenant-store-postgres/src/driver.rs
// ============================================================================
// Module: Postgres Driver
// Description: Pooled Postgres connections scoped to a tenant schema.
// Purpose: Back tenant client handles with a real Postgres store.
// Dependencies: postgres, r2d2, r2d2_postgres, tokio, url
// ============================================================================

//! ## Overview
//! [`PostgresConnectionFactory`] turns a tenant connection target into a
//! [`PostgresConnection`]. The `schema=` query parameter is removed from the
//! target (the Postgres client rejects unknown parameters) and applied as the
//! session `search_path`. Pools are built without contacting the server;
//! `connect` checks out the first connection on a blocking task.
//!
//! Only raw actions are executed here: `queryRaw` returns rows as JSON
//! objects and `executeRaw` returns the affected-row count. SQL lives in
//! `args.query`; `args.params` are bound as text.
//!
//! Security posture: schema names come from connection targets and are
//! restricted to `[A-Za-z0-9_-]` before they reach session options.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use postgres::NoTls;
use postgres::types::ToSql;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tenant_store_core::ActionKind;
use tenant_store_core::ConnectionFactory;
use tenant_store_core::ConnectionOptions;
use tenant_store_core::Operation;
use tenant_store_core::StoreConnection;
use tenant_store_core::StoreError;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Connection target parameter naming the tenant schema.
const SCHEMA_PARAMETER: &str = "schema";

/// Pool type used by every connection.
type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Postgres driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PostgresDriverConfig {
    /// Maximum pool size per tenant.
    pub max_connections: u32,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    pub statement_timeout_ms: u64,
}

impl Default for PostgresDriverConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            connect_timeout_ms: 5_000,
            statement_timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Connection factory producing pooled Postgres connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnectionFactory {
    /// Driver configuration shared by every pool.
    config: PostgresDriverConfig,
}

impl PostgresConnectionFactory {
    /// Creates a factory with the given driver configuration.
    #[must_use]
    pub const fn new(config: PostgresDriverConfig) -> Self {
        Self {
            config,
        }
    }
}

impl ConnectionFactory for PostgresConnectionFactory {
    fn create(
        &self,
        target: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn StoreConnection>, StoreError> {
        Ok(Arc::new(PostgresConnection::new(target, &self.config, options)?))
    }
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Pooled Postgres connection for one tenant target.
///
/// # Invariants
/// - `pool` is `None` only after `disconnect`.
pub struct PostgresConnection {
    /// Schema applied as `search_path`, if any.
    schema: Option<String>,
    /// Connection pool; taken on disconnect.
    pool: Mutex<Option<PgPool>>,
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        let pool = self.pool.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pool) = pool {
            let _ = std::thread::spawn(move || drop(pool));
        }
    }
}

impl PostgresConnection {
    /// Builds an unconnected pool for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Construction`] when the target is not a valid
    /// Postgres URL or names an invalid schema.
    pub fn new(
        target: &str,
        config: &PostgresDriverConfig,
        options: &ConnectionOptions,
    ) -> Result<Self, StoreError> {
        let (base, schema) = split_schema(target)?;
        let mut pg_config =
            base.parse::<postgres::Config>().map_err(|err| StoreError::Construction(err.to_string()))?;
        pg_config.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        let mut session = format!("-c statement_timeout={}", config.statement_timeout_ms);
        if let Some(schema) = &schema {
            session.push_str(&format!(" -c search_path=\"{schema}\""));
        }
        pg_config.options(&session);
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let min_idle = if options.acceleration_enabled { config.max_connections } else { 0 };
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(min_idle))
            .connection_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build_unchecked(manager);
        Ok(Self {
            schema,
            pool: Mutex::new(Some(pool)),
        })
    }

    /// Returns the schema applied as `search_path`.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns a handle to the live pool.
    fn pool(&self) -> Result<PgPool, StoreError> {
        let guard = self.pool.lock().map_err(|_| StoreError::Internal("pool lock poisoned".to_string()))?;
        guard.clone().ok_or_else(|| StoreError::Connection("postgres connection released".to_string()))
    }
}

#[async_trait]
impl StoreConnection for PostgresConnection {
    async fn connect(&self) -> Result<(), StoreError> {
        let pool = self.pool()?;
        tokio::task::spawn_blocking(move || {
            pool.get().map(drop).map_err(|err| StoreError::Connection(err.to_string()))
        })
        .await
        .map_err(|err| StoreError::Internal(err.to_string()))?
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        let pool = self.pool.lock().map_err(|_| StoreError::Internal("pool lock poisoned".to_string()))?.take();
        let Some(pool) = pool else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || drop(pool))
            .await
            .map_err(|err| StoreError::Internal(err.to_string()))
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, StoreError> {
        if !matches!(operation.action, ActionKind::QueryRaw | ActionKind::ExecuteRaw) {
            return Err(StoreError::Unsupported(format!(
                "{} on {} requires a model-aware driver",
                operation.action, operation.model
            )));
        }
        let statement = RawStatement::from_operation(operation)?;
        let pool = self.pool()?;
        tokio::task::spawn_blocking(move || statement.run(&pool))
            .await
            .map_err(|err| StoreError::Internal(err.to_string()))?
    }
}

// ============================================================================
// SECTION: Raw Statements
// ============================================================================

/// Raw SQL statement extracted from operation arguments.
struct RawStatement {
    /// Whether rows (query) or a count (execute) is returned.
    action: ActionKind,
    /// SQL text without trailing terminators.
    sql: String,
    /// Text-bound parameters.
    params: Vec<Option<String>>,
}

impl RawStatement {
    /// Extracts `args.query` and `args.params`.
    fn from_operation(operation: &Operation) -> Result<Self, StoreError> {
        let sql = operation
            .args
            .get("query")
            .and_then(Value::as_str)
            .map(|sql| sql.trim().trim_end_matches(';').trim_end())
            .filter(|sql| !sql.is_empty())
            .ok_or_else(|| StoreError::Operation("args.query must be a non-empty string".to_string()))?;
        let params = match operation.args.get("params") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values.iter().map(text_param).collect(),
            Some(_) => {
                return Err(StoreError::Operation("args.params must be an array".to_string()));
            }
        };
        Ok(Self {
            action: operation.action,
            sql: sql.to_string(),
            params,
        })
    }

    /// Runs the statement on a pooled client.
    fn run(&self, pool: &PgPool) -> Result<Value, StoreError> {
        let mut client = pool.get().map_err(|err| StoreError::Connection(err.to_string()))?;
        let bindings: Vec<&(dyn ToSql + Sync)> =
            self.params.iter().map(|param| param as &(dyn ToSql + Sync)).collect();
        if self.action == ActionKind::ExecuteRaw {
            let affected = client.execute(self.sql.as_str(), &bindings).map_err(operation_error)?;
            return Ok(Value::from(affected));
        }
        let wrapped = format!("SELECT row_to_json(t)::text FROM ({}) t", self.sql);
        let rows = client.query(wrapped.as_str(), &bindings).map_err(operation_error)?;
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let text: String = row.try_get(0).map_err(operation_error)?;
            let value = serde_json::from_str(&text)
                .map_err(|err| StoreError::Operation(format!("invalid row json: {err}")))?;
            values.push(value);
        }
        Ok(Value::Array(values))
    }
}

/// Converts a JSON parameter into its text binding.
fn text_param(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Maps a Postgres error into a store operation error.
fn operation_error(err: postgres::Error) -> StoreError {
    StoreError::Operation(err.to_string())
}

// ============================================================================
// SECTION: Targets
// ============================================================================

/// Splits the `schema=` parameter out of a connection target.
///
/// Returns the target without that parameter and the schema, if present.
///
/// # Errors
///
/// Returns [`StoreError::Construction`] when the target is not a URL or the
/// schema contains characters outside `[A-Za-z0-9_-]`.
pub fn split_schema(target: &str) -> Result<(String, Option<String>), StoreError> {
    let mut url = Url::parse(target)
        .map_err(|err| StoreError::Construction(format!("invalid connection target: {err}")))?;
    let mut schema = None;
    let mut retained: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == SCHEMA_PARAMETER {
            schema = Some(value.into_owned());
        } else {
            retained.push((key.into_owned(), value.into_owned()));
        }
    }
    if let Some(name) = &schema
        && (name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-')))
    {
        return Err(StoreError::Construction(format!("invalid schema name: {name}")));
    }
    url.set_query(None);
    if !retained.is_empty() {
        url.query_pairs_mut().extend_pairs(retained);
    }
    Ok((url.to_string(), schema))
}

#[cfg(test)]
mod tests {
    use super::split_schema;
    use tenant_store_core::StoreError;

    #[test]
    fn schema_parameter_is_removed() {
        assert_eq!(
            split_schema("postgres://host/db?schema=tenant1").ok(),
            Some(("postgres://host/db".to_string(), Some("tenant1".to_string())))
        );
    }

    #[test]
    fn other_parameters_are_kept() {
        assert_eq!(
            split_schema("postgres://host/db?sslmode=require&schema=tenant1").ok(),
            Some(("postgres://host/db?sslmode=require".to_string(), Some("tenant1".to_string())))
        );
    }

    #[test]
    fn target_without_schema_is_unchanged() {
        assert_eq!(
            split_schema("postgres://user:pw@host:5432/db").ok(),
            Some(("postgres://user:pw@host:5432/db".to_string(), None))
        );
    }

    #[test]
    fn unsafe_schema_names_are_rejected() {
        assert!(matches!(
            split_schema("postgres://host/db?schema=a%22%3Bdrop"),
            Err(StoreError::Construction(_))
        ));
        assert!(matches!(split_schema("postgres://host/db?schema="), Err(StoreError::Construction(_))));
    }

    #[test]
    fn non_url_targets_are_rejected() {
        assert!(matches!(split_schema("host=localhost dbname=app"), Err(StoreError::Construction(_))));
    }
}
