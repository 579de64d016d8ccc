// crates/tenant-store-postgres/src/lib.rs
// ============================================================================
// Module: Tenant Store Postgres Library
// Description: Postgres driver for tenant client handles.
// Purpose: Expose the Postgres connection factory and its configuration.
// Dependencies: crate::driver
// ============================================================================

//! ## Overview
//! Implements [`tenant_store_core::ConnectionFactory`] over pooled
//! synchronous Postgres clients. Each tenant target's `schema=` parameter
//! becomes the session `search_path`.

pub mod driver;

pub use driver::PostgresConnection;
pub use driver::PostgresConnectionFactory;
pub use driver::PostgresDriverConfig;
pub use driver::split_schema;
