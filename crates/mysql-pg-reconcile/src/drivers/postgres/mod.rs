//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PgStore`]: native store over a `deadpool-postgres` pool

mod dialect;
mod store;

pub use dialect::PostgresDialect;
pub use store::PgStore;
