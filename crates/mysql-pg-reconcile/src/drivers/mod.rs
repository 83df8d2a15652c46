//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mysql`]: MySQL dialect and native store
//! - [`postgres`]: PostgreSQL dialect and native store
//! - [`process`]: command-line client transport for either engine
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `Store`: statement execution returning text rows
//!
//! [`open_store`] picks the implementation from configuration and wraps it
//! in a [`TimedStore`] so every call is bounded by the store timeout.

#[cfg(test)]
pub mod memory;
pub mod mysql;
pub mod postgres;
pub mod process;

// Re-export driver types
pub use mysql::{MysqlDialect, MysqlStore};
pub use postgres::{PgStore, PostgresDialect};
pub use process::ProcessStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::debug;

use crate::config::{StoreConfig, StoreKind, Transport};
use crate::core::traits::{Dialect, QueryOutput, Store};
use crate::error::{ReconcileError, Result};

/// Enum-based static dispatch for dialects.
///
/// Stores own one of these instead of a boxed trait object.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
}

impl DialectImpl {
    /// Dialect of a store kind.
    pub fn from_kind(kind: StoreKind) -> Self {
        match kind {
            StoreKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            StoreKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mysql(d) => d.name(),
            DialectImpl::Postgres(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.quote_ident(name),
            DialectImpl::Postgres(d) => d.quote_ident(name),
        }
    }

    fn quote_text(&self, value: &str) -> std::result::Result<String, String> {
        match self {
            DialectImpl::Mysql(d) => d.quote_text(value),
            DialectImpl::Postgres(d) => d.quote_text(value),
        }
    }

    fn decode_text(&self, literal: &str) -> Option<String> {
        match self {
            DialectImpl::Mysql(d) => d.decode_text(literal),
            DialectImpl::Postgres(d) => d.decode_text(literal),
        }
    }

    fn list_tables_query(&self) -> String {
        match self {
            DialectImpl::Mysql(d) => d.list_tables_query(),
            DialectImpl::Postgres(d) => d.list_tables_query(),
        }
    }

    fn timestamp_literal(&self, ts: NaiveDateTime) -> String {
        match self {
            DialectImpl::Mysql(d) => d.timestamp_literal(ts),
            DialectImpl::Postgres(d) => d.timestamp_literal(ts),
        }
    }
}

/// Bounds every statement of the wrapped store by a timeout.
///
/// The `Store` template methods all go through `execute_query`, so listing,
/// counting and pinging are bounded too.
pub struct TimedStore {
    inner: Arc<dyn Store>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl Store for TimedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect()
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryOutput> {
        match tokio::time::timeout(self.timeout, self.inner.execute_query(sql)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("{}: timed out after {:?}", self.inner.name(), self.timeout);
                Err(ReconcileError::Timeout {
                    store: self.inner.name().to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Build the store described by a configuration section.
///
/// `name` labels the store in logs and errors ("source", "target").
pub fn open_store(
    name: &str,
    config: &StoreConfig,
    max_conns: usize,
    timeout: Duration,
) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match (config.transport, config.r#type) {
        (Transport::Process, _) => Arc::new(ProcessStore::new(name, config)),
        (Transport::Native, StoreKind::Mysql) => Arc::new(MysqlStore::new(name, config, max_conns)?),
        (Transport::Native, StoreKind::Postgres) => Arc::new(PgStore::new(name, config, max_conns)?),
    };
    Ok(Arc::new(TimedStore::new(store, timeout)))
}
