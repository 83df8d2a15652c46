//! Native PostgreSQL store.
//!
//! Uses deadpool-postgres for connection pooling and the simple query
//! protocol, so every cell comes back as text exactly like `psql` prints it.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{Config as PgConfig, NoTls, SimpleQueryMessage};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::core::traits::{Dialect, QueryOutput, Store};
use crate::error::{ReconcileError, Result};

use super::PostgresDialect;

/// PostgreSQL store backed by a connection pool.
pub struct PgStore {
    name: String,
    pool: Pool,
    dialect: PostgresDialect,
}

impl PgStore {
    /// Create a pooled store. Connections are opened lazily.
    pub fn new(name: impl Into<String>, config: &StoreConfig, max_conns: usize) -> Result<Self> {
        let name = name.into();

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("mysql-pg-reconcile");
        if let Some(schema) = &config.schema {
            pg_config.options(&format!("-c search_path={}", schema));
        }

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| ReconcileError::Config(format!("creating PostgreSQL pool: {}", e)))?;

        info!(
            "PostgreSQL {} store: {}:{}/{}",
            name,
            config.host,
            config.port(),
            config.database
        );

        Ok(Self {
            name,
            pool,
            dialect: PostgresDialect::new(),
        })
    }

    fn map_error(&self, e: tokio_postgres::Error) -> ReconcileError {
        match e.as_db_error() {
            Some(db) => ReconcileError::rejected(format!("ERROR:  {}", db.message())),
            None => ReconcileError::unavailable(&self.name, e),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryOutput> {
        debug!("{}: {}", self.name, sql);

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ReconcileError::unavailable(&self.name, e))?;

        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| self.map_error(e))?;

        let mut output = QueryOutput::empty();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if output.columns.is_empty() {
                    output.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let cells = (0..row.len())
                    .map(|i| row.get(i).map(str::to_string))
                    .collect();
                output.rows.push(cells);
            }
        }

        Ok(output)
    }
}
