//! Native MySQL store using mysql_async.
//!
//! Statements run over the text protocol; every value is rendered to the same
//! text form the `mysql` client prints.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row as MySqlRow, Value as MySqlValue};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::core::traits::{Dialect, QueryOutput, Store};
use crate::error::{ReconcileError, Result};

use super::MysqlDialect;

/// MySQL store backed by a connection pool.
pub struct MysqlStore {
    name: String,
    pool: Pool,
    dialect: MysqlDialect,
}

impl MysqlStore {
    /// Create a pooled store. Connections are opened lazily.
    pub fn new(name: impl Into<String>, config: &StoreConfig, max_conns: usize) -> Result<Self> {
        let name = name.into();

        let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
            ReconcileError::Config(format!("invalid MySQL pool size {}", max_conns))
        })?;

        let builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port())
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"])
            .pool_opts(PoolOpts::new().with_constraints(constraints));

        let opts: Opts = builder.into();
        let pool = Pool::new(opts);

        info!(
            "MySQL {} store: {}:{}/{}",
            name,
            config.host,
            config.port(),
            config.database
        );

        Ok(Self {
            name,
            pool,
            dialect: MysqlDialect::new(),
        })
    }

    fn map_error(&self, e: mysql_async::Error) -> ReconcileError {
        match e {
            mysql_async::Error::Server(server) => ReconcileError::rejected(format!(
                "ERROR {} ({}): {}",
                server.code, server.state, server.message
            )),
            other => ReconcileError::unavailable(&self.name, other),
        }
    }
}

#[async_trait]
impl Store for MysqlStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryOutput> {
        debug!("{}: {}", self.name, sql);

        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| self.map_error(e))?;

        let rows: Vec<MySqlRow> = conn.query(sql).await.map_err(|e| self.map_error(e))?;

        let mut output = QueryOutput::empty();
        for row in rows {
            if output.columns.is_empty() {
                output.columns = row
                    .columns_ref()
                    .iter()
                    .map(|c| c.name_str().into_owned())
                    .collect();
            }
            let cells = (0..row.len())
                .map(|i| render_value(row.as_ref(i)))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| match e {
                    ReconcileError::Parse { message, .. } => {
                        ReconcileError::parse(format!("{} row", self.name), message)
                    }
                    other => other,
                })?;
            output.rows.push(cells);
        }

        Ok(output)
    }
}

/// Render a MySQL value as the text the `mysql` client would print.
fn render_value(value: Option<&MySqlValue>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };

    Ok(match value {
        MySqlValue::NULL => None,
        MySqlValue::Bytes(bytes) => Some(
            String::from_utf8(bytes.clone())
                .map_err(|e| ReconcileError::parse("mysql value", e))?,
        ),
        MySqlValue::Int(v) => Some(v.to_string()),
        MySqlValue::UInt(v) => Some(v.to_string()),
        MySqlValue::Float(v) => Some(v.to_string()),
        MySqlValue::Double(v) => Some(v.to_string()),
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Some(text)
        }
        MySqlValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u32::from(*hours) + days * 24;
            let mut text = format!(
                "{}{:02}:{:02}:{:02}",
                if *negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Some(text)
        }
    })
}
