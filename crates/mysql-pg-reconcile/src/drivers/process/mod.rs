//! Process transport: run each statement through the database's command-line
//! client, optionally inside a container via `docker exec`.
//!
//! One child process is spawned per statement. Passwords are handed to the
//! client through its environment (`MYSQL_PWD`, `PGPASSWORD`), never on the
//! command line. With a container, `docker exec -e NAME` forwards the variable
//! from the docker client's own environment.

pub mod output;

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::{StoreConfig, StoreKind};
use crate::core::traits::{Dialect, QueryOutput, Store};
use crate::drivers::DialectImpl;
use crate::error::{ReconcileError, Result};

use output::{parse_mysql_batch, parse_psql_csv, PSQL_NULL};

/// A store reached through `mysql` or `psql`.
pub struct ProcessStore {
    name: String,
    kind: StoreKind,
    dialect: DialectImpl,
    program: String,
    prefix_args: Vec<String>,
    client_args: Vec<String>,
    env: Vec<(String, String)>,
}

impl ProcessStore {
    /// Build the client invocation for a store.
    pub fn new(name: impl Into<String>, config: &StoreConfig) -> Self {
        let kind = config.r#type;
        let port = config.port().to_string();

        let (client_args, env) = match kind {
            StoreKind::Mysql => {
                let args = vec![
                    config.client_binary().to_string(),
                    "--batch".to_string(),
                    "--default-character-set=utf8mb4".to_string(),
                    "-h".to_string(),
                    config.host.clone(),
                    "-P".to_string(),
                    port,
                    "-u".to_string(),
                    config.user.clone(),
                    config.database.clone(),
                    "-e".to_string(),
                ];
                let env = vec![("MYSQL_PWD".to_string(), config.password.clone())];
                (args, env)
            }
            StoreKind::Postgres => {
                let args = vec![
                    config.client_binary().to_string(),
                    "-X".to_string(),
                    "-q".to_string(),
                    "--csv".to_string(),
                    "-P".to_string(),
                    format!("null={}", PSQL_NULL),
                    "-v".to_string(),
                    "ON_ERROR_STOP=1".to_string(),
                    "-h".to_string(),
                    config.host.clone(),
                    "-p".to_string(),
                    port,
                    "-U".to_string(),
                    config.user.clone(),
                    "-d".to_string(),
                    config.database.clone(),
                    "-c".to_string(),
                ];
                let mut env = vec![("PGPASSWORD".to_string(), config.password.clone())];
                if let Some(schema) = &config.schema {
                    env.push(("PGOPTIONS".to_string(), format!("-c search_path={}", schema)));
                }
                (args, env)
            }
        };

        let (program, prefix_args, client_args) = match &config.container {
            Some(container) => {
                let mut prefix = vec!["exec".to_string()];
                for (key, _) in &env {
                    prefix.push("-e".to_string());
                    prefix.push(key.clone());
                }
                prefix.push(container.clone());
                (config.docker_binary.clone(), prefix, client_args)
            }
            None => {
                let mut args = client_args;
                let program = args.remove(0);
                (program, Vec::new(), args)
            }
        };

        Self {
            name: name.into(),
            kind,
            dialect: DialectImpl::from_kind(kind),
            program,
            prefix_args,
            client_args,
            env,
        }
    }

    /// Full argument vector for a statement (password excluded).
    pub fn command_line(&self, sql: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.prefix_args.len() + self.client_args.len() + 2);
        argv.push(self.program.clone());
        argv.extend(self.prefix_args.iter().cloned());
        argv.extend(self.client_args.iter().cloned());
        argv.push(sql.to_string());
        argv
    }

    fn context(&self) -> String {
        format!("{} ({} client)", self.name, self.kind)
    }
}

#[async_trait]
impl Store for ProcessStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryOutput> {
        debug!("{}: {}", self.name, sql);

        let output = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(&self.client_args)
            .arg(sql)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ReconcileError::unavailable(&self.name, format!("cannot run {}: {}", self.program, e))
            })?;

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ReconcileError::parse(self.context(), e))?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(classify_failure(self.kind, &self.name, &stderr));
        }

        match self.kind {
            StoreKind::Mysql => parse_mysql_batch(&stdout, &self.context()),
            StoreKind::Postgres => {
                if stdout.is_empty() && returns_rows(sql) {
                    return Err(ReconcileError::parse(
                        self.context(),
                        "no header line in output of a row-returning statement",
                    ));
                }
                parse_psql_csv(&stdout, &self.context())
            }
        }
    }
}

/// Whether a statement produces a result set.
fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start();
    ["SELECT", "WITH", "SHOW", "VALUES"].iter().any(|kw| {
        head.get(..kw.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kw))
    })
}

/// Map a failed client run to an error.
///
/// Server-side statement errors are row-level. Everything else (connection
/// refused, authentication, missing container) means the store is unavailable.
fn classify_failure(kind: StoreKind, store: &str, stderr: &str) -> ReconcileError {
    let message = stderr.trim();
    let rejected = match kind {
        // psql prints "ERROR:  ..." for statement errors and "psql: error: ..."
        // for connection failures.
        StoreKind::Postgres => message.contains("ERROR:"),
        StoreKind::Mysql => mysql_error_code(message).is_some_and(is_statement_error),
    };

    if rejected {
        ReconcileError::rejected(message)
    } else if message.is_empty() {
        ReconcileError::unavailable(store, "client exited with an error and no message")
    } else {
        ReconcileError::unavailable(store, message)
    }
}

/// Extract `NNNN` from "ERROR NNNN (SQLSTATE) at line 1: ...".
fn mysql_error_code(stderr: &str) -> Option<u16> {
    let start = stderr.find("ERROR ")? + "ERROR ".len();
    let digits: String = stderr[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Client errors (2000-2999) and access/database errors are not about the statement.
fn is_statement_error(code: u16) -> bool {
    !matches!(code, 1044 | 1045 | 1049 | 2000..=2999)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Transport;

    fn config(kind: StoreKind, container: Option<&str>) -> StoreConfig {
        StoreConfig {
            r#type: kind,
            transport: Transport::Process,
            host: "localhost".to_string(),
            port: None,
            database: "legacy".to_string(),
            user: "root".to_string(),
            password: "secret".to_string(),
            container: container.map(str::to_string),
            client_binary: None,
            docker_binary: "docker".to_string(),
            schema: None,
        }
    }

    #[test]
    fn test_mysql_command_line_in_container() {
        let store = ProcessStore::new("source", &config(StoreKind::Mysql, Some("legacy-mysql")));
        let argv = store.command_line("SELECT 1");
        assert_eq!(
            &argv[..5],
            &["docker", "exec", "-e", "MYSQL_PWD", "legacy-mysql"]
        );
        assert_eq!(argv[5], "mysql");
        assert!(argv.contains(&"--batch".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("SELECT 1"));
        assert!(!argv.iter().any(|a| a.contains("secret")));
    }

    #[test]
    fn test_psql_command_line_direct() {
        let store = ProcessStore::new("target", &config(StoreKind::Postgres, None));
        let argv = store.command_line("SELECT 1");
        assert_eq!(argv[0], "psql");
        assert!(argv.contains(&"--csv".to_string()));
        assert!(argv.contains(&"ON_ERROR_STOP=1".to_string()));
        assert!(argv.contains(&"5432".to_string()));
        assert!(!argv.iter().any(|a| a.contains("secret")));
        assert_eq!(store.dialect().name(), "postgres");
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  select count(*) from t"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!returns_rows("INSERT INTO t VALUES (1)"));
        assert!(!returns_rows("UPDATE t SET a = 1"));
        assert!(!returns_rows("SEL"));
    }

    #[test]
    fn test_classify_postgres() {
        let err = classify_failure(
            StoreKind::Postgres,
            "target",
            "ERROR:  duplicate key value violates unique constraint \"ak_mangas_pkey\"\n",
        );
        assert!(matches!(err, ReconcileError::RowExecution { .. }));

        let err = classify_failure(
            StoreKind::Postgres,
            "target",
            "psql: error: connection to server at \"localhost\" failed: Connection refused",
        );
        assert!(matches!(err, ReconcileError::StoreUnavailable { .. }));
    }

    #[test]
    fn test_classify_mysql() {
        let err = classify_failure(
            StoreKind::Mysql,
            "source",
            "ERROR 1062 (23000) at line 1: Duplicate entry '5' for key 'PRIMARY'",
        );
        assert!(matches!(err, ReconcileError::RowExecution { .. }));

        let err = classify_failure(
            StoreKind::Mysql,
            "source",
            "ERROR 2002 (HY000): Can't connect to local MySQL server through socket",
        );
        assert!(matches!(err, ReconcileError::StoreUnavailable { .. }));

        let err = classify_failure(
            StoreKind::Mysql,
            "source",
            "Error response from daemon: No such container: legacy-mysql",
        );
        assert!(matches!(err, ReconcileError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let mut cfg = config(StoreKind::Mysql, None);
        cfg.client_binary = Some("/nonexistent/mysql-client".to_string());
        let store = ProcessStore::new("source", &cfg);
        let err = store.execute_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::StoreUnavailable { .. }));
    }
}
