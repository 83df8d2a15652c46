//! Configuration validation.

use std::collections::HashSet;

use super::{Config, StoreConfig, StoreKind, Transport};
use crate::core::identifier::validate_identifier;
use crate::error::{ReconcileError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_store("source", &config.source, StoreKind::Mysql)?;
    validate_store("target", &config.target, StoreKind::Postgres)?;

    // Cannot reconcile a database with itself
    if config.source.host == config.target.host
        && config.source.port() == config.target.port()
        && config.source.database == config.target.database
        && config.source.container == config.target.container
    {
        return Err(ReconcileError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.batch_size == 0 {
        return Err(ReconcileError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if migration.fetch_chunk_size == 0 {
        return Err(ReconcileError::Config(
            "migration.fetch_chunk_size must be at least 1".into(),
        ));
    }
    if migration.store_timeout_secs == 0 {
        return Err(ReconcileError::Config(
            "migration.store_timeout_secs must be at least 1".into(),
        ));
    }
    if migration.max_connections == 0 {
        return Err(ReconcileError::Config(
            "migration.max_connections must be at least 1".into(),
        ));
    }

    if config.tables.is_empty() {
        return Err(ReconcileError::Config(
            "at least one table must be configured".into(),
        ));
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        if !seen.insert(table.name.as_str()) {
            return Err(ReconcileError::Config(format!(
                "table {} is configured twice",
                table.name
            )));
        }
        table.validate()?;
    }

    Ok(())
}

fn validate_store(role: &str, store: &StoreConfig, expected: StoreKind) -> Result<()> {
    if store.r#type != expected {
        return Err(ReconcileError::Config(format!(
            "{}.type must be '{}', got '{}'",
            role, expected, store.r#type
        )));
    }
    if store.host.is_empty() {
        return Err(ReconcileError::Config(format!("{}.host is required", role)));
    }
    if store.database.is_empty() {
        return Err(ReconcileError::Config(format!(
            "{}.database is required",
            role
        )));
    }
    if store.user.is_empty() {
        return Err(ReconcileError::Config(format!("{}.user is required", role)));
    }
    if store.transport == Transport::Native && store.container.is_some() {
        return Err(ReconcileError::Config(format!(
            "{}.container requires transport: process",
            role
        )));
    }
    if let Some(schema) = &store.schema {
        validate_identifier(schema)?;
    }
    Ok(())
}
