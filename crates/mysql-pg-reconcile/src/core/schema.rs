//! Declarative table and column descriptions.
//!
//! A [`TableSpec`] is supplied by configuration for every table that takes part
//! in a reconciliation. It is never inferred from a live schema: the column
//! list, kinds and name mapping are fixed for the duration of a run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::identifier::validate_identifier;
use crate::error::{ReconcileError, Result};

/// Kind of a column, driving decode and encode policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    NullableText,
    Timestamp,
}

impl ColumnKind {
    /// Whether values of this kind are written without quotes.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }
}

/// How source column names map to target identifiers when a column has no
/// explicit `target_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierCase {
    /// Lowercase the source name (PostgreSQL folds unquoted names to lowercase).
    #[default]
    Lower,
    /// Keep the source name as-is.
    Preserve,
}

impl IdentifierCase {
    fn apply(self, name: &str) -> String {
        match self {
            IdentifierCase::Lower => name.to_lowercase(),
            IdentifierCase::Preserve => name.to_string(),
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name in the source store.
    pub name: String,

    /// Column kind.
    pub kind: ColumnKind,

    /// Column name in the target store, when it differs from the mapped source name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    /// Literal text substituted for NULL source values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Prefix enforced on non-null text values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Column is absent from the source and filled in at migration time.
    #[serde(default)]
    pub synthesized: bool,
}

impl ColumnSpec {
    /// Create a plain column of the given kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            target_name: None,
            default: None,
            prefix: None,
            synthesized: false,
        }
    }

    /// Set the target column name.
    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    /// Set the NULL replacement literal.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set a required text prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Mark the column as synthesized (not read from the source).
    pub fn synthesized(mut self) -> Self {
        self.synthesized = true;
        self
    }
}

/// Table metadata for one reconciliation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name in the source store.
    pub name: String,

    /// Primary key column (source name).
    pub primary_key: String,

    /// Table name in the target store, when different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    /// Ordered column list.
    pub columns: Vec<ColumnSpec>,

    /// Mapping applied to column names without an explicit target name.
    #[serde(default)]
    pub identifier_case: IdentifierCase,
}

impl TableSpec {
    /// Create a table spec with default identifier mapping.
    pub fn new(
        name: impl Into<String>,
        primary_key: impl Into<String>,
        columns: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            target_name: None,
            columns,
            identifier_case: IdentifierCase::default(),
        }
    }

    /// Table name in the target store.
    pub fn target_table(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.name)
    }

    /// Target identifier for a column.
    pub fn target_column(&self, column: &ColumnSpec) -> String {
        column
            .target_name
            .clone()
            .unwrap_or_else(|| self.identifier_case.apply(&column.name))
    }

    /// The primary key column.
    pub fn key_column(&self) -> Result<&ColumnSpec> {
        self.column(&self.primary_key).ok_or_else(|| {
            ReconcileError::Config(format!(
                "table {}: primary key {} is not a declared column",
                self.name, self.primary_key
            ))
        })
    }

    /// Look up a column by source name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns selected from the source (synthesized columns excluded).
    pub fn source_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.synthesized)
    }

    /// Key column spec as seen by the target store (same kind, mapped name).
    pub fn target_key_column(&self) -> Result<ColumnSpec> {
        let key = self.key_column()?;
        Ok(ColumnSpec::new(self.target_column(key), key.kind))
    }

    /// Check the spec for internal consistency.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        validate_identifier(self.target_table())?;

        if self.columns.is_empty() {
            return Err(ReconcileError::Config(format!(
                "table {}: at least one column is required",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        let mut seen_target = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name)?;
            let target = self.target_column(column);
            validate_identifier(&target)?;
            if !seen.insert(column.name.as_str()) {
                return Err(ReconcileError::Config(format!(
                    "table {}: duplicate column {}",
                    self.name, column.name
                )));
            }
            if !seen_target.insert(target.clone()) {
                return Err(ReconcileError::Config(format!(
                    "table {}: two columns map to target column {}",
                    self.name, target
                )));
            }
            if column.synthesized && column.kind != ColumnKind::Timestamp && column.default.is_none()
            {
                return Err(ReconcileError::Config(format!(
                    "table {}: synthesized column {} needs kind timestamp or a default",
                    self.name, column.name
                )));
            }
        }

        let key = self.key_column()?;
        if key.synthesized {
            return Err(ReconcileError::Config(format!(
                "table {}: primary key {} cannot be synthesized",
                self.name, key.name
            )));
        }
        if !matches!(key.kind, ColumnKind::Integer | ColumnKind::Text) {
            return Err(ReconcileError::Config(format!(
                "table {}: primary key {} must be of kind integer or text",
                self.name, key.name
            )));
        }

        Ok(())
    }
}
