//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{ReconcileError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, stamped into run results.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Keep only the named tables, in configuration order.
    ///
    /// An empty selection keeps every table. Unknown names are an error.
    pub fn select_tables(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        if let Some(unknown) = names
            .iter()
            .find(|name| !self.tables.iter().any(|t| &t.name == *name))
        {
            return Err(ReconcileError::Config(format!(
                "table {} is not configured",
                unknown
            )));
        }

        self.tables.retain(|t| names.contains(&t.name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
source:
  type: mysql
  container: legacy-mysql
  database: legacy
  user: root
  password: secret
target:
  type: postgres
  transport: native
  host: db.internal
  database: app
  user: app
  password: hunter2
migration:
  batch_size: 50
  mode: upsert
tables:
  - name: ak_screenshots
    primary_key: id_screen
    columns:
      - { name: id_screen, kind: integer }
      - { name: url_screen, kind: nullable_text, prefix: "screenshots/" }
      - { name: type, kind: integer, default: "1" }
      - { name: upload_date, kind: timestamp, synthesized: true }
  - name: smf_topics
    primary_key: ID_TOPIC
    columns:
      - { name: ID_TOPIC, kind: integer }
      - { name: ID_BOARD, kind: integer, default: "0" }
"#;

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.r#type, StoreKind::Mysql);
        assert_eq!(config.source.transport, Transport::Process);
        assert_eq!(config.source.host, "localhost");
        assert_eq!(config.source.port(), 3306);
        assert_eq!(config.source.client_binary(), "mysql");
        assert_eq!(config.target.port(), 5432);
        assert_eq!(config.target.transport, Transport::Native);
        assert_eq!(config.migration.batch_size, 50);
        assert_eq!(config.migration.mode, ReplicationMode::Upsert);
        assert_eq!(config.migration.batch_delay_ms, 100);
        assert_eq!(config.migration.fetch_chunk_size, 500);
        assert_eq!(config.migration.verify_mode, VerifyMode::Count);
        assert_eq!(config.migration.diff_sample_size, 10);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(
            config.tables[1].target_column(&config.tables[1].columns[0]),
            "id_topic"
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, ReconcileError::Io(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.target.database, "app");
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.hash(), config.hash());
        assert_eq!(config.hash().len(), 64);

        let mut other = config.clone();
        other.migration.batch_size = 25;
        assert_ne!(config.hash(), other.hash());
    }

    #[test]
    fn test_select_tables() {
        let mut config = Config::from_yaml(YAML).unwrap();
        config.select_tables(&["smf_topics".to_string()]).unwrap();
        assert_eq!(config.tables.len(), 1);
        assert_eq!(config.tables[0].name, "smf_topics");

        let mut config = Config::from_yaml(YAML).unwrap();
        config.select_tables(&[]).unwrap();
        assert_eq!(config.tables.len(), 2);

        let err = config.select_tables(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));
    }

    #[test]
    fn test_unknown_store_type_is_yaml_error() {
        let yaml = YAML.replace("type: mysql", "type: oracle");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ReconcileError::Yaml(_)));
    }
}
