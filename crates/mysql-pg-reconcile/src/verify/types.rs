//! Type definitions for post-replication verification.

use serde::{Deserialize, Serialize};

/// Comparison of one table between source and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Source table name.
    pub table: String,
    pub source_count: i64,
    pub target_count: i64,
    /// Counts are equal (and, in key mode, no key is missing or extra).
    pub matches: bool,
    /// Keys present only in the source (key mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_keys: Option<usize>,
    /// Keys present only in the target (key mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_keys: Option<usize>,
}

impl VerificationResult {
    /// Build a count-only result.
    pub fn from_counts(table: impl Into<String>, source_count: i64, target_count: i64) -> Self {
        Self {
            table: table.into(),
            source_count,
            target_count,
            matches: source_count == target_count,
            missing_keys: None,
            extra_keys: None,
        }
    }

    /// Rows the target is short of the source (negative when the target has more).
    pub fn deficit(&self) -> i64 {
        self.source_count - self.target_count
    }
}
