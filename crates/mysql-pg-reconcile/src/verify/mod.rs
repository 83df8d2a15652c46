//! Post-replication verification.
//!
//! Verification is a pure read: it reports mismatches and never repairs them.
//!
//! - [`VerifyMode::Count`]: compare `COUNT(*)` of both tables
//! - [`VerifyMode::Keys`]: additionally diff the key sets, so that equal counts
//!   hiding different rows are still reported

mod types;

pub use types::VerificationResult;

use tracing::{info, warn};

use crate::config::VerifyMode;
use crate::core::schema::TableSpec;
use crate::core::traits::Store;
use crate::diff::{diff_keys, DiffOptions};
use crate::error::Result;

/// Compare `table` between source and target.
pub async fn verify(
    source: &dyn Store,
    target: &dyn Store,
    table: &TableSpec,
    mode: VerifyMode,
) -> Result<VerificationResult> {
    let source_count = source.row_count(&table.name).await?;
    let target_count = target.row_count(table.target_table()).await?;
    let mut result = VerificationResult::from_counts(&table.name, source_count, target_count);

    if mode == VerifyMode::Keys {
        let diff = diff_keys(source, target, table, &DiffOptions::default()).await?;
        result.matches = result.matches && diff.missing.is_empty() && diff.extra.is_empty();
        result.missing_keys = Some(diff.missing.len());
        result.extra_keys = Some(diff.extra.len());
    }

    if result.matches {
        info!("{}: {} rows (match)", table.name, source_count);
    } else {
        warn!(
            "{}: source={} target={} (MISMATCH, missing {} records)",
            table.name,
            source_count,
            target_count,
            result.deficit()
        );
    }

    Ok(result)
}
