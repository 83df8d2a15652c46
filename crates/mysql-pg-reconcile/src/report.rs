//! Markdown summaries of runs, diffs and table inventories.

use std::path::Path;

use tracing::info;

use crate::diff::{KeyDiff, KeyRange, SampleRow};
use crate::error::Result;
use crate::orchestrator::{RunResult, TableInventory, TableStatus};

/// Keys listed per table before the list is truncated.
const MAX_LISTED_KEYS: usize = 50;

/// Characters shown per sampled cell.
const MAX_CELL_CHARS: usize = 60;

/// Table name prefixes grouped together in inventory reports.
const TABLE_GROUPS: &[(&str, &str)] = &[
    ("ak_", "AK System Tables"),
    ("smf_", "SMF Forum Tables"),
    ("collection_", "Collection Tables"),
    ("wp_", "WordPress Tables"),
];

/// Render the summary of a reconciliation run.
pub fn render_markdown(result: &RunResult) -> String {
    let totals = &result.totals;
    let mut out = String::from("# Reconciliation Report\n\n");

    out.push_str(&format!("- **Run ID**: {}\n", result.run_id));
    out.push_str(&format!("- **Config hash**: `{}`\n", result.config_hash));
    out.push_str(&format!("- **Status**: {:?}\n", result.status));
    out.push_str(&format!(
        "- **Started**: {}\n",
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("- **Duration**: {:.2}s\n\n", result.duration_seconds));

    out.push_str("## Summary\n\n");
    out.push_str(&format!(
        "- Tables: {} ({} in sync, {} reconciled, {} degraded, {} failed)\n",
        totals.tables_total,
        totals.tables_in_sync,
        totals.tables_reconciled,
        totals.tables_degraded,
        totals.tables_failed
    ));
    out.push_str(&format!(
        "- Missing keys: {}, extra keys: {}\n",
        totals.missing_keys, totals.extra_keys
    ));
    out.push_str(&format!(
        "- Rows: {} attempted, {} succeeded, {} failed ({} inserted, {} updated)\n\n",
        totals.rows_attempted,
        totals.rows_succeeded,
        totals.rows_failed,
        totals.rows_inserted,
        totals.rows_updated
    ));

    out.push_str("## Tables\n\n");
    out.push_str("| Table | Status | Missing | Extra | Attempted | Succeeded | Failed | Source | Target |\n");
    out.push_str("|-------|--------|---------|-------|-----------|-----------|--------|--------|--------|\n");
    for table in &result.tables {
        let (missing, extra) = table
            .diff
            .as_ref()
            .map(|d| (d.missing.len().to_string(), d.extra.len().to_string()))
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
        let (attempted, succeeded, failed) = table
            .replication
            .as_ref()
            .map(|r| {
                (
                    r.total_attempted.to_string(),
                    r.total_succeeded.to_string(),
                    r.failed().to_string(),
                )
            })
            .unwrap_or_else(|| ("-".to_string(), "-".to_string(), "-".to_string()));
        let (source, target) = table
            .verification
            .as_ref()
            .map(|v| (v.source_count.to_string(), v.target_count.to_string()))
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
        out.push_str(&format!(
            "| {} | {:?} | {} | {} | {} | {} | {} | {} | {} |\n",
            table.table, table.status, missing, extra, attempted, succeeded, failed, source, target
        ));
    }

    let problems: Vec<_> = result
        .tables
        .iter()
        .filter(|t| matches!(t.status, TableStatus::Degraded | TableStatus::Failed))
        .collect();
    if !problems.is_empty() {
        out.push_str("\n## Problems\n");
        for table in problems {
            out.push_str(&format!("\n### {}\n\n", table.table));
            if let Some(ref failure) = table.failure {
                out.push_str(&format!("- Error (exit {}): {}\n", failure.exit_code, failure.message));
            }
            if let Some(ref diff) = table.diff {
                if !diff.is_confirmed() {
                    out.push_str("- Key set not confirmed, replication skipped\n");
                }
            }
            if let Some(ref verification) = table.verification {
                if !verification.matches {
                    out.push_str(&format!(
                        "- MISMATCH: source={} target={} (missing {} records)\n",
                        verification.source_count,
                        verification.target_count,
                        verification.deficit()
                    ));
                }
            }
            if let Some(ref report) = table.replication {
                for failure in report.failures() {
                    out.push_str(&format!("- Row {}: {}\n", failure.key, failure.reason));
                }
            }
        }
    }

    out
}

/// Render the missing and extra keys of each table.
pub fn render_diff_markdown(diffs: &[KeyDiff]) -> String {
    let mut out = String::from("# Missing Rows Report\n\n");
    out.push_str(
        "Rows present in the source but missing from the target, and rows present only in the target.\n",
    );

    for diff in diffs {
        out.push_str(&format!("\n## {}\n\n", diff.table));
        out.push_str(&format!("- Source keys: {}\n", diff.source_total));
        out.push_str(&format!("- Target keys: {}\n", diff.target_total));
        out.push_str(&format!("- Source key range: {}\n", range(&diff.source_range)));
        out.push_str(&format!("- Target key range: {}\n", range(&diff.target_range)));
        out.push_str(&format!("- Missing in target: {}\n", diff.missing.len()));
        out.push_str(&format!("- Only in target: {}\n", diff.extra.len()));
        if !diff.is_confirmed() {
            out.push_str("- **Warning**: a key listing could not be parsed and was treated as empty\n");
        }
        if !diff.missing.is_empty() {
            out.push_str(&format!("\n### Missing keys\n\n{}\n", key_list(&diff.missing)));
        }
        if !diff.extra.is_empty() {
            out.push_str(&format!("\n### Extra keys\n\n{}\n", key_list(&diff.extra)));
        }
        if !diff.sample.is_empty() {
            out.push_str(&format!(
                "\n### Sample of missing rows ({} of {})\n\n{}",
                diff.sample.len(),
                diff.missing.len(),
                sample_table(&diff.sample)
            ));
        }
    }

    out
}

fn range(range: &Option<KeyRange>) -> String {
    match range {
        Some(r) => format!("{} .. {}", r.min, r.max),
        None => "empty".to_string(),
    }
}

fn sample_table(rows: &[SampleRow]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns: Vec<&String> = first.keys().collect();
    let mut out = format!(
        "| {} |\n|{}|\n",
        columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" | "),
        columns.iter().map(|_| "---").collect::<Vec<_>>().join("|")
    );
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| match row.get(*c).and_then(|v| v.as_deref()) {
                Some(cell) => markdown_cell(cell),
                None => "NULL".to_string(),
            })
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

fn markdown_cell(cell: &str) -> String {
    let mut text: String = cell
        .chars()
        .take(MAX_CELL_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if cell.chars().count() > MAX_CELL_CHARS {
        text.push_str("...");
    }
    text.replace('|', "\\|")
}

fn key_list<T: std::fmt::Display>(keys: &[T]) -> String {
    let mut listed = keys
        .iter()
        .take(MAX_LISTED_KEYS)
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if keys.len() > MAX_LISTED_KEYS {
        listed.push_str(&format!(" ... and {} more", keys.len() - MAX_LISTED_KEYS));
    }
    listed
}

/// Render which tables exist on each side, grouped by name prefix.
pub fn render_inventory_markdown(inventory: &TableInventory) -> String {
    let mut out = String::from("# Table Comparison\n\n");
    out.push_str(&format!(
        "- Source tables: {}\n",
        inventory.source_only.len() + inventory.common.len()
    ));
    out.push_str(&format!(
        "- Target tables: {}\n",
        inventory.target_only.len() + inventory.common.len()
    ));
    out.push_str(&format!("- Common tables: {}\n", inventory.common.len()));

    if !inventory.source_only.is_empty() {
        out.push_str(&format!(
            "\n## Missing in target ({} tables)\n",
            inventory.source_only.len()
        ));
        out.push_str(&grouped(&inventory.source_only));
    }
    if !inventory.target_only.is_empty() {
        out.push_str(&format!(
            "\n## Only in target ({} tables)\n",
            inventory.target_only.len()
        ));
        out.push_str(&grouped(&inventory.target_only));
    }

    out
}

fn grouped(tables: &[String]) -> String {
    let mut out = String::new();
    let mut push_group = |title: &str, members: Vec<&String>| {
        if members.is_empty() {
            return;
        }
        out.push_str(&format!("\n### {} ({})\n\n", title, members.len()));
        for table in members {
            out.push_str(&format!("- {}\n", table));
        }
    };

    for (prefix, title) in TABLE_GROUPS {
        push_group(
            title,
            tables.iter().filter(|t| t.starts_with(prefix)).collect(),
        );
    }
    push_group(
        "Other Tables",
        tables
            .iter()
            .filter(|t| !TABLE_GROUPS.iter().any(|(p, _)| t.starts_with(p)))
            .collect(),
    );
    out
}

/// Write a report to disk.
pub fn write_report<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    std::fs::write(path.as_ref(), content)?;
    info!("Report saved to {:?}", path.as_ref());
    Ok(())
}
