//! mysql-pg-reconcile CLI - find and replay rows a MySQL to PostgreSQL migration missed.

use clap::{Parser, Subcommand, ValueEnum};
use mysql_pg_reconcile::diff::diff_exit_code;
use mysql_pg_reconcile::error::EXIT_DEGRADED;
use mysql_pg_reconcile::report::{
    render_diff_markdown, render_inventory_markdown, render_markdown, write_report,
};
use mysql_pg_reconcile::{Config, Orchestrator, ReconcileError, ReplicationMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-pg-reconcile")]
#[command(about = "Find and replay rows missing from a PostgreSQL copy of a MySQL database")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Write a Markdown report to this path (run, diff and compare-tables)
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    InsertOnly,
    Upsert,
}

impl From<ModeArg> for ReplicationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::InsertOnly => ReplicationMode::InsertOnly,
            ModeArg::Upsert => ReplicationMode::Upsert,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Diff, replicate missing rows and verify every configured table
    Run {
        /// Dry run: compare keys without writing to the target
        #[arg(long)]
        dry_run: bool,

        /// Override the number of keys per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override the replication mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Only process the named table (repeatable)
        #[arg(long = "table", value_name = "NAME")]
        tables: Vec<String>,

        /// In upsert mode, replay every source row instead of only missing ones
        #[arg(long)]
        refresh: bool,
    },

    /// Report keys missing from (or extra in) the target
    Diff {
        /// Missing rows to fetch in full per table (0 to skip)
        #[arg(long, value_name = "ROWS")]
        sample: Option<usize>,
    },

    /// Compare row counts between source and target
    Verify,

    /// List tables present in only one of the databases
    CompareTables,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, ReconcileError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format).map_err(ReconcileError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            dry_run,
            batch_size,
            mode,
            tables,
            refresh,
        } => {
            // Apply overrides
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if let Some(mode) = mode {
                config.migration.mode = mode.into();
            }
            if refresh {
                config.migration.refresh = true;
            }
            if !tables.is_empty() {
                config.select_tables(&tables)?;
            }
            config.validate()?;
            if config.migration.refresh && config.migration.mode != ReplicationMode::Upsert {
                warn!("--refresh only applies to upsert mode, replaying missing rows only");
            }

            let cancel_token = setup_signal_handler();
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.run(cancel_token, dry_run).await?;

            if let Some(ref path) = cli.report {
                write_report(path, &render_markdown(&result))?;
            }

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let totals = &result.totals;
                let status_msg = if dry_run {
                    "Dry run completed!"
                } else {
                    "Reconciliation completed!"
                };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Status: {:?}", result.status);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  Tables: {} in sync, {} reconciled, {} degraded, {} failed (of {})",
                    totals.tables_in_sync,
                    totals.tables_reconciled,
                    totals.tables_degraded,
                    totals.tables_failed,
                    totals.tables_total
                );
                println!(
                    "  Keys: {} missing, {} only in target",
                    totals.missing_keys, totals.extra_keys
                );
                println!(
                    "  Rows: {} attempted, {} succeeded, {} failed",
                    totals.rows_attempted, totals.rows_succeeded, totals.rows_failed
                );
                for table in &result.tables {
                    if let Some(ref v) = table.verification {
                        let verdict = if v.matches { "match" } else { "MISMATCH" };
                        println!(
                            "  {}: source={} target={} ({})",
                            table.table, v.source_count, v.target_count, verdict
                        );
                    }
                }
                let failed = result.failed_tables();
                if !failed.is_empty() {
                    println!("  Failed tables: {:?}", failed);
                }
            }

            Ok(result.exit_code())
        }

        Commands::Diff { sample } => {
            if let Some(rows) = sample {
                config.migration.diff_sample_size = rows;
            }
            let orchestrator = Orchestrator::new(config)?;
            let diffs = orchestrator.diff().await?;

            if let Some(ref path) = cli.report {
                write_report(path, &render_diff_markdown(&diffs))?;
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&diffs)?);
            } else {
                println!("Key Differences:");
                for diff in &diffs {
                    let status = if diff.in_sync() { "✓" } else { "✗" };
                    println!(
                        "  {} {} (source: {}, target: {}, missing: {}, extra: {})",
                        status,
                        diff.table,
                        diff.source_total,
                        diff.target_total,
                        diff.missing.len(),
                        diff.extra.len()
                    );
                }
            }

            Ok(diff_exit_code(&diffs))
        }

        Commands::Verify => {
            let orchestrator = Orchestrator::new(config)?;
            let results = orchestrator.verify().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("Verification Results:");
                for v in &results {
                    if v.matches {
                        println!("  ✓ {}: {} rows (match)", v.table, v.source_count);
                    } else {
                        println!(
                            "  ✗ {}: source={} target={} (MISMATCH, missing {} records)",
                            v.table,
                            v.source_count,
                            v.target_count,
                            v.deficit()
                        );
                    }
                }
            }

            if results.iter().all(|v| v.matches) {
                Ok(0)
            } else {
                Ok(EXIT_DEGRADED)
            }
        }

        Commands::CompareTables => {
            let orchestrator = Orchestrator::new(config)?;
            let inventory = orchestrator.compare_tables().await?;

            if let Some(ref path) = cli.report {
                write_report(path, &render_inventory_markdown(&inventory))?;
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&inventory)?);
            } else {
                println!("Table Comparison:");
                println!("  Common tables: {}", inventory.common.len());
                println!("  Missing in target: {}", inventory.source_only.len());
                for table in &inventory.source_only {
                    println!("    - {}", table);
                }
                println!("  Only in target: {}", inventory.target_only.len());
                for table in &inventory.target_only {
                    println!("    - {}", table);
                }
            }

            Ok(0)
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let (store, err) = if result.source_connected {
                    ("target", result.target_error)
                } else {
                    ("source", result.source_error)
                };
                return Err(ReconcileError::unavailable(
                    store,
                    err.unwrap_or_else(|| "health check failed".to_string()),
                ));
            }

            Ok(0)
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
/// The current batch finishes before the run stops.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    watch_signal(SignalKind::interrupt(), "SIGINT", cancel_token.clone());
    watch_signal(SignalKind::terminate(), "SIGTERM", cancel_token.clone());
    cancel_token
}

#[cfg(unix)]
fn watch_signal(kind: SignalKind, name: &'static str, token: CancellationToken) {
    tokio::spawn(async move {
        match signal(kind) {
            Ok(mut stream) => {
                stream.recv().await;
                eprintln!("\nReceived {}. Finishing the current batch...", name);
                token.cancel();
            }
            Err(e) => warn!("Failed to setup {} handler: {}", name, e),
        }
    });
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Finishing the current batch...");
                token.cancel();
            }
            Err(e) => warn!("Failed to setup Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}
