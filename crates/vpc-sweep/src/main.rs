//! vpc-sweep: dependency-ordered teardown of VPC resources
//!
//! This tool discovers virtual-network resources across accounts and
//! regions, refuses to touch protected defaults, and deletes the rest in
//! dependency order. Nothing is mutated unless `sweep --execute` is given.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vpc_sweep::aws::AwsClientFactory;
use vpc_sweep::config::{Selection, SweepConfig};
use vpc_sweep::executor::RetryPolicy;
use vpc_sweep::orchestrator::{CleanupRun, Orchestrator, RunMode, SweepOptions};
use vpc_sweep::report;
use vpc_sweep::resource::TaskState;
use vpc_sweep_common::defaults::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_SCOPE_WORKERS, DEFAULT_TASK_WORKERS,
};

#[derive(Parser, Debug)]
#[command(name = "vpc-sweep")]
#[command(about = "Dependency-ordered teardown of VPC resources across accounts and regions")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Account/region selection shared by all subcommands
#[derive(clap::Args, Debug)]
struct SelectionArgs {
    /// Path to the accounts file (JSON: accounts map + region list)
    #[arg(long, env = "VPC_SWEEP_CONFIG", default_value = "accounts.json")]
    config: PathBuf,

    /// Accounts to include: comma-separated names, or "all"
    #[arg(long, default_value = "all")]
    accounts: String,

    /// Regions to include: comma-separated names, or "all"
    #[arg(long, default_value = "all")]
    regions: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover and classify resources without deleting anything
    Scan {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Delete eligible resources in dependency order (dry-run by default)
    Sweep {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Actually delete resources (default is dry-run)
        #[arg(long)]
        execute: bool,

        /// Write the machine-readable report to this path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Maximum delete attempts per resource on transient errors
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,

        /// Scopes (account × region) processed concurrently
        #[arg(long, default_value_t = DEFAULT_SCOPE_WORKERS)]
        scope_workers: usize,

        /// Deletions in flight per scope within one batch
        #[arg(long, default_value_t = DEFAULT_TASK_WORKERS)]
        task_workers: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    // Interrupts stop the run at the next batch boundary; in-flight
    // provider calls are allowed to finish.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight calls then stopping");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Command::Scan { selection, format } => handle_scan(selection, format, cancel).await,
        Command::Sweep {
            selection,
            execute,
            output,
            max_attempts,
            scope_workers,
            task_workers,
        } => {
            handle_sweep(
                selection,
                execute,
                output,
                max_attempts,
                scope_workers,
                task_workers,
                cancel,
            )
            .await
        }
    }
}

fn resolve_scopes(selection: &SelectionArgs) -> Result<Vec<vpc_sweep::config::Scope>> {
    let config = SweepConfig::load(&selection.config)?;
    config.scopes(
        &Selection::parse(&selection.accounts),
        &Selection::parse(&selection.regions),
    )
}

/// Handle the scan command: a dry run plus a resource listing.
async fn handle_scan(
    selection: SelectionArgs,
    format: String,
    cancel: CancellationToken,
) -> Result<()> {
    let scopes = resolve_scopes(&selection)?;
    info!(scopes = scopes.len(), "Scanning");

    let orchestrator = Orchestrator::new(
        std::sync::Arc::new(AwsClientFactory),
        SweepOptions::new(RunMode::DryRun),
    );
    let run = orchestrator.run(scopes, cancel).await;
    let summary = report::build(&run);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_resource_table(&run);
        report::print_summary(&summary);
    }

    if run.has_discovery_errors() {
        bail!("Discovery failed for one or more scopes");
    }
    Ok(())
}

/// Handle the sweep command (dry-run unless --execute).
async fn handle_sweep(
    selection: SelectionArgs,
    execute: bool,
    output: Option<PathBuf>,
    max_attempts: u32,
    scope_workers: usize,
    task_workers: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let scopes = resolve_scopes(&selection)?;
    let mode = if execute {
        RunMode::Live
    } else {
        RunMode::DryRun
    };
    info!(scopes = scopes.len(), mode = %mode, "Sweeping");

    let options = SweepOptions {
        mode,
        retry: RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        },
        scope_workers,
        task_workers,
    };
    let orchestrator = Orchestrator::new(std::sync::Arc::new(AwsClientFactory), options);
    let run = orchestrator.run(scopes, cancel).await;

    let summary = report::build(&run);
    report::print_summary(&summary);
    if let Some(path) = &output {
        report::write_json(&summary, path)?;
    }
    if mode == RunMode::DryRun {
        println!("\nRun with --execute to actually delete resources.");
    }

    if run.failed_count() > 0 {
        bail!("Run completed with {} failed tasks", run.failed_count());
    }
    if run.has_discovery_errors() {
        bail!("Discovery failed for one or more scopes");
    }
    Ok(())
}

/// Print every discovered resource with its classification.
fn print_resource_table(run: &CleanupRun) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Scope"),
            Cell::new("Kind"),
            Cell::new("Id"),
            Cell::new("Status"),
        ]);

    let mut rows = 0;
    for outcome in &run.scopes {
        for record in &outcome.protected {
            table.add_row(vec![
                Cell::new(outcome.scope.to_string()),
                Cell::new(record.kind.as_str()),
                Cell::new(&record.id),
                Cell::new("protected"),
            ]);
            rows += 1;
        }
        for task in &outcome.tasks {
            if !task.step.action.is_delete() {
                continue;
            }
            let status = match &task.state {
                TaskState::Skipped { reason } if reason == "dry-run" => "eligible",
                TaskState::Skipped { .. } => "skipped",
                TaskState::Succeeded => "deleted",
                TaskState::Failed { .. } => "failed",
                TaskState::Pending | TaskState::InFlight => "pending",
            };
            table.add_row(vec![
                Cell::new(outcome.scope.to_string()),
                Cell::new(task.kind().as_str()),
                Cell::new(task.resource_id()),
                Cell::new(status),
            ]);
            rows += 1;
        }
    }

    if rows == 0 {
        println!("No network resources found in the selected scopes.");
    } else {
        println!("{table}");
        println!("\nTotal: {rows} resources");
    }
}
