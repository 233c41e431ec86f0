//! ledgerline Migration CLI Tool
//!
//! Command-line interface for applying and reverting the ledger schema chain.
//! Exit codes: 0 success, 1 usage, 2 configuration, 3 precondition,
//! 4 data integrity, 5 store.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use ledgerline::ledger::migrations;
use ledgerline::migration::{
    MigrationPlan, MigrationReport, Migrator, Reversibility, SchemaManager, SchemaSnapshot,
    TransactionMode, BASE,
};
use ledgerline::{connect_executor, LedgerConfig, PostgresExecutor};
use ledgerline_migrate::{exit, scaffold};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "ledgerline-migrate")]
#[command(about = "Migration management tool for the ledgerline schema")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL (overrides DATABASE_URL and config)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration status (applied vs pending)
    Status,

    /// Print the most recently applied migration
    Head,

    /// Apply pending migrations
    Up {
        /// Stop once this migration is applied (default: latest)
        #[arg(long)]
        to: Option<String>,

        /// Dry run - show what would be executed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert migrations until the target is the head
    Down {
        /// Migration to keep as the new head, or `base` to revert everything
        #[arg(long)]
        to: String,

        /// Dry run - show what would be reverted
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a JSON snapshot of the current schema
    Snapshot {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Generate a new migration file linked to the current chain tail
    Generate {
        /// Migration name (e.g., "add_budget_table")
        name: String,

        /// Directory holding the step files
        #[arg(long, default_value = "src/ledger/migrations")]
        dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    if dotenv::dotenv().is_ok() {
        log::debug!("loaded .env");
    }

    let quiet = cli.quiet;
    match run(cli) {
        Ok(()) => {
            if !quiet {
                println!("{}", "✅ Success".green());
            }
            process::exit(exit::SUCCESS);
        }
        Err(e) => {
            eprintln!("{} {e:#}", "❌ Error:".red().bold());
            process::exit(exit::for_error(&e));
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let chain = migrations::chain().context("the ledger migration chain is invalid")?;

    if let Commands::Generate { name, dir } = &cli.command {
        let tail = chain.latest().map(|m| m.id().to_string());
        return handle_generate(dir, name, tail.as_deref());
    }

    let mut config = LedgerConfig::load().context("failed to load configuration")?;
    if let Some(url) = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        config.database.url = url;
    }

    let executor = connect_executor(&config.database.url).with_context(|| {
        format!(
            "failed to connect to {}",
            ledgerline::connection::redact_connection_string(&config.database.url)
        )
    })?;
    let migrator = Migrator::from_config(chain, &config);

    match cli.command {
        Commands::Status => handle_status(&migrator, &executor),
        Commands::Head => handle_head(&migrator, &executor),
        Commands::Up { to, dry_run } => handle_up(&migrator, &executor, to.as_deref(), dry_run),
        Commands::Down { to, dry_run } => handle_down(&migrator, &executor, &to, dry_run),
        Commands::Snapshot { output } => handle_snapshot(&migrator, &executor, output),
        Commands::Generate { .. } => Ok(()),
    }
}

fn handle_status(migrator: &Migrator, executor: &PostgresExecutor) -> anyhow::Result<()> {
    let status = migrator.status(executor)?;

    println!("\n📊 Migration Status\n");

    if status.applied.is_empty() {
        println!("✅ Applied Migrations: None");
    } else {
        println!("✅ Applied Migrations ({}):", status.applied_count);
        for record in &status.applied {
            let time_str = record
                .execution_time_ms
                .map_or_else(|| "N/A".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  {} {} ({}, {})",
                "✓".green(),
                record.id,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time_str
            );
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("⏳ Pending Migrations: None");
    } else {
        println!("⏳ Pending Migrations ({}):", status.pending_count);
        for pending in &status.pending {
            println!("  {} {} {}", "⏳".yellow(), pending.id, pending.description.dimmed());
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied_count, status.pending_count
    );
    Ok(())
}

fn handle_head(migrator: &Migrator, executor: &PostgresExecutor) -> anyhow::Result<()> {
    match migrator.head(executor)? {
        Some(head) => println!("{head}"),
        None => println!("{BASE}"),
    }
    Ok(())
}

fn handle_up(
    migrator: &Migrator,
    executor: &PostgresExecutor,
    to: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        let plan = migrator.plan_apply(executor, to)?;
        print_plan("apply", &plan);
        return Ok(());
    }

    println!("Applying migrations...");
    let report = match to {
        Some(target) => migrator.apply_to(executor, target)?,
        None => migrator.apply_latest(executor)?,
    };
    print_report("applied", &report);
    Ok(())
}

fn handle_down(
    migrator: &Migrator,
    executor: &PostgresExecutor,
    to: &str,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        let plan = migrator.plan_revert(executor, to)?;
        print_plan("revert", &plan);
        return Ok(());
    }

    println!("Reverting migrations...");
    let report = migrator.revert_to(executor, to)?;
    print_report("reverted", &report);
    Ok(())
}

fn handle_snapshot(
    migrator: &Migrator,
    executor: &PostgresExecutor,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let manager = SchemaManager::new(executor);
    let snapshot = SchemaSnapshot::capture(&manager, migrator.state_table().name())?;
    let json = serde_json::to_string_pretty(&snapshot)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Snapshot written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn handle_generate(dir: &Path, name: &str, tail: Option<&str>) -> anyhow::Result<()> {
    let generated = scaffold::generate(dir, name, tail, chrono::Utc::now())?;
    println!("✅ Generated migration: {}", generated.path.display());
    if generated.registered {
        println!("   Registered {} in {}", generated.id, dir.join("mod.rs").display());
    } else {
        println!(
            "   Add `pub mod {0};` and `Box::new({0}::migration())` to the migrations list",
            generated.id
        );
    }
    Ok(())
}

fn print_plan(verb: &str, plan: &MigrationPlan) {
    if plan.is_empty() {
        println!("Nothing to {verb}");
        return;
    }
    println!(
        "Would {verb} {} migration(s) ({} -> {}):",
        plan.steps.len(),
        plan.head_before.as_deref().unwrap_or(BASE),
        plan.head_after.as_deref().unwrap_or(BASE)
    );
    for (i, step) in plan.steps.iter().enumerate() {
        let mut notes = Vec::new();
        if step.mode == TransactionMode::NonTransactional {
            notes.push("non-transactional".to_string());
        }
        match step.reversibility {
            Reversibility::Exact => {}
            Reversibility::BestEffort(caveat) => notes.push(format!("best-effort: {caveat}")),
            Reversibility::Irreversible(reason) => notes.push(format!("irreversible: {reason}")),
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" [{}]", notes.join("; ")).yellow().to_string()
        };
        println!("  {}. {}{notes}", i + 1, step.id);
    }
}

fn print_report(verb: &str, report: &MigrationReport) {
    if report.count() == 0 {
        println!("✅ Nothing {verb}; head is {}", report.head_after.as_deref().unwrap_or(BASE));
        return;
    }
    for step in &report.steps {
        let suffix = if step.reconciled {
            " (already present, recorded)".dimmed().to_string()
        } else {
            format!(" ({}ms)", step.execution_time_ms)
        };
        println!("  {} {}{suffix}", "✓".green(), step.id);
    }
    println!(
        "✅ Successfully {verb} {} migration(s); head is now {}",
        report.count(),
        report.head_after.as_deref().unwrap_or(BASE)
    );
}
