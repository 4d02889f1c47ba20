//! Cross-Chain Rebalancer - Main Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use cross_chain_rebalancer::config::Config;
use cross_chain_rebalancer::market::InputClient;
use cross_chain_rebalancer::persistence::TaskStore;
use cross_chain_rebalancer::service::{RebalanceService, RunOutcome};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Cross-Chain Rebalancer CLI
#[derive(Parser)]
#[command(name = "cross-chain-rebalancer")]
#[command(version, about = "Plans cross-chain capital rebalancing and strategy investment")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rebalance loop at a fixed interval (default)
    Run,

    /// Compute one plan and print it as JSON
    Once {
        /// Store the plan as a task
        #[arg(long)]
        persist: bool,
    },

    /// Show recently planned tasks
    Status {
        /// Path to SQLite database (default: from configuration)
        #[arg(short, long)]
        db: Option<String>,

        /// Number of tasks to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print each task's plan
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;

    match cli.command {
        Some(Commands::Once { persist }) => run_once(config, persist).await,
        Some(Commands::Status { db, limit, verbose }) => {
            let db = db.unwrap_or_else(|| config.persistence.db_path.clone());
            show_status(&db, limit, verbose)
        }
        Some(Commands::Run) | None => run_loop(config).await,
    }
}

/// Fixed-interval loop; a failed run is logged and retried on the next tick.
async fn run_loop(config: Config) -> Result<()> {
    config.validate()?;
    log_config(&config);

    let source = InputClient::new(&config)?;
    let store = open_store(&config.persistence.db_path)?;
    let interval_secs = config.schedule.interval_secs;
    let service = RebalanceService::new(config, source, Some(store));

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs, "Starting rebalance loop");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match service.run_once().await {
                    Ok(RunOutcome::Planned { task_id, plan }) => info!(
                        task_id = ?task_id,
                        transfers = plan.cross_balances.len(),
                        investments = plan.investment_count(),
                        "Rebalance planned"
                    ),
                    Ok(RunOutcome::NothingToDo) => info!("Nothing to rebalance"),
                    Ok(RunOutcome::Skipped { open_task }) => {
                        info!(open_task, "Waiting for open task")
                    }
                    Err(e) => error!("Rebalance run failed: {:#}", e),
                }
            }
        }
    }

    info!("Cross-chain rebalancer shutdown complete");
    Ok(())
}

/// Compute one plan and print it.
async fn run_once(config: Config, persist: bool) -> Result<()> {
    config.validate()?;

    let source = InputClient::new(&config)?;
    let store = if persist {
        Some(open_store(&config.persistence.db_path)?)
    } else {
        None
    };
    let service = RebalanceService::new(config, source, store);

    match service.run_once().await? {
        RunOutcome::Planned { task_id, plan } => {
            if let Some(id) = task_id {
                info!(task_id = id, "Plan persisted");
            }
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        RunOutcome::NothingToDo => println!("Nothing to rebalance."),
        RunOutcome::Skipped { open_task } => {
            println!("Task {} is still open; no plan computed.", open_task)
        }
    }

    Ok(())
}

fn open_store(db_path: &str) -> Result<TaskStore> {
    if let Some(dir) = Path::new(db_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    TaskStore::new(db_path)
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "rebalancer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the guard alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cross_chain_rebalancer=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("Configuration:");
    info!(
        "   Active chains: {} (reserve: {})",
        config.chains.active.join(", "),
        config.chains.reserve
    );
    info!(
        "   Capacity APR floor: {}",
        config.allocation.capacity_apr_floor
    );
    info!("   APR tolerance: {}", config.allocation.apr_tolerance);
    info!("   Currencies: {}", config.currencies.len());
    info!("   Projects: {}", config.projects.len());
    info!("   Task database: {}", config.persistence.db_path);
}

/// Show recently planned tasks.
fn show_status(db_path: &str, limit: usize, verbose: bool) -> Result<()> {
    if !Path::new(db_path).exists() {
        println!("Database not found: {}", db_path);
        println!("   No plan has been persisted yet, or the database path is incorrect.");
        return Ok(());
    }

    let store = TaskStore::new(db_path)?;
    let tasks = store.recent_tasks(limit)?;

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    println!("Recent part rebalance tasks");
    for task in &tasks {
        println!(
            "   #{:<6} {:<12} transfers: {:<3} investments: {:<3} created: {}",
            task.id,
            task.state.to_string(),
            task.params.cross_balances.len(),
            task.params.investment_count(),
            task.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        if !task.message.is_empty() {
            println!("          {}", task.message);
        }
        if verbose {
            println!("{}", serde_json::to_string_pretty(&task.params)?);
        }
    }

    Ok(())
}
