use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aegis_core::Database;

mod commands;

use commands::{
    handle_alerts_command, handle_playbooks_command, handle_runs_command, handle_simulate_command,
    handle_stats_command, AlertsCommand, PlaybooksCommand, RunsCommand,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "aegis")]
#[command(version = VERSION)]
#[command(about = "Aegis - security alert orchestration and playbook automation")]
#[command(long_about = r#"
Aegis ingests security alerts, evaluates playbook trigger conditions against
them and drives the matching playbooks to completion: ordered steps, retries
with backoff, cooperative cancellation and per-alert escalation.

Use 'aegis init' to prepare the database, 'aegis playbooks load <dir>' to
sync a playbook library, then 'aegis alerts create ...' to ingest alerts.
'aegis simulate' runs a self-contained demo against in-memory stores.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Initialize the database and run migrations")]
    Init,

    #[command(about = "Ingest, inspect and update alerts")]
    Alerts {
        #[command(subcommand)]
        action: AlertsCommand,
    },

    #[command(about = "Manage playbooks and trigger manual executions")]
    Playbooks {
        #[command(subcommand)]
        action: PlaybooksCommand,
    },

    #[command(about = "Inspect and cancel execution runs")]
    Runs {
        #[command(subcommand)]
        action: RunsCommand,
    },

    #[command(about = "Show alert statistics")]
    Stats {
        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "Run a self-contained demo against in-memory stores")]
    Simulate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Alerts { action } => handle_alerts_command(action).await,
        Commands::Playbooks { action } => handle_playbooks_command(action).await,
        Commands::Runs { action } => handle_runs_command(action).await,
        Commands::Stats { format } => handle_stats_command(&format).await,
        Commands::Simulate => handle_simulate_command().await,
    }
}

async fn cmd_init() -> anyhow::Result<()> {
    println!("{}", "Initializing Aegis...".cyan().bold());

    println!("  {} Connecting to database...", "→".blue());
    let db = Database::connect_from_env().await?;

    println!("  {} Running migrations...", "→".blue());
    db.run_migrations().await?;

    println!("  {} Verifying connection...", "→".blue());
    db.health_check().await?;
    db.close().await;

    println!(
        "{} {}",
        "✓".green().bold(),
        "Database initialized successfully!".green()
    );
    Ok(())
}
