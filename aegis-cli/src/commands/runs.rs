use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use super::connect_services;

#[derive(Subcommand)]
pub enum RunsCommand {
    #[command(about = "Show one execution run with its step results")]
    Show {
        #[arg(help = "Run id")]
        id: Uuid,
    },

    #[command(about = "List all runs recorded for an alert, oldest first")]
    ForAlert {
        #[arg(help = "Alert id")]
        alert_id: Uuid,
    },

    #[command(about = "Request cancellation of an in-flight run")]
    Cancel {
        #[arg(help = "Run id")]
        id: Uuid,
    },
}

pub async fn handle_runs_command(cmd: RunsCommand) -> anyhow::Result<()> {
    let services = connect_services().await?;

    match cmd {
        RunsCommand::Show { id } => {
            let run = services.playbooks.get_run(id).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }

        RunsCommand::ForAlert { alert_id } => {
            let runs = services.playbooks.list_runs_for_alert(alert_id).await?;
            if runs.is_empty() {
                println!("{}", "No runs for this alert".dimmed());
                return Ok(());
            }
            for run in runs {
                println!(
                    "{} {} playbook={} state={} steps={}",
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                    run.id,
                    run.playbook_id,
                    run.state,
                    run.step_results.len()
                );
            }
        }

        RunsCommand::Cancel { id } => {
            let run = services.playbooks.cancel_run(id).await?;
            if run.state.is_terminal() {
                println!(
                    "{} Run {} already finished: {}",
                    "!".yellow().bold(),
                    id,
                    run.state
                );
            } else {
                println!(
                    "{} Cancellation requested for run {}; it stops at the next step boundary",
                    "✓".green().bold(),
                    id
                );
            }
        }
    }

    Ok(())
}
