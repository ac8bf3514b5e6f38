use std::path::PathBuf;

use clap::Subcommand;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use uuid::Uuid;

use aegis_core::services::{load_playbook_file, sync_playbook_dir};
use aegis_core::Playbook;

use super::connect_services;

#[derive(Subcommand)]
pub enum PlaybooksCommand {
    #[command(about = "List all playbooks with execution metrics")]
    List {
        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "Show one playbook definition")]
    Show {
        #[arg(help = "Playbook id")]
        id: Uuid,
    },

    #[command(about = "Sync YAML playbook files from a directory")]
    Load {
        #[arg(help = "Directory containing .yml/.yaml playbook files")]
        dir: PathBuf,
    },

    #[command(about = "Validate a single playbook file without saving it")]
    Check {
        #[arg(help = "Playbook file")]
        file: PathBuf,
    },

    #[command(about = "Enable a playbook for trigger evaluation")]
    Enable {
        #[arg(help = "Playbook id")]
        id: Uuid,
    },

    #[command(about = "Disable a playbook")]
    Disable {
        #[arg(help = "Playbook id")]
        id: Uuid,
    },

    #[command(about = "Run a playbook against an alert, bypassing its trigger")]
    Execute {
        #[arg(help = "Playbook id")]
        playbook_id: Uuid,

        #[arg(help = "Alert id")]
        alert_id: Uuid,
    },
}

pub async fn handle_playbooks_command(cmd: PlaybooksCommand) -> anyhow::Result<()> {
    match cmd {
        PlaybooksCommand::Check { file } => {
            // parse-only path, no database needed
            let definition = load_playbook_file(&file)?;
            println!(
                "{} '{}' parsed: {} steps, trigger depth {}",
                "✓".green().bold(),
                definition.name,
                definition.steps.len(),
                definition.trigger.depth()
            );
            return Ok(());
        }
        _ => {}
    }

    let services = connect_services().await?;

    match cmd {
        PlaybooksCommand::List { format } => {
            let playbooks = services.playbooks.list().await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&playbooks)?);
            } else {
                print_playbook_table(&playbooks);
            }
        }

        PlaybooksCommand::Show { id } => {
            let playbook = services.playbooks.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&playbook)?);
        }

        PlaybooksCommand::Load { dir } => {
            let synced = sync_playbook_dir(&services.playbooks, &dir).await?;
            println!(
                "{} Synced {} playbook(s) from {}",
                "✓".green().bold(),
                synced.len(),
                dir.display()
            );
            for playbook in synced {
                println!("  {} {}", playbook.id, playbook.name);
            }
        }

        PlaybooksCommand::Enable { id } => {
            services.playbooks.set_enabled(id, true).await?;
            println!("{} Playbook {} enabled", "✓".green().bold(), id);
        }

        PlaybooksCommand::Disable { id } => {
            services.playbooks.set_enabled(id, false).await?;
            println!("{} Playbook {} disabled", "✓".green().bold(), id);
        }

        PlaybooksCommand::Execute {
            playbook_id,
            alert_id,
        } => {
            let run = services.playbooks.execute(playbook_id, alert_id).await?;
            println!(
                "{} Run {} finished: {}",
                "✓".green().bold(),
                run.id,
                run.state
            );
            for result in &run.step_results {
                println!(
                    "  step {} -> {:?} ({} attempt(s), {} ms)",
                    result.index, result.outcome, result.attempts, result.duration_ms
                );
            }
        }

        PlaybooksCommand::Check { .. } => unreachable!("handled before connecting"),
    }

    Ok(())
}

fn print_playbook_table(playbooks: &[Playbook]) {
    if playbooks.is_empty() {
        println!("{}", "No playbooks found".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "ID", "Name", "Enabled", "Steps", "Runs", "Success %", "Avg ms",
        ]);

    for playbook in playbooks {
        let enabled = if playbook.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(playbook.id),
            Cell::new(&playbook.name),
            enabled,
            Cell::new(playbook.steps.len()),
            Cell::new(playbook.execution_count),
            Cell::new(format!("{:.0}", playbook.success_rate())),
            Cell::new(
                playbook
                    .avg_duration_ms
                    .map(|ms| format!("{ms:.0}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("{table}");
}
