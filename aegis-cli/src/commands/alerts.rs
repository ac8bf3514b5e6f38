use clap::Subcommand;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use uuid::Uuid;

use aegis_core::{
    Alert, AlertFilter, AlertStatus, AlertUpdate, NewAlert, Severity,
};

use super::connect_services;

#[derive(Subcommand)]
pub enum AlertsCommand {
    #[command(about = "List alerts, optionally filtered")]
    List {
        #[arg(short, long, help = "Filter by severity (low, medium, high, critical)")]
        severity: Option<String>,

        #[arg(long, help = "Filter by status (open, investigating, resolved)")]
        status: Option<String>,

        #[arg(long, help = "Filter by source system")]
        source: Option<String>,

        #[arg(short, long, help = "Maximum number of alerts to return")]
        limit: Option<i64>,

        #[arg(long, help = "Number of alerts to skip (paging, newest first)")]
        offset: Option<i64>,

        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "Show one alert with its run timeline")]
    Show {
        #[arg(help = "Alert id")]
        id: Uuid,
    },

    #[command(about = "Ingest a new alert (matching playbooks run immediately)")]
    Create {
        #[arg(help = "Alert title")]
        title: String,

        #[arg(short, long, default_value = "low", help = "Severity")]
        severity: String,

        #[arg(long, help = "Source system (SIEM, EDR, ...)")]
        source: String,

        #[arg(short, long, help = "Free-form description")]
        description: Option<String>,

        #[arg(short, long, help = "Tag to attach (repeatable)")]
        tag: Vec<String>,

        #[arg(long, value_parser = parse_attribute, help = "Attribute as key=value (repeatable)")]
        attribute: Vec<(String, String)>,
    },

    #[command(about = "Update alert fields (manual path: may downgrade or reopen)")]
    Update {
        #[arg(help = "Alert id")]
        id: Uuid,

        #[arg(long, help = "New title")]
        title: Option<String>,

        #[arg(short, long, help = "New severity")]
        severity: Option<String>,

        #[arg(long, help = "New status")]
        status: Option<String>,

        #[arg(short, long, help = "Tag to add (repeatable)")]
        tag: Vec<String>,
    },

    #[command(about = "Raise alert severity one level")]
    Escalate {
        #[arg(help = "Alert id")]
        id: Uuid,
    },

    #[command(about = "Apply one update to many alerts, best effort")]
    BulkUpdate {
        #[arg(help = "Alert ids", required = true)]
        ids: Vec<Uuid>,

        #[arg(long, help = "New status")]
        status: Option<String>,

        #[arg(short, long, help = "Tag to add (repeatable)")]
        tag: Vec<String>,
    },

    #[command(about = "Search alerts by title, description or tag")]
    Search {
        #[arg(help = "Search text")]
        query: String,
    },

    #[command(about = "Delete an alert")]
    Delete {
        #[arg(help = "Alert id")]
        id: Uuid,
    },
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("'{raw}' is not in key=value form"))
}

pub async fn handle_alerts_command(cmd: AlertsCommand) -> anyhow::Result<()> {
    let services = connect_services().await?;

    match cmd {
        AlertsCommand::List {
            severity,
            status,
            source,
            limit,
            offset,
            format,
        } => {
            let filter = AlertFilter {
                severity: severity.as_deref().map(Severity::parse).transpose()?,
                status: status.as_deref().map(AlertStatus::parse).transpose()?,
                source,
                limit,
                offset,
            };
            let alerts = services.alerts.list(&filter).await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else {
                print_alert_table(&alerts);
            }
        }

        AlertsCommand::Show { id } => {
            let alert = services.alerts.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&alert)?);

            let runs = services.playbooks.list_runs_for_alert(id).await?;
            if !runs.is_empty() {
                println!();
                println!("{}", "Run timeline:".bold());
                for run in runs {
                    println!(
                        "  {} {} playbook={} steps={}",
                        run.created_at.format("%Y-%m-%d %H:%M:%S"),
                        state_cell(&run.state.to_string()),
                        run.playbook_id,
                        run.step_results.len()
                    );
                }
            }
        }

        AlertsCommand::Create {
            title,
            severity,
            source,
            description,
            tag,
            attribute,
        } => {
            let alert = services
                .alerts
                .create(NewAlert {
                    title,
                    description,
                    severity: Severity::parse(&severity)?,
                    source,
                    tags: tag,
                    attributes: attribute
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect(),
                })
                .await?;
            println!(
                "{} Alert {} created ({})",
                "✓".green().bold(),
                alert.id,
                alert.severity
            );

            let runs = services.playbooks.list_runs_for_alert(alert.id).await?;
            for run in runs {
                println!("  triggered run {} -> {}", run.id, run.state);
            }
        }

        AlertsCommand::Update {
            id,
            title,
            severity,
            status,
            tag,
        } => {
            let update = AlertUpdate {
                title,
                severity: severity.as_deref().map(Severity::parse).transpose()?,
                status: status.as_deref().map(AlertStatus::parse).transpose()?,
                add_tags: tag,
                ..Default::default()
            };
            let alert = services.alerts.update(id, update, None).await?;
            println!(
                "{} Alert {} updated (version {})",
                "✓".green().bold(),
                alert.id,
                alert.version
            );
        }

        AlertsCommand::Escalate { id } => {
            let alert = services.alerts.escalate(id).await?;
            println!(
                "{} Alert {} severity is now {}",
                "✓".green().bold(),
                alert.id,
                alert.severity.to_string().to_uppercase().red()
            );
        }

        AlertsCommand::BulkUpdate { ids, status, tag } => {
            let update = AlertUpdate {
                status: status.as_deref().map(AlertStatus::parse).transpose()?,
                add_tags: tag,
                ..Default::default()
            };
            let outcomes = services.alerts.bulk_update(&ids, &update).await?;
            for outcome in outcomes {
                match outcome.result {
                    Ok(alert) => println!(
                        "  {} {} (version {})",
                        "✓".green(),
                        outcome.alert_id,
                        alert.version
                    ),
                    Err(e) => println!("  {} {} {}", "✗".red(), outcome.alert_id, e),
                }
            }
        }

        AlertsCommand::Search { query } => {
            let alerts = services.alerts.search(&query).await?;
            print_alert_table(&alerts);
        }

        AlertsCommand::Delete { id } => {
            services.alerts.delete(id).await?;
            println!("{} Alert {} deleted", "✓".green().bold(), id);
        }
    }

    Ok(())
}

fn print_alert_table(alerts: &[Alert]) {
    if alerts.is_empty() {
        println!("{}", "No alerts found".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["ID", "Title", "Severity", "Status", "Source", "Tags"]);

    for alert in alerts {
        table.add_row(vec![
            Cell::new(alert.id),
            Cell::new(&alert.title),
            severity_cell(alert.severity),
            Cell::new(alert.status),
            Cell::new(&alert.source),
            Cell::new(alert.tags.join(", ")),
        ]);
    }
    println!("{table}");
}

fn severity_cell(severity: Severity) -> Cell {
    let cell = Cell::new(severity);
    match severity {
        Severity::Low => cell.fg(Color::Green),
        Severity::Medium => cell.fg(Color::Yellow),
        Severity::High => cell.fg(Color::DarkYellow),
        Severity::Critical => cell.fg(Color::Red),
    }
}

fn state_cell(state: &str) -> String {
    match state {
        "completed" => state.green().to_string(),
        "failed" => state.red().to_string(),
        "cancelled" => state.yellow().to_string(),
        other => other.to_string(),
    }
}
