use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

use aegis_core::{AlertStatus, Severity, StatSnapshot};

use super::connect_services;

pub async fn handle_stats_command(format: &str) -> anyhow::Result<()> {
    let services = connect_services().await?;
    // a fresh process has empty counters, so always recount from storage
    let snapshot = services.alerts.recount().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    print_snapshot(&snapshot);
    Ok(())
}

fn print_snapshot(snapshot: &StatSnapshot) {
    println!(
        "{} {} total, {} active",
        "Alerts:".bold(),
        snapshot.total,
        snapshot.active
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Bucket", "Count"]);

    for severity in Severity::ALL {
        table.add_row(vec![
            format!("severity: {severity}"),
            snapshot.severity_count(severity).to_string(),
        ]);
    }
    for status in AlertStatus::ALL {
        table.add_row(vec![
            format!("status: {status}"),
            snapshot.status_count(status).to_string(),
        ]);
    }
    let mut sources: Vec<_> = snapshot.by_source.iter().collect();
    sources.sort_by(|a, b| a.0.cmp(b.0));
    for (source, count) in sources {
        table.add_row(vec![format!("source: {source}"), count.to_string()]);
    }

    println!("{table}");
}
