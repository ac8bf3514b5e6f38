use std::collections::HashMap;

use colored::Colorize;
use serde_json::json;

use aegis_core::{
    AegisConfig, NewAlert, NewPlaybook, Services, Severity, Step, StepAction, TriggerCondition,
};

/// Self-contained demo: seeds two playbooks, ingests a burst of alerts and
/// prints what the engine did. Everything runs against in-memory stores.
pub async fn handle_simulate_command() -> anyhow::Result<()> {
    println!("{}", "Running Aegis simulation (in-memory)...".cyan().bold());
    println!();

    let services = Services::in_memory(&AegisConfig::default());

    services
        .playbooks
        .create(NewPlaybook {
            name: "edr-containment".to_string(),
            description: Some("Quarantine hosts flagged by the EDR".to_string()),
            enabled: true,
            trigger: TriggerCondition::All {
                conditions: vec![
                    TriggerCondition::SeverityGte {
                        severity: Severity::High,
                    },
                    TriggerCondition::Equals {
                        field: "source".to_string(),
                        value: json!("EDR"),
                    },
                ],
            },
            steps: vec![
                Step::new(1, StepAction::QuarantineHost),
                Step::new(2, StepAction::Notify).with_param("message", json!("host contained")),
            ],
        })
        .await?;

    services
        .playbooks
        .create(NewPlaybook {
            name: "siem-triage".to_string(),
            description: Some("Escalate repeated SIEM detections".to_string()),
            enabled: true,
            trigger: TriggerCondition::Equals {
                field: "source".to_string(),
                value: json!("SIEM"),
            },
            steps: vec![
                Step::new(1, StepAction::Tag).with_param("tag", json!("triaged")),
                Step::new(2, StepAction::Escalate).with_param("set_investigating", json!(true)),
            ],
        })
        .await?;
    println!("  {} Seeded 2 playbooks", "→".blue());

    let alerts = vec![
        NewAlert {
            title: "Ransomware behavior on ws-042".to_string(),
            severity: Severity::Critical,
            source: "EDR".to_string(),
            attributes: HashMap::from([("hostname".to_string(), json!("ws-042"))]),
            ..Default::default()
        },
        NewAlert {
            title: "Impossible travel login".to_string(),
            severity: Severity::Medium,
            source: "SIEM".to_string(),
            ..Default::default()
        },
        NewAlert {
            title: "Port scan from guest VLAN".to_string(),
            severity: Severity::Low,
            source: "IDS".to_string(),
            ..Default::default()
        },
    ];

    println!("  {} Ingesting {} alerts", "→".blue(), alerts.len());
    println!();

    for input in alerts {
        let alert = services.alerts.create(input).await?;
        let runs = services.playbooks.list_runs_for_alert(alert.id).await?;
        let final_alert = services.alerts.get(alert.id).await?;

        println!(
            "{} [{}] {}",
            "Alert".bold(),
            final_alert.severity.to_string().to_uppercase(),
            final_alert.title
        );
        if runs.is_empty() {
            println!("  no playbook matched");
        }
        for run in &runs {
            let playbook = services.playbooks.get(run.playbook_id).await?;
            println!("  {} -> {}", playbook.name, run.state);
            for result in &run.step_results {
                println!(
                    "    step {}: {:?} ({} attempt(s))",
                    result.index, result.outcome, result.attempts
                );
            }
        }
        if !final_alert.tags.is_empty() {
            println!("  tags: {}", final_alert.tags.join(", "));
        }
        println!();
    }

    let snapshot = services.alerts.statistics();
    println!(
        "{} {} alerts total, {} active",
        "Done.".green().bold(),
        snapshot.total,
        snapshot.active
    );
    Ok(())
}
