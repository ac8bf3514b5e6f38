//! End-to-end scenarios over the service facade with in-memory stores.

use std::collections::HashMap;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aegis_core::{
    AegisConfig, AegisError, AlertStatus, AlertUpdate, NewAlert, NewPlaybook, RunState, Services,
    Severity, Step, StepAction, StepOutcome, TriggerCondition,
};

fn services() -> Services {
    let mut config = AegisConfig::default();
    config.engine.backoff_base_ms = 5;
    config.engine.backoff_max_ms = 50;
    Services::in_memory(&config)
}

fn edr_critical_alert() -> NewAlert {
    NewAlert {
        title: "Ransomware behavior on ws-042".to_string(),
        description: Some("Mass file encryption detected".to_string()),
        severity: Severity::Critical,
        source: "EDR".to_string(),
        attributes: HashMap::from([("hostname".to_string(), json!("ws-042"))]),
        ..Default::default()
    }
}

fn containment_playbook() -> NewPlaybook {
    NewPlaybook {
        name: "edr-containment".to_string(),
        description: Some("Isolate and announce".to_string()),
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
    }
}

#[tokio::test]
async fn critical_edr_alert_runs_containment_playbook() {
    let s = services();
    s.playbooks.create(containment_playbook()).await.unwrap();

    let alert = s.alerts.create(edr_critical_alert()).await.unwrap();

    let runs = s.playbooks.list_runs_for_alert(alert.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.step_results.len(), 2);
    assert!(run
        .step_results
        .iter()
        .all(|r| r.outcome == StepOutcome::Success));

    // containment tagged the alert but never touched its status
    let stored = s.alerts.get(alert.id).await.unwrap();
    assert_eq!(stored.status, AlertStatus::Open);
    assert!(stored.tags.contains(&"quarantined".to_string()));
    assert_eq!(stored.attributes.get("quarantined_host"), Some(&json!("ws-042")));
}

#[tokio::test]
async fn notify_webhook_recovers_within_retry_budget() {
    let server = MockServer::start().await;
    // two failures, then delivery succeeds
    Mock::given(method("POST"))
        .and(path("/hooks/soc"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hooks/soc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let s = services();
    s.playbooks
        .create(NewPlaybook {
            name: "notifier".to_string(),
            description: None,
            enabled: true,
            trigger: TriggerCondition::SeverityGte {
                severity: Severity::High,
            },
            steps: vec![Step::new(1, StepAction::Notify)
                .with_param("webhook_url", json!(format!("{}/hooks/soc", server.uri())))
                .with_param("message", json!("on-call ping"))
                .with_retries(2)],
        })
        .await
        .unwrap();

    let alert = s.alerts.create(edr_critical_alert()).await.unwrap();

    let runs = s.playbooks.list_runs_for_alert(alert.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    let step = &runs[0].step_results[0];
    assert_eq!(runs[0].state, RunState::Completed);
    assert_eq!(step.outcome, StepOutcome::Success);
    assert_eq!(step.attempts, 3);
}

#[tokio::test]
async fn notify_webhook_failure_beyond_budget_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let s = services();
    s.playbooks
        .create(NewPlaybook {
            name: "notifier".to_string(),
            description: None,
            enabled: true,
            trigger: TriggerCondition::SeverityGte {
                severity: Severity::High,
            },
            steps: vec![Step::new(1, StepAction::Notify)
                .with_param("webhook_url", json!(server.uri()))
                .with_retries(1)],
        })
        .await
        .unwrap();

    let alert = s.alerts.create(edr_critical_alert()).await.unwrap();

    let runs = s.playbooks.list_runs_for_alert(alert.id).await.unwrap();
    let run = &runs[0];
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.step_results[0].attempts, 2);
    assert!(run.step_results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("500"));
}

#[tokio::test]
async fn escalation_chain_is_bounded_to_one_hop() {
    let s = services();
    // fires on every EDR alert and escalates it
    s.playbooks
        .create(NewPlaybook {
            name: "auto-escalate".to_string(),
            description: None,
            enabled: true,
            trigger: TriggerCondition::Equals {
                field: "source".to_string(),
                value: json!("EDR"),
            },
            steps: vec![Step::new(1, StepAction::Escalate)
                .with_param("set_investigating", json!(true))],
        })
        .await
        .unwrap();
    // fires once severity reaches critical
    s.playbooks
        .create(NewPlaybook {
            name: "page-oncall".to_string(),
            description: None,
            enabled: true,
            trigger: TriggerCondition::SeverityGte {
                severity: Severity::Critical,
            },
            steps: vec![Step::new(1, StepAction::Tag).with_param("tag", json!("paged"))],
        })
        .await
        .unwrap();

    let alert = s
        .alerts
        .create(NewAlert {
            title: "Suspicious persistence".to_string(),
            severity: Severity::High,
            source: "EDR".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let stored = s.alerts.get(alert.id).await.unwrap();
    // escalated exactly one level, moved to investigating, and the
    // re-trigger pass fired the critical pager
    assert_eq!(stored.severity, Severity::Critical);
    assert_eq!(stored.status, AlertStatus::Investigating);
    assert!(stored.tags.contains(&"paged".to_string()));

    let runs = s.playbooks.list_runs_for_alert(alert.id).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.state == RunState::Completed));
}

#[tokio::test]
async fn bulk_update_reports_per_alert_outcomes() {
    let s = services();
    let a = s
        .alerts
        .create(NewAlert {
            title: "a".to_string(),
            severity: Severity::Low,
            source: "SIEM".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let b = s
        .alerts
        .create(NewAlert {
            title: "b".to_string(),
            severity: Severity::Low,
            source: "SIEM".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let missing = Uuid::new_v4();

    let outcomes = s
        .alerts
        .bulk_update(
            &[a.id, missing, b.id],
            &AlertUpdate {
                status: Some(AlertStatus::Investigating),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(AegisError::AlertNotFound(_))
    ));
    assert!(outcomes[2].result.is_ok());

    // the two real alerts moved; statistics agree with a full recount
    let incremental = s.alerts.statistics();
    assert_eq!(incremental.status_count(AlertStatus::Investigating), 2);
    let recounted = s.alerts.recount().await.unwrap();
    assert_eq!(
        recounted.status_count(AlertStatus::Investigating),
        incremental.status_count(AlertStatus::Investigating)
    );
    assert_eq!(recounted.total, incremental.total);
}

#[tokio::test]
async fn manual_execute_records_run_and_metrics() {
    let s = services();
    let playbook = s.playbooks.create(containment_playbook()).await.unwrap();

    // low severity alert does not auto-trigger containment
    let alert = s
        .alerts
        .create(NewAlert {
            title: "benign-looking beacon".to_string(),
            severity: Severity::Low,
            source: "EDR".to_string(),
            attributes: HashMap::from([("hostname".to_string(), json!("ws-007"))]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(s
        .playbooks
        .list_runs_for_alert(alert.id)
        .await
        .unwrap()
        .is_empty());

    let run = s.playbooks.execute(playbook.id, alert.id).await.unwrap();
    assert_eq!(run.state, RunState::Completed);

    let stored = s.playbooks.get(playbook.id).await.unwrap();
    assert_eq!(stored.execution_count, 1);
    assert_eq!(stored.success_count, 1);
    assert_eq!(stored.success_rate(), 100.0);
}
