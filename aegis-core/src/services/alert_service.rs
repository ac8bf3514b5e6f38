use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::ExecutionEngine;
use crate::error::{AegisError, AegisResult};
use crate::escalation::EscalationCoordinator;
use crate::events::{AlertEvent, EventBus};
use crate::models::{Alert, AlertStatus, NewAlert, Severity, StatSnapshot};
use crate::stats::StatisticsAggregator;
use crate::store::{AlertFilter, AlertStore};

/// Partial update applied to an alert. Absent fields stay untouched.
///
/// This is the manual path: severity may move in either direction and a
/// resolved alert may be reopened, both of which automation is denied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
    #[serde(default)]
    pub add_tags: Vec<String>,
    #[serde(default)]
    pub set_attributes: HashMap<String, serde_json::Value>,
}

impl AlertUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.status.is_none()
            && self.add_tags.is_empty()
            && self.set_attributes.is_empty()
    }
}

/// Per-alert result of a bulk update. Failures carry the error that stopped
/// that one alert; they never abort the rest of the batch.
#[derive(Debug)]
pub struct BulkUpdateOutcome {
    pub alert_id: Uuid,
    pub result: Result<Alert, AegisError>,
}

pub struct AlertService {
    alerts: Arc<dyn AlertStore>,
    engine: Arc<ExecutionEngine>,
    coordinator: Arc<EscalationCoordinator>,
    stats: Arc<StatisticsAggregator>,
    events: EventBus,
}

impl AlertService {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        engine: Arc<ExecutionEngine>,
        coordinator: Arc<EscalationCoordinator>,
        stats: Arc<StatisticsAggregator>,
        events: EventBus,
    ) -> Self {
        Self {
            alerts,
            engine,
            coordinator,
            stats,
            events,
        }
    }

    /// Ingest a new alert. Enabled playbooks are evaluated against it once
    /// it is persisted; run failures never fail the ingestion itself.
    pub async fn create(&self, input: NewAlert) -> AegisResult<Alert> {
        if input.title.trim().is_empty() {
            return Err(AegisError::Validation("title is required".to_string()));
        }
        if input.source.trim().is_empty() {
            return Err(AegisError::Validation("source is required".to_string()));
        }

        let alert = Alert::new(input);
        self.alerts.insert(&alert).await?;
        info!(alert_id = %alert.id, severity = %alert.severity, source = %alert.source, "Alert created");

        let event = AlertEvent::created(alert.clone());
        self.stats.apply(&event);
        self.events.publish(event);

        if let Err(e) = self.engine.handle_alert(&alert).await {
            e.log();
        }
        Ok(alert)
    }

    pub async fn get(&self, id: Uuid) -> AegisResult<Alert> {
        self.alerts
            .get(id)
            .await?
            .ok_or(AegisError::AlertNotFound(id))
    }

    pub async fn list(&self, filter: &AlertFilter) -> AegisResult<Vec<Alert>> {
        self.alerts.list(filter).await
    }

    /// Case-insensitive substring search over title, description and tags.
    pub async fn search(&self, query: &str) -> AegisResult<Vec<Alert>> {
        let needle = query.to_lowercase();
        let mut alerts = self.alerts.list(&AlertFilter::default()).await?;
        alerts.retain(|a| {
            a.title.to_lowercase().contains(&needle)
                || a.description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
                || a.tags.iter().any(|t| t.to_lowercase().contains(&needle))
        });
        Ok(alerts)
    }

    /// Manual update under the optimistic version check. When
    /// `expected_version` is absent the currently stored version is used,
    /// so a concurrent writer still surfaces as Conflict.
    ///
    /// A changed alert is re-evaluated against enabled playbooks.
    pub async fn update(
        &self,
        id: Uuid,
        update: AlertUpdate,
        expected_version: Option<i64>,
    ) -> AegisResult<Alert> {
        if update.is_empty() {
            return Err(AegisError::Validation(
                "update contains no fields".to_string(),
            ));
        }
        if let Some(ref title) = update.title {
            if title.trim().is_empty() {
                return Err(AegisError::Validation("title cannot be empty".to_string()));
            }
        }

        let before = self.get(id).await?;
        let expected = expected_version.unwrap_or(before.version);

        let mut candidate = before.clone();
        if let Some(title) = update.title {
            candidate.title = title;
        }
        if let Some(description) = update.description {
            candidate.description = Some(description);
        }
        if let Some(severity) = update.severity {
            candidate.severity = severity;
        }
        if let Some(status) = update.status {
            Alert::check_status_transition(candidate.status, status, true)?;
            candidate.status = status;
        }
        for tag in update.add_tags {
            candidate.add_tag(tag);
        }
        for (key, value) in update.set_attributes {
            candidate.attributes.insert(key, value);
        }

        let stored = self.alerts.update_versioned(&candidate, expected).await?;
        info!(alert_id = %id, version = stored.version, "Alert updated");

        let event = AlertEvent::updated(before, stored.clone());
        self.stats.apply(&event);
        self.events.publish(event);

        if let Err(e) = self.engine.handle_alert(&stored).await {
            e.log();
        }
        Ok(stored)
    }

    /// Manually raise severity one level, then re-evaluate playbooks.
    pub async fn escalate(&self, id: Uuid) -> AegisResult<Alert> {
        let outcome = self.coordinator.escalate_manual(id).await?;
        if outcome.changed {
            if let Err(e) = self.engine.handle_alert(&outcome.alert).await {
                e.log();
            }
        }
        Ok(outcome.alert)
    }

    /// Best-effort bulk update: each alert is attempted independently and
    /// the outcome list mirrors the input order.
    pub async fn bulk_update(
        &self,
        ids: &[Uuid],
        update: &AlertUpdate,
    ) -> AegisResult<Vec<BulkUpdateOutcome>> {
        if ids.is_empty() {
            return Err(AegisError::Validation(
                "bulk update requires at least one alert id".to_string(),
            ));
        }
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = self.update(id, update.clone(), None).await;
            if let Err(ref e) = result {
                e.log();
            }
            outcomes.push(BulkUpdateOutcome {
                alert_id: id,
                result,
            });
        }
        Ok(outcomes)
    }

    pub async fn delete(&self, id: Uuid) -> AegisResult<()> {
        let before = self.get(id).await?;
        if !self.alerts.delete(id).await? {
            return Err(AegisError::AlertNotFound(id));
        }
        info!(alert_id = %id, "Alert deleted");

        let event = AlertEvent::deleted(before);
        self.stats.apply(&event);
        self.events.publish(event);
        Ok(())
    }

    /// Counter snapshot; never touches storage.
    pub fn statistics(&self) -> StatSnapshot {
        self.stats.snapshot()
    }

    /// Authoritative recount from the alert store.
    pub async fn recount(&self) -> AegisResult<StatSnapshot> {
        self.stats.recount(self.alerts.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AegisConfig;
    use crate::services::Services;
    use serde_json::json;

    fn services() -> Services {
        Services::in_memory(&AegisConfig::default())
    }

    fn new_alert(severity: Severity) -> NewAlert {
        NewAlert {
            title: "credential stuffing".to_string(),
            severity,
            source: "SIEM".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_validates_required_fields() {
        let s = services();
        let err = s
            .alerts
            .create(NewAlert {
                title: "  ".to_string(),
                source: "SIEM".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation_error());

        let err = s
            .alerts
            .create(NewAlert {
                title: "t".to_string(),
                source: String::new(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_create_counts_in_statistics() {
        let s = services();
        s.alerts.create(new_alert(Severity::High)).await.unwrap();
        s.alerts.create(new_alert(Severity::Low)).await.unwrap();

        let snapshot = s.alerts.statistics();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.severity_count(Severity::High), 1);
        assert_eq!(snapshot.by_source.get("SIEM"), Some(&2));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_payload() {
        let s = services();
        let alert = s.alerts.create(new_alert(Severity::Low)).await.unwrap();
        let err = s
            .alerts
            .update(alert.id, AlertUpdate::default(), None)
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_manual_update_can_downgrade_and_reopen() {
        let s = services();
        let alert = s.alerts.create(new_alert(Severity::High)).await.unwrap();

        let resolved = s
            .alerts
            .update(
                alert.id,
                AlertUpdate {
                    status: Some(AlertStatus::Resolved),
                    severity: Some(Severity::Low),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(resolved.severity, Severity::Low);
        assert_eq!(resolved.status, AlertStatus::Resolved);

        let reopened = s
            .alerts
            .update(
                alert.id,
                AlertUpdate {
                    status: Some(AlertStatus::Open),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(reopened.status, AlertStatus::Open);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let s = services();
        let alert = s.alerts.create(new_alert(Severity::Low)).await.unwrap();
        s.alerts
            .update(
                alert.id,
                AlertUpdate {
                    title: Some("renamed".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let err = s
            .alerts
            .update(
                alert.id,
                AlertUpdate {
                    title: Some("stale write".to_string()),
                    ..Default::default()
                },
                Some(alert.version),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_escalate_raises_and_reports_missing() {
        let s = services();
        let alert = s.alerts.create(new_alert(Severity::Medium)).await.unwrap();

        let escalated = s.alerts.escalate(alert.id).await.unwrap();
        assert_eq!(escalated.severity, Severity::High);

        assert!(matches!(
            s.alerts.escalate(Uuid::new_v4()).await,
            Err(AegisError::AlertNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bulk_update_is_best_effort() {
        let s = services();
        let a = s.alerts.create(new_alert(Severity::Low)).await.unwrap();
        let b = s.alerts.create(new_alert(Severity::Low)).await.unwrap();
        let missing = Uuid::new_v4();

        let outcomes = s
            .alerts
            .bulk_update(
                &[a.id, missing, b.id],
                &AlertUpdate {
                    add_tags: vec!["reviewed".to_string()],
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

        let updated = s.alerts.get(b.id).await.unwrap();
        assert!(updated.tags.contains(&"reviewed".to_string()));
    }

    #[tokio::test]
    async fn test_search_matches_title_and_tags() {
        let s = services();
        let mut input = new_alert(Severity::Low);
        input.title = "Lateral movement detected".to_string();
        input.tags = vec!["mitre-t1021".to_string()];
        let alert = s.alerts.create(input).await.unwrap();
        s.alerts.create(new_alert(Severity::Low)).await.unwrap();

        let by_title = s.alerts.search("lateral").await.unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].id, alert.id);

        let by_tag = s.alerts.search("T1021").await.unwrap();
        assert_eq!(by_tag.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_updates_statistics() {
        let s = services();
        let alert = s.alerts.create(new_alert(Severity::High)).await.unwrap();
        s.alerts.delete(alert.id).await.unwrap();

        assert_eq!(s.alerts.statistics().total, 0);
        assert!(matches!(
            s.alerts.delete(alert.id).await,
            Err(AegisError::AlertNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recount_agrees_with_incremental_counters() {
        let s = services();
        for severity in [Severity::Low, Severity::High, Severity::High] {
            s.alerts.create(new_alert(severity)).await.unwrap();
        }

        let incremental = s.alerts.statistics();
        let recounted = s.alerts.recount().await.unwrap();
        assert_eq!(recounted.total, incremental.total);
        assert_eq!(
            recounted.severity_count(Severity::High),
            incremental.severity_count(Severity::High)
        );
        assert_eq!(recounted.by_source, incremental.by_source);
    }

    #[tokio::test]
    async fn test_attributes_set_via_update() {
        let s = services();
        let alert = s.alerts.create(new_alert(Severity::Low)).await.unwrap();
        let updated = s
            .alerts
            .update(
                alert.id,
                AlertUpdate {
                    set_attributes: HashMap::from([(
                        "hostname".to_string(),
                        json!("ws-042"),
                    )]),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.attributes.get("hostname"), Some(&json!("ws-042")));
    }
}
