//! Storage adapters.
//!
//! The engine and services speak to storage only through these traits. The
//! in-memory implementation backs tests and the `simulate` CLI path; the
//! Postgres repositories back deployments.

mod alert_repo;
mod memory;
mod playbook_repo;
mod run_repo;

pub use alert_repo::AlertRepository;
pub use memory::{InMemoryAlertStore, InMemoryPlaybookStore, InMemoryRunStore};
pub use playbook_repo::PlaybookRepository;
pub use run_repo::RunRepository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AegisResult;
use crate::models::{Alert, AlertStatus, ExecutionRun, Playbook, Severity};

/// Filter for alert listings, matching the dashboard's query surface.
/// `limit`/`offset` page through the filtered set, newest first.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
    pub source: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AlertFilter {
    /// Field match only; paging is applied by the store after ordering.
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(severity) = self.severity {
            if alert.severity != severity {
                return false;
            }
        }
        if let Some(status) = self.status {
            if alert.status != status {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if &alert.source != source {
                return false;
            }
        }
        true
    }
}

/// Typed access to alert records. No business logic lives here.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert(&self, alert: &Alert) -> AegisResult<()>;

    async fn get(&self, id: Uuid) -> AegisResult<Option<Alert>>;

    async fn list(&self, filter: &AlertFilter) -> AegisResult<Vec<Alert>>;

    /// Compare-and-swap write: persists `alert` only if the stored version
    /// still equals `expected_version`, bumping the version by one.
    /// Returns the stored record or `Conflict`.
    async fn update_versioned(&self, alert: &Alert, expected_version: i64) -> AegisResult<Alert>;

    async fn delete(&self, id: Uuid) -> AegisResult<bool>;
}

#[async_trait]
pub trait PlaybookStore: Send + Sync {
    /// Insert or replace by id.
    async fn save(&self, playbook: &Playbook) -> AegisResult<()>;

    async fn get(&self, id: Uuid) -> AegisResult<Option<Playbook>>;

    async fn list(&self) -> AegisResult<Vec<Playbook>>;

    async fn list_enabled(&self) -> AegisResult<Vec<Playbook>>;

    /// Fold one terminal run into the playbook's execution metrics.
    async fn record_execution(
        &self,
        id: Uuid,
        success: bool,
        duration_ms: f64,
    ) -> AegisResult<()>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert(&self, run: &ExecutionRun) -> AegisResult<()>;

    /// Persist the run's current state. Called on every state transition.
    async fn update(&self, run: &ExecutionRun) -> AegisResult<()>;

    async fn get(&self, id: Uuid) -> AegisResult<Option<ExecutionRun>>;

    async fn list_for_alert(&self, alert_id: Uuid) -> AegisResult<Vec<ExecutionRun>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAlert;

    #[test]
    fn test_alert_filter_matching() {
        let alert = Alert::new(NewAlert {
            title: "t".to_string(),
            severity: Severity::High,
            source: "EDR".to_string(),
            ..Default::default()
        });

        assert!(AlertFilter::default().matches(&alert));
        assert!(AlertFilter {
            severity: Some(Severity::High),
            source: Some("EDR".to_string()),
            ..Default::default()
        }
        .matches(&alert));
        assert!(!AlertFilter {
            status: Some(AlertStatus::Resolved),
            ..Default::default()
        }
        .matches(&alert));
    }
}
