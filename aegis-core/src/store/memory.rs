//! In-memory store implementations.
//!
//! Used by the test suites and the CLI's `simulate` path. Semantics match
//! the Postgres repositories, including the version compare-and-swap.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AegisError, AegisResult};
use crate::models::{Alert, ExecutionRun, Playbook};

use super::{AlertFilter, AlertStore, PlaybookStore, RunStore};

#[derive(Default)]
pub struct InMemoryAlertStore {
    inner: RwLock<HashMap<Uuid, Alert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn insert(&self, alert: &Alert) -> AegisResult<()> {
        let mut inner = self.inner.write().await;
        inner.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AegisResult<Option<Alert>> {
        let inner = self.inner.read().await;
        Ok(inner.get(&id).cloned())
    }

    async fn list(&self, filter: &AlertFilter) -> AegisResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(offset) = filter.offset {
            let offset = (offset.max(0) as usize).min(alerts.len());
            alerts.drain(..offset);
        }
        if let Some(limit) = filter.limit {
            alerts.truncate(limit.max(0) as usize);
        }
        Ok(alerts)
    }

    async fn update_versioned(&self, alert: &Alert, expected_version: i64) -> AegisResult<Alert> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .get_mut(&alert.id)
            .ok_or(AegisError::AlertNotFound(alert.id))?;

        if stored.version != expected_version {
            return Err(AegisError::Conflict {
                alert_id: alert.id,
                expected: expected_version,
            });
        }

        let mut updated = alert.clone();
        updated.version = expected_version + 1;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> AegisResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryPlaybookStore {
    inner: RwLock<HashMap<Uuid, Playbook>>,
}

impl InMemoryPlaybookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaybookStore for InMemoryPlaybookStore {
    async fn save(&self, playbook: &Playbook) -> AegisResult<()> {
        let mut inner = self.inner.write().await;
        inner.insert(playbook.id, playbook.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AegisResult<Option<Playbook>> {
        let inner = self.inner.read().await;
        Ok(inner.get(&id).cloned())
    }

    async fn list(&self) -> AegisResult<Vec<Playbook>> {
        let inner = self.inner.read().await;
        let mut playbooks: Vec<Playbook> = inner.values().cloned().collect();
        playbooks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(playbooks)
    }

    async fn list_enabled(&self) -> AegisResult<Vec<Playbook>> {
        let mut playbooks = self.list().await?;
        playbooks.retain(|p| p.enabled);
        Ok(playbooks)
    }

    async fn record_execution(
        &self,
        id: Uuid,
        success: bool,
        duration_ms: f64,
    ) -> AegisResult<()> {
        let mut inner = self.inner.write().await;
        let playbook = inner.get_mut(&id).ok_or(AegisError::PlaybookNotFound(id))?;
        playbook.record_execution(success, duration_ms);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRunStore {
    inner: RwLock<HashMap<Uuid, ExecutionRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: drop all stored runs, simulating a store that lost state.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert(&self, run: &ExecutionRun) -> AegisResult<()> {
        let mut inner = self.inner.write().await;
        inner.insert(run.id, run.clone());
        Ok(())
    }

    async fn update(&self, run: &ExecutionRun) -> AegisResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner.get_mut(&run.id).ok_or(AegisError::RunNotFound(run.id))?;
        *stored = run.clone();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AegisResult<Option<ExecutionRun>> {
        let inner = self.inner.read().await;
        Ok(inner.get(&id).cloned())
    }

    async fn list_for_alert(&self, alert_id: Uuid) -> AegisResult<Vec<ExecutionRun>> {
        let inner = self.inner.read().await;
        let mut runs: Vec<ExecutionRun> = inner
            .values()
            .filter(|r| r.alert_id == alert_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }
}
