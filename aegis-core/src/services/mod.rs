//! Service facade.
//!
//! The services are the API surface an HTTP layer or the CLI binds to. They
//! own validation and orchestration; storage access goes through the store
//! traits and all engine interaction goes through [`ExecutionEngine`].

mod alert_service;
mod library;
mod playbook_service;

pub use alert_service::{AlertService, AlertUpdate, BulkUpdateOutcome};
pub use library::{load_playbook_file, sync_playbook_dir};
pub use playbook_service::{NewPlaybook, PlaybookService};

use std::sync::Arc;

use crate::config::AegisConfig;
use crate::db::Database;
use crate::engine::ExecutionEngine;
use crate::escalation::EscalationCoordinator;
use crate::events::EventBus;
use crate::executor::HandlerRegistry;
use crate::stats::StatisticsAggregator;
use crate::store::{
    AlertRepository, AlertStore, InMemoryAlertStore, InMemoryPlaybookStore, InMemoryRunStore,
    PlaybookRepository, PlaybookStore, RunRepository, RunStore,
};

/// Fully wired service set sharing one engine, event bus and counter bank.
#[derive(Clone)]
pub struct Services {
    pub alerts: Arc<AlertService>,
    pub playbooks: Arc<PlaybookService>,
    pub engine: Arc<ExecutionEngine>,
    pub stats: Arc<StatisticsAggregator>,
    pub events: EventBus,
}

impl Services {
    /// Wire the services over arbitrary store implementations.
    pub fn build(
        alert_store: Arc<dyn AlertStore>,
        playbook_store: Arc<dyn PlaybookStore>,
        run_store: Arc<dyn RunStore>,
        config: &AegisConfig,
    ) -> Self {
        let events = EventBus::default();
        let stats = Arc::new(StatisticsAggregator::new());
        let coordinator = Arc::new(EscalationCoordinator::new(
            alert_store.clone(),
            events.clone(),
            stats.clone(),
            config.engine.escalation_cas_retries,
        ));
        let registry = Arc::new(HandlerRegistry::with_defaults(&config.engine));
        let engine = Arc::new(ExecutionEngine::new(
            alert_store.clone(),
            playbook_store.clone(),
            run_store.clone(),
            registry,
            coordinator.clone(),
            config.engine.clone(),
        ));

        let alerts = Arc::new(AlertService::new(
            alert_store,
            engine.clone(),
            coordinator,
            stats.clone(),
            events.clone(),
        ));
        let playbooks = Arc::new(PlaybookService::new(
            playbook_store,
            run_store,
            engine.clone(),
            config.engine.clone(),
        ));

        Self {
            alerts,
            playbooks,
            engine,
            stats,
            events,
        }
    }

    /// Services over the Postgres repositories.
    pub fn postgres(db: &Database, config: &AegisConfig) -> Self {
        Self::build(
            Arc::new(AlertRepository::new(db.pool().clone())),
            Arc::new(PlaybookRepository::new(db.pool().clone())),
            Arc::new(RunRepository::new(db.pool().clone())),
            config,
        )
    }

    /// Services over in-memory stores, for tests and the simulate path.
    pub fn in_memory(config: &AegisConfig) -> Self {
        Self::build(
            Arc::new(InMemoryAlertStore::new()),
            Arc::new(InMemoryPlaybookStore::new()),
            Arc::new(InMemoryRunStore::new()),
            config,
        )
    }
}
