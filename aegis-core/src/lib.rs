//! Aegis core: alert orchestration and playbook execution.
//!
//! The crate is organized around a small set of seams:
//!
//! - [`models`] — alerts, playbooks, runs and their lifecycle rules
//! - [`trigger`] — stateless boolean trigger evaluation
//! - [`store`] — storage traits with Postgres and in-memory backends
//! - [`executor`] — the step handler registry and built-in handlers
//! - [`escalation`] — per-alert serialized intent application
//! - [`engine`] — run admission, step driving, retry and cancellation
//! - [`stats`] — incremental alert counters with authoritative recount
//! - [`services`] — the facade an HTTP layer or CLI binds to

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod events;
pub mod executor;
pub mod logging;
pub mod models;
pub mod services;
pub mod stats;
pub mod store;
pub mod trigger;

pub use config::{AegisConfig, DatabaseSettings, EngineConfig, LoggingConfig};
pub use db::Database;
pub use engine::ExecutionEngine;
pub use error::{AegisError, AegisResult};
pub use escalation::{EscalationCoordinator, EscalationGuard, IntentOutcome};
pub use events::{AlertEvent, AlertEventKind, EventBus};
pub use executor::{AlertIntent, HandlerRegistry, StepExecution, StepHandler};
pub use models::{
    Alert, AlertStatus, ExecutionRun, FailureCause, NewAlert, Playbook, RunState, Severity,
    StatSnapshot, Step, StepAction, StepOutcome, StepResult, TriggerCondition,
};
pub use services::{
    AlertService, AlertUpdate, BulkUpdateOutcome, NewPlaybook, PlaybookService, Services,
};
pub use stats::StatisticsAggregator;
pub use store::{
    AlertFilter, AlertRepository, AlertStore, InMemoryAlertStore, InMemoryPlaybookStore,
    InMemoryRunStore, PlaybookRepository, PlaybookStore, RunRepository, RunStore,
};
