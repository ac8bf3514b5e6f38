//! Step execution.
//!
//! Each action kind from the closed vocabulary maps to a registered
//! [`StepHandler`]. Handlers run under an at-least-once contract: the engine
//! retries failures, so a handler must tolerate duplicate execution.
//! Handlers never mutate the alert directly; effects come back as
//! [`AlertIntent`]s the engine applies centrally after the step completes.

mod handlers;
mod registry;

pub use handlers::{
    BlockIpHandler, EscalateHandler, NotifyHandler, QuarantineHostHandler, RunScriptHandler,
    TagHandler, WaitHandler, MAX_WAIT_SECS,
};
pub use registry::HandlerRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AegisResult;
use crate::models::{Alert, AlertStatus, Step, StepAction};

/// A requested alert mutation produced by a step. Applied by the escalation
/// coordinator under the per-alert write lock, never by the handler itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertIntent {
    /// Raise severity one level up the ladder.
    Escalate,
    /// Move status forward. Automation can never reopen a resolved alert.
    SetStatus { status: AlertStatus },
    AddTag { tag: String },
    SetAttribute { key: String, value: serde_json::Value },
}

/// Successful result of one handler invocation.
#[derive(Debug, Clone, Default)]
pub struct StepExecution {
    pub intents: Vec<AlertIntent>,
    /// Free-form handler output recorded for diagnostics.
    pub detail: Option<serde_json::Value>,
}

impl StepExecution {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_intent(mut self, intent: AlertIntent) -> Self {
        self.intents.push(intent);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// One action kind's implementation.
///
/// `attempt` is zero-based and provided so handlers can make duplicate
/// deliveries observable downstream (e.g. an idempotency key).
#[async_trait]
pub trait StepHandler: Send + Sync {
    fn action(&self) -> StepAction;

    async fn execute(&self, step: &Step, alert: &Alert, attempt: u32)
        -> AegisResult<StepExecution>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_serde_roundtrip() {
        let intents = vec![
            AlertIntent::Escalate,
            AlertIntent::SetStatus {
                status: AlertStatus::Investigating,
            },
            AlertIntent::AddTag {
                tag: "contained".to_string(),
            },
        ];
        let json = serde_json::to_string(&intents).unwrap();
        let back: Vec<AlertIntent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intents);
    }

    #[test]
    fn test_step_execution_builder() {
        let exec = StepExecution::ok()
            .with_intent(AlertIntent::Escalate)
            .with_detail(serde_json::json!({"delivered": true}));
        assert_eq!(exec.intents.len(), 1);
        assert!(exec.detail.is_some());
    }
}
