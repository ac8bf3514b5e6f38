use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Execution run lifecycle. Pending -> Running -> {Completed, Failed,
/// Cancelled}; terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "run_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed => write!(f, "failed"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one step after its retry budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failed,
    Skipped,
    TimedOut,
}

impl StepOutcome {
    pub fn is_ok(self) -> bool {
        matches!(self, StepOutcome::Success | StepOutcome::Skipped)
    }
}

/// Result of one step. `attempts` counts every try including retries; the
/// recorded outcome is the final attempt's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: u32,
    pub outcome: StepOutcome,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(index: u32, attempts: u32, duration_ms: u64) -> Self {
        Self {
            index,
            outcome: StepOutcome::Success,
            attempts,
            error: None,
            duration_ms,
        }
    }

    pub fn skipped(index: u32) -> Self {
        Self {
            index,
            outcome: StepOutcome::Skipped,
            attempts: 0,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failed(index: u32, attempts: u32, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            index,
            outcome: StepOutcome::Failed,
            attempts,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn timed_out(index: u32, attempts: u32, duration_ms: u64, timeout_secs: u64) -> Self {
        Self {
            index,
            outcome: StepOutcome::TimedOut,
            attempts,
            error: Some(format!("step timed out after {}s", timeout_secs)),
            duration_ms,
        }
    }
}

/// Why a run ended in Failed. Infrastructure causes mean the persistence
/// adapter was unreachable and step effects could not be confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    StepFailed { index: u32, message: String },
    Infrastructure { message: String },
}

impl FailureCause {
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, FailureCause::Infrastructure { .. })
    }
}

/// One execution instance of a playbook against one alert.
///
/// Owned exclusively by the execution engine for its lifetime; persisted via
/// the run store on every state transition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRun {
    pub id: Uuid,
    pub playbook_id: Uuid,
    pub alert_id: Uuid,
    pub state: RunState,
    #[sqlx(json)]
    pub step_results: Vec<StepResult>,
    #[sqlx(json(nullable))]
    pub failure: Option<FailureCause>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRun {
    pub fn new(playbook_id: Uuid, alert_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            playbook_id,
            alert_id,
            state: RunState::Pending,
            step_results: Vec::new(),
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, cause: FailureCause) {
        self.state = RunState::Failed;
        self.failure = Some(cause);
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.state = RunState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed
    }
}
