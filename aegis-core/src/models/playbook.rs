use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::alert::Severity;

/// Closed vocabulary of automation actions a playbook step may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    Notify,
    Tag,
    BlockIp,
    QuarantineHost,
    Escalate,
    RunScript,
    Wait,
}

impl StepAction {
    pub const ALL: [StepAction; 7] = [
        StepAction::Notify,
        StepAction::Tag,
        StepAction::BlockIp,
        StepAction::QuarantineHost,
        StepAction::Escalate,
        StepAction::RunScript,
        StepAction::Wait,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StepAction::Notify => "notify",
            StepAction::Tag => "tag",
            StepAction::BlockIp => "block-ip",
            StepAction::QuarantineHost => "quarantine-host",
            StepAction::Escalate => "escalate",
            StepAction::RunScript => "run-script",
            StepAction::Wait => "wait",
        }
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One ordered step in a playbook. Order indexes are unique within the
/// playbook; execution is strictly ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub order: u32,
    pub action: StepAction,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    /// Per-step timeout; the engine default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Retry budget beyond the first attempt.
    #[serde(default)]
    pub retries: u32,
}

impl Step {
    pub fn new(order: u32, action: StepAction) -> Self {
        Self {
            order,
            action,
            params: HashMap::new(),
            timeout_secs: None,
            retries: 0,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(|v| v.as_u64())
    }
}

/// Boolean expression tree over alert fields and the attribute map.
///
/// Evaluated statelessly by recursive interpretation; the tree depth is
/// capped at validation time and again defensively during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Field equals a scalar value. Unknown field means not satisfied.
    Equals {
        field: String,
        value: serde_json::Value,
    },
    /// Field value is a member of the given set.
    InSet {
        field: String,
        values: Vec<serde_json::Value>,
    },
    /// Alert severity is at least the given level.
    SeverityGte { severity: Severity },
    /// Alert severity is at most the given level.
    SeverityLte { severity: Severity },
    /// All child conditions hold (logical and).
    All { conditions: Vec<TriggerCondition> },
    /// Any child condition holds (logical or).
    Any { conditions: Vec<TriggerCondition> },
    /// Child condition does not hold.
    Not { condition: Box<TriggerCondition> },
}

impl TriggerCondition {
    /// Depth of the expression tree, leaves counting as 1.
    pub fn depth(&self) -> usize {
        match self {
            TriggerCondition::Equals { .. }
            | TriggerCondition::InSet { .. }
            | TriggerCondition::SeverityGte { .. }
            | TriggerCondition::SeverityLte { .. } => 1,
            TriggerCondition::All { conditions } | TriggerCondition::Any { conditions } => {
                1 + conditions.iter().map(|c| c.depth()).max().unwrap_or(0)
            }
            TriggerCondition::Not { condition } => 1 + condition.depth(),
        }
    }
}

/// A named, ordered automation procedure fired by alert conditions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Playbook {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    #[sqlx(json)]
    pub trigger: TriggerCondition,
    #[sqlx(json)]
    pub steps: Vec<Step>,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_duration_ms: Option<f64>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Playbook {
    pub fn new(name: impl Into<String>, trigger: TriggerCondition, steps: Vec<Step>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            enabled: true,
            trigger,
            steps,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            avg_duration_ms: None,
            last_executed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Steps in ascending order index.
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Fold one terminal run into the rolling execution metrics.
    pub fn record_execution(&mut self, success: bool, duration_ms: f64) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.avg_duration_ms = Some(match self.avg_duration_ms {
            None => duration_ms,
            Some(avg) => {
                (avg * (self.execution_count - 1) as f64 + duration_ms)
                    / self.execution_count as f64
            }
        });
        self.last_executed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.execution_count as f64 * 100.0
    }
}
