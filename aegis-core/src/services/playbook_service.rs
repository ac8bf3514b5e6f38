use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::ExecutionEngine;
use crate::error::{AegisError, AegisResult};
use crate::executor::MAX_WAIT_SECS;
use crate::models::{ExecutionRun, Playbook, Step, StepAction, TriggerCondition};
use crate::store::{PlaybookStore, RunStore};
use crate::trigger;

/// Playbook definition as accepted from the API or a library file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlaybook {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: TriggerCondition,
    pub steps: Vec<Step>,
}

fn default_enabled() -> bool {
    true
}

pub struct PlaybookService {
    playbooks: Arc<dyn PlaybookStore>,
    runs: Arc<dyn RunStore>,
    engine: Arc<ExecutionEngine>,
    config: EngineConfig,
}

impl PlaybookService {
    pub fn new(
        playbooks: Arc<dyn PlaybookStore>,
        runs: Arc<dyn RunStore>,
        engine: Arc<ExecutionEngine>,
        config: EngineConfig,
    ) -> Self {
        Self {
            playbooks,
            runs,
            engine,
            config,
        }
    }

    /// Validate and persist a new playbook.
    pub async fn create(&self, input: NewPlaybook) -> AegisResult<Playbook> {
        self.validate(&input)?;
        if self.find_by_name(&input.name).await?.is_some() {
            return Err(AegisError::Validation(format!(
                "playbook '{}' already exists",
                input.name
            )));
        }

        let mut playbook = Playbook::new(input.name, input.trigger, input.steps);
        playbook.description = input.description;
        playbook.enabled = input.enabled;
        self.playbooks.save(&playbook).await?;
        info!(playbook_id = %playbook.id, name = %playbook.name, "Playbook created");
        Ok(playbook)
    }

    /// Replace an existing playbook's definition, keeping its id and
    /// execution metrics.
    pub async fn update(&self, id: Uuid, input: NewPlaybook) -> AegisResult<Playbook> {
        self.validate(&input)?;
        let mut playbook = self.get(id).await?;
        playbook.name = input.name;
        playbook.description = input.description;
        playbook.enabled = input.enabled;
        playbook.trigger = input.trigger;
        playbook.steps = input.steps;
        playbook.updated_at = chrono::Utc::now();
        self.playbooks.save(&playbook).await?;
        info!(playbook_id = %id, "Playbook updated");
        Ok(playbook)
    }

    pub async fn get(&self, id: Uuid) -> AegisResult<Playbook> {
        self.playbooks
            .get(id)
            .await?
            .ok_or(AegisError::PlaybookNotFound(id))
    }

    pub async fn find_by_name(&self, name: &str) -> AegisResult<Option<Playbook>> {
        Ok(self
            .playbooks
            .list()
            .await?
            .into_iter()
            .find(|p| p.name == name))
    }

    pub async fn list(&self) -> AegisResult<Vec<Playbook>> {
        self.playbooks.list().await
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> AegisResult<Playbook> {
        let mut playbook = self.get(id).await?;
        if playbook.enabled != enabled {
            playbook.enabled = enabled;
            playbook.updated_at = chrono::Utc::now();
            self.playbooks.save(&playbook).await?;
            info!(playbook_id = %id, enabled, "Playbook toggled");
        }
        Ok(playbook)
    }

    /// Run a playbook against an alert, bypassing trigger evaluation.
    pub async fn execute(&self, playbook_id: Uuid, alert_id: Uuid) -> AegisResult<ExecutionRun> {
        self.engine.execute(playbook_id, alert_id).await
    }

    pub async fn get_run(&self, run_id: Uuid) -> AegisResult<ExecutionRun> {
        self.runs
            .get(run_id)
            .await?
            .ok_or(AegisError::RunNotFound(run_id))
    }

    /// All runs ever recorded for an alert, oldest first.
    pub async fn list_runs_for_alert(&self, alert_id: Uuid) -> AegisResult<Vec<ExecutionRun>> {
        self.runs.list_for_alert(alert_id).await
    }

    pub async fn cancel_run(&self, run_id: Uuid) -> AegisResult<ExecutionRun> {
        self.engine.cancel(run_id).await
    }

    fn validate(&self, input: &NewPlaybook) -> AegisResult<()> {
        if input.name.trim().is_empty() {
            return Err(AegisError::Validation(
                "playbook name is required".to_string(),
            ));
        }
        if input.steps.is_empty() {
            return Err(AegisError::Validation(
                "playbook needs at least one step".to_string(),
            ));
        }
        trigger::validate(&input.trigger)?;

        let mut seen = HashSet::new();
        for step in &input.steps {
            if !seen.insert(step.order) {
                return Err(AegisError::InvalidStep {
                    index: step.order,
                    message: "duplicate order index".to_string(),
                });
            }
            self.validate_step(step)?;
        }
        Ok(())
    }

    fn validate_step(&self, step: &Step) -> AegisResult<()> {
        match step.action {
            StepAction::Tag => {
                if step.param_str("tag").is_none() {
                    return Err(AegisError::InvalidStep {
                        index: step.order,
                        message: "tag action requires a 'tag' param".to_string(),
                    });
                }
            }
            StepAction::Wait => {
                let Some(secs) = step.param_u64("seconds") else {
                    return Err(AegisError::InvalidStep {
                        index: step.order,
                        message: "wait action requires a 'seconds' param".to_string(),
                    });
                };
                if secs == 0 || secs > MAX_WAIT_SECS {
                    return Err(AegisError::InvalidStep {
                        index: step.order,
                        message: format!("wait must be between 1 and {MAX_WAIT_SECS} seconds"),
                    });
                }
            }
            StepAction::RunScript => {
                let Some(script) = step.param_str("script") else {
                    return Err(AegisError::InvalidStep {
                        index: step.order,
                        message: "run-script action requires a 'script' param".to_string(),
                    });
                };
                if !self.config.script_allow_list.iter().any(|s| s == script) {
                    return Err(AegisError::InvalidStep {
                        index: step.order,
                        message: format!("script '{script}' is not on the allow list"),
                    });
                }
            }
            StepAction::Notify
            | StepAction::BlockIp
            | StepAction::QuarantineHost
            | StepAction::Escalate => {}
        }
        Ok(())
    }
}
