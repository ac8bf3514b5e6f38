//! Playbook execution engine.
//!
//! The engine owns every run from admission to terminal state. Admission is
//! keyed by (playbook, alert): while a run holds its key, further triggers
//! for the same pair coalesce into it instead of starting a second run.
//! Steps execute strictly in ascending order index with per-step retry and
//! timeout budgets; every state transition is persisted before the run moves
//! on. Cancellation is cooperative and observed at step boundaries.
//!
//! When a run's intents actually change the alert, the engine re-evaluates
//! enabled playbooks against the new snapshot exactly once. The re-trigger
//! pass happens while the originating run still holds its admission key, so
//! a playbook can never chain into itself.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{AegisError, AegisResult};
use crate::escalation::{EscalationCoordinator, EscalationGuard};
use crate::executor::{HandlerRegistry, StepExecution};
use crate::models::{
    Alert, ExecutionRun, FailureCause, Playbook, Step, StepResult,
};
use crate::store::{AlertStore, PlaybookStore, RunStore};
use crate::trigger;

/// Cloning yields a handle to the same engine: the admission set and cancel
/// flags are shared, which is what lets each run own a spawned task.
#[derive(Clone)]
pub struct ExecutionEngine {
    alerts: Arc<dyn AlertStore>,
    playbooks: Arc<dyn PlaybookStore>,
    runs: Arc<dyn RunStore>,
    registry: Arc<HandlerRegistry>,
    coordinator: Arc<EscalationCoordinator>,
    config: EngineConfig,
    /// Active (playbook, alert) admission keys.
    admissions: Arc<Mutex<HashSet<(Uuid, Uuid)>>>,
    /// Cooperative cancel flags for in-flight runs.
    cancel_flags: Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>,
}

impl ExecutionEngine {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        playbooks: Arc<dyn PlaybookStore>,
        runs: Arc<dyn RunStore>,
        registry: Arc<HandlerRegistry>,
        coordinator: Arc<EscalationCoordinator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            alerts,
            playbooks,
            runs,
            registry,
            coordinator,
            config,
            admissions: Arc::new(Mutex::new(HashSet::new())),
            cancel_flags: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Evaluate all enabled playbooks against an alert snapshot and run the
    /// matches. Coalesced admissions produce no run; returns the runs this
    /// pass drove to a terminal state.
    pub async fn handle_alert(&self, alert: &Alert) -> AegisResult<Vec<ExecutionRun>> {
        self.evaluate_and_run(alert.clone(), true).await
    }

    /// Execute a specific playbook against an alert, bypassing trigger
    /// evaluation. Fails with `DuplicateRun` if a run for the pair is
    /// already active.
    pub async fn execute(&self, playbook_id: Uuid, alert_id: Uuid) -> AegisResult<ExecutionRun> {
        let playbook = self
            .playbooks
            .get(playbook_id)
            .await?
            .ok_or(AegisError::PlaybookNotFound(playbook_id))?;
        let alert = self
            .alerts
            .get(alert_id)
            .await?
            .ok_or(AegisError::AlertNotFound(alert_id))?;

        if !self.admit(playbook_id, alert_id) {
            return Err(AegisError::DuplicateRun {
                playbook_id,
                alert_id,
            });
        }
        self.admitted_run(&playbook, alert, true).await
    }

    /// Request cancellation of a run.
    ///
    /// An in-flight run is flagged and finalizes at its next step boundary;
    /// the returned record still shows the pre-cancel state. A run that is
    /// already terminal is a no-op. An unknown id is an error.
    pub async fn cancel(&self, run_id: Uuid) -> AegisResult<ExecutionRun> {
        let flag = self
            .cancel_flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run_id)
            .cloned();

        let run = self
            .runs
            .get(run_id)
            .await?
            .ok_or(AegisError::RunNotFound(run_id))?;

        if run.state.is_terminal() {
            return Ok(run);
        }

        if let Some(flag) = flag {
            flag.store(true, Ordering::Release);
            info!(run_id = %run_id, "Cancellation requested, takes effect at next step boundary");
            return Ok(run);
        }

        // Not driven by this engine instance (e.g. left over from a crash);
        // finalize directly, marking the steps that never ran as skipped.
        let mut run = run;
        if let Some(playbook) = self.playbooks.get(run.playbook_id).await? {
            let recorded = run.step_results.len();
            for step in playbook.ordered_steps().into_iter().skip(recorded) {
                run.step_results.push(StepResult::skipped(step.order));
            }
        }
        run.cancel();
        self.runs.update(&run).await?;
        info!(run_id = %run_id, "Orphaned run cancelled");
        Ok(run)
    }

    /// Number of runs currently holding an admission key.
    pub fn active_run_count(&self) -> usize {
        self.admissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn evaluate_and_run(
        &self,
        alert: Alert,
        allow_retrigger: bool,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = AegisResult<Vec<ExecutionRun>>> + Send + '_>,
    > {
        // Boxed because the re-trigger pass makes this future recursive.
        Box::pin(async move {
        let matched: Vec<Playbook> = self
            .playbooks
            .list_enabled()
            .await?
            .into_iter()
            .filter(|p| trigger::evaluate(&alert, &p.trigger))
            .collect();

        // Admit the whole batch against the same snapshot before any
        // run executes, so one run's effects cannot double-start
        // another playbook from this pass.
        let mut admitted = Vec::new();
        for playbook in matched {
            if self.admit(playbook.id, alert.id) {
                admitted.push(playbook);
            } else {
                debug!(playbook = %playbook.name, alert_id = %alert.id, "Trigger coalesced into active run");
            }
        }

        // One worker task per admitted run; a slow playbook must never
        // delay its siblings.
        let mut handles = Vec::with_capacity(admitted.len());
        for playbook in admitted {
            let engine = self.clone();
            let snapshot = alert.clone();
            handles.push(tokio::spawn(async move {
                engine.admitted_run(&playbook, snapshot, allow_retrigger).await
            }));
        }

        let mut runs = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(run)) => runs.push(run),
                Ok(Err(e)) => e.log(),
                Err(e) => warn!(error = %e, "Run task aborted"),
            }
        }
        Ok(runs)
        })
    }

    /// Drive one run whose admission key is already held; the key and the
    /// cancel flag are released on every exit path.
    async fn admitted_run(
        &self,
        playbook: &Playbook,
        alert: Alert,
        allow_retrigger: bool,
    ) -> AegisResult<ExecutionRun> {
        let run = ExecutionRun::new(playbook.id, alert.id);
        let run_id = run.id;
        let alert_id = alert.id;

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, cancel.clone());

        let result = self.drive(playbook, alert, run, &cancel, allow_retrigger).await;

        self.cancel_flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&run_id);
        self.release(playbook.id, alert_id);

        result
    }

    async fn drive(
        &self,
        playbook: &Playbook,
        mut alert: Alert,
        mut run: ExecutionRun,
        cancel: &AtomicBool,
        allow_retrigger: bool,
    ) -> AegisResult<ExecutionRun> {
        self.runs
            .insert(&run)
            .await
            .map_err(|e| AegisError::EngineFatal(format!("cannot persist new run: {e}")))?;
        info!(run_id = %run.id, playbook = %playbook.name, alert_id = %alert.id, "Run admitted");

        run.start();
        if let Err(e) = self.runs.update(&run).await {
            return Ok(self.fail_infrastructure(run, &e).await);
        }

        let guard = EscalationGuard::new();
        let mut alert_changed = false;
        let steps = playbook.ordered_steps();

        for (pos, step) in steps.iter().enumerate() {
            if cancel.load(Ordering::Acquire) {
                for remaining in &steps[pos..] {
                    run.step_results.push(StepResult::skipped(remaining.order));
                }
                run.cancel();
                info!(run_id = %run.id, at_step = step.order, "Run cancelled at step boundary");
                if let Err(e) = self.runs.update(&run).await {
                    return Ok(self.fail_infrastructure(run, &e).await);
                }
                break;
            }

            let (mut result, execution) = self.run_step(step, &alert).await;

            if let Some(execution) = execution {
                if !execution.intents.is_empty() {
                    match self
                        .coordinator
                        .apply_intents(alert.id, &execution.intents, Some((run.id, &guard)))
                        .await
                    {
                        Ok(outcome) => {
                            if outcome.changed {
                                alert_changed = true;
                            }
                            alert = outcome.alert;
                        }
                        Err(e) if e.is_storage_error() => {
                            run.step_results.push(result);
                            return Ok(self.fail_infrastructure(run, &e).await);
                        }
                        Err(e) => {
                            // rejected intent fails the step that produced it
                            result = StepResult::failed(
                                step.order,
                                result.attempts,
                                result.duration_ms,
                                e.to_string(),
                            );
                        }
                    }
                }
            }

            let step_ok = result.outcome.is_ok();
            let step_error = result.error.clone();
            run.step_results.push(result);
            if let Err(e) = self.runs.update(&run).await {
                return Ok(self.fail_infrastructure(run, &e).await);
            }

            if !step_ok {
                run.fail(FailureCause::StepFailed {
                    index: step.order,
                    message: step_error.unwrap_or_else(|| "step failed".to_string()),
                });
                warn!(run_id = %run.id, step = step.order, "Run failed, remaining steps not executed");
                if let Err(e) = self.runs.update(&run).await {
                    return Ok(self.fail_infrastructure(run, &e).await);
                }
                break;
            }
        }

        if !run.state.is_terminal() {
            run.complete();
            if let Err(e) = self.runs.update(&run).await {
                return Ok(self.fail_infrastructure(run, &e).await);
            }
        }

        info!(run_id = %run.id, state = %run.state, steps = run.step_results.len(), "Run finished");

        if let Some(duration_ms) = run.duration_ms() {
            if let Err(e) = self
                .playbooks
                .record_execution(playbook.id, run.succeeded(), duration_ms)
                .await
            {
                warn!(playbook_id = %playbook.id, error = %e, "Failed to record playbook metrics");
            }
        }

        // One-hop re-trigger against the mutated alert, while this run's
        // admission key is still held.
        if alert_changed && allow_retrigger {
            if let Err(e) = self.evaluate_and_run(alert, false).await {
                warn!(run_id = %run.id, error = %e, "Re-trigger pass failed");
            }
        }

        Ok(run)
    }

    /// Execute one step under its timeout and retry budget. Returns the
    /// recorded result and, on success, the handler's output.
    async fn run_step(&self, step: &Step, alert: &Alert) -> (StepResult, Option<StepExecution>) {
        let handler = match self.registry.get(step.action) {
            Ok(handler) => handler,
            Err(e) => return (StepResult::failed(step.order, 0, 0, e.to_string()), None),
        };

        let timeout = self.config.step_timeout(step.timeout_secs);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            match tokio::time::timeout(timeout, handler.execute(step, alert, attempt)).await {
                Ok(Ok(execution)) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!(action = %step.action, attempt, "Step succeeded");
                    return (
                        StepResult::success(step.order, attempt + 1, duration_ms),
                        Some(execution),
                    );
                }
                Ok(Err(e)) => {
                    warn!(action = %step.action, attempt, error = %e, "Step attempt failed");
                    if attempt >= step.retries {
                        let duration_ms = started.elapsed().as_millis() as u64;
                        return (
                            StepResult::failed(step.order, attempt + 1, duration_ms, e.to_string()),
                            None,
                        );
                    }
                }
                Err(_) => {
                    warn!(action = %step.action, attempt, timeout_secs = timeout.as_secs(), "Step attempt timed out");
                    if attempt >= step.retries {
                        let duration_ms = started.elapsed().as_millis() as u64;
                        return (
                            StepResult::timed_out(
                                step.order,
                                attempt + 1,
                                duration_ms,
                                timeout.as_secs(),
                            ),
                            None,
                        );
                    }
                }
            }

            tokio::time::sleep(self.config.backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    /// Terminal path for persistence failures: the run's effects can no
    /// longer be confirmed, so it fails with an infrastructure cause. The
    /// final write is best-effort.
    async fn fail_infrastructure(&self, mut run: ExecutionRun, err: &AegisError) -> ExecutionRun {
        run.fail(FailureCause::Infrastructure {
            message: err.to_string(),
        });
        if let Err(e) = self.runs.update(&run).await {
            warn!(run_id = %run.id, error = %e, "Could not persist infrastructure failure");
        }
        err.log();
        run
    }

    fn admit(&self, playbook_id: Uuid, alert_id: Uuid) -> bool {
        self.admissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((playbook_id, alert_id))
    }

    fn release(&self, playbook_id: Uuid, alert_id: Uuid) {
        self.admissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(playbook_id, alert_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::executor::StepHandler;
    use crate::models::{
        NewAlert, RunState, Severity, StepAction, StepOutcome, TriggerCondition,
    };
    use crate::stats::StatisticsAggregator;
    use crate::store::{InMemoryAlertStore, InMemoryPlaybookStore, InMemoryRunStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    struct Harness {
        engine: Arc<ExecutionEngine>,
        alerts: Arc<InMemoryAlertStore>,
        playbooks: Arc<InMemoryPlaybookStore>,
        runs: Arc<InMemoryRunStore>,
    }

    fn harness_with_registry(registry: HandlerRegistry) -> Harness {
        let alerts = Arc::new(InMemoryAlertStore::new());
        let playbooks = Arc::new(InMemoryPlaybookStore::new());
        let runs = Arc::new(InMemoryRunStore::new());
        let config = EngineConfig {
            backoff_base_ms: 1,
            backoff_max_ms: 10,
            ..Default::default()
        };
        let coordinator = Arc::new(EscalationCoordinator::new(
            alerts.clone(),
            EventBus::default(),
            Arc::new(StatisticsAggregator::new()),
            3,
        ));
        let engine = Arc::new(ExecutionEngine::new(
            alerts.clone(),
            playbooks.clone(),
            runs.clone(),
            Arc::new(registry),
            coordinator,
            config,
        ));
        Harness {
            engine,
            alerts,
            playbooks,
            runs,
        }
    }

    fn harness() -> Harness {
        harness_with_registry(HandlerRegistry::default())
    }

    async fn seed_alert(h: &Harness, severity: Severity) -> Alert {
        let alert = Alert::new(NewAlert {
            title: "suspicious process".to_string(),
            severity,
            source: "EDR".to_string(),
            ..Default::default()
        });
        h.alerts.insert(&alert).await.unwrap();
        alert
    }

    async fn seed_playbook(
        h: &Harness,
        name: &str,
        trigger: TriggerCondition,
        steps: Vec<Step>,
    ) -> Playbook {
        let playbook = Playbook::new(name, trigger, steps);
        h.playbooks.save(&playbook).await.unwrap();
        playbook
    }

    fn gte(severity: Severity) -> TriggerCondition {
        TriggerCondition::SeverityGte { severity }
    }

    #[tokio::test]
    async fn test_matching_playbook_runs_to_completion() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "tagger",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Tag).with_param("tag", json!("triaged"))],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].state, RunState::Completed);
        assert_eq!(runs[0].step_results.len(), 1);
        assert_eq!(runs[0].step_results[0].outcome, StepOutcome::Success);

        let stored = h.alerts.get(alert.id).await.unwrap().unwrap();
        assert!(stored.tags.contains(&"triaged".to_string()));
        assert_eq!(h.engine.active_run_count(), 0);
    }

    #[tokio::test]
    async fn test_non_matching_playbook_does_not_run() {
        let h = harness();
        let alert = seed_alert(&h, Severity::Low).await;
        seed_playbook(&h, "p", gte(Severity::High), vec![Step::new(1, StepAction::Tag)]).await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        assert!(runs.is_empty());
        assert!(h.runs.list_for_alert(alert.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_playbook_does_not_run() {
        let h = harness();
        let alert = seed_alert(&h, Severity::Critical).await;
        let mut playbook = Playbook::new(
            "disabled",
            gte(Severity::Low),
            vec![Step::new(1, StepAction::Tag)],
        );
        playbook.enabled = false;
        h.playbooks.save(&playbook).await.unwrap();

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn test_failed_step_halts_run_and_records_prefix() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        // block-ip without an address fails; the tag step must never run
        seed_playbook(
            &h,
            "containment",
            gte(Severity::High),
            vec![
                Step::new(1, StepAction::BlockIp),
                Step::new(2, StepAction::Tag).with_param("tag", json!("contained")),
            ],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.step_results.len(), 1);
        assert_eq!(run.step_results[0].outcome, StepOutcome::Failed);
        assert!(matches!(
            run.failure,
            Some(FailureCause::StepFailed { index: 1, .. })
        ));

        let stored = h.alerts.get(alert.id).await.unwrap().unwrap();
        assert!(stored.tags.is_empty());
    }

    /// Fails a fixed number of attempts before succeeding.
    struct FlakyHandler {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl StepHandler for FlakyHandler {
        fn action(&self) -> StepAction {
            StepAction::Notify
        }

        async fn execute(
            &self,
            _step: &Step,
            _alert: &Alert,
            _attempt: u32,
        ) -> AegisResult<StepExecution> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(AegisError::StepExecution {
                    action: "notify".to_string(),
                    message: "webhook returned 503".to_string(),
                });
            }
            Ok(StepExecution::ok())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_spent_then_success() {
        let mut registry = HandlerRegistry::default();
        registry.register(Arc::new(FlakyHandler {
            failures: 2,
            calls: AtomicU32::new(0),
        }));
        let h = harness_with_registry(registry);
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "notifier",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Notify).with_retries(2)],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].state, RunState::Completed);
        assert_eq!(runs[0].step_results[0].outcome, StepOutcome::Success);
        assert_eq!(runs[0].step_results[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted_fails_run() {
        let mut registry = HandlerRegistry::default();
        registry.register(Arc::new(FlakyHandler {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        }));
        let h = harness_with_registry(registry);
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "notifier",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Notify).with_retries(1)],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        let run = &runs[0];
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.step_results[0].outcome, StepOutcome::Failed);
        assert_eq!(run.step_results[0].attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_records_timed_out() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "waiter",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Wait)
                .with_param("seconds", json!(60))
                .with_timeout_secs(1)],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        let run = &runs[0];
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.step_results[0].outcome, StepOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sibling_runs_execute_concurrently() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        for name in ["wait-a", "wait-b"] {
            seed_playbook(
                &h,
                name,
                gte(Severity::High),
                vec![Step::new(1, StepAction::Wait).with_param("seconds", json!(5))],
            )
            .await;
        }

        let started = Instant::now();
        let runs = h.engine.handle_alert(&alert).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.state == RunState::Completed));
        // both waits overlap; back-to-back execution would take twice as long
        assert!(
            elapsed < std::time::Duration::from_secs(10),
            "sibling runs serialized: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_trigger_coalesces() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "slow",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Wait).with_param("seconds", json!(5))],
        )
        .await;

        let (first, second) = tokio::join!(
            h.engine.handle_alert(&alert),
            h.engine.handle_alert(&alert)
        );
        let total = first.unwrap().len() + second.unwrap().len();
        assert_eq!(total, 1);
        assert_eq!(h.runs.list_for_alert(alert.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_manual_execute_duplicate_is_conflict() {
        let h = harness();
        let alert = seed_alert(&h, Severity::Low).await;
        let playbook = seed_playbook(
            &h,
            "manual",
            gte(Severity::Critical),
            vec![Step::new(1, StepAction::Tag).with_param("tag", json!("manual"))],
        )
        .await;

        // trigger would not fire for a low alert, but manual execute does
        let run = h.engine.execute(playbook.id, alert.id).await.unwrap();
        assert_eq!(run.state, RunState::Completed);

        assert!(matches!(
            h.engine.execute(playbook.id, Uuid::new_v4()).await,
            Err(AegisError::AlertNotFound(_))
        ));
        assert!(matches!(
            h.engine.execute(Uuid::new_v4(), alert.id).await,
            Err(AegisError::PlaybookNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_skips_remaining_steps() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "cancellable",
            gte(Severity::High),
            vec![
                Step::new(1, StepAction::Wait).with_param("seconds", json!(10)),
                Step::new(2, StepAction::Tag).with_param("tag", json!("late")),
            ],
        )
        .await;

        let engine = h.engine.clone();
        let snapshot = alert.clone();
        let handle = tokio::spawn(async move { engine.handle_alert(&snapshot).await });

        // wait for the run to appear, then flag it while step 1 sleeps
        let run_id = loop {
            let runs = h.runs.list_for_alert(alert.id).await.unwrap();
            if let Some(run) = runs.first() {
                if run.state == RunState::Running {
                    break run.id;
                }
            }
            tokio::task::yield_now().await;
        };
        h.engine.cancel(run_id).await.unwrap();

        let runs = handle.await.unwrap().unwrap();
        let run = &runs[0];
        assert_eq!(run.state, RunState::Cancelled);
        assert_eq!(run.step_results.len(), 2);
        assert_eq!(run.step_results[0].outcome, StepOutcome::Success);
        assert_eq!(run.step_results[1].outcome, StepOutcome::Skipped);

        let stored = h.alerts.get(alert.id).await.unwrap().unwrap();
        assert!(stored.tags.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_orphaned_run_skips_unexecuted_steps() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        let playbook = seed_playbook(
            &h,
            "recovered",
            gte(Severity::High),
            vec![
                Step::new(1, StepAction::Tag).with_param("tag", json!("t")),
                Step::new(2, StepAction::Notify),
            ],
        )
        .await;

        // a run a previous process persisted as Running; no live cancel flag
        let mut run = ExecutionRun::new(playbook.id, alert.id);
        run.start();
        h.runs.insert(&run).await.unwrap();

        let cancelled = h.engine.cancel(run.id).await.unwrap();
        assert_eq!(cancelled.state, RunState::Cancelled);
        assert_eq!(cancelled.step_results.len(), 2);
        assert!(cancelled
            .step_results
            .iter()
            .all(|r| r.outcome == StepOutcome::Skipped));

        let stored = h.runs.get(run.id).await.unwrap().unwrap();
        assert_eq!(stored.state, RunState::Cancelled);
        assert_eq!(stored.step_results.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_terminal_run_is_noop() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "p",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Tag).with_param("tag", json!("t"))],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        let run = h.engine.cancel(runs[0].id).await.unwrap();
        assert_eq!(run.state, RunState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_unknown_run_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.engine.cancel(Uuid::new_v4()).await,
            Err(AegisError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_escalation_retriggers_exactly_one_hop() {
        let h = harness();
        let alert = seed_alert(&h, Severity::Medium).await;
        seed_playbook(
            &h,
            "escalator",
            TriggerCondition::Equals {
                field: "source".to_string(),
                value: json!("EDR"),
            },
            vec![Step::new(1, StepAction::Escalate)],
        )
        .await;
        seed_playbook(
            &h,
            "responder",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Tag).with_param("tag", json!("contained"))],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        // only the escalator matched the original snapshot
        assert_eq!(runs.len(), 1);

        let stored = h.alerts.get(alert.id).await.unwrap().unwrap();
        // escalated once, then the responder fired on the re-trigger pass
        assert_eq!(stored.severity, Severity::High);
        assert!(stored.tags.contains(&"contained".to_string()));
        assert_eq!(h.runs.list_for_alert(alert.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_metrics_recorded_on_playbook() {
        let h = harness();
        let alert = seed_alert(&h, Severity::High).await;
        let playbook = seed_playbook(
            &h,
            "p",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Tag).with_param("tag", json!("t"))],
        )
        .await;

        h.engine.handle_alert(&alert).await.unwrap();

        let stored = h.playbooks.get(playbook.id).await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.success_count, 1);
        assert!(stored.avg_duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_unregistered_action_fails_step() {
        let h = harness_with_registry(HandlerRegistry::new());
        let alert = seed_alert(&h, Severity::High).await;
        seed_playbook(
            &h,
            "p",
            gte(Severity::High),
            vec![Step::new(1, StepAction::Tag)],
        )
        .await;

        let runs = h.engine.handle_alert(&alert).await.unwrap();
        let run = &runs[0];
        assert_eq!(run.state, RunState::Failed);
        assert!(run.step_results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("E4002"));
    }
}
