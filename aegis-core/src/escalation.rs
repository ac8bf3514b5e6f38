//! Escalation coordination.
//!
//! All alert mutations produced by runs or manual escalation funnel through
//! here. Writes are serialized per alert by a compare-and-swap on the
//! alert's version; concurrent writers to different alerts proceed
//! independently. A run may escalate an alert at most once; tripping the
//! guard is surfaced to the caller, never silently dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AegisError, AegisResult};
use crate::events::{AlertEvent, EventBus};
use crate::executor::AlertIntent;
use crate::models::Alert;
use crate::stats::StatisticsAggregator;
use crate::store::AlertStore;

/// Once-per-run escalation marker. The engine creates one per run and hands
/// it to every intent application for that run.
#[derive(Debug, Default)]
pub struct EscalationGuard {
    used: AtomicBool,
}

impl EscalationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    fn mark_used(&self) {
        self.used.store(true, Ordering::Release);
    }
}

/// Result of applying an intent batch.
#[derive(Debug, Clone)]
pub struct IntentOutcome {
    pub alert: Alert,
    /// Whether any field actually changed (and was persisted).
    pub changed: bool,
    /// Whether this application raised the alert's severity.
    pub escalated: bool,
}

pub struct EscalationCoordinator {
    alerts: Arc<dyn AlertStore>,
    events: EventBus,
    stats: Arc<StatisticsAggregator>,
    cas_retries: u32,
}

impl EscalationCoordinator {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        events: EventBus,
        stats: Arc<StatisticsAggregator>,
        cas_retries: u32,
    ) -> Self {
        Self {
            alerts,
            events,
            stats,
            cas_retries,
        }
    }

    /// Apply a batch of intents to an alert under the per-alert write lock.
    ///
    /// Lost optimistic checks are retried against a fresh read up to the
    /// configured budget before Conflict surfaces to the caller.
    pub async fn apply_intents(
        &self,
        alert_id: Uuid,
        intents: &[AlertIntent],
        run: Option<(Uuid, &EscalationGuard)>,
    ) -> AegisResult<IntentOutcome> {
        let mut attempt = 0;
        loop {
            let before = self
                .alerts
                .get(alert_id)
                .await?
                .ok_or(AegisError::AlertNotFound(alert_id))?;

            let (candidate, changed, escalated) = self.project(&before, intents, run)?;

            if !changed {
                return Ok(IntentOutcome {
                    alert: before,
                    changed: false,
                    escalated: false,
                });
            }

            match self
                .alerts
                .update_versioned(&candidate, before.version)
                .await
            {
                Ok(stored) => {
                    if escalated {
                        if let Some((run_id, guard)) = run {
                            guard.mark_used();
                            info!(alert_id = %alert_id, run_id = %run_id, severity = %stored.severity, "Alert escalated by run");
                        } else {
                            info!(alert_id = %alert_id, severity = %stored.severity, "Alert escalated manually");
                        }
                    }
                    let event = AlertEvent::updated(before, stored.clone());
                    self.stats.apply(&event);
                    self.events.publish(event);
                    return Ok(IntentOutcome {
                        alert: stored,
                        changed: true,
                        escalated,
                    });
                }
                Err(AegisError::Conflict { .. }) if attempt < self.cas_retries => {
                    attempt += 1;
                    warn!(alert_id = %alert_id, attempt, "Alert write conflicted, retrying against fresh read");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Manual escalation entry point: one severity bump, no run guard.
    pub async fn escalate_manual(&self, alert_id: Uuid) -> AegisResult<IntentOutcome> {
        self.apply_intents(alert_id, &[AlertIntent::Escalate], None)
            .await
    }

    /// Compute the mutated alert without writing. Returns the candidate,
    /// whether anything changed, and whether severity was raised.
    fn project(
        &self,
        before: &Alert,
        intents: &[AlertIntent],
        run: Option<(Uuid, &EscalationGuard)>,
    ) -> AegisResult<(Alert, bool, bool)> {
        let mut alert = before.clone();
        let mut changed = false;
        let mut escalated = false;

        for intent in intents {
            match intent {
                AlertIntent::Escalate => {
                    let next = alert.severity.escalated();
                    if next == alert.severity {
                        // already critical, nothing to raise
                        continue;
                    }
                    if let Some((run_id, guard)) = run {
                        if guard.is_used() || escalated {
                            return Err(AegisError::EscalationGuard { run_id });
                        }
                    }
                    alert.severity = next;
                    changed = true;
                    escalated = true;
                }
                AlertIntent::SetStatus { status } => {
                    if alert.status == *status {
                        continue;
                    }
                    Alert::check_status_transition(alert.status, *status, false)?;
                    alert.status = *status;
                    changed = true;
                }
                AlertIntent::AddTag { tag } => {
                    if !alert.tags.contains(tag) {
                        alert.tags.push(tag.clone());
                        changed = true;
                    }
                }
                AlertIntent::SetAttribute { key, value } => {
                    if alert.attributes.get(key) != Some(value) {
                        alert.attributes.insert(key.clone(), value.clone());
                        changed = true;
                    }
                }
            }
        }

        Ok((alert, changed, escalated))
    }
}
