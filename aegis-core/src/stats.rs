//! Alert statistics.
//!
//! Counters are kept incrementally from alert events so reads never touch
//! storage. A full recount from the alert store overwrites whatever the
//! incremental path has accumulated; when the two disagree, the recount is
//! authoritative.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::PoisonError;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::error::AegisResult;
use crate::events::{AlertEvent, AlertEventKind};
use crate::models::{Alert, AlertStatus, Severity, StatSnapshot};
use crate::store::{AlertFilter, AlertStore};

#[derive(Debug, Default)]
pub struct StatisticsAggregator {
    total: AtomicI64,
    active: AtomicI64,
    by_severity: [AtomicI64; Severity::ALL.len()],
    by_status: [AtomicI64; AlertStatus::ALL.len()],
    by_source: RwLock<HashMap<String, i64>>,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one alert event into the counters.
    pub fn apply(&self, event: &AlertEvent) {
        match &event.kind {
            AlertEventKind::Created { after } => self.add(after, 1),
            AlertEventKind::Deleted { before } => self.add(before, -1),
            AlertEventKind::Updated { before, after } => {
                self.add(before, -1);
                self.add(after, 1);
            }
        }
    }

    /// Point-in-time view of the counters. Every severity and status bucket
    /// is present, zero or not.
    pub fn snapshot(&self) -> StatSnapshot {
        let mut snapshot = StatSnapshot::empty();
        for severity in Severity::ALL {
            snapshot.by_severity.insert(
                severity,
                self.by_severity[severity.rank() as usize].load(Ordering::Relaxed),
            );
        }
        for status in AlertStatus::ALL {
            snapshot.by_status.insert(
                status,
                self.by_status[status.rank() as usize].load(Ordering::Relaxed),
            );
        }
        snapshot.by_source = self
            .by_source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot.total = self.total.load(Ordering::Relaxed);
        snapshot.active = self.active.load(Ordering::Relaxed);
        snapshot
    }

    /// Rebuild every counter from the alert store. The recomputed values
    /// replace the incremental ones wholesale.
    pub async fn recount(&self, alerts: &dyn AlertStore) -> AegisResult<StatSnapshot> {
        let all = alerts.list(&AlertFilter::default()).await?;
        info!(count = all.len(), "Recounting alert statistics from storage");

        let mut by_severity = [0i64; Severity::ALL.len()];
        let mut by_status = [0i64; AlertStatus::ALL.len()];
        let mut by_source: HashMap<String, i64> = HashMap::new();
        let mut active = 0i64;

        for alert in &all {
            by_severity[alert.severity.rank() as usize] += 1;
            by_status[alert.status.rank() as usize] += 1;
            *by_source.entry(alert.source.clone()).or_default() += 1;
            if alert.is_active() {
                active += 1;
            }
        }

        self.total.store(all.len() as i64, Ordering::Relaxed);
        self.active.store(active, Ordering::Relaxed);
        for (slot, value) in self.by_severity.iter().zip(by_severity) {
            slot.store(value, Ordering::Relaxed);
        }
        for (slot, value) in self.by_status.iter().zip(by_status) {
            slot.store(value, Ordering::Relaxed);
        }
        *self
            .by_source
            .write()
            .unwrap_or_else(PoisonError::into_inner) = by_source;

        Ok(self.snapshot())
    }

    fn add(&self, alert: &Alert, delta: i64) {
        self.total.fetch_add(delta, Ordering::Relaxed);
        self.by_severity[alert.severity.rank() as usize].fetch_add(delta, Ordering::Relaxed);
        self.by_status[alert.status.rank() as usize].fetch_add(delta, Ordering::Relaxed);
        if alert.is_active() {
            self.active.fetch_add(delta, Ordering::Relaxed);
        }
        let mut by_source = self
            .by_source
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = by_source.entry(alert.source.clone()).or_default();
        *entry += delta;
        if *entry == 0 {
            by_source.remove(&alert.source);
        }
        debug!(source = %alert.source, delta, "Applied statistics delta");
    }
}
