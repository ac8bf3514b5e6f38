use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{AlertStatus, Severity};

/// Point-in-time view of the alert population. Derived and cached; always
/// reconstructable by a full recount from the alert store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub total: i64,
    pub by_severity: HashMap<Severity, i64>,
    pub by_status: HashMap<AlertStatus, i64>,
    pub by_source: HashMap<String, i64>,
    /// Alerts whose status is not resolved.
    pub active: i64,
    pub taken_at: DateTime<Utc>,
}

impl StatSnapshot {
    pub fn empty() -> Self {
        let mut by_severity = HashMap::new();
        for severity in Severity::ALL {
            by_severity.insert(severity, 0);
        }
        let mut by_status = HashMap::new();
        for status in AlertStatus::ALL {
            by_status.insert(status, 0);
        }
        Self {
            total: 0,
            by_severity,
            by_status,
            by_source: HashMap::new(),
            active: 0,
            taken_at: Utc::now(),
        }
    }

    pub fn severity_count(&self, severity: Severity) -> i64 {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    pub fn status_count(&self, status: AlertStatus) -> i64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
