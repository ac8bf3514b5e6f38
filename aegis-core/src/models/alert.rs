use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AegisError, AegisResult};

/// Alert severity, totally ordered: low < medium < high < critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// The next level up the escalation ladder. Critical stays critical.
    pub fn escalated(self) -> Severity {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }

    pub fn parse(s: &str) -> AegisResult<Severity> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(AegisError::Validation(format!(
                "invalid severity '{}', must be one of: low, medium, high, critical",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert lifecycle status. Transitions are monotonic (open -> investigating
/// -> resolved) except the explicit reopen, which only a manual update may
/// perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "alert_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 3] = [
        AlertStatus::Open,
        AlertStatus::Investigating,
        AlertStatus::Resolved,
    ];

    pub fn rank(self) -> u8 {
        match self {
            AlertStatus::Open => 0,
            AlertStatus::Investigating => 1,
            AlertStatus::Resolved => 2,
        }
    }

    pub fn parse(s: &str) -> AegisResult<AlertStatus> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(AlertStatus::Open),
            "investigating" => Ok(AlertStatus::Investigating),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(AegisError::Validation(format!(
                "invalid status '{}', must be one of: open, investigating, resolved",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Open => write!(f, "open"),
            AlertStatus::Investigating => write!(f, "investigating"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// A security alert ingested from an external source (SIEM, EDR, firewall).
///
/// The `version` column implements optimistic concurrency: every write goes
/// through a compare-and-swap against the version the writer last read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub status: AlertStatus,
    pub source: String,
    #[sqlx(json)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[sqlx(json)]
    pub tags: Vec<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for alert ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAlert {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub source: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

impl Alert {
    pub fn new(input: NewAlert) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            severity: input.severity,
            status: AlertStatus::Open,
            source: input.source,
            attributes: input.attributes,
            tags: input.tags,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != AlertStatus::Resolved
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Checks the status transition rule. `manual` permits the explicit
    /// reopen (resolved -> open); automation may only move status forward.
    pub fn check_status_transition(
        from: AlertStatus,
        to: AlertStatus,
        manual: bool,
    ) -> AegisResult<()> {
        if from == to || to.rank() > from.rank() {
            return Ok(());
        }
        if manual && from == AlertStatus::Resolved && to == AlertStatus::Open {
            return Ok(());
        }
        Err(AegisError::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_escalation_ladder() {
        assert_eq!(Severity::Low.escalated(), Severity::Medium);
        assert_eq!(Severity::High.escalated(), Severity::Critical);
        assert_eq!(Severity::Critical.escalated(), Severity::Critical);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("CRITICAL").unwrap(), Severity::Critical);
        assert!(Severity::parse("urgent").is_err());
    }

    #[test]
    fn test_status_transition_monotonic() {
        assert!(
            Alert::check_status_transition(AlertStatus::Open, AlertStatus::Investigating, false)
                .is_ok()
        );
        assert!(
            Alert::check_status_transition(AlertStatus::Investigating, AlertStatus::Open, false)
                .is_err()
        );
        // explicit reopen only for manual updates
        assert!(
            Alert::check_status_transition(AlertStatus::Resolved, AlertStatus::Open, true).is_ok()
        );
        assert!(
            Alert::check_status_transition(AlertStatus::Resolved, AlertStatus::Open, false)
                .is_err()
        );
    }

    #[test]
    fn test_new_alert_defaults() {
        let alert = Alert::new(NewAlert {
            title: "Suspicious login".to_string(),
            severity: Severity::High,
            source: "SIEM".to_string(),
            ..Default::default()
        });

        assert_eq!(alert.status, AlertStatus::Open);
        assert_eq!(alert.version, 1);
        assert!(alert.is_active());
        assert_eq!(alert.created_at, alert.updated_at);
    }

    #[test]
    fn test_add_tag_dedup() {
        let mut alert = Alert::new(NewAlert {
            title: "t".to_string(),
            severity: Severity::Low,
            source: "EDR".to_string(),
            ..Default::default()
        });
        alert.add_tag("quarantined");
        alert.add_tag("quarantined");
        assert_eq!(alert.tags, vec!["quarantined".to_string()]);
    }
}
