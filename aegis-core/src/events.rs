//! Alert mutation events.
//!
//! Every alert create/update/delete publishes an [`AlertEvent`]. The
//! statistics aggregator consumes these on the mutation path; external
//! consumers can subscribe to the broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Alert;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEventKind {
    Created { after: Alert },
    Updated { before: Alert, after: Alert },
    Deleted { before: Alert },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: Uuid,
    pub kind: AlertEventKind,
    pub occurred_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn created(after: Alert) -> Self {
        Self {
            alert_id: after.id,
            kind: AlertEventKind::Created { after },
            occurred_at: Utc::now(),
        }
    }

    pub fn updated(before: Alert, after: Alert) -> Self {
        Self {
            alert_id: after.id,
            kind: AlertEventKind::Updated { before, after },
            occurred_at: Utc::now(),
        }
    }

    pub fn deleted(before: Alert) -> Self {
        Self {
            alert_id: before.id,
            kind: AlertEventKind::Deleted { before },
            occurred_at: Utc::now(),
        }
    }
}

/// Fan-out channel for alert events. Publishing never blocks; lagging
/// subscribers miss events rather than stalling a mutation.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AlertEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: AlertEvent) {
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
