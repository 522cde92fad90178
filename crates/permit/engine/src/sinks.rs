//! Side-effect sinks: audit, notifications, realtime events
//!
//! All three are best-effort collaborators. The services never let a sink
//! failure undo or fail a committed mutation; see [`crate::SideEffects`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use permit_types::{TenantId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Errors a sink can report
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Permit,
    WorkOrder,
    Incident,
}

/// One audit record with optional before/after snapshots
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tenant_id: TenantId,
    /// `None` for system actions (scheduled escalation)
    pub user_id: Option<UserId>,
    pub action: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        tenant_id: TenantId,
        user_id: Option<UserId>,
        action: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            action: action.into(),
            entity_type,
            entity_id: entity_id.to_string(),
            before: None,
            after: None,
            at: Utc::now(),
        }
    }

    pub fn with_before(mut self, before: Option<Value>) -> Self {
        self.before = before;
        self
    }

    pub fn with_after(mut self, after: Option<Value>) -> Self {
        self.after = after;
        self
    }
}

#[async_trait]
pub trait AuditWriter: Send + Sync {
    async fn write(&self, entry: AuditEntry) -> Result<(), SinkError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &UserId, message: &str) -> Result<(), SinkError>;
}

#[async_trait]
pub trait RealtimeBus: Send + Sync {
    async fn publish(&self, event: &str, payload: Value) -> Result<(), SinkError>;
}

// ── In-memory sinks ─────────────────────────────────────────────────

/// Audit writer that keeps entries in memory
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditWriter for InMemoryAuditLog {
    async fn write(&self, entry: AuditEntry) -> Result<(), SinkError> {
        self.entries
            .lock()
            .map_err(|_| SinkError::Unavailable("audit log lock poisoned".into()))?
            .push(entry);
        Ok(())
    }
}

/// A delivered notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub user_id: UserId,
    pub message: String,
}

/// Notifier that records every message it is asked to deliver
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, user_id: &UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|n| &n.user_id == user_id)
            .map(|n| n.message)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: &UserId, message: &str) -> Result<(), SinkError> {
        self.sent
            .lock()
            .map_err(|_| SinkError::Unavailable("notifier lock poisoned".into()))?
            .push(Notification {
                user_id: user_id.clone(),
                message: message.to_string(),
            });
        Ok(())
    }
}

/// A published realtime event
#[derive(Clone, Debug, PartialEq)]
pub struct RealtimeEvent {
    pub event: String,
    pub payload: Value,
}

/// Fan-out realtime bus over a tokio broadcast channel
pub struct BroadcastRealtimeBus {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl BroadcastRealtimeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastRealtimeBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RealtimeBus for BroadcastRealtimeBus {
    async fn publish(&self, event: &str, payload: Value) -> Result<(), SinkError> {
        // No subscribers is not an error for a broadcast.
        let _ = self.sender.send(RealtimeEvent {
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}
