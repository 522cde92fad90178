//! Best-effort side-effect dispatch
//!
//! Runs after the primary mutation has committed. Failures are logged and
//! swallowed; the operation that triggered them still reports success.

use crate::sinks::{AuditEntry, AuditWriter, Notifier, RealtimeBus};
use futures::future::join_all;
use permit_types::UserId;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// The three side-effect sinks, bundled
#[derive(Clone)]
pub struct SideEffects {
    audit: Arc<dyn AuditWriter>,
    notifier: Arc<dyn Notifier>,
    realtime: Arc<dyn RealtimeBus>,
}

impl SideEffects {
    pub fn new(
        audit: Arc<dyn AuditWriter>,
        notifier: Arc<dyn Notifier>,
        realtime: Arc<dyn RealtimeBus>,
    ) -> Self {
        Self {
            audit,
            notifier,
            realtime,
        }
    }

    pub async fn audit(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        let entity_id = entry.entity_id.clone();
        let tenant_id = entry.tenant_id.clone();
        if let Err(e) = self.audit.write(entry).await {
            tracing::warn!(
                tenant_id = %tenant_id,
                action = %action,
                entity_id = %entity_id,
                error = %e,
                "Audit write failed"
            );
        }
    }

    /// Returns whether the notification was delivered
    pub async fn notify(&self, user_id: &UserId, message: &str) -> bool {
        match self.notifier.notify(user_id, message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Notification failed");
                false
            }
        }
    }

    /// Notify every user concurrently. One failure never blocks the others.
    ///
    /// Returns the number of successful deliveries.
    pub async fn notify_all<'a, I>(&self, users: I, message: &str) -> usize
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let results = join_all(users.into_iter().map(|u| self.notify(u, message))).await;
        results.into_iter().filter(|delivered| *delivered).count()
    }

    pub async fn publish(&self, event: &str, payload: Value) {
        if let Err(e) = self.realtime.publish(event, payload).await {
            tracing::warn!(event = %event, error = %e, "Realtime publish failed");
        }
    }
}

/// JSON snapshot for audit before/after images
pub(crate) fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to snapshot entity for audit");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{BroadcastRealtimeBus, InMemoryAuditLog, RecordingNotifier, SinkError};
    use async_trait::async_trait;

    struct RefusingNotifier;

    #[async_trait]
    impl Notifier for RefusingNotifier {
        async fn notify(&self, user_id: &UserId, _message: &str) -> Result<(), SinkError> {
            if user_id.as_str() == "offline" {
                Err(SinkError::Delivery("mailbox unreachable".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn notify_all_counts_successes_despite_failures() {
        let effects = SideEffects::new(
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(RefusingNotifier),
            Arc::new(BroadcastRealtimeBus::default()),
        );
        let users = [UserId::new("a"), UserId::new("offline"), UserId::new("b")];
        assert_eq!(effects.notify_all(users.iter(), "hello").await, 2);
    }

    #[tokio::test]
    async fn notify_all_with_no_users_is_zero() {
        let effects = SideEffects::new(
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(RecordingNotifier::new()),
            Arc::new(BroadcastRealtimeBus::default()),
        );
        assert_eq!(effects.notify_all(std::iter::empty::<&UserId>(), "hello").await, 0);
    }
}
