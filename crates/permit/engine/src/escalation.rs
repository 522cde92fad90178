//! Escalation scanner: promotes overdue pending steps to escalated
//!
//! The scanner is driven either lazily, from the top of permit reads, or by
//! an [`EscalationTicker`] on a fixed interval. Both go through
//! [`EscalationTrigger`], so the read path never knows which mode is active.

use crate::chain::ApprovalChainEngine;
use crate::effects::{snapshot, SideEffects};
use crate::sinks::{AuditEntry, EntityType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use permit_storage::{PermitFilter, PermitStore};
use permit_types::{PermitError, PermitId, PermitResult, PermitStatus, TenantId};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Outcome of one sweep over a tenant
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub escalated: Vec<PermitId>,
    /// Permits whose escalation could not be persisted
    pub failed: Vec<PermitId>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Something that applies due escalations before a read
#[async_trait]
pub trait EscalationTrigger: Send + Sync {
    /// Never fails the caller; errors are logged.
    async fn apply_pending_escalations(&self, tenant_id: &TenantId);
}

/// Sweeps a tenant's permits for overdue pending steps
pub struct EscalationScanner {
    permits: Arc<dyn PermitStore>,
    effects: SideEffects,
    chain: ApprovalChainEngine,
}

impl EscalationScanner {
    pub fn new(permits: Arc<dyn PermitStore>, effects: SideEffects) -> Self {
        Self {
            permits,
            effects,
            chain: ApprovalChainEngine::new(),
        }
    }

    /// Escalate every permit of `tenant_id` with a pending step due at `now`.
    ///
    /// Matched permits are processed concurrently. A failure on one permit
    /// is recorded in the report and never aborts its siblings.
    pub async fn sweep(
        &self,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> PermitResult<SweepReport> {
        let filter = PermitFilter::for_tenant(tenant_id.clone())
            .with_statuses([PermitStatus::Pending, PermitStatus::Escalated])
            .escalation_due_by(now);
        let candidates = self.permits.find(&filter).await?;
        if candidates.is_empty() {
            return Ok(SweepReport::default());
        }

        tracing::debug!(
            tenant_id = %tenant_id,
            candidates = candidates.len(),
            "Escalation sweep matched permits"
        );

        let results = join_all(
            candidates
                .iter()
                .map(|p| self.escalate_one(tenant_id, &p.id, now)),
        )
        .await;

        let mut report = SweepReport::default();
        for (permit, result) in candidates.iter().zip(results) {
            match result {
                Ok(true) => report.escalated.push(permit.id.clone()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        permit_id = %permit.id,
                        error = %e,
                        "Scheduled escalation failed"
                    );
                    report.failed.push(permit.id.clone());
                }
            }
        }

        if !report.escalated.is_empty() {
            tracing::info!(
                tenant_id = %tenant_id,
                escalated = report.escalated.len(),
                failed = report.failed.len(),
                "Escalation sweep completed"
            );
        }
        Ok(report)
    }

    /// Returns `Ok(false)` when a concurrent write already moved the step.
    async fn escalate_one(
        &self,
        tenant_id: &TenantId,
        permit_id: &PermitId,
        now: DateTime<Utc>,
    ) -> PermitResult<bool> {
        let mut permit = self
            .permits
            .find_one(tenant_id, permit_id)
            .await?
            .ok_or_else(|| PermitError::PermitNotFound(permit_id.clone()))?;

        let still_due = permit.status.is_awaiting_approval()
            && permit.pending_step().is_some_and(|s| s.is_overdue(now));
        if !still_due {
            tracing::debug!(permit_id = %permit_id, "Step no longer overdue, skipping");
            return Ok(false);
        }

        let before = snapshot(&permit);
        let sequence = self.chain.escalate_permit(&mut permit, None, None, now)?;
        self.permits.save(&permit).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            permit_id = %permit.id,
            sequence,
            "Permit escalated after deadline"
        );

        let message = format!(
            "Permit {} escalated: approval step {} is overdue",
            permit.permit_number, sequence
        );
        self.effects.notify_all(permit.watchers.iter(), &message).await;
        self.effects
            .publish(
                "permit:escalated",
                json!({
                    "permit_id": permit.id,
                    "sequence": sequence,
                    "automatic": true,
                }),
            )
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    tenant_id.clone(),
                    None,
                    "permit.escalate",
                    EntityType::Permit,
                    &permit.id,
                )
                .with_before(before)
                .with_after(snapshot(&permit)),
            )
            .await;

        Ok(true)
    }
}

#[async_trait]
impl EscalationTrigger for EscalationScanner {
    async fn apply_pending_escalations(&self, tenant_id: &TenantId) {
        if let Err(e) = self.sweep(tenant_id, Utc::now()).await {
            tracing::warn!(tenant_id = %tenant_id, error = %e, "Escalation sweep failed");
        }
    }
}

/// Trigger used when a background ticker owns escalation
#[derive(Clone, Copy, Debug, Default)]
pub struct ScheduledEscalations;

#[async_trait]
impl EscalationTrigger for ScheduledEscalations {
    async fn apply_pending_escalations(&self, _tenant_id: &TenantId) {}
}

/// Runs the scanner for a fixed set of tenants on an interval
pub struct EscalationTicker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl EscalationTicker {
    pub fn spawn(
        scanner: Arc<EscalationScanner>,
        tenants: Vec<TenantId>,
        period: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                tenants = tenants.len(),
                period_secs = period.as_secs(),
                "Escalation ticker started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for tenant_id in &tenants {
                            scanner.apply_pending_escalations(tenant_id).await;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Escalation ticker stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the loop and wait for the current sweep to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Escalation ticker task ended abnormally");
        }
    }
}
