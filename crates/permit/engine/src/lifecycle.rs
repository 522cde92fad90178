//! Work-order lifecycle gated by permit readiness
//!
//! ```text
//! requested ──assign──▶ assigned ──start──▶ in_progress ──complete──▶ completed
//!     │                    │                     │
//!     └───────────────cancel────────────────────┴──────────▶ cancelled
//! ```
//!
//! `approval_status` is orthogonal to the status above and gates `assign`.
//! Transitions that write both permits and the work order go through the
//! intent log so a half-applied write can be replayed. Replay only writes
//! onto aggregates nothing else has touched since.

use crate::effects::{snapshot, SideEffects};
use crate::readiness::{ReadinessGate, ReadinessStage};
use crate::sinks::{AuditEntry, EntityType};
use chrono::Utc;
use permit_storage::{
    BaseVersions, DualWriteIntent, ImageState, IntentLog, PermitStore, WorkOrderFilter,
    WorkOrderStore,
};
use permit_types::{
    Actor, ApprovalStatus, CompletionReport, HistoryAction, HistoryEntry, Permit, PermitError,
    PermitId, PermitResult, PermitStatus, UserId, WorkOrder, WorkOrderId, WorkOrderStatus,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A gated work-order transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkOrderTransition {
    Approve,
    Reject,
    Assign,
    Start,
    Complete,
    Cancel,
}

impl WorkOrderTransition {
    /// Readiness stage the transition must pass
    pub fn stage(&self) -> ReadinessStage {
        match self {
            WorkOrderTransition::Complete => ReadinessStage::Complete,
            _ => ReadinessStage::Start,
        }
    }

    pub fn allowed_from(&self, status: WorkOrderStatus) -> bool {
        match self {
            WorkOrderTransition::Assign => {
                matches!(status, WorkOrderStatus::Requested | WorkOrderStatus::Assigned)
            }
            WorkOrderTransition::Start => status == WorkOrderStatus::Assigned,
            WorkOrderTransition::Complete => status == WorkOrderStatus::InProgress,
            WorkOrderTransition::Approve
            | WorkOrderTransition::Reject
            | WorkOrderTransition::Cancel => !status.is_terminal(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkOrderTransition::Approve => "approve",
            WorkOrderTransition::Reject => "reject",
            WorkOrderTransition::Assign => "assign",
            WorkOrderTransition::Start => "start",
            WorkOrderTransition::Complete => "complete",
            WorkOrderTransition::Cancel => "cancel",
        }
    }
}

impl fmt::Display for WorkOrderTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Orchestrates work-order transitions against the readiness gate
pub struct WorkOrderLifecycle {
    work_orders: Arc<dyn WorkOrderStore>,
    permits: Arc<dyn PermitStore>,
    intents: Arc<dyn IntentLog>,
    gate: ReadinessGate,
    effects: SideEffects,
}

impl WorkOrderLifecycle {
    pub fn new(
        work_orders: Arc<dyn WorkOrderStore>,
        permits: Arc<dyn PermitStore>,
        intents: Arc<dyn IntentLog>,
        effects: SideEffects,
    ) -> Self {
        Self {
            gate: ReadinessGate::new(permits.clone()),
            work_orders,
            permits,
            intents,
            effects,
        }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub async fn get_work_order(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
    ) -> PermitResult<WorkOrder> {
        self.load(actor, id).await
    }

    // ── Approval sub-state ───────────────────────────────────────────

    pub async fn approve_work_order(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
        notes: Option<String>,
    ) -> PermitResult<WorkOrder> {
        self.decide(actor, id, WorkOrderTransition::Approve, notes)
            .await
    }

    pub async fn reject_work_order(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
        notes: Option<String>,
    ) -> PermitResult<WorkOrder> {
        self.decide(actor, id, WorkOrderTransition::Reject, notes)
            .await
    }

    async fn decide(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
        transition: WorkOrderTransition,
        notes: Option<String>,
    ) -> PermitResult<WorkOrder> {
        let mut work_order = self.load(actor, id).await?;
        ensure_transition(&work_order, transition)?;
        self.ensure_ready(&work_order, transition).await?;

        let before = snapshot(&work_order);
        work_order.approval_status = match transition {
            WorkOrderTransition::Reject => ApprovalStatus::Rejected,
            _ => ApprovalStatus::Approved,
        };
        work_order.approved_by = Some(actor.user_id.clone());
        work_order.approval_notes = notes;
        work_order.updated_at = Utc::now();
        self.work_orders.save(&work_order).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            work_order_id = %work_order.id,
            approval_status = ?work_order.approval_status,
            "Work order approval decided"
        );

        let verdict = match work_order.approval_status {
            ApprovalStatus::Rejected => "rejected",
            _ => "approved",
        };
        let message = format!("Work order '{}' was {}", work_order.title, verdict);
        self.effects
            .notify_all(interested(&work_order).iter(), &message)
            .await;
        self.after_transition(actor, transition, before, &work_order)
            .await;

        Ok(work_order)
    }

    // ── Status transitions ───────────────────────────────────────────

    pub async fn assign_work_order(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
        assignees: Vec<UserId>,
    ) -> PermitResult<WorkOrder> {
        let assignees = normalize_assignees(assignees)?;
        let mut work_order = self.load(actor, id).await?;
        let transition = WorkOrderTransition::Assign;
        ensure_transition(&work_order, transition)?;
        if work_order.approval_status != ApprovalStatus::Approved {
            return Err(PermitError::InvalidTransition {
                from: work_order.status,
                reason: "work order must be approved before assignment".into(),
            });
        }
        self.ensure_ready(&work_order, transition).await?;

        let before = snapshot(&work_order);
        let newly_assigned: Vec<UserId> = assignees
            .iter()
            .filter(|u| !work_order.assignees.contains(*u))
            .cloned()
            .collect();
        work_order.status = WorkOrderStatus::Assigned;
        work_order.assignees = assignees;
        work_order.updated_at = Utc::now();
        self.work_orders.save(&work_order).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            work_order_id = %work_order.id,
            assignees = work_order.assignees.len(),
            "Work order assigned"
        );

        let message = format!("You have been assigned to work order '{}'", work_order.title);
        self.effects
            .notify_all(newly_assigned.iter(), &message)
            .await;
        self.after_transition(actor, transition, before, &work_order)
            .await;

        Ok(work_order)
    }

    /// Start work: linked `approved` permits become `active`.
    pub async fn start_work_order(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
    ) -> PermitResult<WorkOrder> {
        let mut work_order = self.load(actor, id).await?;
        let transition = WorkOrderTransition::Start;
        ensure_transition(&work_order, transition)?;
        let permits = self.ensure_ready(&work_order, transition).await?;

        let now = Utc::now();
        let base = BaseVersions::capture(&permits, &work_order);
        let before = snapshot(&work_order);
        let touched: Vec<Permit> = permits
            .into_iter()
            .filter(|p| p.status == PermitStatus::Approved)
            .map(|mut p| {
                p.status = PermitStatus::Active;
                p.record(HistoryEntry::new(
                    HistoryAction::WorkOrderStarted {
                        work_order_id: work_order.id.clone(),
                    },
                    Some(actor.user_id.clone()),
                    now,
                ));
                p
            })
            .collect();

        work_order.status = WorkOrderStatus::InProgress;
        work_order.started_at = Some(now);
        work_order.updated_at = now;
        self.commit(transition.name(), base, &touched, &work_order)
            .await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            work_order_id = %work_order.id,
            permits_activated = touched.len(),
            "Work order started"
        );

        self.publish_permit_changes(&touched).await;
        let message = format!("Work started on work order '{}'", work_order.title);
        self.effects
            .notify_all(interested(&work_order).iter(), &message)
            .await;
        self.after_transition(actor, transition, before, &work_order)
            .await;

        Ok(work_order)
    }

    /// Complete work: linked permits are closed and the report recorded.
    pub async fn complete_work_order(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
        report: CompletionReport,
    ) -> PermitResult<WorkOrder> {
        validate_completion(&report)?;
        let mut work_order = self.load(actor, id).await?;
        let transition = WorkOrderTransition::Complete;
        ensure_transition(&work_order, transition)?;
        let permits = self.ensure_ready(&work_order, transition).await?;

        let now = Utc::now();
        let base = BaseVersions::capture(&permits, &work_order);
        let before = snapshot(&work_order);
        let touched: Vec<Permit> = permits
            .into_iter()
            .filter(|p| matches!(p.status, PermitStatus::Active | PermitStatus::Approved))
            .map(|mut p| {
                p.status = PermitStatus::Closed;
                p.record(HistoryEntry::new(
                    HistoryAction::WorkOrderCompleted {
                        work_order_id: work_order.id.clone(),
                    },
                    Some(actor.user_id.clone()),
                    now,
                ));
                p
            })
            .collect();

        work_order.status = WorkOrderStatus::Completed;
        work_order.completed_at = Some(now);
        work_order.completion = Some(report);
        work_order.updated_at = now;
        self.commit(transition.name(), base, &touched, &work_order)
            .await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            work_order_id = %work_order.id,
            permits_closed = touched.len(),
            "Work order completed"
        );

        self.publish_permit_changes(&touched).await;
        let message = format!("Work order '{}' was completed", work_order.title);
        self.effects
            .notify_all(interested(&work_order).iter(), &message)
            .await;
        self.after_transition(actor, transition, before, &work_order)
            .await;

        Ok(work_order)
    }

    pub async fn cancel_work_order(
        &self,
        actor: &Actor,
        id: &WorkOrderId,
        reason: Option<String>,
    ) -> PermitResult<WorkOrder> {
        let mut work_order = self.load(actor, id).await?;
        let transition = WorkOrderTransition::Cancel;
        ensure_transition(&work_order, transition)?;
        self.ensure_ready(&work_order, transition).await?;

        let before = snapshot(&work_order);
        work_order.status = WorkOrderStatus::Cancelled;
        work_order.cancellation_reason = reason;
        work_order.updated_at = Utc::now();
        self.work_orders.save(&work_order).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            work_order_id = %work_order.id,
            "Work order cancelled"
        );

        let message = format!("Work order '{}' was cancelled", work_order.title);
        self.effects
            .notify_all(interested(&work_order).iter(), &message)
            .await;
        self.after_transition(actor, transition, before, &work_order)
            .await;

        Ok(work_order)
    }

    // ── Permit links ─────────────────────────────────────────────────

    /// Link a permit. Linking an already linked pair is a no-op.
    pub async fn link_permit(
        &self,
        actor: &Actor,
        work_order_id: &WorkOrderId,
        permit_id: &PermitId,
    ) -> PermitResult<WorkOrder> {
        let mut work_order = self.load(actor, work_order_id).await?;
        let mut permit = self.load_permit(actor, permit_id).await?;

        if work_order.status.is_terminal() {
            return Err(PermitError::InvalidTransition {
                from: work_order.status,
                reason: "permits cannot be linked to a closed work order".into(),
            });
        }
        match &permit.work_order {
            Some(existing) if existing != &work_order.id => {
                return Err(PermitError::Validation(format!(
                    "Permit {} is already linked to work order {}",
                    permit.permit_number, existing
                )));
            }
            Some(_) if work_order.permits.contains(&permit.id) => return Ok(work_order),
            _ => {}
        }
        self.ensure_not_linked_elsewhere(actor, &work_order, &permit)
            .await?;

        let now = Utc::now();
        let base = BaseVersions::capture(std::slice::from_ref(&permit), &work_order);
        let before = snapshot(&work_order);
        work_order.permits.insert(permit.id.clone());
        work_order.updated_at = now;
        permit.work_order = Some(work_order.id.clone());
        permit.record(HistoryEntry::new(
            HistoryAction::WorkOrderLinked {
                work_order_id: work_order.id.clone(),
            },
            Some(actor.user_id.clone()),
            now,
        ));
        let permits = vec![permit];
        self.commit("link", base, &permits, &work_order).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            work_order_id = %work_order.id,
            permit_id = %permit_id,
            "Permit linked to work order"
        );

        self.publish_permit_changes(&permits).await;
        self.audit_work_order(actor, "workorder.link_permit", before, &work_order)
            .await;

        Ok(work_order)
    }

    pub async fn unlink_permit(
        &self,
        actor: &Actor,
        work_order_id: &WorkOrderId,
        permit_id: &PermitId,
    ) -> PermitResult<WorkOrder> {
        let mut work_order = self.load(actor, work_order_id).await?;
        if !work_order.permits.contains(permit_id) {
            return Err(PermitError::Validation(format!(
                "Permit {} is not linked to work order {}",
                permit_id, work_order.id
            )));
        }
        let mut permit = self.load_permit(actor, permit_id).await?;

        let now = Utc::now();
        let base = BaseVersions::capture(std::slice::from_ref(&permit), &work_order);
        let before = snapshot(&work_order);
        work_order.permits.remove(permit_id);
        work_order.updated_at = now;
        if permit.work_order.as_ref() == Some(&work_order.id) {
            permit.work_order = None;
        }
        permit.record(HistoryEntry::new(
            HistoryAction::WorkOrderUnlinked {
                work_order_id: work_order.id.clone(),
            },
            Some(actor.user_id.clone()),
            now,
        ));
        let permits = vec![permit];
        self.commit("unlink", base, &permits, &work_order).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            work_order_id = %work_order.id,
            permit_id = %permit_id,
            "Permit unlinked from work order"
        );

        self.publish_permit_changes(&permits).await;
        self.audit_work_order(actor, "workorder.unlink_permit", before, &work_order)
            .await;

        Ok(work_order)
    }

    // ── Intent log ───────────────────────────────────────────────────

    /// Resolve every pending intent of the actor's tenant, oldest first.
    ///
    /// An intent whose aggregates are all either already written or still
    /// at their base version is applied. If any aggregate has moved on since,
    /// the intent is marked superseded and nothing is written. Returns how
    /// many intents were applied. Stops at the first failing write and leaves
    /// that intent and the rest pending.
    pub async fn replay_pending_intents(&self, actor: &Actor) -> PermitResult<usize> {
        let pending = self.intents.pending(&actor.tenant_id).await?;
        let mut applied = 0;
        for intent in pending {
            if self.apply_intent(&intent).await? {
                self.intents
                    .mark_applied(&intent.tenant_id, &intent.id, Utc::now())
                    .await?;
                tracing::info!(
                    tenant_id = %intent.tenant_id,
                    intent_id = %intent.id,
                    transition = %intent.transition,
                    "Replayed pending dual-write intent"
                );
                applied += 1;
            } else {
                self.intents
                    .mark_superseded(&intent.tenant_id, &intent.id, Utc::now())
                    .await?;
                tracing::warn!(
                    tenant_id = %intent.tenant_id,
                    intent_id = %intent.id,
                    transition = %intent.transition,
                    work_order_id = %intent.work_order.id,
                    "Dual-write intent superseded by a later write"
                );
            }
        }
        Ok(applied)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn load(&self, actor: &Actor, id: &WorkOrderId) -> PermitResult<WorkOrder> {
        self.work_orders
            .find_one(&actor.tenant_id, id)
            .await?
            .ok_or_else(|| PermitError::WorkOrderNotFound(id.clone()))
    }

    async fn load_permit(&self, actor: &Actor, id: &PermitId) -> PermitResult<Permit> {
        self.permits
            .find_one(&actor.tenant_id, id)
            .await?
            .ok_or_else(|| PermitError::PermitNotFound(id.clone()))
    }

    async fn ensure_ready(
        &self,
        work_order: &WorkOrder,
        transition: WorkOrderTransition,
    ) -> PermitResult<Vec<Permit>> {
        let report = self
            .gate
            .ensure_readiness(
                &work_order.tenant_id,
                &work_order.permit_ids(),
                &work_order.required_permit_types,
                transition.stage(),
            )
            .await?;
        if let Some(message) = report.message() {
            tracing::debug!(
                work_order_id = %work_order.id,
                transition = %transition,
                reason = %message,
                "Readiness gate refused transition"
            );
        }
        report.into_result()
    }

    /// Record the intent, write every permit, then the work order.
    async fn commit(
        &self,
        transition: &str,
        base: BaseVersions,
        permits: &[Permit],
        work_order: &WorkOrder,
    ) -> PermitResult<()> {
        if permits.is_empty() {
            self.work_orders.save(work_order).await?;
            return Ok(());
        }

        let intent = DualWriteIntent::new(transition, base, permits.to_vec(), work_order.clone());
        let intent_id = intent.id.clone();
        self.intents.record(intent).await?;

        for permit in permits {
            self.permits.save(permit).await?;
        }
        self.work_orders.save(work_order).await?;

        if let Err(e) = self
            .intents
            .mark_applied(&work_order.tenant_id, &intent_id, Utc::now())
            .await
        {
            // Both aggregates are written; a replay finds every image landed.
            tracing::warn!(
                intent_id = %intent_id,
                error = %e,
                "Failed to mark dual-write intent applied"
            );
        }
        Ok(())
    }

    /// Write the images still behind. `false` when the intent is superseded.
    async fn apply_intent(&self, intent: &DualWriteIntent) -> PermitResult<bool> {
        let tenant_id = &intent.tenant_id;
        let mut behind = Vec::new();
        for image in &intent.permits {
            let stored = self.permits.find_one(tenant_id, &image.id).await?;
            let base = intent.base.permits.get(&image.id).copied();
            match ImageState::of(stored.as_ref(), image, base, |p| p.updated_at) {
                ImageState::Landed => {}
                ImageState::Behind => behind.push(image),
                ImageState::Diverged => return Ok(false),
            }
        }
        let stored = self
            .work_orders
            .find_one(tenant_id, &intent.work_order.id)
            .await?;
        let work_order_state = ImageState::of(
            stored.as_ref(),
            &intent.work_order,
            Some(intent.base.work_order),
            |w| w.updated_at,
        );
        if work_order_state == ImageState::Diverged {
            return Ok(false);
        }

        for image in behind {
            self.permits.save(image).await?;
        }
        if work_order_state == ImageState::Behind {
            self.work_orders.save(&intent.work_order).await?;
        }
        Ok(true)
    }

    /// Reject a link when another work order already lists the permit,
    /// even if the permit's own back-reference was lost.
    async fn ensure_not_linked_elsewhere(
        &self,
        actor: &Actor,
        work_order: &WorkOrder,
        permit: &Permit,
    ) -> PermitResult<()> {
        let filter =
            WorkOrderFilter::for_tenant(actor.tenant_id.clone()).linking(permit.id.clone());
        let owners = self.work_orders.find(&filter).await?;
        match owners.iter().find(|w| w.id != work_order.id) {
            Some(other) => Err(PermitError::Validation(format!(
                "Permit {} is already linked to work order {}",
                permit.permit_number, other.id
            ))),
            None => Ok(()),
        }
    }

    async fn publish_permit_changes(&self, permits: &[Permit]) {
        for permit in permits {
            self.effects
                .publish(
                    "permit:updated",
                    json!({
                        "permit_id": permit.id,
                        "permit_number": permit.permit_number,
                        "status": permit.status,
                    }),
                )
                .await;
        }
    }

    async fn after_transition(
        &self,
        actor: &Actor,
        transition: WorkOrderTransition,
        before: Option<serde_json::Value>,
        work_order: &WorkOrder,
    ) {
        let action = format!("workorder.{}", transition.name());
        self.audit_work_order(actor, &action, before, work_order)
            .await;
    }

    async fn audit_work_order(
        &self,
        actor: &Actor,
        action: &str,
        before: Option<serde_json::Value>,
        work_order: &WorkOrder,
    ) {
        self.effects
            .publish(
                "workorder:updated",
                json!({
                    "work_order_id": work_order.id,
                    "status": work_order.status,
                    "approval_status": work_order.approval_status,
                    "action": action,
                }),
            )
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    actor.tenant_id.clone(),
                    Some(actor.user_id.clone()),
                    action,
                    EntityType::WorkOrder,
                    &work_order.id,
                )
                .with_before(before)
                .with_after(snapshot(work_order)),
            )
            .await;
    }
}

fn ensure_transition(work_order: &WorkOrder, transition: WorkOrderTransition) -> PermitResult<()> {
    if transition.allowed_from(work_order.status) {
        Ok(())
    } else {
        Err(PermitError::InvalidTransition {
            from: work_order.status,
            reason: format!("cannot {} a {} work order", transition, work_order.status),
        })
    }
}

/// Trim, drop blanks, de-duplicate keeping first occurrence
pub fn normalize_assignees(assignees: Vec<UserId>) -> PermitResult<Vec<UserId>> {
    let mut seen = BTreeSet::new();
    let normalized: Vec<UserId> = assignees
        .into_iter()
        .map(|u| UserId::new(u.as_str().trim()))
        .filter(|u| !u.as_str().is_empty())
        .filter(|u| seen.insert(u.clone()))
        .collect();
    if normalized.is_empty() {
        return Err(PermitError::Validation(
            "At least one assignee is required".into(),
        ));
    }
    Ok(normalized)
}

fn validate_completion(report: &CompletionReport) -> PermitResult<()> {
    if let Some(part) = report
        .parts_used
        .iter()
        .find(|p| p.part_id.trim().is_empty() || p.quantity == 0)
    {
        return Err(PermitError::Validation(format!(
            "Part usage '{}' needs a part id and a positive quantity",
            part.part_id
        )));
    }
    if report.checklist.iter().any(|c| c.label.trim().is_empty()) {
        return Err(PermitError::Validation(
            "Checklist items need a label".into(),
        ));
    }
    Ok(())
}

/// Assignees plus the requester
fn interested(work_order: &WorkOrder) -> BTreeSet<UserId> {
    let mut users: BTreeSet<UserId> = work_order.assignees.iter().cloned().collect();
    if let Some(requester) = &work_order.requested_by {
        users.insert(requester.clone());
    }
    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use permit_types::{PartUsage, TenantId};

    #[test]
    fn test_transition_table() {
        use WorkOrderStatus::*;
        let t = WorkOrderTransition::Assign;
        assert!(t.allowed_from(Requested));
        assert!(t.allowed_from(Assigned));
        assert!(!t.allowed_from(InProgress));

        assert!(WorkOrderTransition::Start.allowed_from(Assigned));
        assert!(!WorkOrderTransition::Start.allowed_from(Requested));
        assert!(WorkOrderTransition::Complete.allowed_from(InProgress));
        assert!(!WorkOrderTransition::Complete.allowed_from(Assigned));

        for status in [Requested, Assigned, InProgress] {
            assert!(WorkOrderTransition::Cancel.allowed_from(status));
        }
        for status in [Completed, Cancelled] {
            assert!(!WorkOrderTransition::Cancel.allowed_from(status));
            assert!(!WorkOrderTransition::Approve.allowed_from(status));
        }
    }

    #[test]
    fn test_only_complete_uses_complete_stage() {
        assert_eq!(
            WorkOrderTransition::Complete.stage(),
            ReadinessStage::Complete
        );
        for t in [
            WorkOrderTransition::Approve,
            WorkOrderTransition::Reject,
            WorkOrderTransition::Assign,
            WorkOrderTransition::Start,
            WorkOrderTransition::Cancel,
        ] {
            assert_eq!(t.stage(), ReadinessStage::Start);
        }
    }

    #[test]
    fn test_normalize_assignees() {
        let users = vec![
            UserId::new(" alice "),
            UserId::new(""),
            UserId::new("bob"),
            UserId::new("alice"),
        ];
        assert_eq!(
            normalize_assignees(users).unwrap(),
            vec![UserId::new("alice"), UserId::new("bob")]
        );
        let err = normalize_assignees(vec![UserId::new("  ")]).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_completion_validation() {
        let report = CompletionReport {
            parts_used: vec![PartUsage {
                part_id: "seal-kit".into(),
                quantity: 0,
            }],
            ..CompletionReport::default()
        };
        assert!(validate_completion(&report).is_err());
        assert!(validate_completion(&CompletionReport::default()).is_ok());
    }

    #[test]
    fn test_illegal_transition_is_conflict() {
        let wo = WorkOrder::new(TenantId::new("t"), "Fix pump");
        let err = ensure_transition(&wo, WorkOrderTransition::Start).unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("cannot start a requested work order"));
    }
}
