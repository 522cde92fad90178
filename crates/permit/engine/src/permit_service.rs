//! Permit operations
//!
//! Each operation follows the same shape: tenant-scoped load, validation,
//! a pure transition (chain engine or field update), one whole-aggregate
//! save, then best-effort side effects. Nothing after the save can fail the
//! operation.

use crate::chain::{ApprovalChainEngine, ChainOutcome};
use crate::config::EngineConfig;
use crate::effects::{snapshot, SideEffects};
use crate::escalation::EscalationTrigger;
use crate::sinks::{AuditEntry, EntityType};
use chrono::{DateTime, Utc};
use permit_storage::{IncidentStore, PermitFilter, PermitStore, QueryWindow, StorageError};
use permit_types::{
    isolation_checklist, Actor, ApprovalStepSpec, HistoryAction, HistoryEntry, Incident,
    IncidentId, NewIncident, NewPermit, Permit, PermitError, PermitId, PermitPatch,
    PermitResult, PermitStatus, StepDecision, UserId, WorkOrderId, MAX_ESCALATE_AFTER_HOURS,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Criteria for [`PermitService::list_permits`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PermitQuery {
    pub statuses: Option<Vec<PermitStatus>>,
    pub permit_type: Option<String>,
    pub work_order: Option<WorkOrderId>,
    #[serde(default)]
    pub window: QueryWindow,
}

impl PermitQuery {
    fn into_filter(self, actor: &Actor) -> PermitFilter {
        let mut filter =
            PermitFilter::for_tenant(actor.tenant_id.clone()).with_window(self.window);
        if let Some(statuses) = self.statuses {
            filter = filter.with_statuses(statuses);
        }
        if let Some(permit_type) = self.permit_type {
            filter = filter.with_permit_type(permit_type);
        }
        if let Some(work_order) = self.work_order {
            filter = filter.with_work_order(work_order);
        }
        filter
    }
}

/// Orchestrates permit reads and mutations
pub struct PermitService {
    permits: Arc<dyn PermitStore>,
    incidents: Arc<dyn IncidentStore>,
    effects: SideEffects,
    escalations: Arc<dyn EscalationTrigger>,
    chain: ApprovalChainEngine,
    config: EngineConfig,
}

impl PermitService {
    pub fn new(
        permits: Arc<dyn PermitStore>,
        incidents: Arc<dyn IncidentStore>,
        effects: SideEffects,
        escalations: Arc<dyn EscalationTrigger>,
        config: EngineConfig,
    ) -> Self {
        Self {
            permits,
            incidents,
            effects,
            escalations,
            chain: ApprovalChainEngine::new(),
            config,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get_permit(&self, actor: &Actor, id: &PermitId) -> PermitResult<Permit> {
        self.escalations
            .apply_pending_escalations(&actor.tenant_id)
            .await;
        self.load(actor, id).await
    }

    /// Newest-updated first. Due escalations are applied before the query.
    pub async fn list_permits(
        &self,
        actor: &Actor,
        query: PermitQuery,
    ) -> PermitResult<Vec<Permit>> {
        self.escalations
            .apply_pending_escalations(&actor.tenant_id)
            .await;
        let filter = query.into_filter(actor);
        Ok(self.permits.find(&filter).await?)
    }

    pub async fn get_permit_history(
        &self,
        actor: &Actor,
        id: &PermitId,
    ) -> PermitResult<Vec<HistoryEntry>> {
        Ok(self.get_permit(actor, id).await?.history)
    }

    pub async fn list_permit_incidents(
        &self,
        actor: &Actor,
        id: &PermitId,
    ) -> PermitResult<Vec<Incident>> {
        let permit = self.load(actor, id).await?;
        Ok(self
            .incidents
            .list_for_permit(&actor.tenant_id, &permit.id)
            .await?)
    }

    // ── Creation and update ──────────────────────────────────────────

    /// Create a permit and initialise its approval chain.
    ///
    /// A caller-supplied permit number already used in the tenant is a
    /// validation error. A collision of a generated number surfaces as a
    /// conflict.
    pub async fn create_permit(&self, actor: &Actor, input: NewPermit) -> PermitResult<Permit> {
        validate_new_permit(&input)?;
        let now = Utc::now();
        let number_supplied = input.permit_number.is_some();

        let permit_number = match input.permit_number {
            Some(number) => number.trim().to_string(),
            None => generate_permit_number(&self.config.permit_number_prefix, now),
        };

        let specs: Vec<ApprovalStepSpec> = input
            .approval_chain
            .into_iter()
            .map(|mut spec| {
                if spec.escalate_after_hours.is_none() {
                    spec.escalate_after_hours = self.config.default_escalate_after_hours;
                }
                spec
            })
            .collect();
        let approval_chain = self.chain.initialize_chain(&specs, now);

        let mut permit = Permit {
            id: PermitId::generate(),
            tenant_id: actor.tenant_id.clone(),
            permit_number,
            permit_type: input.permit_type.trim().to_string(),
            description: input.description.trim().to_string(),
            status: self.chain.initial_status(&approval_chain),
            approval_chain,
            isolation_steps: isolation_checklist(input.isolation_steps),
            watchers: input.watchers,
            work_order: None,
            incidents: Vec::new(),
            history: Vec::new(),
            valid_from: input.valid_from,
            valid_to: input.valid_to,
            risk_level: input.risk_level,
            created_by: actor.user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        permit.record(HistoryEntry::new(
            HistoryAction::Created,
            Some(actor.user_id.clone()),
            now,
        ));

        let number = permit.permit_number.clone();
        let permit = self.permits.create(permit).await.map_err(|e| match e {
            StorageError::Conflict(_) if number_supplied => {
                PermitError::Validation(format!("Permit number {} is already in use", number))
            }
            other => other.into(),
        })?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            permit_id = %permit.id,
            permit_number = %permit.permit_number,
            status = %permit.status,
            steps = permit.approval_chain.len(),
            "Permit created"
        );

        if let Some(user) = permit.active_step().and_then(|s| s.user.as_ref()) {
            let message = format!("Permit {} awaits your approval", permit.permit_number);
            self.effects.notify(user, &message).await;
        }
        let message = format!("Permit {} was created", permit.permit_number);
        self.effects.notify_all(permit.watchers.iter(), &message).await;
        self.effects
            .publish("permit:created", permit_event(&permit))
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    actor.tenant_id.clone(),
                    Some(actor.user_id.clone()),
                    "permit.create",
                    EntityType::Permit,
                    &permit.id,
                )
                .with_after(snapshot(&permit)),
            )
            .await;

        Ok(permit)
    }

    /// Patch the mutable descriptive fields. Status and chain are untouched.
    pub async fn update_permit(
        &self,
        actor: &Actor,
        id: &PermitId,
        patch: PermitPatch,
    ) -> PermitResult<Permit> {
        if patch.is_empty() {
            return Err(PermitError::Validation("No fields to update".into()));
        }
        let mut permit = self.load(actor, id).await?;
        if permit.status.is_terminal() {
            return Err(PermitError::PermitFinalized(permit.status));
        }
        let before = snapshot(&permit);

        if let Some(permit_type) = patch.permit_type {
            permit.permit_type = non_blank("type", &permit_type)?;
        }
        if let Some(description) = patch.description {
            permit.description = non_blank("description", &description)?;
        }
        if let Some(risk_level) = patch.risk_level {
            permit.risk_level = risk_level;
        }
        if patch.valid_from.is_some() {
            permit.valid_from = patch.valid_from;
        }
        if patch.valid_to.is_some() {
            permit.valid_to = patch.valid_to;
        }
        validate_window(permit.valid_from, permit.valid_to)?;
        if let Some(watchers) = patch.watchers {
            permit.watchers = watchers;
        }
        if let Some(steps) = patch.isolation_steps {
            if permit.isolation_steps.iter().any(|s| s.completed) {
                return Err(PermitError::Validation(
                    "Isolation checklist cannot change once a step is completed".into(),
                ));
            }
            validate_isolation_steps(&steps)?;
            permit.isolation_steps = isolation_checklist(steps);
        }

        permit.record(HistoryEntry::new(
            HistoryAction::Updated,
            Some(actor.user_id.clone()),
            Utc::now(),
        ));
        self.permits.save(&permit).await?;

        tracing::info!(tenant_id = %actor.tenant_id, permit_id = %permit.id, "Permit updated");

        self.effects
            .publish("permit:updated", permit_event(&permit))
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    actor.tenant_id.clone(),
                    Some(actor.user_id.clone()),
                    "permit.update",
                    EntityType::Permit,
                    &permit.id,
                )
                .with_before(before)
                .with_after(snapshot(&permit)),
            )
            .await;

        Ok(permit)
    }

    // ── Approval chain ───────────────────────────────────────────────

    /// Approve the active step.
    ///
    /// A permit with no active step is returned unchanged: the approval
    /// has already been decided.
    pub async fn approve_permit(
        &self,
        actor: &Actor,
        id: &PermitId,
        notes: Option<String>,
    ) -> PermitResult<Permit> {
        let mut permit = self.load(actor, id).await?;
        if !permit.status.is_awaiting_approval() || permit.active_step().is_none() {
            tracing::debug!(
                permit_id = %permit.id,
                status = %permit.status,
                "Approve on decided permit ignored"
            );
            return Ok(permit);
        }
        authorize_decision(&permit, actor)?;

        let before = snapshot(&permit);
        let decision = StepDecision::approve(actor.user_id.clone()).with_notes(notes);
        let outcome = self.chain.apply_decision(&mut permit, &decision, Utc::now());
        self.permits.save(&permit).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            permit_id = %permit.id,
            status = %permit.status,
            "Permit approval step approved"
        );

        match &outcome {
            ChainOutcome::Advanced {
                assignee: Some(user),
                ..
            } => {
                let message = format!("Permit {} awaits your approval", permit.permit_number);
                self.effects.notify(user, &message).await;
            }
            ChainOutcome::Completed { .. } => {
                let message = format!("Permit {} has been approved", permit.permit_number);
                self.effects
                    .notify_all(stakeholders(&permit).iter(), &message)
                    .await;
            }
            _ => {}
        }
        self.record_decision(actor, "permit.approve", before, &permit)
            .await;

        Ok(permit)
    }

    /// Reject the active step. Terminal for the permit.
    pub async fn reject_permit(
        &self,
        actor: &Actor,
        id: &PermitId,
        notes: Option<String>,
    ) -> PermitResult<Permit> {
        let mut permit = self.load(actor, id).await?;
        authorize_decision(&permit, actor)?;

        let before = snapshot(&permit);
        let decision = StepDecision::reject(actor.user_id.clone()).with_notes(notes.clone());
        self.chain.apply_decision(&mut permit, &decision, Utc::now());
        self.permits.save(&permit).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            permit_id = %permit.id,
            "Permit rejected"
        );

        let message = match notes {
            Some(reason) => format!("Permit {} was rejected: {}", permit.permit_number, reason),
            None => format!("Permit {} was rejected", permit.permit_number),
        };
        self.effects
            .notify_all(stakeholders(&permit).iter(), &message)
            .await;
        self.record_decision(actor, "permit.reject", before, &permit)
            .await;

        Ok(permit)
    }

    /// Manually escalate the pending step
    pub async fn escalate_permit(
        &self,
        actor: &Actor,
        id: &PermitId,
        notes: Option<String>,
    ) -> PermitResult<Permit> {
        let mut permit = self.load(actor, id).await?;
        let before = snapshot(&permit);
        let sequence = self.chain.escalate_permit(
            &mut permit,
            Some(actor.user_id.clone()),
            notes,
            Utc::now(),
        )?;
        self.permits.save(&permit).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            permit_id = %permit.id,
            sequence,
            "Permit escalated manually"
        );

        let message = format!(
            "Permit {} was escalated by {}",
            permit.permit_number, actor.user_id
        );
        self.effects.notify_all(permit.watchers.iter(), &message).await;
        self.effects
            .publish(
                "permit:escalated",
                json!({
                    "permit_id": permit.id,
                    "sequence": sequence,
                    "automatic": false,
                }),
            )
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    actor.tenant_id.clone(),
                    Some(actor.user_id.clone()),
                    "permit.escalate",
                    EntityType::Permit,
                    &permit.id,
                )
                .with_before(before)
                .with_after(snapshot(&permit)),
            )
            .await;

        Ok(permit)
    }

    // ── Isolation and incidents ──────────────────────────────────────

    pub async fn complete_isolation_step(
        &self,
        actor: &Actor,
        id: &PermitId,
        index: u32,
        verification_notes: Option<String>,
    ) -> PermitResult<Permit> {
        let mut permit = self.load(actor, id).await?;
        if permit.status.is_terminal() {
            return Err(PermitError::PermitFinalized(permit.status));
        }
        let before = snapshot(&permit);
        let now = Utc::now();

        let step = permit
            .isolation_steps
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| {
                PermitError::Validation(format!("Isolation step {} does not exist", index))
            })?;
        if step.completed {
            return Err(PermitError::Validation(format!(
                "Isolation step {} is already completed",
                index
            )));
        }
        step.complete(actor.user_id.clone(), verification_notes.clone(), now);
        permit.record(
            HistoryEntry::new(
                HistoryAction::IsolationStepCompleted { index },
                Some(actor.user_id.clone()),
                now,
            )
            .with_notes(verification_notes),
        );
        self.permits.save(&permit).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            permit_id = %permit.id,
            index,
            remaining = permit.open_isolation_steps().count(),
            "Isolation step completed"
        );

        if permit.isolation_complete() {
            let message = format!(
                "All isolation steps on permit {} are complete",
                permit.permit_number
            );
            self.effects.notify_all(permit.watchers.iter(), &message).await;
        }
        self.effects
            .publish("permit:updated", permit_event(&permit))
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    actor.tenant_id.clone(),
                    Some(actor.user_id.clone()),
                    "permit.isolation_step.complete",
                    EntityType::Permit,
                    &permit.id,
                )
                .with_before(before)
                .with_after(snapshot(&permit)),
            )
            .await;

        Ok(permit)
    }

    pub async fn log_permit_incident(
        &self,
        actor: &Actor,
        id: &PermitId,
        input: NewIncident,
    ) -> PermitResult<Incident> {
        let description = non_blank("incident description", &input.description)?;
        let mut permit = self.load(actor, id).await?;
        let now = Utc::now();

        let incident = self
            .incidents
            .create(Incident {
                id: IncidentId::generate(),
                tenant_id: actor.tenant_id.clone(),
                permit_id: permit.id.clone(),
                description,
                severity: input.severity,
                reported_by: actor.user_id.clone(),
                reported_at: now,
            })
            .await?;

        permit.incidents.push(incident.id.clone());
        permit.record(HistoryEntry::new(
            HistoryAction::IncidentLogged {
                incident_id: incident.id.clone(),
            },
            Some(actor.user_id.clone()),
            now,
        ));
        self.permits.save(&permit).await?;

        tracing::info!(
            tenant_id = %actor.tenant_id,
            permit_id = %permit.id,
            incident_id = %incident.id,
            severity = ?incident.severity,
            "Incident logged against permit"
        );

        let message = format!(
            "Incident reported on permit {}: {}",
            permit.permit_number, incident.description
        );
        self.effects.notify_all(permit.watchers.iter(), &message).await;
        self.effects
            .publish(
                "permit:incident",
                json!({
                    "permit_id": permit.id,
                    "incident_id": incident.id,
                    "severity": incident.severity,
                }),
            )
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    actor.tenant_id.clone(),
                    Some(actor.user_id.clone()),
                    "permit.incident.log",
                    EntityType::Incident,
                    &incident.id,
                )
                .with_after(snapshot(&incident)),
            )
            .await;

        Ok(incident)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn load(&self, actor: &Actor, id: &PermitId) -> PermitResult<Permit> {
        self.permits
            .find_one(&actor.tenant_id, id)
            .await?
            .ok_or_else(|| PermitError::PermitNotFound(id.clone()))
    }

    async fn record_decision(
        &self,
        actor: &Actor,
        action: &str,
        before: Option<serde_json::Value>,
        permit: &Permit,
    ) {
        self.effects
            .publish("permit:updated", permit_event(permit))
            .await;
        self.effects
            .audit(
                AuditEntry::new(
                    actor.tenant_id.clone(),
                    Some(actor.user_id.clone()),
                    action,
                    EntityType::Permit,
                    &permit.id,
                )
                .with_before(before)
                .with_after(snapshot(permit)),
            )
            .await;
    }
}

/// The actor must hold authority over the permit's active step
fn authorize_decision(permit: &Permit, actor: &Actor) -> PermitResult<()> {
    let step = permit
        .active_step()
        .filter(|_| permit.status.is_awaiting_approval())
        .ok_or(PermitError::NoPendingApprovals)?;
    if step.authorizes(actor) {
        Ok(())
    } else {
        Err(PermitError::Unauthorized(format!(
            "{} may not decide approval step {} of permit {}",
            actor.user_id, step.sequence, permit.permit_number
        )))
    }
}

/// `{prefix}-{epochMillis}-{0..999}`; collision-resistant, not unique
pub fn generate_permit_number(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("{}-{}-{}", prefix, now.timestamp_millis(), suffix)
}

fn permit_event(permit: &Permit) -> serde_json::Value {
    json!({
        "permit_id": permit.id,
        "permit_number": permit.permit_number,
        "status": permit.status,
    })
}

/// Watchers plus the author
fn stakeholders(permit: &Permit) -> BTreeSet<UserId> {
    let mut users = permit.watchers.clone();
    users.insert(permit.created_by.clone());
    users
}

fn non_blank(field: &str, value: &str) -> PermitResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PermitError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn validate_window(
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
) -> PermitResult<()> {
    match (valid_from, valid_to) {
        (Some(from), Some(to)) if from >= to => Err(PermitError::Validation(
            "validFrom must be before validTo".into(),
        )),
        _ => Ok(()),
    }
}

fn validate_isolation_steps(steps: &[String]) -> PermitResult<()> {
    if steps.iter().any(|s| s.trim().is_empty()) {
        return Err(PermitError::Validation(
            "Isolation step descriptions must not be empty".into(),
        ));
    }
    Ok(())
}

fn validate_new_permit(input: &NewPermit) -> PermitResult<()> {
    non_blank("type", &input.permit_type)?;
    non_blank("description", &input.description)?;
    if let Some(number) = &input.permit_number {
        non_blank("permit number", number)?;
    }
    validate_window(input.valid_from, input.valid_to)?;
    validate_isolation_steps(&input.isolation_steps)?;

    for (i, spec) in input.approval_chain.iter().enumerate() {
        let has_role = spec.role.as_deref().is_some_and(|r| !r.trim().is_empty());
        let has_user = spec.user.as_ref().is_some_and(|u| !u.as_str().trim().is_empty());
        if !has_role && !has_user {
            return Err(PermitError::Validation(format!(
                "Approval step {} must name a user or a role",
                i
            )));
        }
        match spec.escalate_after_hours {
            Some(0) => {
                return Err(PermitError::Validation(format!(
                    "Approval step {} escalation window must be positive",
                    i
                )));
            }
            Some(hours) if hours > MAX_ESCALATE_AFTER_HOURS => {
                return Err(PermitError::Validation(format!(
                    "Approval step {} escalation window exceeds {} hours",
                    i, MAX_ESCALATE_AFTER_HOURS
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
