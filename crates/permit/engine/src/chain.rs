//! Approval chain engine: pure transitions over an ordered chain
//!
//! The engine never touches storage or side effects. Callers load the
//! permit, apply a transition here, then persist the whole aggregate.
//!
//! Chain shape while a permit awaits approval:
//!
//! ```text
//!   approved .. approved | pending/escalated | blocked .. blocked
//!   0                      k                   k+1       n-1
//! ```

use chrono::{DateTime, Duration, Utc};
use permit_types::{
    ApprovalStep, ApprovalStepSpec, DecisionKind, HistoryAction, HistoryEntry, Permit,
    PermitError, PermitResult, PermitStatus, StepDecision, StepStatus, UserId,
};

/// Result of applying a decision to a chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainOutcome {
    /// No active step; nothing changed
    Unchanged,
    /// A step was approved and the next one activated
    Advanced {
        approved: u32,
        activated: u32,
        /// Named user of the newly active step, if any
        assignee: Option<UserId>,
    },
    /// The last step was approved
    Completed { approved: u32 },
    /// The active step was rejected; the chain is finished
    Rejected { sequence: u32 },
}

impl ChainOutcome {
    /// Permit status implied by the outcome, `None` when unchanged
    pub fn permit_status(&self) -> Option<PermitStatus> {
        match self {
            ChainOutcome::Unchanged => None,
            ChainOutcome::Advanced { .. } => Some(PermitStatus::Pending),
            ChainOutcome::Completed { .. } => Some(PermitStatus::Approved),
            ChainOutcome::Rejected { .. } => Some(PermitStatus::Rejected),
        }
    }
}

/// Pure state transitions over an approval chain
#[derive(Clone, Debug, Default)]
pub struct ApprovalChainEngine;

impl ApprovalChainEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build a chain: step 0 pending with its own deadline, the rest blocked.
    pub fn initialize_chain(
        &self,
        specs: &[ApprovalStepSpec],
        now: DateTime<Utc>,
    ) -> Vec<ApprovalStep> {
        specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let first = i == 0;
                ApprovalStep {
                    sequence: i as u32,
                    role: spec.role.clone(),
                    user: spec.user.clone(),
                    status: if first {
                        StepStatus::Pending
                    } else {
                        StepStatus::Blocked
                    },
                    escalate_after_hours: spec.escalate_after_hours,
                    escalate_at: if first {
                        deadline(spec.escalate_after_hours, now)
                    } else {
                        None
                    },
                    approved_at: None,
                    acted_by: None,
                    notes: None,
                }
            })
            .collect()
    }

    /// Status of a freshly created permit. An empty chain gates nothing.
    pub fn initial_status(&self, chain: &[ApprovalStep]) -> PermitStatus {
        if chain.is_empty() {
            PermitStatus::Approved
        } else {
            PermitStatus::Pending
        }
    }

    /// Apply a decision to the active step.
    ///
    /// Returns [`ChainOutcome::Unchanged`] when no step is active; callers
    /// treat that as "already decided".
    pub fn advance(
        &self,
        chain: &mut [ApprovalStep],
        decision: &StepDecision,
        now: DateTime<Utc>,
    ) -> ChainOutcome {
        let Some(idx) = chain.iter().position(|s| s.status.is_active()) else {
            return ChainOutcome::Unchanged;
        };

        let sequence = {
            let step = &mut chain[idx];
            step.escalate_at = None;
            step.acted_by = Some(decision.acted_by.clone());
            step.notes = decision.notes.clone();
            step.sequence
        };

        match decision.kind {
            DecisionKind::Reject => {
                chain[idx].status = StepStatus::Rejected;
                ChainOutcome::Rejected { sequence }
            }
            DecisionKind::Approve => {
                chain[idx].status = StepStatus::Approved;
                chain[idx].approved_at = Some(now);

                let next = chain
                    .iter_mut()
                    .filter(|s| s.status == StepStatus::Blocked)
                    .min_by_key(|s| s.sequence);

                match next {
                    Some(step) => {
                        step.status = StepStatus::Pending;
                        step.escalate_at = deadline(step.escalate_after_hours, now);
                        ChainOutcome::Advanced {
                            approved: sequence,
                            activated: step.sequence,
                            assignee: step.user.clone(),
                        }
                    }
                    None => ChainOutcome::Completed { approved: sequence },
                }
            }
        }
    }

    /// Apply a decision to a permit: chain, status and history.
    ///
    /// A permit that is not awaiting approval is left untouched.
    pub fn apply_decision(
        &self,
        permit: &mut Permit,
        decision: &StepDecision,
        now: DateTime<Utc>,
    ) -> ChainOutcome {
        if !permit.status.is_awaiting_approval() {
            return ChainOutcome::Unchanged;
        }

        let outcome = self.advance(&mut permit.approval_chain, decision, now);
        let action = match &outcome {
            ChainOutcome::Unchanged => return outcome,
            ChainOutcome::Advanced { approved, .. } | ChainOutcome::Completed { approved } => {
                HistoryAction::StepApproved {
                    sequence: *approved,
                }
            }
            ChainOutcome::Rejected { sequence } => HistoryAction::Rejected {
                sequence: *sequence,
            },
        };

        if let Some(status) = outcome.permit_status() {
            permit.status = status;
        }
        permit.record(
            HistoryEntry::new(action, Some(decision.acted_by.clone()), now)
                .with_notes(decision.notes.clone()),
        );
        outcome
    }

    /// Escalate the pending step. Returns its sequence.
    pub fn escalate(&self, chain: &mut [ApprovalStep]) -> PermitResult<u32> {
        let step = chain
            .iter_mut()
            .find(|s| s.status == StepStatus::Pending)
            .ok_or(PermitError::NoPendingApprovals)?;
        step.status = StepStatus::Escalated;
        step.escalate_at = None;
        Ok(step.sequence)
    }

    /// Escalate a permit: pending step and permit status both become
    /// escalated, and a history entry is appended.
    ///
    /// `by` is `None` for scheduled escalation.
    pub fn escalate_permit(
        &self,
        permit: &mut Permit,
        by: Option<UserId>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> PermitResult<u32> {
        if !permit.status.is_awaiting_approval() {
            return Err(PermitError::NoPendingApprovals);
        }
        let sequence = self.escalate(&mut permit.approval_chain)?;
        permit.status = PermitStatus::Escalated;
        let automatic = by.is_none();
        permit.record(
            HistoryEntry::new(
                HistoryAction::Escalated {
                    sequence,
                    automatic,
                },
                by,
                now,
            )
            .with_notes(notes),
        );
        Ok(sequence)
    }
}

/// Escalation deadline for a step activated at `activated_at`.
///
/// `None` when the step has no window or the deadline is past the
/// representable range.
pub fn deadline(
    escalate_after_hours: Option<u32>,
    activated_at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    escalate_after_hours
        .and_then(|h| activated_at.checked_add_signed(Duration::hours(i64::from(h))))
}

/// Check the structural chain invariants for a permit in `status`.
///
/// - sequences are exactly `0..n` in order
/// - while awaiting approval with a non-empty chain: exactly one active
///   step, everything before it approved, everything after it blocked
/// - no step is active once the permit has left the approval phase
pub fn chain_is_consistent(status: PermitStatus, chain: &[ApprovalStep]) -> bool {
    let contiguous = chain
        .iter()
        .enumerate()
        .all(|(i, s)| s.sequence == i as u32);
    if !contiguous {
        return false;
    }

    let active: Vec<usize> = chain
        .iter()
        .enumerate()
        .filter(|(_, s)| s.status.is_active())
        .map(|(i, _)| i)
        .collect();

    if !status.is_awaiting_approval() {
        return active.is_empty();
    }
    if chain.is_empty() {
        return true;
    }

    match active.as_slice() {
        [idx] => {
            chain[..*idx].iter().all(|s| s.status == StepStatus::Approved)
                && chain[idx + 1..]
                    .iter()
                    .all(|s| s.status == StepStatus::Blocked)
        }
        _ => false,
    }
}
