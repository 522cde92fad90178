//! Approval chain steps

use crate::{Actor, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one approval step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for an earlier step to be approved
    Blocked,
    /// The live step; a decision is expected
    Pending,
    Approved,
    Rejected,
    /// Deadline passed (or manually escalated) while still undecided
    Escalated,
}

impl StepStatus {
    /// Whether the step is the chain's live step and can still be decided
    pub fn is_active(&self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::Escalated)
    }
}

/// Who may decide a step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepAuthority<'a> {
    /// A named user; takes precedence over any role
    User(&'a UserId),
    Role(&'a str),
    /// Neither user nor role set. Nobody is authorised.
    Unassigned,
}

/// One link of a permit's approval chain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    /// Position in the chain, 0-based, fixed at creation
    pub sequence: u32,
    pub role: Option<String>,
    pub user: Option<UserId>,
    pub status: StepStatus,
    pub escalate_after_hours: Option<u32>,
    /// Deadline after which the step escalates; only set while pending
    pub escalate_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub acted_by: Option<UserId>,
    pub notes: Option<String>,
}

impl ApprovalStep {
    pub fn authority(&self) -> StepAuthority<'_> {
        match (&self.user, &self.role) {
            (Some(user), _) => StepAuthority::User(user),
            (None, Some(role)) => StepAuthority::Role(role.as_str()),
            (None, None) => StepAuthority::Unassigned,
        }
    }

    /// Whether `actor` may approve or reject this step
    pub fn authorizes(&self, actor: &Actor) -> bool {
        match self.authority() {
            StepAuthority::User(user) => *user == actor.user_id,
            StepAuthority::Role(role) => actor.has_role(role),
            StepAuthority::Unassigned => false,
        }
    }

    /// Whether the step is pending and its deadline is at or before `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == StepStatus::Pending && self.escalate_at.is_some_and(|at| at <= now)
    }
}

/// Longest accepted escalation window: one year
pub const MAX_ESCALATE_AFTER_HOURS: u32 = 24 * 365;

/// Caller-supplied step definition used when a permit is created
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStepSpec {
    pub role: Option<String>,
    pub user: Option<UserId>,
    pub escalate_after_hours: Option<u32>,
}

impl ApprovalStepSpec {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    pub fn user(user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn escalate_after(mut self, hours: u32) -> Self {
        self.escalate_after_hours = Some(hours);
        self
    }
}

/// A decision on the active step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Reject,
}

/// Decision input for the chain engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepDecision {
    pub kind: DecisionKind,
    pub acted_by: UserId,
    pub notes: Option<String>,
}

impl StepDecision {
    pub fn approve(acted_by: UserId) -> Self {
        Self {
            kind: DecisionKind::Approve,
            acted_by,
            notes: None,
        }
    }

    pub fn reject(acted_by: UserId) -> Self {
        Self {
            kind: DecisionKind::Reject,
            acted_by,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}
