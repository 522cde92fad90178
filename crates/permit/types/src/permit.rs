//! The permit aggregate

use crate::{
    ApprovalStep, ApprovalStepSpec, HistoryEntry, IncidentId, IsolationStep, PermitId, StepStatus,
    TenantId, UserId, WorkOrderId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Permit lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
    /// Work under the permit has started
    Active,
    /// Work under the permit is complete
    Closed,
}

impl PermitStatus {
    /// Still moving through the approval chain
    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self, PermitStatus::Pending | PermitStatus::Escalated)
    }

    /// No further transitions apply
    pub fn is_terminal(&self) -> bool {
        matches!(self, PermitStatus::Rejected | PermitStatus::Closed)
    }
}

impl fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermitStatus::Pending => "pending",
            PermitStatus::Approved => "approved",
            PermitStatus::Rejected => "rejected",
            PermitStatus::Escalated => "escalated",
            PermitStatus::Active => "active",
            PermitStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A permit to work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Permit {
    pub id: PermitId,
    pub tenant_id: TenantId,
    /// Human-facing number, unique per tenant by convention only
    pub permit_number: String,
    /// Permit type, e.g. "hot_work", "confined_space"
    pub permit_type: String,
    pub description: String,
    pub status: PermitStatus,
    pub approval_chain: Vec<ApprovalStep>,
    pub isolation_steps: Vec<IsolationStep>,
    pub watchers: BTreeSet<UserId>,
    /// Non-owning back-reference; `WorkOrder::permits` is authoritative
    pub work_order: Option<WorkOrderId>,
    pub incidents: Vec<IncidentId>,
    pub history: Vec<HistoryEntry>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub risk_level: RiskLevel,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permit {
    /// The live step: the first pending or escalated step, if any
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        self.approval_chain.iter().find(|s| s.status.is_active())
    }

    /// The step the escalation scanner looks at: the pending one, if any
    pub fn pending_step(&self) -> Option<&ApprovalStep> {
        self.approval_chain
            .iter()
            .find(|s| s.status == StepStatus::Pending)
    }

    pub fn open_isolation_steps(&self) -> impl Iterator<Item = &IsolationStep> {
        self.isolation_steps.iter().filter(|s| !s.completed)
    }

    pub fn isolation_complete(&self) -> bool {
        self.open_isolation_steps().next().is_none()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.updated_at = entry.at;
        self.history.push(entry);
    }
}

/// Input for creating a permit
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPermit {
    /// Generated when omitted
    pub permit_number: Option<String>,
    pub permit_type: String,
    pub description: String,
    #[serde(default)]
    pub approval_chain: Vec<ApprovalStepSpec>,
    #[serde(default)]
    pub isolation_steps: Vec<String>,
    #[serde(default)]
    pub watchers: BTreeSet<UserId>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl NewPermit {
    pub fn new(permit_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            permit_type: permit_type.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_step(mut self, step: ApprovalStepSpec) -> Self {
        self.approval_chain.push(step);
        self
    }

    pub fn with_isolation_step(mut self, description: impl Into<String>) -> Self {
        self.isolation_steps.push(description.into());
        self
    }

    pub fn with_watcher(mut self, user: UserId) -> Self {
        self.watchers.insert(user);
        self
    }

    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }
}

/// Partial update of the mutable permit fields.
///
/// Status and approval chain are deliberately absent: they only change
/// through decisions, escalation and the work-order hooks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PermitPatch {
    pub permit_type: Option<String>,
    pub description: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub watchers: Option<BTreeSet<UserId>>,
    pub isolation_steps: Option<Vec<String>>,
}

impl PermitPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
