//! Append-only permit history

use crate::{IncidentId, UserId, WorkOrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to the permit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum HistoryAction {
    Created,
    Updated,
    StepApproved { sequence: u32 },
    Rejected { sequence: u32 },
    /// `automatic` is true when the escalation scanner raised it
    Escalated { sequence: u32, automatic: bool },
    IsolationStepCompleted { index: u32 },
    IncidentLogged { incident_id: IncidentId },
    WorkOrderLinked { work_order_id: WorkOrderId },
    WorkOrderUnlinked { work_order_id: WorkOrderId },
    WorkOrderStarted { work_order_id: WorkOrderId },
    WorkOrderCompleted { work_order_id: WorkOrderId },
}

impl HistoryAction {
    /// Stable name of the action, matching its serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::StepApproved { .. } => "step-approved",
            HistoryAction::Rejected { .. } => "rejected",
            HistoryAction::Escalated { .. } => "escalated",
            HistoryAction::IsolationStepCompleted { .. } => "isolation-step-completed",
            HistoryAction::IncidentLogged { .. } => "incident-logged",
            HistoryAction::WorkOrderLinked { .. } => "work-order-linked",
            HistoryAction::WorkOrderUnlinked { .. } => "work-order-unlinked",
            HistoryAction::WorkOrderStarted { .. } => "work-order-started",
            HistoryAction::WorkOrderCompleted { .. } => "work-order-completed",
        }
    }
}

/// One history entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub action: HistoryAction,
    pub at: DateTime<Utc>,
    /// `None` for system-initiated entries (scheduled escalation)
    pub actor: Option<UserId>,
    pub notes: Option<String>,
}

impl HistoryEntry {
    pub fn new(action: HistoryAction, actor: Option<UserId>, at: DateTime<Utc>) -> Self {
        Self {
            action,
            at,
            actor,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}
