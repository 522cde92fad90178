//! Work order fields relevant to permit gating

use crate::{PermitId, TenantId, UserId, WorkOrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Work order lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Requested,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkOrderStatus::Requested => "requested",
            WorkOrderStatus::Assigned => "assigned",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Orthogonal approval sub-state; assignment requires `Approved`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A maintenance work order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub tenant_id: TenantId,
    pub title: String,
    pub status: WorkOrderStatus,
    pub approval_status: ApprovalStatus,
    /// Linked permits; the readiness gate evaluates exactly this set
    pub permits: BTreeSet<PermitId>,
    /// Permit types that must be present among the linked permits
    pub required_permit_types: BTreeSet<String>,
    pub assignees: Vec<UserId>,
    pub requested_by: Option<UserId>,
    pub approved_by: Option<UserId>,
    pub approval_notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion: Option<CompletionReport>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    pub fn new(tenant_id: TenantId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkOrderId::generate(),
            tenant_id,
            title: title.into(),
            status: WorkOrderStatus::Requested,
            approval_status: ApprovalStatus::Pending,
            permits: BTreeSet::new(),
            required_permit_types: BTreeSet::new(),
            assignees: Vec::new(),
            requested_by: None,
            approved_by: None,
            approval_notes: None,
            started_at: None,
            completed_at: None,
            completion: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_required_permit_type(mut self, permit_type: impl Into<String>) -> Self {
        self.required_permit_types.insert(permit_type.into());
        self
    }

    pub fn with_requested_by(mut self, user: UserId) -> Self {
        self.requested_by = Some(user);
        self
    }

    pub fn permit_ids(&self) -> Vec<PermitId> {
        self.permits.iter().cloned().collect()
    }
}

/// A part consumed during the work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartUsage {
    pub part_id: String,
    pub quantity: u32,
}

/// One completion checklist line
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub label: String,
    pub done: bool,
}

/// Data captured when a work order is completed
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    #[serde(default)]
    pub parts_used: Vec<PartUsage>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    pub signature: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_work_order_defaults() {
        let wo = WorkOrder::new(TenantId::new("t"), "Replace pump seal")
            .with_required_permit_type("hot_work");
        assert_eq!(wo.status, WorkOrderStatus::Requested);
        assert_eq!(wo.approval_status, ApprovalStatus::Pending);
        assert!(wo.permits.is_empty());
        assert!(wo.required_permit_types.contains("hot_work"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(WorkOrderStatus::Completed.is_terminal());
        assert!(WorkOrderStatus::Cancelled.is_terminal());
        assert!(!WorkOrderStatus::InProgress.is_terminal());
        assert_eq!(WorkOrderStatus::InProgress.to_string(), "in_progress");
    }
}
