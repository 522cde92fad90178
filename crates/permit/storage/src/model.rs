use chrono::{DateTime, Utc};
use permit_types::{IntentId, Permit, PermitId, PermitStatus, TenantId, WorkOrder, WorkOrderId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Generic query window for paged reads. `limit == 0` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Tenant-scoped permit query. Unset criteria match everything.
#[derive(Debug, Clone, PartialEq)]
pub struct PermitFilter {
    pub tenant_id: TenantId,
    pub ids: Option<BTreeSet<PermitId>>,
    pub statuses: Option<Vec<PermitStatus>>,
    pub permit_type: Option<String>,
    pub work_order: Option<WorkOrderId>,
    /// Only permits with a pending step whose deadline is at or before this instant
    pub escalation_due_by: Option<DateTime<Utc>>,
    pub window: QueryWindow,
}

impl PermitFilter {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            ids: None,
            statuses: None,
            permit_type: None,
            work_order: None,
            escalation_due_by: None,
            window: QueryWindow::default(),
        }
    }

    pub fn with_ids<I: IntoIterator<Item = PermitId>>(mut self, ids: I) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_statuses<I: IntoIterator<Item = PermitStatus>>(mut self, statuses: I) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn with_permit_type(mut self, permit_type: impl Into<String>) -> Self {
        self.permit_type = Some(permit_type.into());
        self
    }

    pub fn with_work_order(mut self, work_order: WorkOrderId) -> Self {
        self.work_order = Some(work_order);
        self
    }

    pub fn escalation_due_by(mut self, now: DateTime<Utc>) -> Self {
        self.escalation_due_by = Some(now);
        self
    }

    pub fn with_window(mut self, window: QueryWindow) -> Self {
        self.window = window;
        self
    }

    pub fn matches(&self, permit: &Permit) -> bool {
        if permit.tenant_id != self.tenant_id {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&permit.id) {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&permit.status) {
                return false;
            }
        }
        if let Some(permit_type) = &self.permit_type {
            if &permit.permit_type != permit_type {
                return false;
            }
        }
        if let Some(work_order) = &self.work_order {
            if permit.work_order.as_ref() != Some(work_order) {
                return false;
            }
        }
        if let Some(now) = self.escalation_due_by {
            if !permit.approval_chain.iter().any(|s| s.is_overdue(now)) {
                return false;
            }
        }
        true
    }
}

/// Tenant-scoped work order query.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkOrderFilter {
    pub tenant_id: TenantId,
    /// Only work orders that link this permit
    pub linked_permit: Option<PermitId>,
    pub window: QueryWindow,
}

impl WorkOrderFilter {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            linked_permit: None,
            window: QueryWindow::default(),
        }
    }

    pub fn linking(mut self, permit_id: PermitId) -> Self {
        self.linked_permit = Some(permit_id);
        self
    }

    pub fn matches(&self, work_order: &WorkOrder) -> bool {
        if work_order.tenant_id != self.tenant_id {
            return false;
        }
        if let Some(permit_id) = &self.linked_permit {
            if !work_order.permits.contains(permit_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Pending,
    Applied,
    /// Another write reached one of the aggregates first; never replayed
    Superseded,
}

/// `updated_at` of every aggregate as it was loaded, before the
/// transition touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseVersions {
    pub permits: BTreeMap<PermitId, DateTime<Utc>>,
    pub work_order: DateTime<Utc>,
}

impl BaseVersions {
    pub fn capture(permits: &[Permit], work_order: &WorkOrder) -> Self {
        Self {
            permits: permits
                .iter()
                .map(|p| (p.id.clone(), p.updated_at))
                .collect(),
            work_order: work_order.updated_at,
        }
    }
}

/// Where one stored aggregate stands relative to an intent's after-image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// The stored document already equals the image
    Landed,
    /// Still at the base version; the image can be written
    Behind,
    /// Changed by something else, or gone
    Diverged,
}

impl ImageState {
    pub fn of<T: PartialEq>(
        stored: Option<&T>,
        image: &T,
        base: Option<DateTime<Utc>>,
        version: impl Fn(&T) -> DateTime<Utc>,
    ) -> Self {
        match stored {
            Some(current) if current == image => ImageState::Landed,
            Some(current) if Some(version(current)) == base => ImageState::Behind,
            _ => ImageState::Diverged,
        }
    }
}

/// After-images of every aggregate touched by one cross-aggregate
/// transition, recorded before any of them is written.
///
/// An image is only replayed onto an aggregate still at its base version.
/// If any aggregate has moved on, the whole intent is superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualWriteIntent {
    pub id: IntentId,
    pub tenant_id: TenantId,
    /// Name of the transition that produced the intent, e.g. "start"
    pub transition: String,
    pub base: BaseVersions,
    pub permits: Vec<Permit>,
    pub work_order: WorkOrder,
    pub state: IntentState,
    pub recorded_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DualWriteIntent {
    pub fn new(
        transition: impl Into<String>,
        base: BaseVersions,
        permits: Vec<Permit>,
        work_order: WorkOrder,
    ) -> Self {
        Self {
            id: IntentId::generate(),
            tenant_id: work_order.tenant_id.clone(),
            transition: transition.into(),
            base,
            permits,
            work_order,
            state: IntentState::Pending,
            recorded_at: Utc::now(),
            resolved_at: None,
        }
    }
}
