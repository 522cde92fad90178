use crate::model::{DualWriteIntent, PermitFilter, WorkOrderFilter};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use permit_types::{Incident, IntentId, Permit, PermitId, TenantId, WorkOrder, WorkOrderId};

/// Storage interface for permit documents.
///
/// Every read is tenant-scoped. Writes replace the whole aggregate.
#[async_trait]
pub trait PermitStore: Send + Sync {
    /// Get one permit within a tenant.
    async fn find_one(&self, tenant_id: &TenantId, id: &PermitId)
        -> StorageResult<Option<Permit>>;

    /// Query permits, newest-updated first.
    async fn find(&self, filter: &PermitFilter) -> StorageResult<Vec<Permit>>;

    /// Insert a new permit. Fails with `Conflict` on a duplicate id or a
    /// duplicate permit number within the tenant.
    async fn create(&self, permit: Permit) -> StorageResult<Permit>;

    /// Replace an existing permit.
    async fn save(&self, permit: &Permit) -> StorageResult<()>;
}

/// Storage interface for work order documents.
#[async_trait]
pub trait WorkOrderStore: Send + Sync {
    async fn find_one(
        &self,
        tenant_id: &TenantId,
        id: &WorkOrderId,
    ) -> StorageResult<Option<WorkOrder>>;

    async fn find(&self, filter: &WorkOrderFilter) -> StorageResult<Vec<WorkOrder>>;

    async fn create(&self, work_order: WorkOrder) -> StorageResult<WorkOrder>;

    async fn save(&self, work_order: &WorkOrder) -> StorageResult<()>;
}

/// Storage interface for permit incidents.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create(&self, incident: Incident) -> StorageResult<Incident>;

    /// Incidents of one permit, oldest first.
    async fn list_for_permit(
        &self,
        tenant_id: &TenantId,
        permit_id: &PermitId,
    ) -> StorageResult<Vec<Incident>>;
}

/// Log of cross-aggregate write intents.
#[async_trait]
pub trait IntentLog: Send + Sync {
    async fn record(&self, intent: DualWriteIntent) -> StorageResult<()>;

    async fn mark_applied(
        &self,
        tenant_id: &TenantId,
        id: &IntentId,
        applied_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Retire an intent whose images must not be written any more.
    async fn mark_superseded(
        &self,
        tenant_id: &TenantId,
        id: &IntentId,
        superseded_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Intents still pending, oldest first.
    async fn pending(&self, tenant_id: &TenantId) -> StorageResult<Vec<DualWriteIntent>>;
}
