//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly. Production deployments plug a document
//! store behind the same traits.

use crate::model::{DualWriteIntent, IntentState, PermitFilter, QueryWindow, WorkOrderFilter};
use crate::traits::{IncidentStore, IntentLog, PermitStore, WorkOrderStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use permit_types::{Incident, IntentId, Permit, PermitId, TenantId, WorkOrder, WorkOrderId};
use std::collections::HashMap;
use std::sync::RwLock;

type Key<T> = (TenantId, T);

/// In-memory storage adapter implementing every store trait.
#[derive(Default)]
pub struct InMemoryStorage {
    permits: RwLock<HashMap<Key<PermitId>, Permit>>,
    work_orders: RwLock<HashMap<Key<WorkOrderId>, WorkOrder>>,
    incidents: RwLock<Vec<Incident>>,
    intents: RwLock<Vec<DualWriteIntent>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_intent(
        &self,
        tenant_id: &TenantId,
        id: &IntentId,
        state: IntentState,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self.intents.write().map_err(|_| poisoned("intents"))?;
        let intent = guard
            .iter_mut()
            .find(|i| &i.tenant_id == tenant_id && &i.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("intent {} not found", id)))?;
        if intent.state != IntentState::Pending {
            return Err(StorageError::InvariantViolation(format!(
                "intent {} already resolved",
                id
            )));
        }
        intent.state = state;
        intent.resolved_at = Some(at);
        Ok(())
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::Backend(format!("{} lock poisoned", what))
}

#[async_trait]
impl PermitStore for InMemoryStorage {
    async fn find_one(
        &self,
        tenant_id: &TenantId,
        id: &PermitId,
    ) -> StorageResult<Option<Permit>> {
        let guard = self.permits.read().map_err(|_| poisoned("permits"))?;
        Ok(guard.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn find(&self, filter: &PermitFilter) -> StorageResult<Vec<Permit>> {
        let guard = self.permits.read().map_err(|_| poisoned("permits"))?;
        let mut values = guard
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(apply_window(values, filter.window))
    }

    async fn create(&self, permit: Permit) -> StorageResult<Permit> {
        let mut guard = self.permits.write().map_err(|_| poisoned("permits"))?;
        let key = (permit.tenant_id.clone(), permit.id.clone());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "permit {} already exists",
                permit.id
            )));
        }
        if guard
            .values()
            .any(|p| p.tenant_id == permit.tenant_id && p.permit_number == permit.permit_number)
        {
            return Err(StorageError::Conflict(format!(
                "permit number {} already in use",
                permit.permit_number
            )));
        }
        guard.insert(key, permit.clone());
        Ok(permit)
    }

    async fn save(&self, permit: &Permit) -> StorageResult<()> {
        let mut guard = self.permits.write().map_err(|_| poisoned("permits"))?;
        let record = guard
            .get_mut(&(permit.tenant_id.clone(), permit.id.clone()))
            .ok_or_else(|| StorageError::NotFound(format!("permit {} not found", permit.id)))?;
        *record = permit.clone();
        Ok(())
    }
}

#[async_trait]
impl WorkOrderStore for InMemoryStorage {
    async fn find_one(
        &self,
        tenant_id: &TenantId,
        id: &WorkOrderId,
    ) -> StorageResult<Option<WorkOrder>> {
        let guard = self.work_orders.read().map_err(|_| poisoned("work orders"))?;
        Ok(guard.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn find(&self, filter: &WorkOrderFilter) -> StorageResult<Vec<WorkOrder>> {
        let guard = self.work_orders.read().map_err(|_| poisoned("work orders"))?;
        let mut values = guard
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(apply_window(values, filter.window))
    }

    async fn create(&self, work_order: WorkOrder) -> StorageResult<WorkOrder> {
        let mut guard = self
            .work_orders
            .write()
            .map_err(|_| poisoned("work orders"))?;
        let key = (work_order.tenant_id.clone(), work_order.id.clone());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "work order {} already exists",
                work_order.id
            )));
        }
        guard.insert(key, work_order.clone());
        Ok(work_order)
    }

    async fn save(&self, work_order: &WorkOrder) -> StorageResult<()> {
        let mut guard = self
            .work_orders
            .write()
            .map_err(|_| poisoned("work orders"))?;
        let record = guard
            .get_mut(&(work_order.tenant_id.clone(), work_order.id.clone()))
            .ok_or_else(|| {
                StorageError::NotFound(format!("work order {} not found", work_order.id))
            })?;
        *record = work_order.clone();
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for InMemoryStorage {
    async fn create(&self, incident: Incident) -> StorageResult<Incident> {
        let mut guard = self.incidents.write().map_err(|_| poisoned("incidents"))?;
        if guard.iter().any(|i| i.id == incident.id) {
            return Err(StorageError::Conflict(format!(
                "incident {} already exists",
                incident.id
            )));
        }
        guard.push(incident.clone());
        Ok(incident)
    }

    async fn list_for_permit(
        &self,
        tenant_id: &TenantId,
        permit_id: &PermitId,
    ) -> StorageResult<Vec<Incident>> {
        let guard = self.incidents.read().map_err(|_| poisoned("incidents"))?;
        Ok(guard
            .iter()
            .filter(|i| &i.tenant_id == tenant_id && &i.permit_id == permit_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IntentLog for InMemoryStorage {
    async fn record(&self, intent: DualWriteIntent) -> StorageResult<()> {
        let mut guard = self.intents.write().map_err(|_| poisoned("intents"))?;
        if guard.iter().any(|i| i.id == intent.id) {
            return Err(StorageError::Conflict(format!(
                "intent {} already recorded",
                intent.id
            )));
        }
        guard.push(intent);
        Ok(())
    }

    async fn mark_applied(
        &self,
        tenant_id: &TenantId,
        id: &IntentId,
        applied_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.resolve_intent(tenant_id, id, IntentState::Applied, applied_at)
    }

    async fn mark_superseded(
        &self,
        tenant_id: &TenantId,
        id: &IntentId,
        superseded_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.resolve_intent(tenant_id, id, IntentState::Superseded, superseded_at)
    }

    async fn pending(&self, tenant_id: &TenantId) -> StorageResult<Vec<DualWriteIntent>> {
        let guard = self.intents.read().map_err(|_| poisoned("intents"))?;
        let mut values = guard
            .iter()
            .filter(|i| &i.tenant_id == tenant_id && i.state == IntentState::Pending)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(values)
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
