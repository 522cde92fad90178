//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use permit_engine::{
    BroadcastRealtimeBus, EngineConfig, EscalationScanner, InMemoryAuditLog, Notification,
    Notifier, PermitService, SideEffects, SinkError, WorkOrderLifecycle,
};
use permit_storage::{
    InMemoryStorage, PermitFilter, PermitStore, StorageError, StorageResult, WorkOrderFilter,
    WorkOrderStore,
};
use permit_types::{
    Actor, ApprovalStepSpec, NewPermit, Permit, PermitId, TenantId, UserId, WorkOrder,
    WorkOrderId,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub fn tenant() -> TenantId {
    TenantId::new("acme")
}

pub fn actor(user: &str, roles: &[&str]) -> Actor {
    roles
        .iter()
        .fold(Actor::new(tenant(), UserId::new(user)), |a, r| a.with_role(*r))
}

pub fn safety_officer() -> Actor {
    actor("sam", &["safety_officer"])
}

pub fn plant_manager() -> Actor {
    actor("pat", &["plant_manager"])
}

pub fn technician() -> Actor {
    actor("tess", &["technician"])
}

/// Two-step hot work permit with two watchers
pub fn hot_work_permit() -> NewPermit {
    NewPermit::new("hot_work", "Weld bracket on conveyor 3")
        .with_step(ApprovalStepSpec::role("safety_officer").escalate_after(4))
        .with_step(ApprovalStepSpec::role("plant_manager"))
        .with_watcher(UserId::new("wendy"))
        .with_watcher(UserId::new("walt"))
}

/// Notifier that records deliveries and refuses users marked offline
#[derive(Default)]
pub struct SelectiveNotifier {
    offline: Mutex<BTreeSet<UserId>>,
    delivered: Mutex<Vec<Notification>>,
}

impl SelectiveNotifier {
    pub fn set_offline(&self, user: &str, offline: bool) {
        let mut guard = self.offline.lock().unwrap();
        if offline {
            guard.insert(UserId::new(user));
        } else {
            guard.remove(&UserId::new(user));
        }
    }

    pub fn delivered_to(&self, user: &str) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id.as_str() == user)
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for SelectiveNotifier {
    async fn notify(&self, user_id: &UserId, message: &str) -> Result<(), SinkError> {
        if self.offline.lock().unwrap().contains(user_id) {
            return Err(SinkError::Delivery(format!("{} unreachable", user_id)));
        }
        self.delivered.lock().unwrap().push(Notification {
            user_id: user_id.clone(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Store wrapper whose saves can be made to fail
pub struct FlakyStorage {
    inner: Arc<InMemoryStorage>,
    failing_permits: Mutex<BTreeSet<PermitId>>,
    fail_work_order_saves: AtomicBool,
}

impl FlakyStorage {
    pub fn new(inner: Arc<InMemoryStorage>) -> Self {
        Self {
            inner,
            failing_permits: Mutex::new(BTreeSet::new()),
            fail_work_order_saves: AtomicBool::new(false),
        }
    }

    pub fn fail_permit_saves(&self, id: &PermitId, fail: bool) {
        let mut guard = self.failing_permits.lock().unwrap();
        if fail {
            guard.insert(id.clone());
        } else {
            guard.remove(id);
        }
    }

    pub fn fail_work_order_saves(&self, fail: bool) {
        self.fail_work_order_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermitStore for FlakyStorage {
    async fn find_one(
        &self,
        tenant_id: &TenantId,
        id: &PermitId,
    ) -> StorageResult<Option<Permit>> {
        PermitStore::find_one(&*self.inner, tenant_id, id).await
    }

    async fn find(&self, filter: &PermitFilter) -> StorageResult<Vec<Permit>> {
        PermitStore::find(&*self.inner, filter).await
    }

    async fn create(&self, permit: Permit) -> StorageResult<Permit> {
        PermitStore::create(&*self.inner, permit).await
    }

    async fn save(&self, permit: &Permit) -> StorageResult<()> {
        if self.failing_permits.lock().unwrap().contains(&permit.id) {
            return Err(StorageError::Backend("write timed out".into()));
        }
        PermitStore::save(&*self.inner, permit).await
    }
}

#[async_trait]
impl WorkOrderStore for FlakyStorage {
    async fn find_one(
        &self,
        tenant_id: &TenantId,
        id: &WorkOrderId,
    ) -> StorageResult<Option<WorkOrder>> {
        WorkOrderStore::find_one(&*self.inner, tenant_id, id).await
    }

    async fn find(&self, filter: &WorkOrderFilter) -> StorageResult<Vec<WorkOrder>> {
        WorkOrderStore::find(&*self.inner, filter).await
    }

    async fn create(&self, work_order: WorkOrder) -> StorageResult<WorkOrder> {
        WorkOrderStore::create(&*self.inner, work_order).await
    }

    async fn save(&self, work_order: &WorkOrder) -> StorageResult<()> {
        if self.fail_work_order_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("write timed out".into()));
        }
        WorkOrderStore::save(&*self.inner, work_order).await
    }
}

/// Services wired over a flaky store and a selective notifier
pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub flaky: Arc<FlakyStorage>,
    pub notifier: Arc<SelectiveNotifier>,
    pub audit: Arc<InMemoryAuditLog>,
    pub realtime: Arc<BroadcastRealtimeBus>,
    pub scanner: Arc<EscalationScanner>,
    pub permits: PermitService,
    pub work_orders: WorkOrderLifecycle,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let flaky = Arc::new(FlakyStorage::new(storage.clone()));
        let notifier = Arc::new(SelectiveNotifier::default());
        let audit = Arc::new(InMemoryAuditLog::new());
        let realtime = Arc::new(BroadcastRealtimeBus::default());
        let effects = SideEffects::new(audit.clone(), notifier.clone(), realtime.clone());

        let scanner = Arc::new(EscalationScanner::new(flaky.clone(), effects.clone()));
        let permits = PermitService::new(
            flaky.clone(),
            storage.clone(),
            effects.clone(),
            scanner.clone(),
            config,
        );
        let work_orders =
            WorkOrderLifecycle::new(flaky.clone(), flaky.clone(), storage.clone(), effects);

        Self {
            storage,
            flaky,
            notifier,
            audit,
            realtime,
            scanner,
            permits,
            work_orders,
        }
    }

    pub async fn stored_permit(&self, id: &PermitId) -> Permit {
        PermitStore::find_one(&*self.storage, &tenant(), id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn stored_work_order(&self, id: &WorkOrderId) -> WorkOrder {
        WorkOrderStore::find_one(&*self.storage, &tenant(), id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn seed_work_order(&self, work_order: WorkOrder) -> WorkOrder {
        WorkOrderStore::create(&*self.storage, work_order)
            .await
            .unwrap()
    }

    /// Move the pending step's deadline to `at`, bypassing the services
    pub async fn backdate_deadline(&self, id: &PermitId, at: DateTime<Utc>) {
        let mut permit = self.stored_permit(id).await;
        let step = permit
            .approval_chain
            .iter_mut()
            .find(|s| s.status == permit_types::StepStatus::Pending)
            .unwrap();
        step.escalate_at = Some(at);
        PermitStore::save(&*self.storage, &permit).await.unwrap();
    }

    /// Create and fully approve a two-step permit
    pub async fn approved_permit(&self, new_permit: NewPermit) -> Permit {
        let permit = self
            .permits
            .create_permit(&technician(), new_permit)
            .await
            .unwrap();
        self.permits
            .approve_permit(&safety_officer(), &permit.id, None)
            .await
            .unwrap();
        self.permits
            .approve_permit(&plant_manager(), &permit.id, None)
            .await
            .unwrap()
    }
}
