//! In-process wiring of stores, sinks and services

use crate::config::{EngineConfig, EscalationMode};
use crate::effects::SideEffects;
use crate::escalation::{
    EscalationScanner, EscalationTicker, EscalationTrigger, ScheduledEscalations,
};
use crate::lifecycle::WorkOrderLifecycle;
use crate::permit_service::PermitService;
use crate::sinks::{BroadcastRealtimeBus, InMemoryAuditLog, RecordingNotifier};
use permit_storage::InMemoryStorage;
use permit_types::TenantId;
use std::sync::Arc;

/// A fully wired engine over the in-memory backend and recording sinks
pub struct MaintenanceRuntime {
    pub config: EngineConfig,
    pub storage: Arc<InMemoryStorage>,
    pub audit: Arc<InMemoryAuditLog>,
    pub notifier: Arc<RecordingNotifier>,
    pub realtime: Arc<BroadcastRealtimeBus>,
    pub scanner: Arc<EscalationScanner>,
    pub permits: PermitService,
    pub work_orders: WorkOrderLifecycle,
}

impl MaintenanceRuntime {
    pub fn in_memory(config: EngineConfig) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let realtime = Arc::new(BroadcastRealtimeBus::default());
        let effects = SideEffects::new(audit.clone(), notifier.clone(), realtime.clone());

        let scanner = Arc::new(EscalationScanner::new(storage.clone(), effects.clone()));
        let escalations: Arc<dyn EscalationTrigger> = match config.escalation.mode {
            EscalationMode::Lazy => scanner.clone(),
            EscalationMode::Background => Arc::new(ScheduledEscalations),
        };

        let permits = PermitService::new(
            storage.clone(),
            storage.clone(),
            effects.clone(),
            escalations,
            config.clone(),
        );
        let work_orders =
            WorkOrderLifecycle::new(storage.clone(), storage.clone(), storage.clone(), effects);

        tracing::info!(mode = ?config.escalation.mode, "Maintenance runtime initialised");

        Self {
            config,
            storage,
            audit,
            notifier,
            realtime,
            scanner,
            permits,
            work_orders,
        }
    }

    /// Spawn the background sweep for `tenants`.
    ///
    /// `None` in lazy mode, where reads already apply escalations.
    pub fn start_ticker(&self, tenants: Vec<TenantId>) -> Option<EscalationTicker> {
        match self.config.escalation.mode {
            EscalationMode::Lazy => None,
            EscalationMode::Background => Some(EscalationTicker::spawn(
                self.scanner.clone(),
                tenants,
                self.config.escalation.sweep_interval(),
            )),
        }
    }
}
