//! Permit Engine: approval chains, escalation and work-order gating
//!
//! The engine owns the permit approval state machine and the readiness
//! gate it imposes on work orders. Storage and side-effect delivery are
//! collaborators behind traits.
//!
//! # Components
//!
//! - [`ApprovalChainEngine`]: pure transitions over an ordered approval chain
//! - [`EscalationScanner`]: promotes overdue pending steps to escalated,
//!   either lazily before reads or from an [`EscalationTicker`]
//! - [`ReadinessGate`]: read-only policy over a work order's linked permits
//! - [`PermitService`]: permit operations (create, decide, escalate,
//!   isolation, incidents, history)
//! - [`WorkOrderLifecycle`]: gated work-order transitions and permit links
//!
//! Primary mutations abort on failure. Audit, notification and realtime
//! side effects run after the write commits and never fail the operation.

#![deny(unsafe_code)]

pub mod chain;
pub mod config;
pub mod effects;
pub mod escalation;
pub mod lifecycle;
pub mod permit_service;
pub mod readiness;
pub mod runtime;
pub mod sinks;
pub mod telemetry;

pub use chain::{chain_is_consistent, ApprovalChainEngine, ChainOutcome};
pub use config::{EngineConfig, EscalationConfig, EscalationMode, TelemetryConfig};
pub use effects::SideEffects;
pub use escalation::{
    EscalationScanner, EscalationTicker, EscalationTrigger, ScheduledEscalations, SweepReport,
};
pub use lifecycle::{WorkOrderLifecycle, WorkOrderTransition};
pub use permit_service::{PermitQuery, PermitService};
pub use readiness::{ReadinessFailure, ReadinessGate, ReadinessReport, ReadinessStage};
pub use runtime::MaintenanceRuntime;
pub use sinks::{
    AuditEntry, AuditWriter, BroadcastRealtimeBus, EntityType, InMemoryAuditLog, Notification,
    Notifier, RealtimeBus, RealtimeEvent, RecordingNotifier, SinkError,
};
pub use telemetry::init_tracing;
