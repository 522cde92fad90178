//! Readiness gate: may a work-order transition proceed given its permits?
//!
//! The gate only reads. Permit status flips that follow a successful check
//! belong to the caller ([`crate::WorkOrderLifecycle`]).

use permit_storage::{PermitFilter, PermitStore};
use permit_types::{Permit, PermitError, PermitId, PermitResult, PermitStatus, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Which transition the gate is checking for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStage {
    /// Approve, assign, start and cancel
    Start,
    /// Complete
    Complete,
}

impl fmt::Display for ReadinessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessStage::Start => f.write_str("start"),
            ReadinessStage::Complete => f.write_str("complete"),
        }
    }
}

/// Why the gate refused
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadinessFailure {
    MissingPermits { requested: usize, resolved: usize },
    MissingPermitType { permit_type: String },
    NotApproved {
        permit_number: String,
        status: PermitStatus,
    },
    IsolationIncomplete {
        permit_number: String,
        open_steps: usize,
    },
    NotCompletable {
        permit_number: String,
        status: PermitStatus,
    },
}

impl ReadinessFailure {
    pub fn message(&self) -> String {
        match self {
            ReadinessFailure::MissingPermits { .. } => {
                "One or more linked permits could not be found".to_string()
            }
            ReadinessFailure::MissingPermitType { permit_type } => {
                format!("A {} permit is required for this work order", permit_type)
            }
            ReadinessFailure::NotApproved {
                permit_number,
                status,
            } => format!(
                "Permit {} must be approved before work can start (currently {})",
                permit_number, status
            ),
            ReadinessFailure::IsolationIncomplete {
                permit_number,
                open_steps,
            } => format!(
                "Permit {} has {} incomplete isolation step(s)",
                permit_number, open_steps
            ),
            ReadinessFailure::NotCompletable {
                permit_number,
                status,
            } => format!(
                "Permit {} is {} and cannot close out this work order",
                permit_number, status
            ),
        }
    }

    pub fn into_error(self) -> PermitError {
        match self {
            ReadinessFailure::MissingPermits {
                requested,
                resolved,
            } => PermitError::LinkedPermitsMissing {
                requested,
                resolved,
            },
            other => PermitError::NotReady(other.message()),
        }
    }
}

/// Gate verdict plus the resolved permits, in requested order
#[derive(Clone, Debug, PartialEq)]
pub struct ReadinessReport {
    pub permits: Vec<Permit>,
    pub failure: Option<ReadinessFailure>,
}

impl ReadinessReport {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn message(&self) -> Option<String> {
        self.failure.as_ref().map(ReadinessFailure::message)
    }

    /// The resolved permits when ready, the mapped error otherwise
    pub fn into_result(self) -> PermitResult<Vec<Permit>> {
        match self.failure {
            None => Ok(self.permits),
            Some(failure) => Err(failure.into_error()),
        }
    }
}

/// Readiness policy over a tenant's permits
#[derive(Clone)]
pub struct ReadinessGate {
    permits: Arc<dyn PermitStore>,
}

impl ReadinessGate {
    pub fn new(permits: Arc<dyn PermitStore>) -> Self {
        Self { permits }
    }

    /// Resolve the linked permits and evaluate them for `stage`.
    ///
    /// `Err` only for storage faults; a refusal is an `Ok` report with a
    /// failure set.
    pub async fn ensure_readiness(
        &self,
        tenant_id: &TenantId,
        permit_ids: &[PermitId],
        required_types: &BTreeSet<String>,
        stage: ReadinessStage,
    ) -> PermitResult<ReadinessReport> {
        let requested: BTreeSet<PermitId> = permit_ids.iter().cloned().collect();
        let resolved = if requested.is_empty() {
            Vec::new()
        } else {
            let filter = PermitFilter::for_tenant(tenant_id.clone()).with_ids(requested);
            self.permits.find(&filter).await?
        };
        Ok(evaluate(permit_ids, resolved, required_types, stage))
    }
}

/// The pure policy behind [`ReadinessGate::ensure_readiness`].
pub fn evaluate(
    permit_ids: &[PermitId],
    resolved: Vec<Permit>,
    required_types: &BTreeSet<String>,
    stage: ReadinessStage,
) -> ReadinessReport {
    let requested: BTreeSet<&PermitId> = permit_ids.iter().collect();
    let mut permits: Vec<Permit> = Vec::with_capacity(resolved.len());
    for id in permit_ids {
        if permits.iter().any(|p| &p.id == id) {
            continue;
        }
        if let Some(p) = resolved.iter().find(|p| &p.id == id) {
            permits.push(p.clone());
        }
    }

    let failure = check(&requested, &permits, required_types, stage);
    ReadinessReport { permits, failure }
}

fn check(
    requested: &BTreeSet<&PermitId>,
    permits: &[Permit],
    required_types: &BTreeSet<String>,
    stage: ReadinessStage,
) -> Option<ReadinessFailure> {
    if permits.len() != requested.len() {
        return Some(ReadinessFailure::MissingPermits {
            requested: requested.len(),
            resolved: permits.len(),
        });
    }

    if let Some(missing) = required_types
        .iter()
        .find(|t| !permits.iter().any(|p| &p.permit_type == *t))
    {
        return Some(ReadinessFailure::MissingPermitType {
            permit_type: missing.clone(),
        });
    }

    match stage {
        ReadinessStage::Start => permits
            .iter()
            .find(|p| !matches!(p.status, PermitStatus::Approved | PermitStatus::Active))
            .map(|p| ReadinessFailure::NotApproved {
                permit_number: p.permit_number.clone(),
                status: p.status,
            }),
        ReadinessStage::Complete => {
            if let Some(p) = permits.iter().find(|p| !p.isolation_complete()) {
                return Some(ReadinessFailure::IsolationIncomplete {
                    permit_number: p.permit_number.clone(),
                    open_steps: p.open_isolation_steps().count(),
                });
            }
            permits
                .iter()
                .find(|p| {
                    !matches!(
                        p.status,
                        PermitStatus::Active | PermitStatus::Approved | PermitStatus::Closed
                    )
                })
                .map(|p| ReadinessFailure::NotCompletable {
                    permit_number: p.permit_number.clone(),
                    status: p.status,
                })
        }
    }
}
