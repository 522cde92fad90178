//! Incidents logged against a permit

use crate::{IncidentId, PermitId, TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    NearMiss,
    #[default]
    Minor,
    Major,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub tenant_id: TenantId,
    pub permit_id: PermitId,
    pub description: String,
    pub severity: IncidentSeverity,
    pub reported_by: UserId,
    pub reported_at: DateTime<Utc>,
}

/// Input for logging an incident
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    pub description: String,
    #[serde(default)]
    pub severity: IncidentSeverity,
}

impl NewIncident {
    pub fn new(description: impl Into<String>, severity: IncidentSeverity) -> Self {
        Self {
            description: description.into(),
            severity,
        }
    }
}
