//! Isolation checklist

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One energy-isolation item (lock-out, drain, vent, ...) on a permit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsolationStep {
    pub index: u32,
    pub description: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<UserId>,
    pub verification_notes: Option<String>,
}

impl IsolationStep {
    pub fn new(index: u32, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            completed: false,
            completed_at: None,
            completed_by: None,
            verification_notes: None,
        }
    }

    pub fn complete(&mut self, by: UserId, notes: Option<String>, at: DateTime<Utc>) {
        self.completed = true;
        self.completed_at = Some(at);
        self.completed_by = Some(by);
        self.verification_notes = notes;
    }
}

/// Build an indexed checklist from plain descriptions
pub fn isolation_checklist<I, S>(descriptions: I) -> Vec<IsolationStep>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    descriptions
        .into_iter()
        .enumerate()
        .map(|(i, d)| IsolationStep::new(i as u32, d))
        .collect()
}
