use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::reference::{CriticalityId, EnvironmentId, IncidentTypeId, SegmentId};
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub String);

/// Current-state row of a recorded infrastructure incident. Owned by the
/// store adapter; the approval workflow only touches it through there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Derived: non-null iff `ended_at` is set, rounded to whole minutes.
    pub duration_minutes: Option<i64>,
    pub type_id: IncidentTypeId,
    pub environment_id: EnvironmentId,
    pub segment_id: SegmentId,
    pub criticality_id: CriticalityId,
    pub description: String,
    pub actions_taken: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: Option<String>,
}

pub fn duration_minutes_between(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    let seconds = (ended_at - started_at).num_seconds() as f64;
    (seconds / 60.0).round() as i64
}

impl Incident {
    /// Re-derives `duration_minutes` from the temporal fields. Must be
    /// called whenever `ended_at` changes.
    pub fn recompute_duration(&mut self) {
        self.duration_minutes =
            self.ended_at.map(|ended_at| duration_minutes_between(self.started_at, ended_at));
    }

    pub fn is_resolved(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Full proposed incident state as it arrives from the form layer, with
/// the classification references still unchecked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentDraft {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub type_id: Option<IncidentTypeId>,
    pub environment_id: Option<EnvironmentId>,
    pub segment_id: Option<SegmentId>,
    pub criticality_id: Option<CriticalityId>,
    pub description: String,
    pub actions_taken: Option<String>,
}

/// A draft that passed required-field validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedDraft {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub type_id: IncidentTypeId,
    pub environment_id: EnvironmentId,
    pub segment_id: SegmentId,
    pub criticality_id: CriticalityId,
    pub description: String,
    pub actions_taken: Option<String>,
}

impl IncidentDraft {
    pub fn validate(&self) -> Result<ValidatedDraft, WorkflowError> {
        let mut missing: Vec<&str> = Vec::new();

        if self.started_at.is_none() {
            missing.push("started_at");
        }
        if self.type_id.is_none() {
            missing.push("type");
        }
        if self.environment_id.is_none() {
            missing.push("environment");
        }
        if self.segment_id.is_none() {
            missing.push("segment");
        }
        if self.criticality_id.is_none() {
            missing.push("criticality");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }

        if !missing.is_empty() {
            return Err(WorkflowError::validation(format!(
                "required incident fields missing: {}",
                missing.join(", ")
            )));
        }

        Ok(ValidatedDraft {
            started_at: self.started_at.unwrap_or_default(),
            ended_at: self.ended_at,
            type_id: self.type_id.unwrap_or(IncidentTypeId(0)),
            environment_id: self.environment_id.unwrap_or(EnvironmentId(0)),
            segment_id: self.segment_id.unwrap_or(SegmentId(0)),
            criticality_id: self.criticality_id.unwrap_or(CriticalityId(0)),
            description: self.description.trim().to_string(),
            actions_taken: self.actions_taken.clone(),
        })
    }
}

impl ValidatedDraft {
    pub fn duration_minutes(&self) -> Option<i64> {
        self.ended_at.map(|ended_at| duration_minutes_between(self.started_at, ended_at))
    }
}
