use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::Role;
use crate::domain::incident::{Incident, IncidentId};
use crate::domain::reference::{CriticalityId, EnvironmentId, IncidentTypeId, SegmentId};
use crate::errors::WorkflowError;

/// Immutable full-state copy of an incident at a point in time, tagged with
/// the requester's role. Owned exclusively by the approval request that
/// carries it, so later incident mutation cannot corrupt history.
///
/// Reference fields carry their display names alongside the ids: the diff
/// comparison set works on names, and snapshots must stay renderable even
/// after reference data changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentSnapshot {
    pub incident_id: IncidentId,
    pub requester_role: Role,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub type_id: IncidentTypeId,
    pub type_name: String,
    pub environment_id: EnvironmentId,
    pub environment_name: String,
    pub segment_id: SegmentId,
    pub segment_name: String,
    pub criticality_id: CriticalityId,
    pub criticality_name: String,
    pub description: String,
    pub actions_taken: Option<String>,
}

/// Display names resolved from the reference tables at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayNames {
    pub type_name: String,
    pub environment_name: String,
    pub segment_name: String,
    pub criticality_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    StartedAt,
    EndedAt,
    Type,
    Environment,
    Segment,
    Criticality,
    Description,
    ActionsTaken,
    /// Sentinel entry reported for delete requests instead of a field diff.
    Deletion,
}

impl SnapshotField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartedAt => "started_at",
            Self::EndedAt => "ended_at",
            Self::Type => "type",
            Self::Environment => "environment",
            Self::Segment => "segment",
            Self::Criticality => "criticality",
            Self::Description => "description",
            Self::ActionsTaken => "actions_taken",
            Self::Deletion => "deletion",
        }
    }
}

/// The fixed comparison table. Fields outside this set (provenance,
/// derived duration) never participate in a diff.
pub const COMPARED_FIELDS: &[SnapshotField] = &[
    SnapshotField::StartedAt,
    SnapshotField::EndedAt,
    SnapshotField::Type,
    SnapshotField::Environment,
    SnapshotField::Segment,
    SnapshotField::Criticality,
    SnapshotField::Description,
    SnapshotField::ActionsTaken,
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: SnapshotField,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl FieldChange {
    pub fn deletion_requested() -> Self {
        Self { field: SnapshotField::Deletion, before: None, after: None }
    }
}

impl IncidentSnapshot {
    pub fn from_incident(incident: &Incident, names: DisplayNames, requester_role: Role) -> Self {
        Self {
            incident_id: incident.id.clone(),
            requester_role,
            started_at: incident.started_at,
            ended_at: incident.ended_at,
            duration_minutes: incident.duration_minutes,
            type_id: incident.type_id,
            type_name: names.type_name,
            environment_id: incident.environment_id,
            environment_name: names.environment_name,
            segment_id: incident.segment_id,
            segment_name: names.segment_name,
            criticality_id: incident.criticality_id,
            criticality_name: names.criticality_name,
            description: incident.description.clone(),
            actions_taken: incident.actions_taken.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.description.trim().is_empty() {
            return Err(WorkflowError::validation("snapshot description must not be blank"));
        }
        for (name, field) in [
            (&self.type_name, "type"),
            (&self.environment_name, "environment"),
            (&self.segment_name, "segment"),
            (&self.criticality_name, "criticality"),
        ] {
            if name.trim().is_empty() {
                return Err(WorkflowError::validation(format!(
                    "snapshot is missing the {field} display name"
                )));
            }
        }
        Ok(())
    }

    fn field_value(&self, field: SnapshotField) -> Option<String> {
        match field {
            SnapshotField::StartedAt => Some(self.started_at.to_rfc3339()),
            SnapshotField::EndedAt => self.ended_at.map(|value| value.to_rfc3339()),
            SnapshotField::Type => Some(self.type_name.clone()),
            SnapshotField::Environment => Some(self.environment_name.clone()),
            SnapshotField::Segment => Some(self.segment_name.clone()),
            SnapshotField::Criticality => Some(self.criticality_name.clone()),
            SnapshotField::Description => Some(self.description.clone()),
            SnapshotField::ActionsTaken => self.actions_taken.clone(),
            SnapshotField::Deletion => None,
        }
    }
}

/// Field-by-field comparison across the fixed table, ordered as the table
/// orders it. `after = None` means a delete was requested and yields the
/// single sentinel entry.
pub fn diff(before: &IncidentSnapshot, after: Option<&IncidentSnapshot>) -> Vec<FieldChange> {
    let Some(after) = after else {
        return vec![FieldChange::deletion_requested()];
    };

    COMPARED_FIELDS
        .iter()
        .filter_map(|&field| {
            let before_value = before.field_value(field);
            let after_value = after.field_value(field);
            (before_value != after_value).then_some(FieldChange {
                field,
                before: before_value,
                after: after_value,
            })
        })
        .collect()
}
