use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::Role;
use crate::domain::incident::IncidentId;
use crate::errors::WorkflowError;
use crate::snapshot::IncidentSnapshot;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Edit,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "edit" => Some(Self::Edit),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// A queued, auditable proposal to edit or delete an incident. Created
/// whenever the policy engine returns `RequiresApproval`, resolved exactly
/// once, never deleted.
///
/// The request exclusively owns its snapshots; `incident_id` may point to
/// an incident that no longer exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub incident_id: IncidentId,
    pub operation: MutationKind,
    pub before_snapshot: IncidentSnapshot,
    /// Full proposed post-edit state; `None` exactly for delete requests.
    pub after_snapshot: Option<IncidentSnapshot>,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    pub resolver_id: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Required when rejecting, otherwise null.
    pub rejection_reason: Option<String>,
    /// Audit note set when an approval finalized without applying (e.g.
    /// the incident vanished concurrently).
    pub resolution_note: Option<String>,
}

impl ApprovalRequest {
    pub fn new_pending(
        id: ApprovalRequestId,
        operation: MutationKind,
        before_snapshot: IncidentSnapshot,
        after_snapshot: Option<IncidentSnapshot>,
        requested_by: impl Into<String>,
        requested_at: DateTime<Utc>,
    ) -> Result<Self, WorkflowError> {
        match (operation, &after_snapshot) {
            (MutationKind::Edit, None) => {
                return Err(WorkflowError::validation(
                    "edit requests must carry the proposed post-edit snapshot",
                ));
            }
            (MutationKind::Delete, Some(_)) => {
                return Err(WorkflowError::validation(
                    "delete requests must not carry an after snapshot",
                ));
            }
            _ => {}
        }

        if let Some(after) = &after_snapshot {
            after.validate()?;
        }

        Ok(Self {
            incident_id: before_snapshot.incident_id.clone(),
            id,
            operation,
            before_snapshot,
            after_snapshot,
            requested_by: requested_by.into(),
            requested_at,
            status: ApprovalStatus::Pending,
            resolver_id: None,
            resolved_at: None,
            rejection_reason: None,
            resolution_note: None,
        })
    }

    pub fn requester_role(&self) -> Role {
        self.before_snapshot.requester_role
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Resolver provenance must be all-or-nothing, exactly when terminal.
    pub fn resolver_fields_consistent(&self) -> bool {
        let resolved = self.resolver_id.is_some() && self.resolved_at.is_some();
        let unresolved = self.resolver_id.is_none() && self.resolved_at.is_none();
        match self.status {
            ApprovalStatus::Pending => unresolved,
            ApprovalStatus::Approved => resolved,
            ApprovalStatus::Rejected => resolved && self.rejection_reason.is_some(),
        }
    }
}
