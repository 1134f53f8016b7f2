pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod snapshot;

pub use domain::approval::{ApprovalRequest, ApprovalRequestId, ApprovalStatus, MutationKind};
pub use domain::identity::{IdentityResolver, Principal, Role, StaticIdentityResolver};
pub use domain::incident::{Incident, IncidentDraft, IncidentId, ValidatedDraft};
pub use domain::reference::{
    Criticality, CriticalityId, Environment, EnvironmentId, IncidentType, IncidentTypeId, Segment,
    SegmentId,
};
pub use errors::WorkflowError;
pub use policy::{decide, MutationDecision};
pub use snapshot::{diff, DisplayNames, FieldChange, IncidentSnapshot, SnapshotField};
