use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use opsboard_core::domain::approval::{ApprovalRequest, ApprovalRequestId, ApprovalStatus};
use opsboard_core::domain::identity::Role;
use opsboard_core::domain::incident::{Incident, IncidentId};
use opsboard_core::domain::reference::{
    Criticality, CriticalityId, Environment, EnvironmentId, IncidentType, IncidentTypeId, Segment,
    SegmentId,
};

pub mod approval;
pub mod incident;
pub mod lookup;

pub use approval::SqlApprovalRequestRepository;
pub use incident::SqlIncidentRepository;
pub use lookup::SqlLookupRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

pub(crate) fn parse_timestamp(
    field: &'static str,
    raw: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&raw).map(|value| value.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid `{field}` timestamp `{raw}`: {err}"))
    })
}

pub(crate) fn parse_optional_timestamp(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_timestamp(field, value)).transpose()
}

/// RFC 3339 bound for the first instant of a calendar day (UTC).
pub(crate) fn day_start(date: NaiveDate) -> String {
    date.and_time(chrono::NaiveTime::MIN).and_utc().to_rfc3339()
}

/// RFC 3339 bound for the final instant of a calendar day (UTC); range
/// filters are inclusive on both ends.
pub(crate) fn day_end(date: NaiveDate) -> String {
    let end_of_day =
        chrono::NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(chrono::NaiveTime::MIN);
    date.and_time(end_of_day).and_utc().to_rfc3339()
}

/// Listing filters for the dashboard report view. Date bounds are
/// inclusive calendar days; the end bound covers the whole final day.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub environment_id: Option<EnvironmentId>,
    pub started_from: Option<NaiveDate>,
    pub started_until: Option<NaiveDate>,
}

/// An incident joined with the display names of its classification
/// references, as the listing renders them.
#[derive(Clone, Debug, PartialEq)]
pub struct IncidentListing {
    pub incident: Incident,
    pub type_name: String,
    pub environment_name: String,
    pub segment_name: String,
    pub criticality_name: String,
}

#[async_trait]
pub trait IncidentRepository: Send + Sync {
    async fn insert(&self, incident: Incident) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &IncidentId) -> Result<Option<Incident>, RepositoryError>;
    /// Overwrites the full current state. Returns `false` when the id does
    /// not exist (the caller raises `NotFound`).
    async fn update(&self, incident: Incident) -> Result<bool, RepositoryError>;
    /// Returns `false` when the id does not exist.
    async fn delete(&self, id: &IncidentId) -> Result<bool, RepositoryError>;
    /// Filtered listing ordered by `started_at` descending.
    async fn query(&self, filter: IncidentFilter) -> Result<Vec<IncidentListing>, RepositoryError>;
}

#[async_trait]
pub trait LookupRepository: Send + Sync {
    async fn environment(&self, id: EnvironmentId)
        -> Result<Option<Environment>, RepositoryError>;
    async fn segment(&self, id: SegmentId) -> Result<Option<Segment>, RepositoryError>;
    async fn incident_type(
        &self,
        id: IncidentTypeId,
    ) -> Result<Option<IncidentType>, RepositoryError>;
    async fn criticality(&self, id: CriticalityId)
        -> Result<Option<Criticality>, RepositoryError>;
    async fn environments(&self) -> Result<Vec<Environment>, RepositoryError>;
    async fn segments_for_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Vec<Segment>, RepositoryError>;
}

/// Listing filters for the approval queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<ApprovalStatus>,
    pub environment_id: Option<EnvironmentId>,
    pub requested_from: Option<NaiveDate>,
    pub requested_until: Option<NaiveDate>,
}

/// Result of the conditional approval update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApproveOutcome {
    /// Request finalized and the incident mutation applied.
    Applied,
    /// Request finalized, but the incident had already vanished; the
    /// mutation was skipped and an audit note recorded.
    FinalizedWithoutApply,
    /// Another resolver won the race; nothing changed.
    AlreadyResolved,
}

#[async_trait]
pub trait ApprovalRequestRepository: Send + Sync {
    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;
    /// Requests visible to `viewer_role`, newest `requested_at` first.
    /// Gestor listings are restricted to operador-requested entries.
    async fn list(
        &self,
        filter: RequestFilter,
        viewer_role: Role,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError>;
    /// Count of pending requests visible to `viewer_role`.
    async fn count_pending(&self, viewer_role: Role) -> Result<u64, RepositoryError>;
    /// Check-and-set approval: flips `pending -> approved` and applies the
    /// stored mutation to the incident inside a single transaction. The
    /// status guard is the conditional update itself, never a
    /// read-then-write pair.
    async fn approve_pending(
        &self,
        id: &ApprovalRequestId,
        resolver_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<ApproveOutcome, RepositoryError>;
    /// Check-and-set rejection. Returns `false` when the request was no
    /// longer pending. The incident is left untouched.
    async fn reject_pending(
        &self,
        id: &ApprovalRequestId,
        resolver_id: &str,
        resolved_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, RepositoryError>;
}
