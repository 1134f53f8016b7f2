use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use opsboard_core::domain::approval::{
    ApprovalRequest, ApprovalRequestId, ApprovalStatus, MutationKind,
};
use opsboard_core::domain::identity::Role;
use opsboard_core::domain::incident::IncidentId;
use opsboard_core::snapshot::IncidentSnapshot;

use super::{
    day_end, day_start, parse_optional_timestamp, parse_timestamp, ApprovalRequestRepository,
    ApproveOutcome, RepositoryError, RequestFilter,
};
use crate::DbPool;

/// Audit note recorded when an approval finalizes but the incident row is
/// already gone, so the stored mutation could not be applied.
pub const VANISHED_INCIDENT_NOTE: &str = "incident missing at apply time; mutation skipped";

pub struct SqlApprovalRequestRepository {
    pool: DbPool,
}

impl SqlApprovalRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "id, incident_id, operation, requester_role, \
     before_snapshot_json, after_snapshot_json, requested_by, requested_at, status, \
     resolver_id, resolved_at, rejection_reason, resolution_note";

fn decode_snapshot(
    field: &'static str,
    raw: &str,
) -> Result<IncidentSnapshot, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid `{field}` payload: {err}")))
}

fn request_from_row(row: &SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let operation_raw: String = row.try_get("operation")?;
    let operation = MutationKind::parse(&operation_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown mutation operation `{operation_raw}`"))
    })?;

    let status_raw: String = row.try_get("status")?;
    let status = ApprovalStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown approval status `{status_raw}`"))
    })?;

    let before_raw: String = row.try_get("before_snapshot_json")?;
    let after_raw: Option<String> = row.try_get("after_snapshot_json")?;

    Ok(ApprovalRequest {
        id: ApprovalRequestId(row.try_get("id")?),
        incident_id: IncidentId(row.try_get("incident_id")?),
        operation,
        before_snapshot: decode_snapshot("before_snapshot_json", &before_raw)?,
        after_snapshot: after_raw
            .as_deref()
            .map(|raw| decode_snapshot("after_snapshot_json", raw))
            .transpose()?,
        requested_by: row.try_get("requested_by")?,
        requested_at: parse_timestamp("requested_at", row.try_get("requested_at")?)?,
        status,
        resolver_id: row.try_get("resolver_id")?,
        resolved_at: parse_optional_timestamp("resolved_at", row.try_get("resolved_at")?)?,
        rejection_reason: row.try_get("rejection_reason")?,
        resolution_note: row.try_get("resolution_note")?,
    })
}

/// Applies the stored mutation to the incidents table. Returns `false` when
/// the incident row no longer exists.
async fn apply_mutation(
    tx: &mut Transaction<'_, Sqlite>,
    operation: MutationKind,
    incident_id: &str,
    after_snapshot_json: Option<&str>,
    applied_by: &str,
) -> Result<bool, RepositoryError> {
    let rows_affected = match operation {
        MutationKind::Delete => {
            sqlx::query("DELETE FROM incidents WHERE id = ?")
                .bind(incident_id)
                .execute(&mut **tx)
                .await?
                .rows_affected()
        }
        MutationKind::Edit => {
            let raw = after_snapshot_json.ok_or_else(|| {
                RepositoryError::Decode("edit request without an after snapshot".to_string())
            })?;
            let after = decode_snapshot("after_snapshot_json", raw)?;

            sqlx::query(
                "UPDATE incidents
                 SET started_at = ?, ended_at = ?, duration_minutes = ?, type_id = ?,
                     environment_id = ?, segment_id = ?, criticality_id = ?, description = ?,
                     actions_taken = ?, updated_by = ?
                 WHERE id = ?",
            )
            .bind(after.started_at.to_rfc3339())
            .bind(after.ended_at.map(|value| value.to_rfc3339()))
            .bind(after.duration_minutes)
            .bind(after.type_id.0)
            .bind(after.environment_id.0)
            .bind(after.segment_id.0)
            .bind(after.criticality_id.0)
            .bind(&after.description)
            .bind(after.actions_taken.as_deref())
            .bind(applied_by)
            .bind(incident_id)
            .execute(&mut **tx)
            .await?
            .rows_affected()
        }
    };

    Ok(rows_affected > 0)
}

#[async_trait::async_trait]
impl ApprovalRequestRepository for SqlApprovalRequestRepository {
    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError> {
        let before_json = serde_json::to_string(&request.before_snapshot)
            .map_err(|err| RepositoryError::Decode(format!("encode before snapshot: {err}")))?;
        let after_json = request
            .after_snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| RepositoryError::Decode(format!("encode after snapshot: {err}")))?;

        sqlx::query(
            "INSERT INTO approval_requests (id, incident_id, operation, requester_role,
                                            before_snapshot_json, after_snapshot_json,
                                            requested_by, requested_at, status, resolver_id,
                                            resolved_at, rejection_reason, resolution_note)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.incident_id.0)
        .bind(request.operation.as_str())
        .bind(request.requester_role().as_str())
        .bind(before_json)
        .bind(after_json)
        .bind(&request.requested_by)
        .bind(request.requested_at.to_rfc3339())
        .bind(request.status.as_str())
        .bind(request.resolver_id.as_deref())
        .bind(request.resolved_at.map(|value| value.to_rfc3339()))
        .bind(request.rejection_reason.as_deref())
        .bind(request.resolution_note.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM approval_requests WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref row) => Ok(Some(request_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        filter: RequestFilter,
        viewer_role: Role,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        if !viewer_role.can_resolve_requests() {
            return Ok(Vec::new());
        }

        let mut sql =
            format!("SELECT {REQUEST_COLUMNS} FROM approval_requests WHERE 1 = 1");
        if viewer_role == Role::Gestor {
            sql.push_str(" AND requester_role = 'operador'");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.environment_id.is_some() {
            sql.push_str(
                " AND CAST(json_extract(before_snapshot_json, '$.environment_id') AS INTEGER) = ?",
            );
        }
        if filter.requested_from.is_some() {
            sql.push_str(" AND requested_at >= ?");
        }
        if filter.requested_until.is_some() {
            sql.push_str(" AND requested_at <= ?");
        }
        sql.push_str(" ORDER BY requested_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(environment_id) = filter.environment_id {
            query = query.bind(environment_id.0);
        }
        if let Some(from) = filter.requested_from {
            query = query.bind(day_start(from));
        }
        if let Some(until) = filter.requested_until {
            query = query.bind(day_end(until));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn count_pending(&self, viewer_role: Role) -> Result<u64, RepositoryError> {
        let sql = match viewer_role {
            Role::Admin => {
                "SELECT COUNT(*) AS count FROM approval_requests WHERE status = 'pending'"
            }
            Role::Gestor => {
                "SELECT COUNT(*) AS count FROM approval_requests
                 WHERE status = 'pending' AND requester_role = 'operador'"
            }
            Role::Operador | Role::Cliente => return Ok(0),
        };

        let count: i64 = sqlx::query(sql).fetch_one(&self.pool).await?.get("count");
        Ok(count.max(0) as u64)
    }

    async fn approve_pending(
        &self,
        id: &ApprovalRequestId,
        resolver_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<ApproveOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The conditional update is the whole race arbitration: whichever
        // resolver flips pending first wins, everyone else sees zero rows.
        let flipped = sqlx::query(
            "UPDATE approval_requests
             SET status = 'approved', resolver_id = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolver_id)
        .bind(resolved_at.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            tx.rollback().await?;
            return Ok(ApproveOutcome::AlreadyResolved);
        }

        let row = sqlx::query(
            "SELECT incident_id, operation, after_snapshot_json, requested_by
             FROM approval_requests WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_one(&mut *tx)
        .await?;

        let incident_id: String = row.try_get("incident_id")?;
        let operation_raw: String = row.try_get("operation")?;
        let operation = MutationKind::parse(&operation_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown mutation operation `{operation_raw}`"))
        })?;
        let after_snapshot_json: Option<String> = row.try_get("after_snapshot_json")?;
        let requested_by: String = row.try_get("requested_by")?;

        let applied = apply_mutation(
            &mut tx,
            operation,
            &incident_id,
            after_snapshot_json.as_deref(),
            &requested_by,
        )
        .await?;

        if !applied {
            sqlx::query("UPDATE approval_requests SET resolution_note = ? WHERE id = ?")
                .bind(VANISHED_INCIDENT_NOTE)
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(ApproveOutcome::FinalizedWithoutApply);
        }

        tx.commit().await?;
        Ok(ApproveOutcome::Applied)
    }

    async fn reject_pending(
        &self,
        id: &ApprovalRequestId,
        resolver_id: &str,
        resolved_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query(
            "UPDATE approval_requests
             SET status = 'rejected', resolver_id = ?, resolved_at = ?, rejection_reason = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolver_id)
        .bind(resolved_at.to_rfc3339())
        .bind(reason)
        .bind(&id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }
}
