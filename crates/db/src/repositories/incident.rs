use sqlx::{sqlite::SqliteRow, Row};

use opsboard_core::domain::incident::{Incident, IncidentId};
use opsboard_core::domain::reference::{CriticalityId, EnvironmentId, IncidentTypeId, SegmentId};

use super::{
    day_end, day_start, parse_optional_timestamp, parse_timestamp, IncidentFilter,
    IncidentListing, IncidentRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlIncidentRepository {
    pool: DbPool,
}

impl SqlIncidentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const INCIDENT_COLUMNS: &str = "id, started_at, ended_at, duration_minutes, type_id, \
     environment_id, segment_id, criticality_id, description, actions_taken, \
     created_at, created_by, updated_by";

fn incident_from_row(row: &SqliteRow) -> Result<Incident, RepositoryError> {
    Ok(Incident {
        id: IncidentId(row.try_get("id")?),
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        ended_at: parse_optional_timestamp("ended_at", row.try_get("ended_at")?)?,
        duration_minutes: row.try_get("duration_minutes")?,
        type_id: IncidentTypeId(row.try_get("type_id")?),
        environment_id: EnvironmentId(row.try_get("environment_id")?),
        segment_id: SegmentId(row.try_get("segment_id")?),
        criticality_id: CriticalityId(row.try_get("criticality_id")?),
        description: row.try_get("description")?,
        actions_taken: row.try_get("actions_taken")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
    })
}

fn listing_from_row(row: &SqliteRow) -> Result<IncidentListing, RepositoryError> {
    Ok(IncidentListing {
        incident: incident_from_row(row)?,
        type_name: row.try_get("type_name")?,
        environment_name: row.try_get("environment_name")?,
        segment_name: row.try_get("segment_name")?,
        criticality_name: row.try_get("criticality_name")?,
    })
}

#[async_trait::async_trait]
impl IncidentRepository for SqlIncidentRepository {
    async fn insert(&self, incident: Incident) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO incidents (id, started_at, ended_at, duration_minutes, type_id,
                                    environment_id, segment_id, criticality_id, description,
                                    actions_taken, created_at, created_by, updated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&incident.id.0)
        .bind(incident.started_at.to_rfc3339())
        .bind(incident.ended_at.map(|value| value.to_rfc3339()))
        .bind(incident.duration_minutes)
        .bind(incident.type_id.0)
        .bind(incident.environment_id.0)
        .bind(incident.segment_id.0)
        .bind(incident.criticality_id.0)
        .bind(&incident.description)
        .bind(incident.actions_taken.as_deref())
        .bind(incident.created_at.to_rfc3339())
        .bind(&incident.created_by)
        .bind(incident.updated_by.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &IncidentId) -> Result<Option<Incident>, RepositoryError> {
        let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref row) => Ok(Some(incident_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, incident: Incident) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE incidents
             SET started_at = ?, ended_at = ?, duration_minutes = ?, type_id = ?,
                 environment_id = ?, segment_id = ?, criticality_id = ?, description = ?,
                 actions_taken = ?, updated_by = ?
             WHERE id = ?",
        )
        .bind(incident.started_at.to_rfc3339())
        .bind(incident.ended_at.map(|value| value.to_rfc3339()))
        .bind(incident.duration_minutes)
        .bind(incident.type_id.0)
        .bind(incident.environment_id.0)
        .bind(incident.segment_id.0)
        .bind(incident.criticality_id.0)
        .bind(&incident.description)
        .bind(incident.actions_taken.as_deref())
        .bind(incident.updated_by.as_deref())
        .bind(&incident.id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &IncidentId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM incidents WHERE id = ?").bind(&id.0).execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, filter: IncidentFilter) -> Result<Vec<IncidentListing>, RepositoryError> {
        let mut sql = String::from(
            "SELECT i.id, i.started_at, i.ended_at, i.duration_minutes, i.type_id,
                    i.environment_id, i.segment_id, i.criticality_id, i.description,
                    i.actions_taken, i.created_at, i.created_by, i.updated_by,
                    t.name AS type_name, e.name AS environment_name,
                    s.name AS segment_name, c.name AS criticality_name
             FROM incidents i
             JOIN incident_types t ON t.id = i.type_id
             JOIN environments e ON e.id = i.environment_id
             JOIN segments s ON s.id = i.segment_id
             JOIN criticalities c ON c.id = i.criticality_id
             WHERE 1 = 1",
        );
        if filter.environment_id.is_some() {
            sql.push_str(" AND i.environment_id = ?");
        }
        if filter.started_from.is_some() {
            sql.push_str(" AND i.started_at >= ?");
        }
        if filter.started_until.is_some() {
            sql.push_str(" AND i.started_at <= ?");
        }
        sql.push_str(" ORDER BY i.started_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(environment_id) = filter.environment_id {
            query = query.bind(environment_id.0);
        }
        if let Some(from) = filter.started_from {
            query = query.bind(day_start(from));
        }
        if let Some(until) = filter.started_until {
            query = query.bind(day_end(until));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(listing_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use opsboard_core::domain::incident::{Incident, IncidentId};
    use opsboard_core::domain::reference::{
        CriticalityId, EnvironmentId, IncidentTypeId, SegmentId,
    };

    use super::SqlIncidentRepository;
    use crate::repositories::{IncidentFilter, IncidentRepository};
    use crate::{connect_with_settings, fixtures, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        fixtures::seed_reference_data(&pool).await.expect("reference data");
        pool
    }

    fn sample_incident(id: &str, started_at: chrono::DateTime<Utc>) -> Incident {
        Incident {
            id: IncidentId(id.to_string()),
            started_at,
            ended_at: Some(started_at + Duration::minutes(30)),
            duration_minutes: Some(30),
            type_id: IncidentTypeId(1),
            environment_id: EnvironmentId(1),
            segment_id: SegmentId(1),
            criticality_id: CriticalityId(2),
            description: "bgp session flap".to_string(),
            actions_taken: Some("cleared the session".to_string()),
            created_at: started_at,
            created_by: "u-op".to_string(),
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let pool = setup().await;
        let repo = SqlIncidentRepository::new(pool);
        let incident = sample_incident("inc-1", Utc::now());

        repo.insert(incident.clone()).await.expect("insert");
        let found = repo
            .find_by_id(&IncidentId("inc-1".to_string()))
            .await
            .expect("find")
            .expect("should exist");

        assert_eq!(found.description, incident.description);
        assert_eq!(found.duration_minutes, Some(30));
        assert_eq!(found.segment_id, SegmentId(1));
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_ids() {
        let pool = setup().await;
        let repo = SqlIncidentRepository::new(pool);

        let phantom = sample_incident("inc-ghost", Utc::now());
        assert!(!repo.update(phantom).await.expect("update"));
        assert!(!repo.delete(&IncidentId("inc-ghost".to_string())).await.expect("delete"));
    }

    #[tokio::test]
    async fn update_overwrites_current_state() {
        let pool = setup().await;
        let repo = SqlIncidentRepository::new(pool);
        let incident = sample_incident("inc-1", Utc::now());
        repo.insert(incident.clone()).await.expect("insert");

        let mut edited = incident;
        edited.description = "bgp session flap on the peering edge".to_string();
        edited.ended_at = None;
        edited.duration_minutes = None;
        edited.updated_by = Some("u-admin".to_string());
        assert!(repo.update(edited).await.expect("update"));

        let found = repo
            .find_by_id(&IncidentId("inc-1".to_string()))
            .await
            .expect("find")
            .expect("should exist");
        assert_eq!(found.ended_at, None);
        assert_eq!(found.duration_minutes, None);
        assert_eq!(found.updated_by.as_deref(), Some("u-admin"));
    }

    #[tokio::test]
    async fn query_filters_by_environment_and_inclusive_day_range() {
        let pool = setup().await;
        let repo = SqlIncidentRepository::new(pool);

        let aug_10 = Utc.with_ymd_and_hms(2026, 8, 10, 8, 0, 0).single().expect("timestamp");
        let aug_12_late =
            Utc.with_ymd_and_hms(2026, 8, 12, 23, 30, 0).single().expect("timestamp");
        let aug_13 = Utc.with_ymd_and_hms(2026, 8, 13, 0, 30, 0).single().expect("timestamp");

        repo.insert(sample_incident("inc-a", aug_10)).await.expect("insert a");
        repo.insert(sample_incident("inc-b", aug_12_late)).await.expect("insert b");
        repo.insert(sample_incident("inc-c", aug_13)).await.expect("insert c");

        let mut other_env = sample_incident("inc-d", aug_10);
        other_env.environment_id = EnvironmentId(2);
        other_env.segment_id = SegmentId(3);
        repo.insert(other_env).await.expect("insert d");

        let filter = IncidentFilter {
            environment_id: Some(EnvironmentId(1)),
            started_from: NaiveDate::from_ymd_opt(2026, 8, 10),
            started_until: NaiveDate::from_ymd_opt(2026, 8, 12),
        };
        let listings = repo.query(filter).await.expect("query");

        // The 23:30 incident sits inside the inclusive end day; the 00:30
        // one on the 13th does not, and environment 2 is filtered out.
        let ids: Vec<&str> =
            listings.iter().map(|listing| listing.incident.id.0.as_str()).collect();
        assert_eq!(ids, vec!["inc-b", "inc-a"]);
        assert_eq!(listings[0].environment_name, "Production");
        assert_eq!(listings[0].type_name, "Link Down");
    }
}
