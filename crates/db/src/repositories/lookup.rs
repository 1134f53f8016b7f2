use sqlx::Row;

use opsboard_core::domain::reference::{
    Criticality, CriticalityId, Environment, EnvironmentId, IncidentType, IncidentTypeId, Segment,
    SegmentId,
};

use super::{LookupRepository, RepositoryError};
use crate::DbPool;

/// Read-only access to the classification reference tables. These rows are
/// seeded, small, and queried per request without caching.
pub struct SqlLookupRepository {
    pool: DbPool,
}

impl SqlLookupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LookupRepository for SqlLookupRepository {
    async fn environment(
        &self,
        id: EnvironmentId,
    ) -> Result<Option<Environment>, RepositoryError> {
        let row = sqlx::query("SELECT id, name FROM environments WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Environment {
            id: EnvironmentId(row.get("id")),
            name: row.get("name"),
        }))
    }

    async fn segment(&self, id: SegmentId) -> Result<Option<Segment>, RepositoryError> {
        let row = sqlx::query("SELECT id, environment_id, name FROM segments WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Segment {
            id: SegmentId(row.get("id")),
            environment_id: EnvironmentId(row.get("environment_id")),
            name: row.get("name"),
        }))
    }

    async fn incident_type(
        &self,
        id: IncidentTypeId,
    ) -> Result<Option<IncidentType>, RepositoryError> {
        let row = sqlx::query("SELECT id, name FROM incident_types WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| IncidentType {
            id: IncidentTypeId(row.get("id")),
            name: row.get("name"),
        }))
    }

    async fn criticality(
        &self,
        id: CriticalityId,
    ) -> Result<Option<Criticality>, RepositoryError> {
        let row = sqlx::query("SELECT id, name FROM criticalities WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Criticality {
            id: CriticalityId(row.get("id")),
            name: row.get("name"),
        }))
    }

    async fn environments(&self) -> Result<Vec<Environment>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name FROM environments ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Environment { id: EnvironmentId(row.get("id")), name: row.get("name") })
            .collect())
    }

    async fn segments_for_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Vec<Segment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, environment_id, name FROM segments WHERE environment_id = ? ORDER BY name",
        )
        .bind(environment_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Segment {
                id: SegmentId(row.get("id")),
                environment_id: EnvironmentId(row.get("environment_id")),
                name: row.get("name"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use opsboard_core::domain::reference::{EnvironmentId, IncidentTypeId, SegmentId};

    use super::SqlLookupRepository;
    use crate::repositories::LookupRepository;
    use crate::{connect_with_settings, fixtures, migrations};

    async fn setup() -> SqlLookupRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        fixtures::seed_reference_data(&pool).await.expect("reference data");
        SqlLookupRepository::new(pool)
    }

    #[tokio::test]
    async fn finds_seeded_reference_rows_by_id() {
        let repo = setup().await;

        let environment = repo
            .environment(EnvironmentId(1))
            .await
            .expect("environment query")
            .expect("environment 1");
        assert_eq!(environment.name, "Production");

        let incident_type = repo
            .incident_type(IncidentTypeId(2))
            .await
            .expect("type query")
            .expect("type 2");
        assert_eq!(incident_type.name, "Power Outage");

        assert!(repo.segment(SegmentId(999)).await.expect("segment query").is_none());
    }

    #[tokio::test]
    async fn segments_are_scoped_to_their_environment() {
        let repo = setup().await;

        let segments = repo
            .segments_for_environment(EnvironmentId(1))
            .await
            .expect("segments query");

        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|segment| segment.environment_id == EnvironmentId(1)));

        let names: Vec<&str> = segments.iter().map(|segment| segment.name.as_str()).collect();
        assert_eq!(names, vec!["Access", "Core"]);
    }

    #[tokio::test]
    async fn environments_list_is_sorted_by_name() {
        let repo = setup().await;

        let environments = repo.environments().await.expect("environments query");
        let names: Vec<&str> =
            environments.iter().map(|environment| environment.name.as_str()).collect();
        assert_eq!(names, vec!["Homologation", "Production"]);
    }
}
