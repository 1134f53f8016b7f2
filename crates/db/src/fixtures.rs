//! Deterministic seed data for local development and the doctor command.
//!
//! Reference rows use fixed ids so dashboards, demos, and tests agree on
//! what id 1 means. All inserts are `INSERT OR IGNORE`, so re-seeding an
//! already-seeded database is a no-op.

use sqlx::Row;

use opsboard_core::domain::incident::duration_minutes_between;

use crate::repositories::RepositoryError;
use crate::DbPool;

const ENVIRONMENTS: &[(i64, &str)] = &[(1, "Production"), (2, "Homologation")];

const SEGMENTS: &[(i64, i64, &str)] = &[(1, 1, "Core"), (2, 1, "Access"), (3, 2, "Core")];

const INCIDENT_TYPES: &[(i64, &str)] =
    &[(1, "Link Down"), (2, "Power Outage"), (3, "Hardware Failure")];

const CRITICALITIES: &[(i64, &str)] = &[(1, "High"), (2, "Medium"), (3, "Low")];

/// Demo incidents with fixed ids and past timestamps. Third column is the
/// RFC 3339 start, fourth the end (empty for still-open incidents).
const DEMO_INCIDENTS: &[(&str, i64, &str, &str, &str)] = &[
    (
        "inc-demo-0001",
        1,
        "2026-07-14T03:12:00+00:00",
        "2026-07-14T04:40:00+00:00",
        "fiber cut between the core ring and the access layer",
    ),
    (
        "inc-demo-0002",
        2,
        "2026-08-02T22:05:00+00:00",
        "2026-08-03T01:15:00+00:00",
        "utility power loss at the homologation site, generator carried the load",
    ),
    (
        "inc-demo-0003",
        3,
        "2026-08-20T11:30:00+00:00",
        "",
        "line card flapping on the production edge, replacement en route",
    ),
];

/// Row counts after seeding, reported by the doctor command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedReport {
    pub environments: i64,
    pub segments: i64,
    pub incident_types: i64,
    pub criticalities: i64,
    pub incidents: i64,
}

impl SeedReport {
    pub fn reference_data_complete(&self) -> bool {
        self.environments >= ENVIRONMENTS.len() as i64
            && self.segments >= SEGMENTS.len() as i64
            && self.incident_types >= INCIDENT_TYPES.len() as i64
            && self.criticalities >= CRITICALITIES.len() as i64
    }
}

/// Seeds the classification reference tables. Idempotent.
pub async fn seed_reference_data(pool: &DbPool) -> Result<(), RepositoryError> {
    for (id, name) in ENVIRONMENTS {
        sqlx::query("INSERT OR IGNORE INTO environments (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await?;
    }

    for (id, environment_id, name) in SEGMENTS {
        sqlx::query("INSERT OR IGNORE INTO segments (id, environment_id, name) VALUES (?, ?, ?)")
            .bind(id)
            .bind(environment_id)
            .bind(name)
            .execute(pool)
            .await?;
    }

    for (id, name) in INCIDENT_TYPES {
        sqlx::query("INSERT OR IGNORE INTO incident_types (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await?;
    }

    for (id, name) in CRITICALITIES {
        sqlx::query("INSERT OR IGNORE INTO criticalities (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Seeds a handful of demo incidents on top of the reference data.
/// Idempotent; intended for local development only.
pub async fn seed_demo_incidents(pool: &DbPool) -> Result<(), RepositoryError> {
    for (id, type_id, started_at, ended_at, description) in DEMO_INCIDENTS {
        let ended_at = (!ended_at.is_empty()).then_some(*ended_at);
        let duration_minutes = match ended_at {
            Some(end) => {
                let start =
                    super::repositories::parse_timestamp("started_at", started_at.to_string())?;
                let end = super::repositories::parse_timestamp("ended_at", end.to_string())?;
                Some(duration_minutes_between(start, end))
            }
            None => None,
        };

        sqlx::query(
            "INSERT OR IGNORE INTO incidents (id, started_at, ended_at, duration_minutes,
                                              type_id, environment_id, segment_id,
                                              criticality_id, description, actions_taken,
                                              created_at, created_by, updated_by)
             VALUES (?, ?, ?, ?, ?, 1, 1, 2, ?, NULL, ?, 'seed', NULL)",
        )
        .bind(id)
        .bind(started_at)
        .bind(ended_at)
        .bind(duration_minutes)
        .bind(type_id)
        .bind(description)
        .bind(started_at)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Counts the seeded tables, for the doctor command and seed verification.
pub async fn verify_seed(pool: &DbPool) -> Result<SeedReport, RepositoryError> {
    async fn count(pool: &DbPool, table: &str) -> Result<i64, RepositoryError> {
        // Table names come from the fixed list below, never from input.
        let sql = format!("SELECT COUNT(*) AS count FROM {table}");
        Ok(sqlx::query(&sql).fetch_one(pool).await?.get("count"))
    }

    Ok(SeedReport {
        environments: count(pool, "environments").await?,
        segments: count(pool, "segments").await?,
        incident_types: count(pool, "incident_types").await?,
        criticalities: count(pool, "criticalities").await?,
        incidents: count(pool, "incidents").await?,
    })
}

#[cfg(test)]
mod tests {
    use super::{seed_demo_incidents, seed_reference_data, verify_seed};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        seed_reference_data(&pool).await.expect("first seed");
        seed_demo_incidents(&pool).await.expect("first demo seed");
        let first = verify_seed(&pool).await.expect("first report");

        seed_reference_data(&pool).await.expect("second seed");
        seed_demo_incidents(&pool).await.expect("second demo seed");
        let second = verify_seed(&pool).await.expect("second report");

        assert_eq!(first, second);
        assert!(first.reference_data_complete());
        assert_eq!(first.environments, 2);
        assert_eq!(first.segments, 3);
        assert_eq!(first.incident_types, 3);
        assert_eq!(first.criticalities, 3);
        assert_eq!(first.incidents, 3);
    }

    #[tokio::test]
    async fn demo_incidents_carry_rounded_durations() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_reference_data(&pool).await.expect("seed");
        seed_demo_incidents(&pool).await.expect("demo seed");

        use sqlx::Row;
        let row = sqlx::query(
            "SELECT duration_minutes FROM incidents WHERE id = 'inc-demo-0001'",
        )
        .fetch_one(&pool)
        .await
        .expect("demo incident");
        assert_eq!(row.get::<Option<i64>, _>("duration_minutes"), Some(88));

        let open = sqlx::query(
            "SELECT duration_minutes, ended_at FROM incidents WHERE id = 'inc-demo-0003'",
        )
        .fetch_one(&pool)
        .await
        .expect("open demo incident");
        assert_eq!(open.get::<Option<i64>, _>("duration_minutes"), None);
        assert_eq!(open.get::<Option<String>, _>("ended_at"), None);
    }
}
