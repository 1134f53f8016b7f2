use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use opsboard_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Busy handler wait before a locked write gives up. Approval resolutions
/// contend on the same request row, so waiting briefly beats surfacing an
/// immediate SQLITE_BUSY to the caller.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool described by the application config.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use opsboard_core::config::DatabaseConfig;

    use super::connect;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn config_driven_pool_enforces_foreign_keys() {
        let pool = connect(&memory_config()).await.expect("connect");

        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma query");
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn zero_sized_pool_settings_are_clamped() {
        let config = DatabaseConfig { max_connections: 0, timeout_secs: 0, ..memory_config() };
        let pool = connect(&config).await.expect("connect despite zero settings");

        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.expect("query");
        assert_eq!(one, 1);
    }
}
