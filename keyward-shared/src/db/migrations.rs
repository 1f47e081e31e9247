/// Database migration runner
///
/// Migrations live in `migrations/` at the workspace root and are embedded at
/// compile time. Each one is reversible: `{timestamp}_{name}.up.sql` and
/// `{timestamp}_{name}.down.sql`.
///
/// # Example
///
/// ```no_run
/// use keyward_shared::db::pool::{create_pool, DatabaseConfig};
/// use keyward_shared::db::migrations::{run_migrations, get_migration_status};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::from_env()?).await?;
///
///     run_migrations(&pool).await?;
///
///     let status = get_migration_status(&pool).await?;
///     assert!(status.is_up_to_date);
///     Ok(())
/// }
/// ```

use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::postgres::PgPool;
use sqlx::Postgres;
use tracing::{debug, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Migration status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Number of migrations successfully applied
    pub applied_migrations: usize,

    /// Latest applied version
    pub latest_version: Option<i64>,

    /// Whether every embedded migration has been applied
    pub is_up_to_date: bool,
}

/// Latest version among the embedded migrations
pub fn embedded_latest_version() -> Option<i64> {
    MIGRATOR.iter().map(|m| m.version).max()
}

/// Applies all pending migrations
///
/// # Errors
///
/// Returns an error if a migration fails or was modified after being applied
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Starting database migrations");

    match MIGRATOR.run(pool).await {
        Ok(()) => {
            info!("All database migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e)
        }
    }
}

/// Reports applied migrations against the embedded set
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
            is_up_to_date: false,
        });
    }

    let (count, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = true",
    )
    .fetch_one(pool)
    .await?;

    Ok(MigrationStatus {
        applied_migrations: usize::try_from(count).unwrap_or(0),
        latest_version,
        is_up_to_date: latest_version.is_some() && latest_version >= embedded_latest_version(),
    })
}

/// Creates the database if it doesn't exist (development and tests)
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if !Postgres::database_exists(database_url).await? {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::migrate::MigrationType;
    use std::collections::BTreeSet;

    #[test]
    fn test_embedded_migrations_present() {
        let versions: BTreeSet<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert_eq!(versions.len(), 3);
        assert_eq!(embedded_latest_version(), Some(20260101000003));
    }

    #[test]
    fn test_embedded_migrations_are_reversible() {
        let downs = MIGRATOR
            .iter()
            .filter(|m| matches!(m.migration_type, MigrationType::ReversibleDown))
            .count();
        assert_eq!(downs, 3);
    }
}
