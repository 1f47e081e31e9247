/// Database layer for Keyward
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: Embedded migration runner
///
/// Models are in the `models` module at crate root level.
///
/// # Example
///
/// ```no_run
/// use keyward_shared::db::pool::{create_pool, DatabaseConfig};
/// use keyward_shared::db::migrations::run_migrations;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::from_env()?).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
