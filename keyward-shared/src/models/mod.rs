/// Database models for Keyward
///
/// # Models
///
/// - `account`: Accounts, lockout bookkeeping and permission grants
/// - `session`: Refresh session records and rotation chains
///
/// # Example
///
/// ```no_run
/// use keyward_shared::models::account::{Account, CreateAccount};
/// use keyward_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let account = Account::create(&pool, CreateAccount {
///     tenant_id: Uuid::new_v4(),
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod account;
pub mod session;
