/// Account model and database operations
///
/// An account is the identity record the session lifecycle authenticates.
/// This crate only reads identity fields and writes the lockout counter,
/// lock window and last-login stamp; creation and deactivation belong to the
/// administration side and are provided here for provisioning and tests.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE accounts (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL,
///     username VARCHAR(64) NOT NULL,
///     email CITEXT NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     failed_login_attempts INTEGER NOT NULL DEFAULT 0,
///     locked_until TIMESTAMPTZ,
///     last_login_at TIMESTAMPTZ,
///     last_login_ip VARCHAR(64),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (tenant_id, username),
///     UNIQUE (tenant_id, email)
/// );
/// ```
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
/// let tenant_id = Uuid::new_v4();
///
/// let account = Account::create(&pool, CreateAccount {
///     tenant_id,
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// let found = Account::find_by_identifier(&pool, tenant_id, "ALICE@example.com").await?;
/// assert_eq!(found.map(|a| a.id), Some(account.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, tenant_id, username, email::TEXT AS email, password_hash, is_active, \
     failed_login_attempts, locked_until, last_login_at, last_login_ip, created_at, updated_at";

/// Account model
///
/// Passwords are stored as Argon2id hashes, never in plaintext. The hash is
/// skipped during serialization.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    /// Unique account ID
    pub id: Uuid,

    /// Tenant the account belongs to
    pub tenant_id: Uuid,

    /// Login name, unique within the tenant
    pub username: String,

    /// Email address, unique (case-insensitive) within the tenant
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Deactivated accounts cannot log in or refresh
    pub is_active: bool,

    /// Consecutive failed logins since the last success
    pub failed_login_attempts: i32,

    /// Login refused while this is in the future
    pub locked_until: Option<DateTime<Utc>>,

    /// Last successful login
    pub last_login_at: Option<DateTime<Utc>>,

    /// Client address of the last successful login
    pub last_login_ip: Option<String>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    /// Tenant ID
    pub tenant_id: Uuid,

    /// Login name
    pub username: String,

    /// Email address
    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,
}

impl Account {
    /// Builds an account value without touching the database
    ///
    /// Used by the in-memory store and tests.
    pub fn new(data: CreateAccount, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: data.tenant_id,
            username: data.username,
            email: data.email,
            password_hash: data.password_hash,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `identifier` names this account (username exact, email case-insensitive)
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.username == identifier || self.email.eq_ignore_ascii_case(identifier)
    }

    /// Creates a new account in the database
    ///
    /// # Errors
    ///
    /// Returns an error if the username or email already exists in the tenant,
    /// or if the database connection fails
    pub async fn create(pool: &PgPool, data: CreateAccount) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounts (tenant_id, username, email, password_hash) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            ACCOUNT_COLUMNS
        );

        sqlx::query_as::<_, Account>(&query)
            .bind(data.tenant_id)
            .bind(data.username)
            .bind(data.email)
            .bind(data.password_hash)
            .fetch_one(pool)
            .await
    }

    /// Finds an account by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);

        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds an account in a tenant by username or email
    ///
    /// Email comparison is case-insensitive (CITEXT); username is exact.
    pub async fn find_by_identifier(
        pool: &PgPool,
        tenant_id: Uuid,
        identifier: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM accounts \
             WHERE tenant_id = $1 AND (username = $2 OR email = $2::CITEXT) \
             ORDER BY (username = $2) DESC \
             LIMIT 1",
            ACCOUNT_COLUMNS
        );

        sqlx::query_as::<_, Account>(&query)
            .bind(tenant_id)
            .bind(identifier)
            .fetch_optional(pool)
            .await
    }

    /// Applies one failed login atomically
    ///
    /// The whole lockout rule runs inside a single `UPDATE`, so concurrent
    /// failures against one account serialize on the row lock and none is
    /// lost:
    ///
    /// - an active lock is left untouched (no sliding lockout);
    /// - an elapsed lock restarts counting from zero;
    /// - otherwise the counter grows, capped at `threshold`, and reaching the
    ///   threshold sets `locked_until = lock_until`.
    ///
    /// Returns the resulting `(failed_login_attempts, locked_until)`, or `None`
    /// if the account vanished.
    pub async fn record_failure(
        pool: &PgPool,
        id: Uuid,
        threshold: i32,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<(i32, Option<DateTime<Utc>>)>, sqlx::Error> {
        sqlx::query_as::<_, (i32, Option<DateTime<Utc>>)>(
            r#"
            UPDATE accounts
            SET failed_login_attempts = CASE
                    WHEN locked_until > $2 THEN failed_login_attempts
                    WHEN locked_until IS NOT NULL THEN LEAST(1, $3)
                    ELSE LEAST(failed_login_attempts + 1, $3)
                END,
                locked_until = CASE
                    WHEN locked_until > $2 THEN locked_until
                    WHEN (CASE WHEN locked_until IS NOT NULL THEN 1
                               ELSE failed_login_attempts + 1 END) >= $3 THEN $4
                    ELSE NULL
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(threshold)
        .bind(lock_until)
        .fetch_optional(pool)
        .await
    }

    /// Clears the failure counter and lock, and stamps the login
    pub async fn record_success(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = $2,
                last_login_ip = $3,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(ip)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Resets the failure counter without stamping a login
    ///
    /// Only touches rows that are not currently locked.
    pub async fn reset_failures(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET failed_login_attempts = 0,
                locked_until = NULL,
                updated_at = $2
            WHERE id = $1
              AND failed_login_attempts > 0
              AND (locked_until IS NULL OR locked_until <= $2)
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Activates or deactivates an account
    pub async fn set_active(pool: &PgPool, id: Uuid, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(active)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists the permission codes granted to an account, sorted
    pub async fn permissions(pool: &PgPool, id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT permission_code
            FROM account_permissions
            WHERE account_id = $1
            ORDER BY permission_code
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }

    /// Grants a permission code (no-op if already granted)
    pub async fn grant_permission(pool: &PgPool, id: Uuid, code: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO account_permissions (account_id, permission_code)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(code)
        .execute(pool)
        .await?;

        Ok(())
    }
}
