/// Persistence seams for the session lifecycle
///
/// The lifecycle talks to storage only through [`AccountStore`] and
/// [`SessionStore`]. Two implementations ship with the crate:
///
/// - [`postgres`]: sqlx / PostgreSQL, used by the API server
/// - [`memory`]: tokio-mutex guarded maps, used by tests and embedders
///
/// Both apply the same atomicity rules: the failed-login increment is
/// serialized per account, rotation is a compare-and-set plus insert that
/// either fully happens or not at all, and cap enforcement runs in the same
/// unit of work as the insert it makes room for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::lockout::{LockoutOutcome, LockoutPolicy};
use crate::models::account::Account;
use crate::models::session::{RefreshSession, RevocationReason};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAccountStore, MemorySessionStore};
pub use postgres::{PgAccountStore, PgSessionStore};

/// Storage failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data violates an invariant the store relies on
    #[error("Integrity violation: {0}")]
    Integrity(String),
}

/// Account lookups and lockout bookkeeping
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Finds an account in `tenant_id` by username or email
    async fn find_by_identifier(
        &self,
        tenant_id: Uuid,
        identifier: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Finds an account by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Applies one failed login atomically; `None` if the account is gone
    async fn record_login_failure(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutOutcome>, StoreError>;

    /// Clears failures and stamps the login time and address
    async fn record_login_success(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Clears a non-zero failure counter on an unlocked account
    async fn reset_failures(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Permission codes granted to the account
    async fn permissions(&self, id: Uuid) -> Result<Vec<String>, StoreError>;
}

/// Refresh session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts `session` and revokes the oldest live sessions of the same
    /// account so that at most `max_live` remain live, the new one included
    ///
    /// Returns the IDs revoked with reason `session_limit`.
    async fn insert_with_cap(
        &self,
        session: RefreshSession,
        max_live: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Looks a session up by token hash
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>, StoreError>;

    /// Looks a session up by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshSession>, StoreError>;

    /// Revokes `id` if not yet revoked; `true` if this call revoked it
    async fn revoke_if_live(
        &self,
        id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Rotates `old_id` into `replacement`
    ///
    /// Compare-and-set on the old record (unrevoked and unexpired) plus the
    /// insert of the replacement, as one unit. Returns `false`, with nothing
    /// written, when the old record was no longer live.
    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: RefreshSession,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Revokes every live (unrevoked, unexpired) session of an account; returns the count
    async fn revoke_all_live(
        &self,
        account_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, StoreError>;

    /// Live sessions of an account, oldest first
    async fn list_live(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError>;
}
