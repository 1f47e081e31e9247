/// PostgreSQL-backed stores
///
/// Thin adapters over the query functions on [`Account`] and
/// [`RefreshSession`]. Multi-statement operations (cap enforcement, rotation)
/// run inside a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{AccountStore, SessionStore, StoreError};
use crate::auth::lockout::{LockoutOutcome, LockoutPolicy};
use crate::models::account::Account;
use crate::models::session::{RefreshSession, RevocationReason};

/// Accounts in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_identifier(
        &self,
        tenant_id: Uuid,
        identifier: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(Account::find_by_identifier(&self.pool, tenant_id, identifier).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(Account::find_by_id(&self.pool, id).await?)
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutOutcome>, StoreError> {
        let row = Account::record_failure(
            &self.pool,
            id,
            policy.threshold_i32(),
            now,
            policy.lock_until(now),
        )
        .await?;

        Ok(row.map(|(failed_attempts, locked_until)| {
            let locked = locked_until.is_some_and(|until| until > now);
            LockoutOutcome {
                locked,
                lock_until: if locked { locked_until } else { None },
                failed_attempts,
            }
        }))
    }

    async fn record_login_success(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), StoreError> {
        Account::record_success(&self.pool, id, now, ip).await?;
        Ok(())
    }

    async fn reset_failures(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        Account::reset_failures(&self.pool, id, now).await?;
        Ok(())
    }

    async fn permissions(&self, id: Uuid) -> Result<Vec<String>, StoreError> {
        Ok(Account::permissions(&self.pool, id).await?)
    }
}

/// Refresh sessions in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert_with_cap(
        &self,
        session: RefreshSession,
        max_live: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent logins of the same account
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(session.account_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner.is_none() {
            return Err(StoreError::Integrity(format!(
                "account {} does not exist",
                session.account_id
            )));
        }

        let live = RefreshSession::list_live(&mut *tx, session.account_id, now).await?;
        let excess = (live.len() + 1).saturating_sub(max_live.max(1));

        let mut evicted = Vec::with_capacity(excess);
        for old in live.iter().take(excess) {
            if RefreshSession::revoke_if_live(&mut *tx, old.id, RevocationReason::SessionLimit, now, None)
                .await?
            {
                evicted.push(old.id);
            }
        }

        RefreshSession::insert(&mut *tx, &session).await?;
        tx.commit().await?;

        debug!(
            account_id = %session.account_id,
            session_id = %session.id,
            evicted = evicted.len(),
            "Inserted refresh session"
        );

        Ok(evicted)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>, StoreError> {
        Ok(RefreshSession::find_by_hash(&self.pool, token_hash).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshSession>, StoreError> {
        Ok(RefreshSession::find_by_id(&self.pool, id).await?)
    }

    async fn revoke_if_live(
        &self,
        id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(RefreshSession::revoke_if_live(&self.pool, id, reason, now, ip).await?)
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: RefreshSession,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The successor must exist before the old row can reference it
        RefreshSession::insert(&mut *tx, &replacement).await?;

        let won = RefreshSession::mark_rotated(&mut *tx, old_id, replacement.id, now, ip).await?;
        if !won {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_all_live(
        &self,
        account_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, StoreError> {
        Ok(RefreshSession::revoke_all_for_account(&self.pool, account_id, reason, now, ip).await?)
    }

    async fn list_live(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        Ok(RefreshSession::list_live(&self.pool, account_id, now).await?)
    }
}
