/// In-memory stores
///
/// Each store keeps its state behind one `tokio::sync::Mutex`, so every trait
/// operation is a single critical section: the lockout increment, the
/// rotation compare-and-set and cap enforcement cannot interleave.
///
/// Clones share state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AccountStore, SessionStore, StoreError};
use crate::auth::lockout::{self, LockoutOutcome, LockoutPolicy};
use crate::models::account::{Account, CreateAccount};
use crate::models::session::{RefreshSession, RevocationReason};

#[derive(Debug, Default)]
struct AccountState {
    accounts: HashMap<Uuid, Account>,
    permissions: HashMap<Uuid, BTreeSet<String>>,
}

/// Accounts held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    state: Arc<Mutex<AccountState>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisions an account
    ///
    /// # Errors
    ///
    /// `StoreError::Integrity` if the username or email is taken in the tenant
    pub async fn create(&self, data: CreateAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let mut state = self.state.lock().await;

        let taken = state.accounts.values().any(|a| {
            a.tenant_id == data.tenant_id
                && (a.username == data.username || a.email.eq_ignore_ascii_case(&data.email))
        });
        if taken {
            return Err(StoreError::Integrity(format!(
                "username or email already registered in tenant {}",
                data.tenant_id
            )));
        }

        let account = Account::new(data, now);
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    /// Activates or deactivates an account; `false` if unknown
    pub async fn set_active(&self, id: Uuid, active: bool) -> bool {
        let mut state = self.state.lock().await;
        match state.accounts.get_mut(&id) {
            Some(account) => {
                account.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Grants a permission code
    pub async fn grant_permission(&self, id: Uuid, code: &str) {
        let mut state = self.state.lock().await;
        state
            .permissions
            .entry(id)
            .or_default()
            .insert(code.to_string());
    }

    /// Snapshot of an account
    pub async fn get(&self, id: Uuid) -> Option<Account> {
        self.state.lock().await.accounts.get(&id).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_identifier(
        &self,
        tenant_id: Uuid,
        identifier: &str,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.state.lock().await;

        // Username match wins over an email match
        let mut email_match = None;
        for account in state.accounts.values().filter(|a| a.tenant_id == tenant_id) {
            if account.username == identifier {
                return Ok(Some(account.clone()));
            }
            if email_match.is_none() && account.matches_identifier(identifier) {
                email_match = Some(account);
            }
        }

        Ok(email_match.cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutOutcome>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .accounts
            .get_mut(&id)
            .map(|account| policy.record_failure(account, now)))
    }

    async fn record_login_success(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.get_mut(&id) {
            lockout::record_success(account);
            account.last_login_at = Some(now);
            account.last_login_ip = ip.map(str::to_string);
            account.updated_at = now;
        }
        Ok(())
    }

    async fn reset_failures(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.get_mut(&id) {
            let locked = account.locked_until.is_some_and(|until| until > now);
            if account.failed_login_attempts > 0 && !locked {
                lockout::record_success(account);
                account.updated_at = now;
            }
        }
        Ok(())
    }

    async fn permissions(&self, id: Uuid) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .permissions
            .get(&id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<Uuid, RefreshSession>,
    by_hash: HashMap<String, Uuid>,
}

impl SessionState {
    fn insert(&mut self, session: RefreshSession) -> Result<(), StoreError> {
        if self.by_hash.contains_key(&session.token_hash) || self.sessions.contains_key(&session.id) {
            return Err(StoreError::Integrity("duplicate refresh session".to_string()));
        }
        self.by_hash.insert(session.token_hash.clone(), session.id);
        self.sessions.insert(session.id, session);
        Ok(())
    }

    fn live_oldest_first(&self, account_id: Uuid, now: DateTime<Utc>) -> Vec<RefreshSession> {
        let mut live: Vec<RefreshSession> = self
            .sessions
            .values()
            .filter(|s| s.account_id == account_id && s.is_live(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
        live
    }
}

/// Refresh sessions held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    state: Arc<Mutex<SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a record as-is, bypassing every check
    ///
    /// For seeding fixtures, including deliberately inconsistent chains.
    pub async fn put_raw(&self, session: RefreshSession) {
        let mut state = self.state.lock().await;
        state.by_hash.insert(session.token_hash.clone(), session.id);
        state.sessions.insert(session.id, session);
    }

    /// Every stored record, in no particular order
    pub async fn all(&self) -> Vec<RefreshSession> {
        self.state.lock().await.sessions.values().cloned().collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert_with_cap(
        &self,
        session: RefreshSession,
        max_live: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut state = self.state.lock().await;

        let live = state.live_oldest_first(session.account_id, now);
        let excess = (live.len() + 1).saturating_sub(max_live.max(1));
        let doomed: Vec<Uuid> = live.iter().take(excess).map(|s| s.id).collect();

        state.insert(session)?;

        let mut evicted = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(old) = state.sessions.get_mut(&id) {
                if old.revoke(RevocationReason::SessionLimit, now, None) {
                    evicted.push(id);
                }
            }
        }

        Ok(evicted)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_hash
            .get(token_hash)
            .and_then(|id| state.sessions.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshSession>, StoreError> {
        Ok(self.state.lock().await.sessions.get(&id).cloned())
    }

    async fn revoke_if_live(
        &self,
        id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .sessions
            .get_mut(&id)
            .is_some_and(|s| s.revoke(reason, now, ip)))
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: RefreshSession,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;

        let live = state.sessions.get(&old_id).is_some_and(|s| s.is_live(now));
        if !live {
            return Ok(false);
        }

        let replacement_id = replacement.id;
        state.insert(replacement)?;

        if let Some(old) = state.sessions.get_mut(&old_id) {
            old.revoke(RevocationReason::Rotated, now, ip);
            old.replaced_by = Some(replacement_id);
        }
        Ok(true)
    }

    async fn revoke_all_live(
        &self,
        account_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for session in state.sessions.values_mut() {
            if session.account_id == account_id
                && session.is_live(now)
                && session.revoke(reason, now, ip)
            {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_live(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        Ok(self.state.lock().await.live_oldest_first(account_id, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::NewSession;
    use chrono::Duration;

    fn new_session(account_id: Uuid, hash: &str, now: DateTime<Utc>) -> RefreshSession {
        RefreshSession::new(
            NewSession {
                account_id,
                tenant_id: Uuid::nil(),
                token_hash: hash.to_string(),
                created_by_ip: None,
            },
            now,
            Duration::days(1),
        )
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_identity() {
        let store = MemoryAccountStore::new();
        let tenant_id = Uuid::new_v4();
        let data = CreateAccount {
            tenant_id,
            username: "u1".to_string(),
            email: "u1@example.com".to_string(),
            password_hash: String::new(),
        };

        store.create(data.clone(), Utc::now()).await.unwrap();
        let dup = CreateAccount {
            username: "u2".to_string(),
            email: "U1@EXAMPLE.com".to_string(),
            ..data.clone()
        };
        assert!(matches!(
            store.create(dup, Utc::now()).await,
            Err(StoreError::Integrity(_))
        ));

        // Same name in a different tenant is fine
        let other = CreateAccount {
            tenant_id: Uuid::new_v4(),
            ..data
        };
        assert!(store.create(other, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_find_by_identifier_scoped_to_tenant() {
        let store = MemoryAccountStore::new();
        let tenant_id = Uuid::new_v4();
        let account = store
            .create(
                CreateAccount {
                    tenant_id,
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    password_hash: String::new(),
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let by_email = store
            .find_by_identifier(tenant_id, "ALICE@example.com")
            .await
            .unwrap();
        assert_eq!(by_email.map(|a| a.id), Some(account.id));

        let elsewhere = store
            .find_by_identifier(Uuid::new_v4(), "alice")
            .await
            .unwrap();
        assert!(elsewhere.is_none());
    }

    #[tokio::test]
    async fn test_permissions_sorted_and_deduplicated() {
        let store = MemoryAccountStore::new();
        let id = Uuid::new_v4();
        store.grant_permission(id, "b:write").await;
        store.grant_permission(id, "a:read").await;
        store.grant_permission(id, "a:read").await;

        assert_eq!(store.permissions(id).await.unwrap(), vec!["a:read", "b:write"]);
        assert!(store.permissions(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_is_compare_and_set() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let account_id = Uuid::new_v4();
        let old = new_session(account_id, "h0", now);
        let old_id = old.id;
        store.insert_with_cap(old, 5, now).await.unwrap();

        let first = new_session(account_id, "h1", now);
        let first_id = first.id;
        assert!(store.rotate(old_id, first, now, None).await.unwrap());

        let second = new_session(account_id, "h2", now);
        assert!(!store.rotate(old_id, second, now, None).await.unwrap());

        let old = store.find_by_id(old_id).await.unwrap().unwrap();
        assert_eq!(old.replaced_by, Some(first_id));
        assert_eq!(old.revoked_reason, Some(RevocationReason::Rotated));
        // The losing replacement was never written
        assert!(store.find_by_hash("h2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_refuses_expired_record() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let old = new_session(Uuid::new_v4(), "h0", now);
        let old_id = old.id;
        let account_id = old.account_id;
        store.insert_with_cap(old, 5, now).await.unwrap();

        let later = now + Duration::days(2);
        let replacement = new_session(account_id, "h1", later);
        assert!(!store.rotate(old_id, replacement, later, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_with_cap_evicts_oldest() {
        let store = MemorySessionStore::new();
        let start = Utc::now();
        let account_id = Uuid::new_v4();

        let mut ids = Vec::new();
        for i in 0..4 {
            let at = start + Duration::seconds(i);
            let s = new_session(account_id, &format!("h{}", i), at);
            ids.push(s.id);
            let evicted = store.insert_with_cap(s, 3, at).await.unwrap();
            if i < 3 {
                assert!(evicted.is_empty());
            } else {
                assert_eq!(evicted, vec![ids[0]]);
            }
        }

        let live: Vec<Uuid> = store
            .list_live(account_id, start + Duration::seconds(4))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(live, ids[1..].to_vec());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let account_id = Uuid::new_v4();
        store
            .insert_with_cap(new_session(account_id, "same", now), 5, now)
            .await
            .unwrap();

        let result = store
            .insert_with_cap(new_session(account_id, "same", now), 5, now)
            .await;
        assert!(matches!(result, Err(StoreError::Integrity(_))));
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_all_live_counts_only_unrevoked() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let account_id = Uuid::new_v4();
        let first = new_session(account_id, "h0", now);
        let first_id = first.id;
        store.insert_with_cap(first, 5, now).await.unwrap();
        store
            .insert_with_cap(new_session(account_id, "h1", now), 5, now)
            .await
            .unwrap();
        store
            .insert_with_cap(new_session(Uuid::new_v4(), "h2", now), 5, now)
            .await
            .unwrap();

        assert!(store
            .revoke_if_live(first_id, RevocationReason::Logout, now, None)
            .await
            .unwrap());
        let count = store
            .revoke_all_live(account_id, RevocationReason::LogoutAll, now, Some("10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert!(store.list_live(account_id, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoke_all_live_skips_expired() {
        let store = MemorySessionStore::new();
        let start = Utc::now();
        let account_id = Uuid::new_v4();
        let stale = new_session(account_id, "h0", start);
        let stale_id = stale.id;
        store.insert_with_cap(stale, 5, start).await.unwrap();

        let later = start + Duration::days(2);
        store
            .insert_with_cap(new_session(account_id, "h1", later), 5, later)
            .await
            .unwrap();

        let count = store
            .revoke_all_live(account_id, RevocationReason::LogoutAll, later, None)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let stale = store.find_by_id(stale_id).await.unwrap().unwrap();
        assert!(!stale.revoked);
    }
}
