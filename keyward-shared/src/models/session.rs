/// Refresh session model and database operations
///
/// One row per issued refresh token. The row is keyed by the SHA-256 of the
/// opaque token; the plaintext never reaches the database.
///
/// Rotation links records into a forward chain: when a token is exchanged the
/// old row is revoked with reason `rotated` and `replaced_by` points at its
/// successor. Presenting a rotated token again is how reuse is detected.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE refresh_sessions (
///     id UUID PRIMARY KEY,
///     account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
///     tenant_id UUID NOT NULL,
///     token_hash CHAR(64) NOT NULL UNIQUE,
///     issued_at TIMESTAMPTZ NOT NULL,
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_by_ip VARCHAR(64),
///     revoked BOOLEAN NOT NULL DEFAULT FALSE,
///     revoked_at TIMESTAMPTZ,
///     revoked_reason revocation_reason,
///     revoked_by_ip VARCHAR(64),
///     replaced_by UUID REFERENCES refresh_sessions(id)
/// );
/// ```
///
/// The query functions are generic over [`sqlx::PgExecutor`] so they run
/// equally against the pool or inside a transaction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use std::fmt;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, account_id, tenant_id, token_hash, issued_at, expires_at, \
     created_by_ip, revoked, revoked_at, revoked_reason, revoked_by_ip, replaced_by";

/// Why a session stopped being usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "revocation_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// Exchanged for a successor token
    Rotated,
    /// Single-session logout
    Logout,
    /// Logout from every device
    LogoutAll,
    /// Evicted by the per-account session cap
    SessionLimit,
    /// Descendant of a replayed rotated token
    ReuseDetected,
    /// Account was deactivated or locked when the session was used
    AccountDisabled,
}

impl RevocationReason {
    /// Database label
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Rotated => "rotated",
            RevocationReason::Logout => "logout",
            RevocationReason::LogoutAll => "logout_all",
            RevocationReason::SessionLimit => "session_limit",
            RevocationReason::ReuseDetected => "reuse_detected",
            RevocationReason::AccountDisabled => "account_disabled",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived lifecycle state; every state but `Active` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Rotated,
    Revoked,
    Expired,
}

/// Refresh session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshSession {
    /// Session ID
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    /// Tenant of the owning account
    pub tenant_id: Uuid,

    /// SHA-256 hex of the opaque token
    #[serde(skip_serializing, default)]
    pub token_hash: String,

    /// When the token was issued
    pub issued_at: DateTime<Utc>,

    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,

    /// Client address at issuance
    pub created_by_ip: Option<String>,

    /// Revocation flag
    pub revoked: bool,

    /// When the session was revoked
    pub revoked_at: Option<DateTime<Utc>>,

    /// Why the session was revoked
    pub revoked_reason: Option<RevocationReason>,

    /// Client address that caused the revocation
    pub revoked_by_ip: Option<String>,

    /// Successor session, set on rotation
    pub replaced_by: Option<Uuid>,
}

/// Input for a new session row
#[derive(Debug, Clone)]
pub struct NewSession {
    pub account_id: Uuid,
    pub tenant_id: Uuid,
    pub token_hash: String,
    pub created_by_ip: Option<String>,
}

impl RefreshSession {
    /// Builds an active session issued at `now`
    pub fn new(data: NewSession, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: data.account_id,
            tenant_id: data.tenant_id,
            token_hash: data.token_hash,
            issued_at: now,
            expires_at: now + ttl,
            created_by_ip: data.created_by_ip,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            revoked_by_ip: None,
            replaced_by: None,
        }
    }

    /// Lifecycle state at `now`
    ///
    /// Revocation takes precedence over expiry.
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked {
            if self.revoked_reason == Some(RevocationReason::Rotated) {
                SessionState::Rotated
            } else {
                SessionState::Revoked
            }
        } else if self.expires_at <= now {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    /// Whether the token would currently be accepted
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == SessionState::Active
    }

    /// Marks the record revoked in memory
    ///
    /// Mirrors [`RefreshSession::revoke_if_live`]; returns `false` if it was
    /// already revoked.
    pub fn revoke(
        &mut self,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> bool {
        if self.revoked {
            return false;
        }
        self.revoked = true;
        self.revoked_at = Some(now);
        self.revoked_reason = Some(reason);
        self.revoked_by_ip = ip.map(str::to_string);
        true
    }

    /// Inserts a session row
    pub async fn insert<'e, E>(executor: E, session: &RefreshSession) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions
                (id, account_id, tenant_id, token_hash, issued_at, expires_at, created_by_ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id)
        .bind(session.account_id)
        .bind(session.tenant_id)
        .bind(&session.token_hash)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .bind(&session.created_by_ip)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Finds a session by token hash
    pub async fn find_by_hash<'e, E>(executor: E, token_hash: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {} FROM refresh_sessions WHERE token_hash = $1",
            SESSION_COLUMNS
        );

        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(token_hash)
            .fetch_optional(executor)
            .await
    }

    /// Finds a session by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {} FROM refresh_sessions WHERE id = $1", SESSION_COLUMNS);

        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Revokes a session only if it is not already revoked
    ///
    /// Returns `true` if this call performed the revocation.
    pub async fn revoke_if_live<'e, E>(
        executor: E,
        id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked = TRUE, revoked_at = $2, revoked_reason = $3, revoked_by_ip = $4
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(reason)
        .bind(ip)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-set for rotation
    ///
    /// Marks `id` as rotated into `replaced_by` only while it is unrevoked and
    /// unexpired. Exactly one concurrent caller can see `true`.
    pub async fn mark_rotated<'e, E>(
        executor: E,
        id: Uuid,
        replaced_by: Uuid,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked = TRUE,
                revoked_at = $3,
                revoked_reason = 'rotated',
                revoked_by_ip = $4,
                replaced_by = $2
            WHERE id = $1 AND revoked = FALSE AND expires_at > $3
            "#,
        )
        .bind(id)
        .bind(replaced_by)
        .bind(now)
        .bind(ip)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes every unrevoked session of an account
    pub async fn revoke_all_for_account<'e, E>(
        executor: E,
        account_id: Uuid,
        reason: RevocationReason,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked = TRUE, revoked_at = $2, revoked_reason = $3, revoked_by_ip = $4
            WHERE account_id = $1 AND revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(account_id)
        .bind(now)
        .bind(reason)
        .bind(ip)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Lists unrevoked, unexpired sessions of an account, oldest first
    pub async fn list_live<'e, E>(
        executor: E,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {} FROM refresh_sessions \
             WHERE account_id = $1 AND revoked = FALSE AND expires_at > $2 \
             ORDER BY issued_at ASC, id ASC",
            SESSION_COLUMNS
        );

        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(account_id)
            .bind(now)
            .fetch_all(executor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> RefreshSession {
        RefreshSession::new(
            NewSession {
                account_id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                token_hash: "a".repeat(64),
                created_by_ip: Some("10.0.0.1".to_string()),
            },
            now,
            Duration::days(14),
        )
    }

    #[test]
    fn test_new_session_is_active() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(s.expires_at, now + Duration::days(14));
        assert_eq!(s.state(now), SessionState::Active);
        assert!(s.is_live(now));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(s.state(s.expires_at - Duration::seconds(1)), SessionState::Active);
        assert_eq!(s.state(s.expires_at), SessionState::Expired);
    }

    #[test]
    fn test_revocation_precedes_expiry() {
        let now = Utc::now();
        let mut s = session(now);
        assert!(s.revoke(RevocationReason::Logout, now, None));
        assert_eq!(s.state(s.expires_at + Duration::days(1)), SessionState::Revoked);
    }

    #[test]
    fn test_rotated_state() {
        let now = Utc::now();
        let mut s = session(now);
        s.revoke(RevocationReason::Rotated, now, Some("10.0.0.2"));
        s.replaced_by = Some(Uuid::new_v4());
        assert_eq!(s.state(now), SessionState::Rotated);
        assert_eq!(s.revoked_by_ip.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let now = Utc::now();
        let mut s = session(now);
        assert!(s.revoke(RevocationReason::Logout, now, None));
        assert!(!s.revoke(RevocationReason::LogoutAll, now + Duration::seconds(1), None));
        assert_eq!(s.revoked_reason, Some(RevocationReason::Logout));
        assert_eq!(s.revoked_at, Some(now));
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(RevocationReason::LogoutAll.as_str(), "logout_all");
        assert_eq!(RevocationReason::ReuseDetected.to_string(), "reuse_detected");
        assert_eq!(
            serde_json::to_value(RevocationReason::SessionLimit).unwrap(),
            serde_json::json!("session_limit")
        );
    }

    #[test]
    fn test_token_hash_not_serialized() {
        let json = serde_json::to_value(session(Utc::now())).unwrap();
        assert!(json.get("token_hash").is_none());
    }
}
