/// Session lifecycle manager
///
/// Orchestrates login, refresh, logout and access-token validation on top of
/// the account store, the refresh token store, the token issuer and the
/// lockout policy.
///
/// Every persistence call of one operation shares a single deadline taken
/// from the [`RequestContext`] (or the configured default). Running past it
/// yields [`AuthError::Timeout`]; storage failures are logged and surface as
/// [`AuthError::OperationFailed`].
///
/// Errors keep their precise kind (expired, revoked, chain compromised) for
/// auditing. Callers facing clients should pass them through
/// [`AuthError::client_facing`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::refresh::{RefreshTokenError, RefreshTokenStore};
use crate::auth::jwt::{AccessClaims, IssuedToken, TokenIssuer};
use crate::auth::lockout::LockoutPolicy;
use crate::auth::password::{dummy_verify, verify_password};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::models::account::Account;
use crate::models::session::{RefreshSession, RevocationReason};
use crate::store::{AccountStore, SessionStore, StoreError};

/// Per-request caller information
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Client address, recorded on sessions and logins
    pub client_ip: Option<String>,

    /// Deadline for the operation's persistence calls
    pub timeout: Option<std::time::Duration>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }
}

/// Login input
#[derive(Clone)]
pub struct LoginRequest {
    pub tenant_id: Uuid,
    /// Username or email
    pub identifier: String,
    pub secret: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("tenant_id", &self.tenant_id)
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Tokens handed to a client after login or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,

    /// Opaque refresh token; shown only here
    pub refresh_token: String,

    /// Access token expiry
    pub expires_at: DateTime<Utc>,

    /// Refresh token expiry
    pub refresh_expires_at: DateTime<Utc>,

    /// Always `Bearer`
    pub token_type: String,
}

/// Drives the session lifecycle
#[derive(Clone)]
pub struct SessionManager {
    accounts: Arc<dyn AccountStore>,
    refresh: RefreshTokenStore,
    issuer: TokenIssuer,
    lockout: LockoutPolicy,
    clock: Arc<dyn Clock>,
    default_timeout: std::time::Duration,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("refresh", &self.refresh)
            .field("issuer", &self.issuer)
            .field("lockout", &self.lockout)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Wires a manager from validated configuration
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        config: &AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let max_sessions = usize::try_from(config.max_sessions_per_account).unwrap_or(usize::MAX);

        Self {
            accounts,
            refresh: RefreshTokenStore::new(
                sessions,
                clock.clone(),
                config.refresh_token_ttl(),
                max_sessions,
            ),
            issuer: TokenIssuer::from_config(config, clock.clone()),
            lockout: LockoutPolicy::new(config.lockout_threshold, config.lockout_duration()),
            clock,
            default_timeout: config.persistence_timeout(),
        }
    }

    /// Lockout policy in force
    pub fn lockout_policy(&self) -> &LockoutPolicy {
        &self.lockout
    }

    /// Authenticates with a secret and opens a session
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown account or wrong secret, including
    ///   the failure that trips the lock
    /// - `AccountInactive`, `AccountLocked` before the secret is checked
    pub async fn login(&self, request: LoginRequest, ctx: &RequestContext) -> AuthResult<TokenPair> {
        let deadline = self.deadline(ctx);

        let account = self
            .persist(
                deadline,
                "find account",
                self.accounts.find_by_identifier(request.tenant_id, &request.identifier),
            )
            .await?;

        let Some(account) = account else {
            verify_secret(None, request.secret).await;
            warn!(tenant_id = %request.tenant_id, "Login failed: unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !account.is_active {
            warn!(account_id = %account.id, "Login refused: account inactive");
            return Err(AuthError::AccountInactive);
        }

        let now = self.clock.now();
        if self.lockout.is_locked(&account, now) {
            warn!(account_id = %account.id, "Login refused: account locked");
            return Err(AuthError::AccountLocked {
                until: account.locked_until.unwrap_or(now),
            });
        }

        if !verify_secret(Some(account.password_hash.clone()), request.secret).await {
            let outcome = self
                .persist(
                    deadline,
                    "record login failure",
                    self.accounts.record_login_failure(account.id, &self.lockout, now),
                )
                .await?;

            match outcome {
                Some(outcome) if outcome.locked => warn!(
                    account_id = %account.id,
                    failed_attempts = outcome.failed_attempts,
                    "Account locked after repeated login failures"
                ),
                Some(outcome) => warn!(
                    account_id = %account.id,
                    failed_attempts = outcome.failed_attempts,
                    "Login failed: wrong secret"
                ),
                None => warn!(account_id = %account.id, "Login failed: account vanished"),
            }
            return Err(AuthError::InvalidCredentials);
        }

        self.persist(
            deadline,
            "record login success",
            self.accounts.record_login_success(account.id, now, ctx.ip()),
        )
        .await?;

        let pair = self.open_session(&account, deadline, ctx).await?;
        info!(account_id = %account.id, tenant_id = %account.tenant_id, "Login succeeded");
        Ok(pair)
    }

    /// Exchanges a refresh token for a new token pair
    ///
    /// The presented token is rotated first; the account is then re-checked
    /// and the new session revoked again if the account can no longer sign in.
    pub async fn refresh(&self, raw: &str, ctx: &RequestContext) -> AuthResult<TokenPair> {
        let deadline = self.deadline(ctx);

        let (refresh_token, session) = self
            .within(deadline, "rotate refresh token", self.refresh.rotate(raw, ctx.ip()))
            .await?
            .map_err(token_failure)?;

        let account = self
            .persist(deadline, "load account", self.accounts.find_by_id(session.account_id))
            .await?;
        let now = self.clock.now();

        let refusal = match &account {
            None => Some(AuthError::TokenInvalid),
            Some(a) if !a.is_active => Some(AuthError::AccountInactive),
            Some(a) if self.lockout.is_locked(a, now) => Some(AuthError::AccountLocked {
                until: a.locked_until.unwrap_or(now),
            }),
            Some(_) => None,
        };

        let account = match (account, refusal) {
            (Some(account), None) => account,
            (_, refusal) => {
                self.persist(
                    deadline,
                    "revoke session",
                    self.refresh
                        .revoke_session(&session, RevocationReason::AccountDisabled, ctx.ip()),
                )
                .await?;
                warn!(
                    account_id = %session.account_id,
                    session_id = %session.id,
                    "Refresh refused: account cannot sign in"
                );
                return Err(refusal.unwrap_or(AuthError::TokenInvalid));
            }
        };

        if account.failed_login_attempts > 0 {
            self.persist(deadline, "reset failures", self.accounts.reset_failures(account.id, now))
                .await?;
        }

        let permissions = self
            .persist(deadline, "load permissions", self.accounts.permissions(account.id))
            .await?;
        let access = self.issue_access(&account, session.tenant_id, permissions)?;

        debug!(account_id = %account.id, session_id = %session.id, "Refreshed session");

        Ok(TokenPair {
            access_token: access.token,
            refresh_token,
            expires_at: access.expires_at,
            refresh_expires_at: session.expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    /// Ends one session, or all of the caller's sessions
    ///
    /// With a refresh token only that session is revoked (idempotent). Without
    /// one, the caller identified by `caller` loses every session. Returns the
    /// number of sessions revoked.
    pub async fn logout(
        &self,
        raw: Option<&str>,
        caller: Option<&AccessClaims>,
        ctx: &RequestContext,
    ) -> AuthResult<u64> {
        match (raw, caller) {
            (Some(raw), _) => {
                let deadline = self.deadline(ctx);
                let revoked = self
                    .persist(
                        deadline,
                        "revoke session",
                        self.refresh.revoke_one(raw, RevocationReason::Logout, ctx.ip()),
                    )
                    .await?;
                Ok(u64::from(revoked))
            }
            (None, Some(claims)) => self.revoke_all(claims, RevocationReason::LogoutAll, ctx).await,
            (None, None) => Err(AuthError::TokenInvalid),
        }
    }

    /// Ends every session of the caller; returns the count
    pub async fn logout_all(&self, caller: &AccessClaims, ctx: &RequestContext) -> AuthResult<u64> {
        self.revoke_all(caller, RevocationReason::LogoutAll, ctx).await
    }

    /// Live sessions of the caller, oldest first
    pub async fn list_sessions(
        &self,
        caller: &AccessClaims,
        ctx: &RequestContext,
    ) -> AuthResult<Vec<RefreshSession>> {
        let deadline = self.deadline(ctx);
        self.persist(deadline, "list sessions", self.refresh.list_active(caller.sub))
            .await
    }

    /// Validates an access token; any failure is `TokenInvalid`
    pub fn validate_access_token(&self, token: &str) -> AuthResult<AccessClaims> {
        self.issuer.validate(token).map_err(|e| {
            debug!(error = %e, "Access token rejected");
            AuthError::TokenInvalid
        })
    }

    async fn revoke_all(
        &self,
        caller: &AccessClaims,
        reason: RevocationReason,
        ctx: &RequestContext,
    ) -> AuthResult<u64> {
        let deadline = self.deadline(ctx);
        self.persist(
            deadline,
            "revoke all sessions",
            self.refresh.revoke_all_for_account(caller.sub, reason, ctx.ip()),
        )
        .await
    }

    async fn open_session(
        &self,
        account: &Account,
        deadline: Instant,
        ctx: &RequestContext,
    ) -> AuthResult<TokenPair> {
        let permissions = self
            .persist(deadline, "load permissions", self.accounts.permissions(account.id))
            .await?;
        let access = self.issue_access(account, account.tenant_id, permissions)?;

        let (refresh_token, session) = self
            .persist(
                deadline,
                "create session",
                self.refresh.create(account.id, account.tenant_id, ctx.ip()),
            )
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token,
            expires_at: access.expires_at,
            refresh_expires_at: session.expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    fn issue_access(
        &self,
        account: &Account,
        tenant_id: Uuid,
        permissions: Vec<String>,
    ) -> AuthResult<IssuedToken> {
        let issued = self.issuer.issue(account, tenant_id, permissions).map_err(|e| {
            error!(account_id = %account.id, error = %e, "Failed to sign access token");
            AuthError::OperationFailed("token signing failed".to_string())
        })?;

        debug!(account_id = %account.id, jti = %issued.jti, "Issued access token");
        Ok(issued)
    }

    fn deadline(&self, ctx: &RequestContext) -> Instant {
        Instant::now() + ctx.timeout.unwrap_or(self.default_timeout)
    }

    async fn within<F: Future>(
        &self,
        deadline: Instant,
        operation: &'static str,
        fut: F,
    ) -> AuthResult<F::Output> {
        tokio::time::timeout_at(deadline, fut).await.map_err(|_| {
            warn!(operation, "Persistence call exceeded the request deadline");
            AuthError::Timeout
        })
    }

    async fn persist<T, F>(&self, deadline: Instant, operation: &'static str, fut: F) -> AuthResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.within(deadline, operation, fut)
            .await?
            .map_err(|e| store_failure(operation, e))
    }
}

fn store_failure(operation: &'static str, e: StoreError) -> AuthError {
    error!(operation, error = %e, "Persistence call failed");
    AuthError::OperationFailed(format!("{} failed", operation))
}

fn token_failure(e: RefreshTokenError) -> AuthError {
    match e {
        RefreshTokenError::Invalid => AuthError::TokenInvalid,
        RefreshTokenError::Expired => AuthError::TokenExpired,
        RefreshTokenError::Revoked => AuthError::TokenRevoked,
        RefreshTokenError::ChainCompromised { revoked, .. } => {
            AuthError::TokenChainCompromised { revoked }
        }
        RefreshTokenError::Store(e) => store_failure("rotate refresh token", e),
    }
}

/// Runs Argon2 off the async workers; `None` burns a dummy verification
///
/// An unreadable stored hash counts as a mismatch.
async fn verify_secret(hash: Option<String>, secret: String) -> bool {
    let result = tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&secret, &hash),
        None => Ok(dummy_verify(&secret)),
    })
    .await;

    match result {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            error!(error = %e, "Stored credential could not be verified");
            false
        }
        Err(e) => {
            error!(error = %e, "Credential verification task failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_debug_redacts_secret() {
        let request = LoginRequest {
            tenant_id: Uuid::nil(),
            identifier: "u1".to_string(),
            secret: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("u1"));
    }

    #[test]
    fn test_request_context_builder() {
        let ctx = RequestContext::new()
            .with_client_ip("203.0.113.7")
            .with_timeout(std::time::Duration::from_millis(250));
        assert_eq!(ctx.ip(), Some("203.0.113.7"));
        assert_eq!(ctx.timeout, Some(std::time::Duration::from_millis(250)));
    }

    #[test]
    fn test_token_failure_mapping() {
        assert_eq!(token_failure(RefreshTokenError::Invalid), AuthError::TokenInvalid);
        assert_eq!(token_failure(RefreshTokenError::Expired), AuthError::TokenExpired);
        assert_eq!(token_failure(RefreshTokenError::Revoked), AuthError::TokenRevoked);
        assert_eq!(
            token_failure(RefreshTokenError::ChainCompromised {
                session_id: Uuid::nil(),
                account_id: Uuid::nil(),
                revoked: 2,
            }),
            AuthError::TokenChainCompromised { revoked: 2 }
        );
        assert!(matches!(
            token_failure(RefreshTokenError::Store(StoreError::Integrity("x".to_string()))),
            AuthError::OperationFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_unparseable_hash_is_mismatch() {
        assert!(!verify_secret(Some("not-a-phc-string".to_string()), "x".to_string()).await);
        assert!(!verify_secret(None, "x".to_string()).await);
    }
}
