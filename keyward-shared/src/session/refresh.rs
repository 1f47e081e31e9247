/// Refresh token store
///
/// Issues opaque refresh tokens, validates them, rotates them one-for-one and
/// revokes them. Built on a [`SessionStore`]; only token hashes ever reach it.
///
/// # Rotation and reuse
///
/// Rotating a token revokes its record with reason `rotated` and links it to
/// the successor through `replaced_by`. A legitimate client never presents a
/// rotated token again, so doing so means the token leaked. The store then
/// walks the chain forward from the replayed record and revokes every
/// still-live descendant (reason `reuse_detected`), cutting off whichever
/// party holds the current tip.
///
/// The walk is iterative and bounded by `max_sessions * 64` hops; a visited
/// set stops it on cyclic data.

use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::refresh_token::{
    generate_refresh_token, hash_refresh_token, validate_refresh_token_format,
};
use crate::clock::Clock;
use crate::models::session::{NewSession, RefreshSession, RevocationReason, SessionState};
use crate::store::{SessionStore, StoreError};

/// Hops allowed per permitted live session during containment
const CHAIN_HOPS_PER_SESSION: usize = 64;

/// Why a presented refresh token was not accepted
#[derive(Debug, thiserror::Error)]
pub enum RefreshTokenError {
    /// Malformed or unknown token
    #[error("Refresh token is invalid")]
    Invalid,

    /// Token is past its expiry
    #[error("Refresh token has expired")]
    Expired,

    /// Token was revoked (logout, session cap, containment)
    #[error("Refresh token has been revoked")]
    Revoked,

    /// A rotated token was replayed; descendants were revoked
    #[error("Refresh token reuse detected; {revoked} descendant session(s) revoked")]
    ChainCompromised {
        /// Replayed session
        session_id: Uuid,
        /// Owner of the chain
        account_id: Uuid,
        /// Descendants revoked by this detection
        revoked: usize,
    },

    /// Storage failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Refresh token lifecycle over a [`SessionStore`]
#[derive(Clone)]
pub struct RefreshTokenStore {
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_sessions: usize,
}

impl std::fmt::Debug for RefreshTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenStore")
            .field("ttl", &self.ttl)
            .field("max_sessions", &self.max_sessions)
            .finish_non_exhaustive()
    }
}

impl RefreshTokenStore {
    /// Creates a store
    ///
    /// `max_sessions` is the per-account live-session cap; zero is treated
    /// as one.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            sessions,
            clock,
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Issues a new refresh token for an account
    ///
    /// Returns the plaintext token (the only time it is available) and the
    /// stored record. Oldest live sessions beyond the cap are revoked in the
    /// same unit of work.
    pub async fn create(
        &self,
        account_id: Uuid,
        tenant_id: Uuid,
        ip: Option<&str>,
    ) -> Result<(String, RefreshSession), StoreError> {
        let (token, token_hash) = generate_refresh_token();
        let now = self.clock.now();
        let session = RefreshSession::new(
            NewSession {
                account_id,
                tenant_id,
                token_hash,
                created_by_ip: ip.map(str::to_string),
            },
            now,
            self.ttl,
        );

        let evicted = self
            .sessions
            .insert_with_cap(session.clone(), self.max_sessions, now)
            .await?;

        if !evicted.is_empty() {
            info!(
                account_id = %account_id,
                evicted = evicted.len(),
                "Session cap reached; revoked oldest sessions"
            );
        }

        Ok((token, session))
    }

    /// Validates a presented token
    ///
    /// Checks format, then existence, then revocation, then expiry. A replayed
    /// rotated token triggers chain containment before the error is returned.
    pub async fn validate(
        &self,
        raw: &str,
        ip: Option<&str>,
    ) -> Result<RefreshSession, RefreshTokenError> {
        if !validate_refresh_token_format(raw) {
            return Err(RefreshTokenError::Invalid);
        }

        let session = self
            .sessions
            .find_by_hash(&hash_refresh_token(raw))
            .await?
            .ok_or(RefreshTokenError::Invalid)?;

        match session.state(self.clock.now()) {
            SessionState::Active => Ok(session),
            SessionState::Rotated | SessionState::Revoked if session.replaced_by.is_some() => {
                Err(self.compromised(&session, ip).await?)
            }
            SessionState::Rotated | SessionState::Revoked => Err(RefreshTokenError::Revoked),
            SessionState::Expired => Err(RefreshTokenError::Expired),
        }
    }

    /// Exchanges a live token for a new one
    ///
    /// At most one concurrent exchange of the same token succeeds. A loser is
    /// treated as a replay of a rotated token.
    pub async fn rotate(
        &self,
        raw: &str,
        ip: Option<&str>,
    ) -> Result<(String, RefreshSession), RefreshTokenError> {
        let current = self.validate(raw, ip).await?;

        let (token, token_hash) = generate_refresh_token();
        let now = self.clock.now();
        let replacement = RefreshSession::new(
            NewSession {
                account_id: current.account_id,
                tenant_id: current.tenant_id,
                token_hash,
                created_by_ip: ip.map(str::to_string),
            },
            now,
            self.ttl,
        );

        if self
            .sessions
            .rotate(current.id, replacement.clone(), now, ip)
            .await?
        {
            debug!(
                account_id = %current.account_id,
                old_session_id = %current.id,
                session_id = %replacement.id,
                "Rotated refresh token"
            );
            return Ok((token, replacement));
        }

        // Lost the compare-and-set; see what the winner left behind
        match self.sessions.find_by_id(current.id).await? {
            Some(latest) if latest.replaced_by.is_some() => {
                Err(self.compromised(&latest, ip).await?)
            }
            Some(latest) if latest.state(now) == SessionState::Expired => {
                Err(RefreshTokenError::Expired)
            }
            _ => Err(RefreshTokenError::Revoked),
        }
    }

    /// Revokes the session behind `raw`
    ///
    /// Idempotent: malformed, unknown or already revoked tokens yield
    /// `Ok(false)`. A rotated token still triggers chain containment, since
    /// presenting it is a replay.
    pub async fn revoke_one(
        &self,
        raw: &str,
        reason: RevocationReason,
        ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        if !validate_refresh_token_format(raw) {
            return Ok(false);
        }

        let Some(session) = self.sessions.find_by_hash(&hash_refresh_token(raw)).await? else {
            return Ok(false);
        };

        if session.replaced_by.is_some() {
            self.compromised(&session, ip).await?;
            return Ok(false);
        }

        self.revoke_session(&session, reason, ip).await
    }

    /// Revokes a known session record if still unrevoked
    pub async fn revoke_session(
        &self,
        session: &RefreshSession,
        reason: RevocationReason,
        ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        let revoked = self
            .sessions
            .revoke_if_live(session.id, reason, self.clock.now(), ip)
            .await?;

        if revoked {
            info!(
                account_id = %session.account_id,
                session_id = %session.id,
                reason = %reason,
                "Revoked refresh session"
            );
        }

        Ok(revoked)
    }

    /// Revokes every live session of an account; expired records are left alone
    pub async fn revoke_all_for_account(
        &self,
        account_id: Uuid,
        reason: RevocationReason,
        ip: Option<&str>,
    ) -> Result<u64, StoreError> {
        let count = self
            .sessions
            .revoke_all_live(account_id, reason, self.clock.now(), ip)
            .await?;

        info!(account_id = %account_id, count, reason = %reason, "Revoked all refresh sessions");
        Ok(count)
    }

    /// Live sessions of an account, oldest first
    pub async fn list_active(&self, account_id: Uuid) -> Result<Vec<RefreshSession>, StoreError> {
        self.sessions.list_live(account_id, self.clock.now()).await
    }

    async fn compromised(
        &self,
        replayed: &RefreshSession,
        ip: Option<&str>,
    ) -> Result<RefreshTokenError, StoreError> {
        let revoked = self.revoke_descendants(replayed, ip).await?;

        warn!(
            account_id = %replayed.account_id,
            session_id = %replayed.id,
            revoked,
            "Refresh token reuse detected; revoked descendant sessions"
        );

        Ok(RefreshTokenError::ChainCompromised {
            session_id: replayed.id,
            account_id: replayed.account_id,
            revoked,
        })
    }

    /// Walks `replaced_by` forward from `origin`, revoking live descendants
    async fn revoke_descendants(
        &self,
        origin: &RefreshSession,
        ip: Option<&str>,
    ) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let max_hops = self.max_sessions.saturating_mul(CHAIN_HOPS_PER_SESSION);

        let mut visited = HashSet::from([origin.id]);
        let mut next = origin.replaced_by;
        let mut revoked = 0;

        while let Some(id) = next {
            if visited.len() > max_hops {
                warn!(session_id = %origin.id, max_hops, "Session chain walk hit the hop limit");
                break;
            }
            if !visited.insert(id) {
                warn!(session_id = %id, "Session chain contains a cycle");
                break;
            }

            if self
                .sessions
                .revoke_if_live(id, RevocationReason::ReuseDetected, now, ip)
                .await?
            {
                revoked += 1;
            }

            // Read after revoking: a revoked record can no longer gain a successor
            next = match self.sessions.find_by_id(id).await? {
                Some(session) => session.replaced_by,
                None => None,
            };
        }

        Ok(revoked)
    }
}
