/// Service-level error type for the session lifecycle
///
/// Every login, refresh, logout and validation path returns
/// `Result<T, AuthError>`. Token failures keep their precise kind internally
/// (expired, revoked, chain compromised) so they can be logged and audited,
/// while [`AuthError::client_facing`] collapses them into one generic
/// `TokenInvalid` before anything reaches a client.

use chrono::{DateTime, Utc};

/// Result alias for lifecycle operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Lifecycle error kinds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown account or wrong secret (never distinguished)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Too many consecutive failures; login refused until `until`
    #[error("Account is locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    /// Account has been deactivated
    #[error("Account is inactive")]
    AccountInactive,

    /// Token unknown, malformed, or badly signed
    #[error("Token is invalid")]
    TokenInvalid,

    /// Token was genuine but is past its expiry
    #[error("Token has expired")]
    TokenExpired,

    /// Token was revoked (logout, session cap, containment)
    #[error("Token has been revoked")]
    TokenRevoked,

    /// An already-rotated refresh token was presented again
    #[error("Refresh token reuse detected; {revoked} descendant session(s) revoked")]
    TokenChainCompromised { revoked: usize },

    /// A persistence call exceeded its deadline
    #[error("Operation timed out")]
    Timeout,

    /// Unexpected failure below the lifecycle (store, hashing, signing)
    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl AuthError {
    /// Collapses token failure kinds into `TokenInvalid`
    ///
    /// Clients must not learn whether a refresh token expired, was revoked, or
    /// tripped reuse detection.
    ///
    /// # Example
    ///
    /// ```
    /// use keyward_shared::error::AuthError;
    ///
    /// let internal = AuthError::TokenChainCompromised { revoked: 2 };
    /// assert_eq!(internal.client_facing(), AuthError::TokenInvalid);
    /// assert_eq!(AuthError::InvalidCredentials.client_facing(), AuthError::InvalidCredentials);
    /// ```
    pub fn client_facing(self) -> Self {
        match self {
            AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::TokenChainCompromised { .. } => AuthError::TokenInvalid,
            other => other,
        }
    }

    /// Whether the caller can recover by retrying with different input
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AuthError::Timeout | AuthError::OperationFailed(_))
    }

    /// Whether this error should be recorded in the security audit trail
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            AuthError::TokenChainCompromised { .. } | AuthError::AccountLocked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_facing_collapses_token_kinds() {
        for err in [
            AuthError::TokenExpired,
            AuthError::TokenRevoked,
            AuthError::TokenChainCompromised { revoked: 3 },
            AuthError::TokenInvalid,
        ] {
            assert_eq!(err.client_facing(), AuthError::TokenInvalid);
        }
    }

    #[test]
    fn test_client_facing_keeps_other_kinds() {
        assert_eq!(AuthError::AccountInactive.client_facing(), AuthError::AccountInactive);
        assert_eq!(AuthError::Timeout.client_facing(), AuthError::Timeout);
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AuthError::InvalidCredentials.is_client_error());
        assert!(AuthError::TokenRevoked.is_client_error());
        assert!(!AuthError::Timeout.is_client_error());
        assert!(!AuthError::OperationFailed("db".to_string()).is_client_error());
    }

    #[test]
    fn test_display_never_mentions_account_existence() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
    }
}
