/// Access token issuance and validation
///
/// Access tokens are short-lived HS256 JWTs carrying the account identity,
/// tenant and permission codes. They are never persisted: validation needs
/// only the signing key.
///
/// # Security
///
/// - **Algorithm**: HS256 only; tokens declaring any other algorithm fail
/// - **Key**: injected as a [`SigningKey`] at construction, never read from
///   global state, so tests and key rotation can use distinct keys
/// - **Expiry**: `exp`/`nbf` are checked against the issuer's [`Clock`] with
///   an explicit leeway bounded by [`MAX_LEEWAY_SECS`]
/// - **Fail closed**: any signature, structure, issuer or time failure yields
///   an error; partial claims are never returned
///
/// # Example
///
/// ```
/// use keyward_shared::auth::jwt::{SigningKey, TokenIssuer};
/// use keyward_shared::clock::SystemClock;
/// use keyward_shared::models::account::{Account, CreateAccount};
/// use chrono::{Duration, Utc};
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let issuer = TokenIssuer::new(
///     SigningKey::from_secret("test-secret-key-at-least-32-bytes-long"),
///     "keyward",
///     Duration::minutes(15),
///     5,
///     Arc::new(SystemClock),
/// );
///
/// let account = Account::new(CreateAccount {
///     tenant_id: Uuid::new_v4(),
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: String::new(),
/// }, Utc::now());
///
/// let issued = issuer.issue(&account, account.tenant_id, vec!["sessions:read".to_string()])?;
/// let claims = issuer.validate(&issued.token)?;
/// assert_eq!(claims.sub, account.id);
/// assert!(claims.has_permission("sessions:read"));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{AuthConfig, MAX_LEEWAY_SECS};
use crate::models::account::Account;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature or algorithm check failed
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Token is not valid yet (`nbf` in the future)
    #[error("Token is not valid yet")]
    NotYetValid,

    /// Invalid token format
    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    /// Invalid issuer
    #[error("Invalid issuer")]
    InvalidIssuer,
}

/// HS256 key pair derived from the server-held secret
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Derives encoding and decoding keys from a shared secret
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Claims carried by an access token
///
/// # Standard Claims
///
/// - `sub`: Account ID
/// - `iss`: Issuer
/// - `iat` / `nbf` / `exp`: Unix timestamps
/// - `jti`: Unique token ID, for correlating audit records
///
/// # Custom Claims
///
/// - `tenant_id`, `username`, `email`
/// - `permissions`: Permission codes granted to the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject - Account ID
    pub sub: Uuid,

    /// Issuer
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Token ID
    pub jti: Uuid,

    /// Tenant ID
    pub tenant_id: Uuid,

    /// Login name
    pub username: String,

    /// Email address
    pub email: String,

    /// Permission codes
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl AccessClaims {
    /// Whether the token grants `code`
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.iter().any(|p| p == code)
    }
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded JWT
    pub token: String,

    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,

    /// Token ID stamped into the claims
    pub jti: Uuid,
}

/// Signs and verifies access tokens
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: SigningKey,
    issuer: String,
    ttl: Duration,
    leeway_secs: u64,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Creates an issuer
    ///
    /// `leeway_secs` is clamped to [`MAX_LEEWAY_SECS`].
    pub fn new(
        key: SigningKey,
        issuer: impl Into<String>,
        ttl: Duration,
        leeway_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            ttl,
            leeway_secs: leeway_secs.min(MAX_LEEWAY_SECS),
            clock,
        }
    }

    /// Builds an issuer from validated configuration
    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            SigningKey::from_secret(&config.jwt_secret),
            config.jwt_issuer.clone(),
            config.access_token_ttl(),
            config.token_leeway_secs,
            clock,
        )
    }

    /// Issues an access token for `account` in `tenant_id`
    ///
    /// # Errors
    ///
    /// Returns `JwtError::CreateError` if encoding fails
    pub fn issue(
        &self,
        account: &Account,
        tenant_id: Uuid,
        permissions: Vec<String>,
    ) -> Result<IssuedToken, JwtError> {
        let now = self.clock.now();
        let expires_at = now + self.ttl;
        let jti = Uuid::new_v4();

        let claims = AccessClaims {
            sub: account.id,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti,
            tenant_id,
            username: account.username.clone(),
            email: account.email.clone(),
            permissions,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key.encoding)
            .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_at,
            jti,
        })
    }

    /// Validates an access token and returns its claims
    ///
    /// Verifies:
    /// - Signature is valid and algorithm is HS256
    /// - Issuer matches
    /// - `exp` is not past and `nbf` is not ahead, each within the leeway
    ///
    /// # Errors
    ///
    /// Returns the first failing check; never partial claims.
    pub fn validate(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        // Time checks run below against the injected clock
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let data = decode::<AccessClaims>(token, &self.key.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    JwtError::InvalidFormat(e.to_string())
                }
                _ => JwtError::ValidationError(e.to_string()),
            }
        })?;

        let claims = data.claims;
        let now = self.clock.now().timestamp();
        let leeway = self.leeway_secs as i64;

        if now >= claims.exp.saturating_add(leeway) {
            return Err(JwtError::Expired);
        }
        if claims.nbf > now.saturating_add(leeway) {
            return Err(JwtError::NotYetValid);
        }

        Ok(claims)
    }
}
