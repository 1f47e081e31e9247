/// Authentication configuration
///
/// Values that shape the token and session lifecycle: TTLs, signing secret,
/// lockout policy and the per-account session cap. Loaded from environment
/// variables (a `.env` file is honoured in development) and validated before
/// any component is built from them.
///
/// # Environment Variables
///
/// - `JWT_SECRET`: HS256 signing secret (required, at least 32 characters)
/// - `JWT_ISSUER`: Issuer claim (default: keyward)
/// - `ACCESS_TOKEN_TTL_SECS`: Access token lifetime (default: 900)
/// - `REFRESH_TOKEN_TTL_SECS`: Refresh token lifetime (default: 1209600, 14 days)
/// - `TOKEN_LEEWAY_SECS`: Allowed clock skew when validating (default: 5, max: 60)
/// - `LOCKOUT_THRESHOLD`: Consecutive failures before locking (default: 5)
/// - `LOCKOUT_DURATION_SECS`: Lock window (default: 900)
///
/// TTLs and the lock window are capped at ten years.
/// - `MAX_SESSIONS_PER_ACCOUNT`: Live refresh sessions per account (default: 5)
/// - `PERSISTENCE_TIMEOUT_MS`: Default deadline for store calls (default: 5000)
///
/// # Example
///
/// ```no_run
/// use keyward_shared::config::AuthConfig;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AuthConfig::from_env()?;
/// println!("Access tokens live for {}s", config.access_token_ttl_secs);
/// # Ok(())
/// # }
/// ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Minimum signing secret length (256 bits when ASCII)
pub const MIN_SECRET_LENGTH: usize = 32;

/// Upper bound for validation clock-skew leeway, in seconds
pub const MAX_LEEWAY_SECS: u64 = 60;

/// Upper bound for any TTL or lock window, in seconds (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// A variable is set but unusable
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Token and session lifecycle settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub jwt_secret: String,

    /// Issuer claim stamped into and required from access tokens
    pub jwt_issuer: String,

    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: u64,

    /// Clock skew tolerated on `exp`/`nbf`, in seconds
    pub token_leeway_secs: u64,

    /// Consecutive failed logins before the account is locked
    pub lockout_threshold: u32,

    /// How long a lock lasts, in seconds
    pub lockout_duration_secs: u64,

    /// Maximum live refresh sessions per account
    pub max_sessions_per_account: u32,

    /// Default deadline for a single persistence call, in milliseconds
    pub persistence_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "keyward".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 14 * 24 * 3600,
            token_leeway_secs: 5,
            lockout_threshold: 5,
            lockout_duration_secs: 900,
            max_sessions_per_account: 5,
            persistence_timeout_ms: 5000,
        }
    }
}

// The secret must never end up in logs via `{:?}`.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("token_leeway_secs", &self.token_leeway_secs)
            .field("lockout_threshold", &self.lockout_threshold)
            .field("lockout_duration_secs", &self.lockout_duration_secs)
            .field("max_sessions_per_account", &self.max_sessions_per_account)
            .field("persistence_timeout_ms", &self.persistence_timeout_ms)
            .finish()
    }
}

impl AuthConfig {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWT_SECRET` is missing
    /// - A numeric variable does not parse
    /// - The resulting configuration fails [`AuthConfig::validate`]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            access_token_ttl_secs: parse_var("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl_secs)?,
            refresh_token_ttl_secs: parse_var("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl_secs)?,
            token_leeway_secs: parse_var("TOKEN_LEEWAY_SECS", defaults.token_leeway_secs)?,
            lockout_threshold: parse_var("LOCKOUT_THRESHOLD", defaults.lockout_threshold)?,
            lockout_duration_secs: parse_var("LOCKOUT_DURATION_SECS", defaults.lockout_duration_secs)?,
            max_sessions_per_account: parse_var(
                "MAX_SESSIONS_PER_ACCOUNT",
                defaults.max_sessions_per_account,
            )?,
            persistence_timeout_ms: parse_var("PERSISTENCE_TIMEOUT_MS", defaults.persistence_timeout_ms)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the lifecycle components rely on
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET",
                reason: format!("must be at least {} characters long", MIN_SECRET_LENGTH),
            });
        }
        if self.access_token_ttl_secs == 0 {
            return Err(invalid("ACCESS_TOKEN_TTL_SECS", "must be positive"));
        }
        for (var, secs) in [
            ("ACCESS_TOKEN_TTL_SECS", self.access_token_ttl_secs),
            ("REFRESH_TOKEN_TTL_SECS", self.refresh_token_ttl_secs),
            ("LOCKOUT_DURATION_SECS", self.lockout_duration_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid {
                    var,
                    reason: format!("must not exceed {} seconds", MAX_DURATION_SECS),
                });
            }
        }
        if self.refresh_token_ttl_secs <= self.access_token_ttl_secs {
            return Err(invalid(
                "REFRESH_TOKEN_TTL_SECS",
                "must be longer than the access token TTL",
            ));
        }
        if self.token_leeway_secs > MAX_LEEWAY_SECS {
            return Err(ConfigError::Invalid {
                var: "TOKEN_LEEWAY_SECS",
                reason: format!("must not exceed {} seconds", MAX_LEEWAY_SECS),
            });
        }
        if self.lockout_threshold == 0 {
            return Err(invalid("LOCKOUT_THRESHOLD", "must be at least 1"));
        }
        if self.lockout_duration_secs == 0 {
            return Err(invalid("LOCKOUT_DURATION_SECS", "must be positive"));
        }
        if self.max_sessions_per_account == 0 {
            return Err(invalid("MAX_SESSIONS_PER_ACCOUNT", "must be at least 1"));
        }
        if self.persistence_timeout_ms == 0 {
            return Err(invalid("PERSISTENCE_TIMEOUT_MS", "must be positive"));
        }
        Ok(())
    }

    /// Access token lifetime
    pub fn access_token_ttl(&self) -> Duration {
        bounded_seconds(self.access_token_ttl_secs)
    }

    /// Refresh token lifetime
    pub fn refresh_token_ttl(&self) -> Duration {
        bounded_seconds(self.refresh_token_ttl_secs)
    }

    /// Lock window applied when the failure threshold is reached
    pub fn lockout_duration(&self) -> Duration {
        bounded_seconds(self.lockout_duration_secs)
    }

    /// Default deadline for persistence calls
    pub fn persistence_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.persistence_timeout_ms)
    }
}

/// Seconds as a `Duration`, saturating at `MAX_DURATION_SECS`
fn bounded_seconds(secs: u64) -> Duration {
    let secs = i64::try_from(secs.min(MAX_DURATION_SECS)).unwrap_or(i64::MAX);
    Duration::try_seconds(secs).unwrap_or(Duration::MAX)
}

fn invalid(var: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
