//! # Keyward Shared Library
//!
//! Token and session lifecycle core used by the Keyward API server.
//!
//! ## Module Organization
//!
//! - `auth`: Credential verification, lockout policy, access and refresh tokens
//! - `session`: Refresh token store and the session lifecycle manager
//! - `store`: Persistence seams with PostgreSQL and in-memory implementations
//! - `models`: Database models and data structures
//! - `db`: Connection pool and migrations
//! - `config`: Authentication settings
//! - `clock`: Injectable time source
//! - `error`: Lifecycle error types

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod store;

/// Current version of the Keyward shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
