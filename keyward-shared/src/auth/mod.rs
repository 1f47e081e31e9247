/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id credential hashing and verification
/// - [`lockout`]: Failed-login counting and account locks
/// - [`jwt`]: Access token issuance and validation
/// - [`refresh_token`]: Opaque refresh token generation and hashing
/// - [`middleware`]: Bearer authentication for Axum
///
/// # Example
///
/// ```
/// use keyward_shared::auth::password::{hash_password, verify_password};
/// use keyward_shared::auth::refresh_token::{generate_refresh_token, hash_refresh_token};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("account_secret")?;
/// assert!(verify_password("account_secret", &hash)?);
///
/// let (token, stored) = generate_refresh_token();
/// assert_eq!(hash_refresh_token(&token), stored);
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod refresh_token;
