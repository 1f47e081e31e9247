/// Refresh token generation and hashing
///
/// Refresh tokens are opaque bearer strings. Only their SHA-256 digest is
/// persisted; the plaintext is shown to the client exactly once.
///
/// # Token Format
///
/// `kwrt_` followed by 48 base62 characters drawn from the operating system
/// CSPRNG (53 chars total, roughly 285 bits of entropy).
///
/// # Example
///
/// ```
/// use keyward_shared::auth::refresh_token::{
///     generate_refresh_token, hash_refresh_token, validate_refresh_token_format,
/// };
///
/// let (token, hash) = generate_refresh_token();
/// assert!(token.starts_with("kwrt_"));
/// assert!(validate_refresh_token_format(&token));
/// assert_eq!(hash_refresh_token(&token), hash);
/// ```

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

/// Refresh token prefix
pub const TOKEN_PREFIX: &str = "kwrt_";

/// Length of the random part (characters)
const TOKEN_RANDOM_LENGTH: usize = 48;

/// Total length of a refresh token
pub const REFRESH_TOKEN_LENGTH: usize = TOKEN_PREFIX.len() + TOKEN_RANDOM_LENGTH;

/// Generates a new refresh token
///
/// Returns `(plaintext, sha256_hex)`.
pub fn generate_refresh_token() -> (String, String) {
    let random_part: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LENGTH)
        .map(char::from)
        .collect();

    let token = format!("{}{}", TOKEN_PREFIX, random_part);
    let hash = hash_refresh_token(&token);

    (token, hash)
}

/// Hashes a refresh token with SHA-256 (lowercase hex, 64 chars)
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Checks prefix, length and alphabet without touching storage
pub fn validate_refresh_token_format(token: &str) -> bool {
    if token.len() != REFRESH_TOKEN_LENGTH {
        return false;
    }

    match token.strip_prefix(TOKEN_PREFIX) {
        Some(random) => random.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_refresh_token() {
        let (token, hash) = generate_refresh_token();

        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), REFRESH_TOKEN_LENGTH);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_refresh_token(&token));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let tokens: HashSet<String> = (0..200).map(|_| generate_refresh_token().0).collect();
        assert_eq!(tokens.len(), 200);
    }

    #[test]
    fn test_hash_is_deterministic_and_distinct() {
        assert_eq!(hash_refresh_token("kwrt_a"), hash_refresh_token("kwrt_a"));
        assert_ne!(hash_refresh_token("kwrt_a"), hash_refresh_token("kwrt_b"));
        // Known SHA-256 of the empty string
        assert_eq!(
            hash_refresh_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_validate_format() {
        let (token, _) = generate_refresh_token();
        assert!(validate_refresh_token_format(&token));

        assert!(!validate_refresh_token_format(""));
        assert!(!validate_refresh_token_format("kwrt_"));
        assert!(!validate_refresh_token_format(&token[..token.len() - 1]));
        assert!(!validate_refresh_token_format(&format!("{}x", token)));
        assert!(!validate_refresh_token_format(&token.replacen("kwrt_", "axon_", 1)));

        let with_symbol = format!("{}{}", TOKEN_PREFIX, "-".repeat(TOKEN_RANDOM_LENGTH));
        assert!(!validate_refresh_token_format(&with_symbol));
    }
}
