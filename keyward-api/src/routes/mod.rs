/// API route handlers
///
/// - `health`: Health check endpoint
/// - `auth`: Login, refresh, logout and session endpoints

pub mod auth;
pub mod health;
