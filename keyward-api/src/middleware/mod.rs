/// Middleware modules for the API server
///
/// Bearer authentication lives in `keyward_shared::auth::middleware`; this
/// crate adds the HTTP-only concerns.

pub mod security;
