/// Bearer authentication middleware for Axum
///
/// Extracts the access token from `Authorization: Bearer <token>`, validates
/// it through the [`SessionManager`] and stores an [`AuthContext`] in the
/// request extensions for handlers to pick up.
///
/// Every rejection uses the same 401 body, whatever the underlying reason.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Extension, Router};
/// use keyward_shared::auth::middleware::{access_token_auth, AuthContext};
/// use keyward_shared::session::manager::SessionManager;
/// use std::sync::Arc;
///
/// async fn me(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, {}!", auth.claims.username)
/// }
///
/// fn router(sessions: Arc<SessionManager>) -> Router {
///     Router::new()
///         .route("/me", get(me))
///         .layer(middleware::from_fn_with_state(sessions, access_token_auth))
/// }
/// ```

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::AccessClaims;
use crate::session::manager::SessionManager;

/// Authenticated caller, added to request extensions
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated account
    pub account_id: Uuid,

    /// Tenant the token was issued for
    pub tenant_id: Uuid,

    /// Full validated claims
    pub claims: AccessClaims,
}

impl AuthContext {
    pub fn from_claims(claims: AccessClaims) -> Self {
        Self {
            account_id: claims.sub,
            tenant_id: claims.tenant_id,
            claims,
        }
    }

    /// Whether the caller holds a permission code
    pub fn has_permission(&self, code: &str) -> bool {
        self.claims.has_permission(code)
    }
}

/// Why a request was not authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareError {
    /// No `Authorization` header
    MissingCredentials,

    /// Header present but not a bearer token
    InvalidFormat,

    /// Token failed validation
    InvalidToken,
}

impl IntoResponse for MiddlewareError {
    fn into_response(self) -> Response {
        let message = match self {
            MiddlewareError::MissingCredentials => "Missing credentials",
            MiddlewareError::InvalidFormat | MiddlewareError::InvalidToken => {
                "Invalid or expired token"
            }
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized", "message": message })),
        )
            .into_response()
    }
}

/// Returns the bearer token from `Authorization`, if well-formed
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, MiddlewareError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| MiddlewareError::InvalidFormat)?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(MiddlewareError::InvalidFormat)?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(MiddlewareError::InvalidFormat);
    }

    Ok(Some(token))
}

/// Validates the claims behind an optional bearer header
///
/// `Ok(None)` when no header is present; handlers with optional
/// authentication use this directly.
pub fn optional_auth(
    sessions: &SessionManager,
    headers: &HeaderMap,
) -> Result<Option<AuthContext>, MiddlewareError> {
    match bearer_token(headers)? {
        Some(token) => sessions
            .validate_access_token(token)
            .map(|claims| Some(AuthContext::from_claims(claims)))
            .map_err(|_| MiddlewareError::InvalidToken),
        None => Ok(None),
    }
}

/// Requires a valid access token
pub async fn access_token_auth(
    State(sessions): State<Arc<SessionManager>>,
    mut req: Request,
    next: Next,
) -> Result<Response, MiddlewareError> {
    let context =
        optional_auth(&sessions, req.headers())?.ok_or(MiddlewareError::MissingCredentials)?;

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}
