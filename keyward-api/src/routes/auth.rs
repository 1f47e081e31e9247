/// Authentication endpoints
///
/// Thin HTTP layer over [`SessionManager`]: request validation, client
/// address extraction and error mapping. All lifecycle decisions are made in
/// `keyward_shared::session`.
///
/// # Endpoints
///
/// - `POST /v1/auth/login` - Exchange credentials for a token pair
/// - `POST /v1/auth/refresh` - Rotate a refresh token
/// - `POST /v1/auth/logout` - End one session, or all of the bearer's
/// - `POST /v1/auth/logout-all` - End every session of the bearer
/// - `GET  /v1/auth/sessions` - List the bearer's live sessions
/// - `GET  /v1/auth/me` - Return the bearer's claims

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use keyward_shared::auth::jwt::AccessClaims;
use keyward_shared::auth::middleware::{optional_auth, AuthContext};
use keyward_shared::models::session::RefreshSession;
use keyward_shared::session::manager::{self, RequestContext, TokenPair};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;
use validator::Validate;

/// Login request
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    /// Tenant the account belongs to
    pub tenant_id: Uuid,

    /// Username or email
    #[validate(length(min = 1, max = 254, message = "Identifier must be 1-254 characters"))]
    pub identifier: String,

    /// Plaintext secret
    #[validate(length(min = 1, max = 1024, message = "Secret must be 1-1024 characters"))]
    pub secret: String,
}

/// Refresh request
#[derive(Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, max = 256, message = "Refresh token must be 1-256 characters"))]
    pub refresh_token: String,
}

/// Logout request; the body is optional
#[derive(Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1, max = 256, message = "Refresh token must be 1-256 characters"))]
    pub refresh_token: Option<String>,
}

/// Count of sessions ended by a logout
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub revoked: u64,
}

/// Session as shown to its owner; the token hash is never returned
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by_ip: Option<String>,
}

impl From<RefreshSession> for SessionSummary {
    fn from(session: RefreshSession) -> Self {
        Self {
            id: session.id,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            created_by_ip: session.created_by_ip,
        }
    }
}

/// Builds the lifecycle context for a request
///
/// `X-Forwarded-For` is only read when the socket peer is a trusted proxy.
/// The chain is then walked from the right, skipping trusted hops, so the
/// client address is the last one a trusted proxy vouched for.
fn request_context(
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    trusted_proxies: &[IpAddr],
) -> RequestContext {
    let peer_ip = peer.map(|ConnectInfo(addr)| addr.ip());

    let forwarded = peer_ip
        .filter(|ip| trusted_proxies.contains(ip))
        .and_then(|_| forwarded_client(headers, trusted_proxies));

    match forwarded.or(peer_ip) {
        Some(ip) => RequestContext::new().with_client_ip(ip.to_string()),
        None => RequestContext::new(),
    }
}

fn forwarded_client(headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    let chain = headers.get("x-forwarded-for")?.to_str().ok()?;

    let mut client = None;
    for hop in chain.rsplit(',').map(str::trim) {
        let ip = hop.parse::<IpAddr>().ok()?;
        client = Some(ip);
        if !trusted_proxies.contains(&ip) {
            break;
        }
    }
    client
}

/// Login endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// { "tenant_id": "uuid", "identifier": "u1", "secret": "..." }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials (unknown account or wrong secret)
/// - `403 Forbidden`: Account locked or inactive
/// - `422 Unprocessable Entity`: Validation failed
pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    req.validate()?;

    let ctx = request_context(&headers, peer, &state.config.api.trusted_proxies);
    let pair = state
        .sessions
        .login(
            manager::LoginRequest {
                tenant_id: req.tenant_id,
                identifier: req.identifier,
                secret: req.secret,
            },
            &ctx,
        )
        .await?;

    Ok(Json(pair))
}

/// Token refresh endpoint
///
/// The presented refresh token is consumed; the response carries its
/// replacement.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid, expired, revoked or reused refresh token
/// - `403 Forbidden`: Account locked or inactive
pub async fn refresh(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    req.validate()?;

    let ctx = request_context(&headers, peer, &state.config.api.trusted_proxies);
    let pair = state.sessions.refresh(&req.refresh_token, &ctx).await?;

    Ok(Json(pair))
}

/// Logout endpoint
///
/// With a `refresh_token` in the body only that session ends, and repeating
/// the call is harmless. Without one, a valid bearer token ends all of the
/// caller's sessions.
pub async fn logout(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> ApiResult<Json<LogoutResponse>> {
    let refresh_token = match body {
        Some(Json(req)) => {
            req.validate()?;
            req.refresh_token
        }
        None => None,
    };

    let caller = optional_auth(&state.sessions, &headers)?;
    if refresh_token.is_none() && caller.is_none() {
        return Err(ApiError::BadRequest(
            "A refresh token or bearer token is required".to_string(),
        ));
    }

    let ctx = request_context(&headers, peer, &state.config.api.trusted_proxies);
    let revoked = state
        .sessions
        .logout(
            refresh_token.as_deref(),
            caller.as_ref().map(|auth| &auth.claims),
            &ctx,
        )
        .await?;

    Ok(Json(LogoutResponse { revoked }))
}

/// Ends every session of the bearer
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult<Json<LogoutResponse>> {
    let ctx = request_context(&headers, peer, &state.config.api.trusted_proxies);
    let revoked = state.sessions.logout_all(&auth.claims, &ctx).await?;

    Ok(Json(LogoutResponse { revoked }))
}

/// Lists the bearer's live sessions, oldest first
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    let sessions = state
        .sessions
        .list_sessions(&auth.claims, &RequestContext::new())
        .await?;

    Ok(Json(sessions.into_iter().map(SessionSummary::from).collect()))
}

/// Returns the validated claims of the bearer
pub async fn me(Extension(auth): Extension<AuthContext>) -> Json<AccessClaims> {
    Json(auth.claims)
}
