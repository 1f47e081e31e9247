/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`, which converts to an HTTP
/// status code and a JSON error body. Lifecycle errors are collapsed with
/// [`AuthError::client_facing`] first, so a client never learns whether a
/// token expired, was revoked, or tripped reuse detection.
///
/// # Example
///
/// ```
/// use keyward_api::error::ApiError;
/// use keyward_shared::error::AuthError;
///
/// let err = ApiError::from(AuthError::TokenRevoked);
/// assert_eq!(err.to_string(), "Unauthorized: Invalid or expired token");
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keyward_shared::auth::middleware::MiddlewareError;
use keyward_shared::error::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_TOKEN: &str = "Invalid or expired token";

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert lifecycle errors to API errors
///
/// Messages are fixed per kind; nothing from the internal error leaks.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_security_event() {
            tracing::warn!(error = %err, "Security event on request");
        }

        match err.client_facing() {
            AuthError::InvalidCredentials => ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()),
            AuthError::AccountLocked { .. } => {
                ApiError::Forbidden("Account is temporarily locked".to_string())
            }
            AuthError::AccountInactive => ApiError::Forbidden("Account is inactive".to_string()),
            AuthError::Timeout => ApiError::ServiceUnavailable("Request timed out".to_string()),
            AuthError::OperationFailed(msg) => ApiError::InternalError(msg),
            AuthError::TokenInvalid
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::TokenChainCompromised { .. } => {
                ApiError::Unauthorized(INVALID_TOKEN.to_string())
            }
        }
    }
}

/// Convert bearer header failures to API errors
impl From<MiddlewareError> for ApiError {
    fn from(err: MiddlewareError) -> Self {
        match err {
            MiddlewareError::MissingCredentials => {
                ApiError::Unauthorized("Missing credentials".to_string())
            }
            MiddlewareError::InvalidFormat | MiddlewareError::InvalidToken => {
                ApiError::Unauthorized(INVALID_TOKEN.to_string())
            }
        }
    }
}

/// Convert request validation failures to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(errors)
    }
}
