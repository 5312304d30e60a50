use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error taxonomy. Every error that reaches the HTTP boundary
/// becomes a `{"status":"error","message":...}` envelope with the mapped
/// status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing link / user / reset-token target.
    #[error("{0}")]
    NotFound(String),

    /// Alias or email already taken.
    #[error("{0}")]
    Conflict(String),

    /// Not the owner, wrong role, or stale token.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed URL, alias, email, or password policy violation.
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid, or expired credential.
    #[error("{0}")]
    Unauthorized(String),

    /// CAPTCHA / email / geo collaborator failure.
    #[error("{0}")]
    Upstream(String),

    /// Storage failure. Surfaced generically; details go to the log only.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn link_not_found(alias: &str) -> Self {
        ApiError::NotFound(format!("No such shortened URL: {alias}"))
    }

    pub fn link_id_not_found(id: i64) -> Self {
        ApiError::NotFound(format!("No link with id {id}"))
    }

    pub fn user_not_found() -> Self {
        ApiError::NotFound("No user with the given id".into())
    }

    pub fn alias_taken(alias: &str) -> Self {
        ApiError::Conflict(format!("Given short URL /{alias} already in use"))
    }

    pub fn not_owner() -> Self {
        ApiError::Forbidden("You are not allowed to change this link".into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client-facing message. Internal failures are collapsed to a
    /// generic line so no storage details leak.
    fn public_message(&self) -> String {
        match self {
            ApiError::Database(_) | ApiError::Internal(_) => {
                "Something went wrong. Please try again later".into()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Database(ref e) = self {
            tracing::error!("database error: {e:?}");
        }
        if let ApiError::Internal(ref msg) = self {
            tracing::error!("internal error: {msg}");
        }

        let body = json!({
            "status": "error",
            "message": self.public_message(),
        });

        (self.status_code(), Json(body)).into_response()
    }
}
