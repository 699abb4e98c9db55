//! Request-time error taxonomy and its HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

use routekit_auth::AuthError;
use routekit_core::{ConfigurationError, ValidationError};

use crate::response;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body, query or params rejected by a schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Malformed request that is not a schema failure (e.g. invalid JSON).
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid session.
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    /// The named resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

/// How much of an internal failure reaches the client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ErrorRendering {
    /// Include the cause chain of 5xx errors in `details` (development only).
    pub expose_internal: bool,
}

impl ErrorRendering {
    pub fn development() -> Self {
        Self { expose_internal: true }
    }
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Auth("Unauthorized".to_string())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("Forbidden".to_string())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Configuration(_) | Self::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as an error envelope. Internal errors are logged here, once.
    pub fn render(&self, rendering: ErrorRendering) -> Response {
        match self {
            Self::Validation(err) => {
                let details = err
                    .issues
                    .iter()
                    .map(|i| json!({ "path": i.path, "message": i.message }))
                    .collect();
                response::error_with_details("Validation failed", details, self.status()).into_response()
            }
            Self::NotFound(resource) => response::not_found(resource).into_response(),
            Self::BadRequest(msg) | Self::Auth(msg) | Self::Forbidden(msg) | Self::Conflict(msg) => {
                response::error(msg, self.status()).into_response()
            }
            Self::Configuration(err) => {
                tracing::error!(error = %err, "configuration error reached a request");
                internal(rendering, vec![Value::String(err.to_string())])
            }
            Self::Unhandled(err) => {
                tracing::error!(error = ?err, "unhandled error");
                internal(rendering, err.chain().map(|c| Value::String(c.to_string())).collect())
            }
        }
    }
}

fn internal(rendering: ErrorRendering, chain: Vec<Value>) -> Response {
    if rendering.expose_internal {
        response::error_with_details("Internal server error", chain, StatusCode::INTERNAL_SERVER_ERROR)
            .into_response()
    } else {
        response::server_error("Internal server error").into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.render(ErrorRendering::default())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Auth("Invalid email or password".to_string()),
            AuthError::UserAlreadyExists => Self::Conflict(err.to_string()),
            AuthError::InvalidToken(_) | AuthError::Token(_) => Self::unauthorized(),
            AuthError::Disabled(_) => Self::Forbidden(err.to_string()),
            AuthError::Provider(msg) => Self::Unhandled(anyhow::anyhow!(msg)),
        }
    }
}
