use axum::http::header::{ALLOW, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method not allowed")]
    MethodNotAllowed { allow: &'static str },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Protocol clients print error bodies verbatim, so keep them plain text.
        let body = match &self {
            Self::NotFound(msg) => {
                tracing::info!(status = status.as_u16(), detail = %msg, "not found");
                "not found".to_owned()
            }
            Self::Unauthorized => {
                tracing::info!(status = status.as_u16(), "unauthorized");
                "unauthorized".to_owned()
            }
            Self::Forbidden(msg) => {
                tracing::warn!(status = status.as_u16(), detail = %msg, "forbidden");
                "forbidden".to_owned()
            }
            Self::BadRequest(msg) | Self::Conflict(msg) => {
                tracing::warn!(status = status.as_u16(), detail = %msg, "request rejected");
                self.to_string()
            }
            Self::MethodNotAllowed { .. } => {
                tracing::info!(status = status.as_u16(), "method not allowed");
                "method not allowed".to_owned()
            }
            Self::PayloadTooLarge => {
                tracing::warn!(status = status.as_u16(), "upload exceeds size limit");
                "payload too large".to_owned()
            }
            Self::Internal(err) => {
                tracing::error!(status = status.as_u16(), error = ?err, "internal server error");
                "internal server error".to_owned()
            }
        };

        let mut response = (status, body).into_response();
        match &self {
            Self::Unauthorized => {
                response.headers_mut().insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"modvault\""),
                );
            }
            Self::MethodNotAllowed { allow } => {
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static(*allow));
            }
            _ => {}
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            StoreError::PermissionDenied { context, source } => {
                Self::Forbidden(format!("{context}: {source}"))
            }
            err @ StoreError::Storage { .. } => Self::Internal(err.into()),
        }
    }
}
