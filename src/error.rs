// src/error.rs
//! API error type.
//!
//! Every handler returns `Result<_, ApiError>`. Adapter errors convert into it
//! with `From`, and the response body is always
//! `{ "success": false, "message": ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::blockchain::ChainError;
use crate::models::document::TransitionError;
use crate::services::auth::AuthError;
use crate::storage::ipfs_client::IpfsError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Share link past its expiry (400).
    #[error("Verification link has expired")]
    Expired,

    #[error("{0}")]
    BadRequest(String),

    /// Request conflicts with the current state of the resource (409).
    #[error("{0}")]
    Conflict(String),

    /// Blockchain or IPFS failure. The message is surfaced to the client (500).
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),

    /// Optional integration not configured (503).
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Expired | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }

        let body = json!({
            "success": false,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidSignatureCount { .. } => Self::BadRequest(err.to_string()),
            _ => Self::Conflict(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(err.to_string()),
            StoreError::Duplicate(msg) => Self::Conflict(msg),
            StoreError::Transition(transition) => transition.into(),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        Self::Upstream(format!("Blockchain error: {}", err))
    }
}

impl From<IpfsError> for ApiError {
    fn from(err: IpfsError) -> Self {
        match err {
            IpfsError::InvalidCid(_) => Self::BadRequest(err.to_string()),
            _ => Self::Upstream(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AdminRequired => Self::Forbidden(err.to_string()),
            AuthError::Hashing(_) | AuthError::TokenCreation(_) => Self::Internal(err.to_string()),
            _ => Self::Unauthorized(err.to_string()),
        }
    }
}
