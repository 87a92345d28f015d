// src/services/auth.rs
//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs carrying the user id and an expiry. Handlers receive
//! the caller through the [`AuthUser`] and [`AdminUser`] extractors; the admin
//! flag is always read from the user store, never from the token.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::user::User;
use crate::services::api_server::ApiServer;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No auth token provided")]
    MissingToken,

    #[error("Not authorized")]
    InvalidToken,

    #[error("Not authorized. Admin access required")]
    AdminRequired,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

/// JWT payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: String,
    /// Expiry, seconds since epoch
    pub exp: usize,
}

/// Issues and validates bearer tokens.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl AuthService {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        AuthService {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::hours(expiry_hours),
        }
    }

    /// Signs a token for `user_id` valid for the configured lifetime.
    pub fn issue_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        let exp = (Utc::now() + self.expiry).timestamp().max(0) as usize;
        let claims = Claims {
            id: user_id.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Checks signature and expiry and returns the user id.
    pub fn validate_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        Uuid::parse_str(&data.claims.id).map_err(|_| AuthError::InvalidToken)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Any authenticated user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// An authenticated user with `is_admin` set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<ApiServer>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiServer>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        let user_id = state.auth.validate_token(token)?;
        let user = state
            .users
            .get(user_id)
            .await
            .ok_or(AuthError::InvalidToken)?;
        Ok(AuthUser(user))
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<ApiServer>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiServer>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AuthError::AdminRequired.into());
        }
        Ok(AdminUser(user))
    }
}
