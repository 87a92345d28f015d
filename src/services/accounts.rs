// src/services/accounts.rs
//! User registration, login and profile management.

use log::info;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::user::{is_valid_email, User};
use crate::services::auth::{AuthError, AuthService};
use crate::storage::user_store::{ProfileUpdate, UserStore};
use crate::utils::crypto::{hash_password, verify_password};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    auth: Arc<AuthService>,
    config: Arc<AppConfig>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, auth: Arc<AuthService>, config: Arc<AppConfig>) -> Self {
        AccountService { users, auth, config }
    }

    /// Creates an account and returns it with a fresh token.
    ///
    /// # Errors
    /// - `BadRequest` for a missing name, malformed email or short password
    /// - `Conflict` if the email is already registered
    pub async fn register(&self, request: RegisterRequest) -> Result<(User, String), ApiError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::bad_request("Name is required"));
        }
        if !is_valid_email(request.email.trim()) {
            return Err(ApiError::bad_request("Please enter a valid email"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(AuthError::Hashing)?;

        let mut user = User::new(name, request.email, password_hash, request.phone);
        user.is_admin = self.config.is_admin_email(&user.email);
        let user = self.users.insert(user).await?;
        let token = self.auth.issue_token(user.id)?;

        info!("Registered user {} (admin: {})", user.id, user.is_admin);
        Ok((user, token))
    }

    /// # Errors
    /// `Unauthorized` for an unknown email or wrong password, without saying which.
    pub async fn login(&self, request: LoginRequest) -> Result<(User, String), ApiError> {
        let user = self
            .users
            .find_by_email(&request.email)
            .await
            .ok_or(AuthError::InvalidCredentials)?;

        let password = request.password;
        let password_hash = user.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;
        if !matches {
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.auth.issue_token(user.id)?;
        Ok((user, token))
    }

    pub async fn update_profile(&self, user: &User, update: ProfileUpdate) -> Result<User, ApiError> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(ApiError::bad_request("Name cannot be empty"));
            }
        }
        if let Some(email) = &update.email {
            if !is_valid_email(email.trim()) {
                return Err(ApiError::bad_request("Please enter a valid email"));
            }
        }
        Ok(self.users.update_profile(user.id, update).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::user_store::InMemoryUserStore;

    fn service(admin_emails: Vec<String>) -> AccountService {
        let config = AppConfig {
            jwt_secret: "test-secret".into(),
            admin_emails,
            ..AppConfig::default()
        };
        AccountService::new(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(AuthService::new("test-secret", 24)),
            Arc::new(config),
        )
    }

    fn register_request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Grace".into(),
            email: email.into(),
            password: password.into(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let accounts = service(vec![]);
        let (user, _) = accounts
            .register(register_request("Grace@Example.com", "s3cret!"))
            .await
            .unwrap();
        assert_eq!(user.email, "grace@example.com");
        assert!(!user.is_admin);

        let (logged_in, _) = accounts
            .login(LoginRequest {
                email: "grace@example.com".into(),
                password: "s3cret!".into(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let wrong = accounts
            .login(LoginRequest {
                email: "grace@example.com".into(),
                password: "nope-nope".into(),
            })
            .await;
        assert!(matches!(wrong, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_register_validation_and_duplicates() {
        let accounts = service(vec![]);
        assert!(matches!(
            accounts.register(register_request("grace@example.com", "short")).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            accounts.register(register_request("not-an-email", "long-enough")).await,
            Err(ApiError::BadRequest(_))
        ));

        accounts
            .register(register_request("grace@example.com", "long-enough"))
            .await
            .unwrap();
        assert!(matches!(
            accounts.register(register_request("GRACE@example.com", "long-enough")).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_configured_admin_email() {
        let accounts = service(vec!["ops@example.com".into()]);
        let (admin, _) = accounts
            .register(register_request("ops@example.com", "long-enough"))
            .await
            .unwrap();
        assert!(admin.is_admin);
    }
}
