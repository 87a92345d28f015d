// src/models/user.rs
//! User account model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A registered user. Admins review documents; everyone else owns them.
///
/// The password hash is never serialized into API responses.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Stored lowercased; unique across users
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    /// `did:ethr:` identifier, filled in once a blockchain identity exists
    pub did: Option<String>,
    pub wallet_address: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String, phone: Option<String>) -> Self {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name,
            email: email.trim().to_lowercase(),
            password_hash,
            phone,
            did: None,
            wallet_address: None,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Loose `local@domain.tld` check, matching what the registration form enforces.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => {
            !host.is_empty()
                && (2..=6).contains(&tld.len())
                && tld.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let user = User::new("Ada".into(), "  Ada@Example.COM ".into(), "hash".into(), None);
        assert_eq!(user.email, "ada@example.com");
        assert!(!user.is_admin);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@example.c0m"));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("Ada".into(), "ada@example.com".into(), "secret-hash".into(), None);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }
}
