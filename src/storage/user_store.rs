// src/storage/user_store.rs
//! User accounts and their blockchain identities.

use crate::models::identity::BlockchainIdentity;
use crate::models::user::User;
use crate::storage::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Fields a user may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user. Emails are unique.
    async fn insert(&self, user: User) -> Result<User, StoreError>;

    async fn get(&self, id: Uuid) -> Option<User>;

    async fn find_by_email(&self, email: &str) -> Option<User>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User, StoreError>;

    /// Display names for the given ids; unknown ids are absent from the map.
    async fn names(&self, ids: &[Uuid]) -> HashMap<Uuid, String>;

    /// Stores a user's identity and mirrors its DID and address onto the user.
    async fn insert_identity(&self, identity: BlockchainIdentity) -> Result<BlockchainIdentity, StoreError>;

    async fn get_identity(&self, user_id: Uuid) -> Option<BlockchainIdentity>;

    async fn set_identity_verified(
        &self,
        user_id: Uuid,
        verified: bool,
    ) -> Result<BlockchainIdentity, StoreError>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    identities: HashMap<Uuid, BlockchainIdentity>,
}

/// Process-local user store. Users and identities share one lock so the
/// identity insert and the user mirror update land together.
#[derive(Default)]
pub struct InMemoryUserStore {
    tables: RwLock<Tables>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("User already exists".to_string()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        let email = email.trim().to_lowercase();
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;

        let email = update.email.map(|e| e.trim().to_lowercase());
        if let Some(email) = &email {
            if tables.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::Duplicate("Email is already in use".to_string()));
            }
        }

        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(phone) = update.phone {
            user.phone = Some(phone);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn names(&self, ids: &[Uuid]) -> HashMap<Uuid, String> {
        let tables = self.tables.read().await;
        ids.iter()
            .filter_map(|id| tables.users.get(id).map(|u| (*id, u.name.clone())))
            .collect()
    }

    async fn insert_identity(&self, identity: BlockchainIdentity) -> Result<BlockchainIdentity, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.identities.contains_key(&identity.user_id) {
            return Err(StoreError::Duplicate(
                "Blockchain identity already exists for this user".to_string(),
            ));
        }
        let user = tables
            .users
            .get_mut(&identity.user_id)
            .ok_or(StoreError::NotFound("User"))?;
        user.did = Some(identity.did.clone());
        user.wallet_address = Some(identity.address.clone());
        user.updated_at = Utc::now();

        tables.identities.insert(identity.user_id, identity.clone());
        Ok(identity)
    }

    async fn get_identity(&self, user_id: Uuid) -> Option<BlockchainIdentity> {
        self.tables.read().await.identities.get(&user_id).cloned()
    }

    async fn set_identity_verified(
        &self,
        user_id: Uuid,
        verified: bool,
    ) -> Result<BlockchainIdentity, StoreError> {
        let mut tables = self.tables.write().await;
        let identity = tables
            .identities
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound("Blockchain identity"))?;
        identity.verified = verified;
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }
}
