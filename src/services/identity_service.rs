// src/services/identity_service.rs
//! Blockchain identity lifecycle: one generated wallet and DID per user.

use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::identity::BlockchainIdentity;
use crate::storage::user_store::UserStore;
use crate::wallet::key_management::generate_wallet;

pub struct IdentityService {
    users: Arc<dyn UserStore>,
}

impl IdentityService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        IdentityService { users }
    }

    /// Generates a wallet for `user_id` and records its `did:ethr:` identifier.
    ///
    /// # Errors
    /// `Conflict` if the user already has an identity.
    pub async fn create(&self, user_id: Uuid) -> Result<BlockchainIdentity, ApiError> {
        if self.users.get_identity(user_id).await.is_some() {
            return Err(ApiError::Conflict(
                "Blockchain identity already exists for this user".to_string(),
            ));
        }

        let wallet = generate_wallet();
        let identity = BlockchainIdentity::new(user_id, wallet.address, wallet.private_key);
        let identity = self.users.insert_identity(identity).await?;

        info!("Created blockchain identity {} for user {}", identity.did, user_id);
        Ok(identity)
    }

    pub async fn get(&self, user_id: Uuid) -> Result<BlockchainIdentity, ApiError> {
        self.users
            .get_identity(user_id)
            .await
            .ok_or_else(|| ApiError::not_found("Blockchain identity not found"))
    }

    /// Admin attestation of another user's identity.
    pub async fn verify(&self, user_id: Uuid) -> Result<BlockchainIdentity, ApiError> {
        let identity = self.set_verified(user_id, true).await?;
        info!("Blockchain identity {} verified", identity.did);
        Ok(identity)
    }

    /// Owner withdraws the attestation on their own identity.
    pub async fn revoke(&self, user_id: Uuid) -> Result<BlockchainIdentity, ApiError> {
        let identity = self.set_verified(user_id, false).await?;
        info!("Blockchain identity {} revoked", identity.did);
        Ok(identity)
    }

    async fn set_verified(&self, user_id: Uuid, verified: bool) -> Result<BlockchainIdentity, ApiError> {
        self.users
            .set_identity_verified(user_id, verified)
            .await
            .map_err(|_| ApiError::not_found("Blockchain identity not found"))
    }
}
