// src/storage/share_store.rs
//! Verification share records. Shares are never deleted; expiry is checked on read.

use crate::models::share::VerificationShare;
use crate::storage::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ShareStore: Send + Sync {
    /// Inserts a share. Codes are unique.
    async fn insert(&self, share: VerificationShare) -> Result<VerificationShare, StoreError>;

    async fn get(&self, code: &str) -> Option<VerificationShare>;
}

#[derive(Default)]
pub struct InMemoryShareStore {
    shares: RwLock<HashMap<String, VerificationShare>>,
}

impl InMemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShareStore for InMemoryShareStore {
    async fn insert(&self, share: VerificationShare) -> Result<VerificationShare, StoreError> {
        let mut shares = self.shares.write().await;
        if shares.contains_key(&share.code) {
            return Err(StoreError::Duplicate("Share code already in use".to_string()));
        }
        shares.insert(share.code.clone(), share.clone());
        Ok(share)
    }

    async fn get(&self, code: &str) -> Option<VerificationShare> {
        self.shares.read().await.get(code).cloned()
    }
}
