// src/storage/document_store.rs
//! Document record storage.
//!
//! Every mutating operation is a single conditional update: the store looks the
//! document up, runs the state transition from [`Document`] and commits, all
//! while holding the write lock. Two admins signing the same document at the
//! same moment are therefore applied one after the other, never lost.

use crate::models::document::{AdminSignature, Document, MultiSigPayment, TransitionError};
use crate::storage::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage operations the verification workflow relies on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document. Content hashes are unique.
    async fn insert(&self, document: Document) -> Result<Document, StoreError>;

    async fn get(&self, id: Uuid) -> Option<Document>;

    async fn find_by_ipfs_hash(&self, ipfs_hash: &str) -> Option<Document>;

    /// Documents with the given ids, in the order requested. Unknown ids are skipped.
    async fn get_many(&self, ids: &[Uuid]) -> Vec<Document>;

    /// All documents of one owner, newest first.
    async fn list_by_owner(&self, user_id: Uuid) -> Vec<Document>;

    /// Submitted documents awaiting review, oldest submission first.
    async fn list_pending(&self) -> Vec<Document>;

    async fn set_blockchain_tx(&self, id: Uuid, tx_hash: String) -> Result<Document, StoreError>;

    /// Flags the owner's documents among `ids` as submitted.
    ///
    /// # Returns
    /// Number of unverified documents that matched both an id and the owner.
    async fn submit_for_verification(&self, owner: Uuid, ids: &[Uuid], at: DateTime<Utc>) -> usize;

    async fn mark_verified(
        &self,
        id: Uuid,
        admin_id: Uuid,
        tx_hash: Option<String>,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Document, StoreError>;

    async fn reject(
        &self,
        id: Uuid,
        admin_id: Uuid,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Document, StoreError>;

    async fn enable_multisig(
        &self,
        id: Uuid,
        required_signatures: u8,
        payment: MultiSigPayment,
    ) -> Result<Document, StoreError>;

    /// Appends a signature and flips the completion flags in one atomic step.
    ///
    /// # Returns
    /// The updated document and whether this signature completed it.
    async fn append_signature(
        &self,
        id: Uuid,
        signature: AdminSignature,
    ) -> Result<(Document, bool), StoreError>;
}

/// Process-local document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `transition` on the stored document under the write lock.
    async fn modify<T, F>(&self, id: Uuid, transition: F) -> Result<(Document, T), StoreError>
    where
        F: FnOnce(&mut Document) -> Result<T, TransitionError>,
    {
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(&id).ok_or(StoreError::NotFound("Document"))?;
        let outcome = transition(document)?;
        Ok((document.clone(), outcome))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, document: Document) -> Result<Document, StoreError> {
        let mut documents = self.documents.write().await;
        if documents.values().any(|d| d.ipfs_hash == document.ipfs_hash) {
            return Err(StoreError::Duplicate(
                "A document with this content has already been uploaded".to_string(),
            ));
        }
        documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get(&self, id: Uuid) -> Option<Document> {
        self.documents.read().await.get(&id).cloned()
    }

    async fn find_by_ipfs_hash(&self, ipfs_hash: &str) -> Option<Document> {
        self.documents
            .read()
            .await
            .values()
            .find(|d| d.ipfs_hash == ipfs_hash)
            .cloned()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Vec<Document> {
        let documents = self.documents.read().await;
        ids.iter().filter_map(|id| documents.get(id).cloned()).collect()
    }

    async fn list_by_owner(&self, user_id: Uuid) -> Vec<Document> {
        let mut owned: Vec<Document> = self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        owned
    }

    async fn list_pending(&self) -> Vec<Document> {
        let mut pending: Vec<Document> = self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.is_pending_review())
            .cloned()
            .collect();
        pending.sort_by_key(|d| d.submission_date.unwrap_or(d.uploaded_at));
        pending
    }

    async fn set_blockchain_tx(&self, id: Uuid, tx_hash: String) -> Result<Document, StoreError> {
        self.modify(id, |doc| {
            doc.blockchain_tx_hash = Some(tx_hash);
            Ok(())
        })
        .await
        .map(|(doc, _)| doc)
    }

    async fn submit_for_verification(&self, owner: Uuid, ids: &[Uuid], at: DateTime<Utc>) -> usize {
        let mut documents = self.documents.write().await;
        let mut matched = 0;
        for id in ids {
            if let Some(doc) = documents.get_mut(id).filter(|d| d.user_id == owner) {
                if doc.submit(at).is_ok() {
                    matched += 1;
                }
            }
        }
        matched
    }

    async fn mark_verified(
        &self,
        id: Uuid,
        admin_id: Uuid,
        tx_hash: Option<String>,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Document, StoreError> {
        self.modify(id, |doc| doc.verify(admin_id, tx_hash, feedback, at))
            .await
            .map(|(doc, _)| doc)
    }

    async fn reject(
        &self,
        id: Uuid,
        admin_id: Uuid,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Document, StoreError> {
        self.modify(id, |doc| doc.reject(admin_id, feedback, at))
            .await
            .map(|(doc, _)| doc)
    }

    async fn enable_multisig(
        &self,
        id: Uuid,
        required_signatures: u8,
        payment: MultiSigPayment,
    ) -> Result<Document, StoreError> {
        self.modify(id, |doc| doc.enable_multisig(required_signatures, payment))
            .await
            .map(|(doc, _)| doc)
    }

    async fn append_signature(
        &self,
        id: Uuid,
        signature: AdminSignature,
    ) -> Result<(Document, bool), StoreError> {
        self.modify(id, |doc| doc.apply_signature(signature)).await
    }
}
