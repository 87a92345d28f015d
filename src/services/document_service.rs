// src/services/document_service.rs
//! Document workflow: upload, submission, single-admin review and retrieval.
//!
//! Single-admin verification writes to the chain first and persists only after
//! the transaction is mined, so a chain failure leaves the record untouched.
//! Upload anchoring is best-effort: the upload succeeds even when `addDocument`
//! fails.

use bytes::Bytes;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::blockchain::{ChainStatus, DocumentLedger};
use crate::error::ApiError;
use crate::models::document::Document;
use crate::models::user::User;
use crate::storage::document_store::DocumentStore;
use crate::storage::ipfs_client::ContentStore;
use crate::storage::user_store::UserStore;

/// A file received from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Verify,
    Reject,
}

/// Who submitted a pending document.
#[derive(Debug, Clone, Serialize)]
pub struct Submitter {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingDocument {
    #[serde(flatten)]
    pub document: Document,
    pub user: Option<Submitter>,
}

/// Bytes of a stored document plus what is needed to serve them.
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub data: Bytes,
}

pub struct DocumentService {
    documents: Arc<dyn DocumentStore>,
    users: Arc<dyn UserStore>,
    content: Arc<dyn ContentStore>,
    ledger: Option<Arc<dyn DocumentLedger>>,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        users: Arc<dyn UserStore>,
        content: Arc<dyn ContentStore>,
        ledger: Option<Arc<dyn DocumentLedger>>,
    ) -> Self {
        DocumentService {
            documents,
            users,
            content,
            ledger,
        }
    }

    /// Pins the file, records the document and anchors it when possible.
    ///
    /// # Errors
    /// - `BadRequest` if the file or document type is missing
    /// - `Upstream` if pinning fails
    /// - `Conflict` if the same content was uploaded before
    pub async fn upload(
        &self,
        owner: &User,
        document_type: &str,
        file: UploadedFile,
    ) -> Result<Document, ApiError> {
        let document_type = document_type.trim();
        if file.data.is_empty() || document_type.is_empty() {
            return Err(ApiError::bad_request("Document file and type are required"));
        }

        let file_size = file.data.len() as u64;
        let mime_type = file
            .content_type
            .filter(|m| !m.is_empty())
            .or_else(|| mime_from_file_name(&file.file_name).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let pinned = self.content.upload(&file.file_name, file.data).await?;
        debug!("Pinned {} ({} bytes) at {}", file.file_name, pinned.size, pinned.url);
        if self.documents.find_by_ipfs_hash(&pinned.cid).await.is_some() {
            return Err(ApiError::Conflict(
                "This document has already been uploaded".to_string(),
            ));
        }

        let document = Document::new(
            owner.id,
            document_type.to_string(),
            pinned.cid,
            file.file_name,
            file_size,
            mime_type,
        );
        let mut document = self.documents.insert(document).await?;
        info!("Document {} uploaded by {} as {}", document.id, owner.id, document.ipfs_hash);

        if let Some(tx_hash) = self.anchor(owner, &document).await {
            document = self.documents.set_blockchain_tx(document.id, tx_hash).await?;
        }
        Ok(document)
    }

    async fn anchor(&self, owner: &User, document: &Document) -> Option<String> {
        let ledger = self.ledger.as_ref()?;
        let identity = self.users.get_identity(owner.id).await?;

        match ledger
            .add_document(&identity.did, &document.ipfs_hash, document.id)
            .await
        {
            Ok(receipt) => Some(receipt.tx_hash),
            Err(e) => {
                warn!("Anchoring document {} failed: {}", document.id, e);
                None
            }
        }
    }

    pub async fn list_own(&self, owner: &User) -> Vec<Document> {
        self.documents.list_by_owner(owner.id).await
    }

    /// Submitted documents awaiting review, with submitter details.
    pub async fn list_pending(&self) -> Vec<PendingDocument> {
        let pending = self.documents.list_pending().await;

        let mut submitters: HashMap<Uuid, Option<Submitter>> = HashMap::new();
        for document in &pending {
            if !submitters.contains_key(&document.user_id) {
                let submitter = self.users.get(document.user_id).await.map(|u| Submitter {
                    id: u.id,
                    name: u.name,
                    email: u.email,
                });
                submitters.insert(document.user_id, submitter);
            }
        }

        pending
            .into_iter()
            .map(|document| PendingDocument {
                user: submitters.get(&document.user_id).cloned().flatten(),
                document,
            })
            .collect()
    }

    /// Flags the caller's documents among `ids` as submitted for review.
    ///
    /// # Returns
    /// Number of documents submitted.
    pub async fn submit(&self, owner: &User, ids: &[Uuid]) -> Result<usize, ApiError> {
        if ids.is_empty() {
            return Err(ApiError::bad_request("Document IDs are required"));
        }
        let count = self
            .documents
            .submit_for_verification(owner.id, ids, Utc::now())
            .await;
        if count == 0 {
            return Err(ApiError::not_found("No matching documents found"));
        }
        info!("User {} submitted {} document(s) for verification", owner.id, count);
        Ok(count)
    }

    /// Single-admin review entry point.
    pub async fn review(
        &self,
        admin: &User,
        id: Uuid,
        action: ReviewAction,
        feedback: Option<String>,
    ) -> Result<Document, ApiError> {
        match action {
            ReviewAction::Verify => self.verify(admin, id, feedback).await,
            ReviewAction::Reject => self.reject(admin, id, feedback).await,
        }
    }

    /// Approves a document on the single-admin path.
    ///
    /// # Errors
    /// - `NotFound` for an unknown id
    /// - `Conflict` if already verified or multi-signature is required
    /// - `Upstream` if `verifyDocument` fails; the record is not modified
    pub async fn verify(
        &self,
        admin: &User,
        id: Uuid,
        feedback: Option<String>,
    ) -> Result<Document, ApiError> {
        let document = self.get(id).await?;
        document.check_can_verify()?;

        let tx_hash = match &self.ledger {
            Some(ledger) => Some(ledger.verify_document(id).await?.tx_hash),
            None => None,
        };

        let mined_tx = tx_hash.clone();
        let document = match self
            .documents
            .mark_verified(id, admin.id, tx_hash, feedback, Utc::now())
            .await
        {
            Ok(document) => document,
            Err(e) => {
                if let Some(tx) = mined_tx {
                    warn!(
                        "verifyDocument tx {} for document {} was mined but not recorded: {}",
                        tx, id, e
                    );
                }
                return Err(e.into());
            }
        };
        info!("Document {} verified by admin {}", id, admin.id);
        Ok(document)
    }

    pub async fn reject(
        &self,
        admin: &User,
        id: Uuid,
        feedback: Option<String>,
    ) -> Result<Document, ApiError> {
        let document = self
            .documents
            .reject(id, admin.id, feedback, Utc::now())
            .await?;
        info!("Document {} rejected by admin {}", id, admin.id);
        Ok(document)
    }

    pub async fn get(&self, id: Uuid) -> Result<Document, ApiError> {
        self.documents
            .get(id)
            .await
            .ok_or_else(|| ApiError::not_found("Document not found"))
    }

    /// Returns the document if `user` owns it or is an admin. Other callers
    /// get the same `NotFound` as for a missing id.
    pub async fn get_readable(&self, user: &User, id: Uuid) -> Result<Document, ApiError> {
        let document = self.get(id).await?;
        if document.user_id != user.id && !user.is_admin {
            return Err(ApiError::not_found("Document not found"));
        }
        Ok(document)
    }

    /// Fetches a readable document's bytes through the gateway list.
    pub async fn download(&self, user: &User, id: Uuid) -> Result<DocumentContent, ApiError> {
        let document = self.get_readable(user, id).await?;
        let content = self.content.retrieve(&document.ipfs_hash).await?;
        debug!("Document {} served from {}", id, content.source);
        Ok(DocumentContent {
            file_name: Some(document.file_name),
            mime_type: document.mime_type,
            data: content.data,
        })
    }

    /// Public proxy by CID. The MIME type comes from the stored document when
    /// one exists, else from its file extension, else from the gateway.
    pub async fn content_by_cid(&self, cid: &str) -> Result<DocumentContent, ApiError> {
        let content = self.content.retrieve(cid).await?;
        debug!("Content {} served from {}", cid, content.source);
        let document = self.documents.find_by_ipfs_hash(cid).await;

        let mime_type = document
            .as_ref()
            .and_then(|d| {
                if d.mime_type.is_empty() {
                    mime_from_file_name(&d.file_name).map(str::to_string)
                } else {
                    Some(d.mime_type.clone())
                }
            })
            .or(content.content_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(DocumentContent {
            file_name: document.map(|d| d.file_name),
            mime_type,
            data: content.data,
        })
    }

    /// On-chain view of a readable document.
    pub async fn chain_status(&self, user: &User, id: Uuid) -> Result<ChainStatus, ApiError> {
        let ledger = self
            .ledger
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("Blockchain integration is not configured".into()))?;
        self.get_readable(user, id).await?;
        Ok(ledger.chain_status(id).await?)
    }
}

/// Guesses a MIME type from common document extensions.
pub fn mime_from_file_name(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}
