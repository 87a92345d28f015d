// src/services/share_service.rs
//! Verification share links.
//!
//! A share grants anyone holding its code read access to a redacted summary of
//! some of a user's documents until it expires:
//! - content hashes and reviewer details only with `include_details`
//! - preview URLs only with `show_documents`
//! - nothing at all once `now > expires_at`

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::document::Document;
use crate::models::share::VerificationShare;
use crate::models::user::User;
use crate::storage::document_store::DocumentStore;
use crate::storage::share_store::ShareStore;
use crate::storage::user_store::UserStore;
use crate::storage::StoreError;
use crate::utils::crypto::generate_share_code;

pub const MAX_SHARE_DAYS: i64 = 365;
const CODE_ATTEMPTS: usize = 3;
const FALLBACK_NAME: &str = "Admin";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub include_details: bool,
    #[serde(default = "default_show_documents")]
    pub show_documents: bool,
}

fn default_show_documents() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedShare {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verification_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerDetail {
    pub name: String,
    pub signed_at: Option<DateTime<Utc>>,
}

/// Reviewer details of a verified document, flattened into its summary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "verificationType")]
pub enum VerificationInfo {
    #[serde(rename = "multi-signature", rename_all = "camelCase")]
    MultiSignature {
        verified_by: Vec<String>,
        verified_by_details: Vec<SignerDetail>,
        required_signatures: u8,
        current_signatures: usize,
        is_multi_sig_complete: bool,
    },
    #[serde(rename = "single-admin", rename_all = "camelCase")]
    SingleAdmin {
        verified_by: Vec<String>,
        verified_by_details: Vec<SignerDetail>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDocument {
    pub id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub submitted_by: String,
    pub requires_multi_sig: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipfs_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(flatten)]
    pub verification: Option<VerificationInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedUser {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedVerification {
    pub user: SharedUser,
    pub documents: Vec<SharedDocument>,
    pub expires_at: DateTime<Utc>,
    pub include_details: bool,
    pub show_documents: bool,
}

pub struct ShareService {
    shares: Arc<dyn ShareStore>,
    documents: Arc<dyn DocumentStore>,
    users: Arc<dyn UserStore>,
    frontend_url: String,
    public_api_url: String,
    default_expiry_days: i64,
}

impl ShareService {
    pub fn new(
        shares: Arc<dyn ShareStore>,
        documents: Arc<dyn DocumentStore>,
        users: Arc<dyn UserStore>,
        config: &AppConfig,
    ) -> Self {
        ShareService {
            shares,
            documents,
            users,
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            public_api_url: config.public_api_url.trim_end_matches('/').to_string(),
            default_expiry_days: config.share_default_expiry_days,
        }
    }

    /// Creates a share over documents the caller owns.
    ///
    /// # Errors
    /// `BadRequest` if no documents are given, any id is unknown or foreign,
    /// or the expiry is outside 1..=365 days.
    pub async fn create(&self, owner: &User, request: CreateShareRequest) -> Result<CreatedShare, ApiError> {
        if request.document_ids.is_empty() {
            return Err(ApiError::bad_request("No documents selected to share"));
        }
        let days = request.expires_in_days.unwrap_or(self.default_expiry_days);
        if !(1..=MAX_SHARE_DAYS).contains(&days) {
            return Err(ApiError::bad_request(format!(
                "Expiry must be between 1 and {} days",
                MAX_SHARE_DAYS
            )));
        }

        let mut document_ids: Vec<Uuid> = Vec::with_capacity(request.document_ids.len());
        for id in request.document_ids {
            if !document_ids.contains(&id) {
                document_ids.push(id);
            }
        }
        let found = self.documents.get_many(&document_ids).await;
        if found.len() != document_ids.len() || found.iter().any(|d| d.user_id != owner.id) {
            return Err(ApiError::bad_request(
                "Some documents are invalid or don't belong to you",
            ));
        }

        let now = Utc::now();
        let expires_at = now + Duration::days(days);
        let mut share = VerificationShare {
            code: generate_share_code(),
            user_id: owner.id,
            document_ids,
            expires_at,
            include_details: request.include_details,
            show_documents: request.show_documents,
            created_at: now,
        };

        let mut attempts = 0;
        let share = loop {
            match self.shares.insert(share.clone()).await {
                Ok(stored) => break stored,
                Err(StoreError::Duplicate(_)) if attempts + 1 < CODE_ATTEMPTS => {
                    attempts += 1;
                    share.code = generate_share_code();
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!(
            "User {} shared {} document(s) until {}",
            owner.id,
            share.document_ids.len(),
            share.expires_at
        );
        Ok(CreatedShare {
            verification_url: format!(
                "{}/verify?code={}&expires={}&details={}",
                self.frontend_url,
                share.code,
                share.expires_at.timestamp_millis(),
                if share.include_details { 1 } else { 0 }
            ),
            code: share.code,
            expires_at: share.expires_at,
        })
    }

    /// Resolves a share code at the current time.
    pub async fn resolve(&self, code: &str) -> Result<SharedVerification, ApiError> {
        self.resolve_at(code, Utc::now()).await
    }

    /// # Errors
    /// - `BadRequest` for an empty code
    /// - `NotFound` for an unknown code
    /// - `Expired` when `now > expires_at`; no document data is read
    pub async fn resolve_at(&self, code: &str, now: DateTime<Utc>) -> Result<SharedVerification, ApiError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ApiError::bad_request("Invalid verification code"));
        }
        let share = self
            .shares
            .get(code)
            .await
            .ok_or_else(|| ApiError::not_found("Verification link not found or has expired"))?;
        if share.is_expired_at(now) {
            return Err(ApiError::Expired);
        }

        let documents = self.documents.get_many(&share.document_ids).await;

        let mut person_ids = vec![share.user_id];
        for document in &documents {
            person_ids.push(document.user_id);
            person_ids.extend(document.verified_by);
            person_ids.extend(document.admin_signatures.iter().map(|s| s.admin_id));
        }
        let names = self.users.names(&person_ids).await;

        let documents = documents
            .iter()
            .map(|document| self.summarize(&share, document, &names))
            .collect();

        Ok(SharedVerification {
            user: SharedUser {
                name: names
                    .get(&share.user_id)
                    .cloned()
                    .unwrap_or_else(|| "User".to_string()),
            },
            documents,
            expires_at: share.expires_at,
            include_details: share.include_details,
            show_documents: share.show_documents,
        })
    }

    fn summarize(
        &self,
        share: &VerificationShare,
        document: &Document,
        names: &HashMap<Uuid, String>,
    ) -> SharedDocument {
        let verification = (share.include_details && document.is_verified)
            .then(|| verification_info(document, names));

        SharedDocument {
            id: document.id,
            document_type: document.document_type.clone(),
            file_name: document.file_name.clone(),
            uploaded_at: document.uploaded_at,
            is_verified: document.is_verified,
            verified_at: document.verified_at,
            submitted_by: names
                .get(&document.user_id)
                .cloned()
                .unwrap_or_else(|| "Document Owner".to_string()),
            requires_multi_sig: document.requires_multi_sig,
            ipfs_hash: share
                .include_details
                .then(|| document.ipfs_hash.clone()),
            preview_url: share.show_documents.then(|| {
                format!("{}/api/ipfs/content/{}", self.public_api_url, document.ipfs_hash)
            }),
            verification,
        }
    }
}

fn display_name(names: &HashMap<Uuid, String>, id: &Uuid) -> String {
    names
        .get(id)
        .cloned()
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

fn verification_info(document: &Document, names: &HashMap<Uuid, String>) -> VerificationInfo {
    if document.requires_multi_sig && !document.admin_signatures.is_empty() {
        let details: Vec<SignerDetail> = document
            .admin_signatures
            .iter()
            .map(|s| SignerDetail {
                name: display_name(names, &s.admin_id),
                signed_at: Some(s.signed_at),
            })
            .collect();
        VerificationInfo::MultiSignature {
            verified_by: details.iter().map(|d| d.name.clone()).collect(),
            verified_by_details: details,
            required_signatures: document.required_signatures,
            current_signatures: document.admin_signatures.len(),
            is_multi_sig_complete: document.is_multi_sig_complete,
        }
    } else {
        let name = document
            .verified_by
            .map(|id| display_name(names, &id))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        VerificationInfo::SingleAdmin {
            verified_by: vec![name.clone()],
            verified_by_details: vec![SignerDetail {
                name,
                signed_at: document.verified_at,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{AdminSignature, MultiSigPayment};
    use crate::storage::document_store::InMemoryDocumentStore;
    use crate::storage::share_store::InMemoryShareStore;
    use crate::storage::user_store::InMemoryUserStore;

    struct Fixture {
        service: ShareService,
        documents: Arc<InMemoryDocumentStore>,
        users: Arc<InMemoryUserStore>,
        owner: User,
    }

    async fn fixture() -> Fixture {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let owner = users
            .insert(User::new("Olive".into(), "olive@example.com".into(), "h".into(), None))
            .await
            .unwrap();
        let service = ShareService::new(
            Arc::new(InMemoryShareStore::new()),
            documents.clone(),
            users.clone(),
            &AppConfig::default(),
        );
        Fixture {
            service,
            documents,
            users,
            owner,
        }
    }

    async fn upload(f: &Fixture, hash: &str) -> Document {
        f.documents
            .insert(Document::new(
                f.owner.id,
                "passport".into(),
                hash.into(),
                "passport.pdf".into(),
                10,
                "application/pdf".into(),
            ))
            .await
            .unwrap()
    }

    fn request(ids: Vec<Uuid>, include_details: bool, show_documents: bool) -> CreateShareRequest {
        CreateShareRequest {
            document_ids: ids,
            expires_in_days: None,
            include_details,
            show_documents,
        }
    }

    #[tokio::test]
    async fn test_create_share_builds_url() {
        let f = fixture().await;
        let document = upload(&f, "QmOne").await;

        let created = f
            .service
            .create(&f.owner, request(vec![document.id, document.id], true, true))
            .await
            .unwrap();
        assert_eq!(created.code.len(), 12);
        assert_eq!(
            created.verification_url,
            format!(
                "http://localhost:3000/verify?code={}&expires={}&details=1",
                created.code,
                created.expires_at.timestamp_millis()
            )
        );
        let days = (created.expires_at - Utc::now()).num_days();
        assert!(days == 6 || days == 7);

        let resolved = f.service.resolve(&created.code).await.unwrap();
        assert_eq!(resolved.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_or_missing_documents() {
        let f = fixture().await;
        let mine = upload(&f, "QmMine").await;
        let other = f
            .users
            .insert(User::new("Eve".into(), "eve@example.com".into(), "h".into(), None))
            .await
            .unwrap();

        assert!(matches!(
            f.service.create(&f.owner, request(vec![], false, true)).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            f.service.create(&other, request(vec![mine.id], false, true)).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            f.service
                .create(&f.owner, request(vec![mine.id, Uuid::new_v4()], false, true))
                .await,
            Err(ApiError::BadRequest(_))
        ));

        let mut too_long = request(vec![mine.id], false, true);
        too_long.expires_in_days = Some(366);
        assert!(matches!(
            f.service.create(&f.owner, too_long).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_share_returns_no_data() {
        let f = fixture().await;
        let document = upload(&f, "QmExpiring").await;
        let created = f
            .service
            .create(&f.owner, request(vec![document.id], true, true))
            .await
            .unwrap();

        assert!(f.service.resolve_at(&created.code, created.expires_at).await.is_ok());
        let later = created.expires_at + Duration::milliseconds(1);
        assert!(matches!(
            f.service.resolve_at(&created.code, later).await,
            Err(ApiError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_empty_codes() {
        let f = fixture().await;
        assert!(matches!(f.service.resolve("").await, Err(ApiError::BadRequest(_))));
        assert!(matches!(
            f.service.resolve("ffffffffffff").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_redaction_flags() {
        let f = fixture().await;
        let document = upload(&f, "QmRedacted").await;
        let created = f
            .service
            .create(&f.owner, request(vec![document.id], false, false))
            .await
            .unwrap();

        let resolved = f.service.resolve(&created.code).await.unwrap();
        let shared = &resolved.documents[0];
        assert!(shared.preview_url.is_none());
        assert!(shared.ipfs_hash.is_none());
        assert!(shared.verification.is_none());
        assert_eq!(shared.submitted_by, "Olive");
        assert_eq!(resolved.user.name, "Olive");

        let json = serde_json::to_value(shared).unwrap();
        assert!(json.get("previewUrl").is_none());
        assert!(json.get("ipfsHash").is_none());
    }

    #[tokio::test]
    async fn test_preview_url_points_at_public_proxy() {
        let f = fixture().await;
        let document = upload(&f, "QmPreview").await;
        let created = f
            .service
            .create(&f.owner, request(vec![document.id], false, true))
            .await
            .unwrap();

        let resolved = f.service.resolve(&created.code).await.unwrap();
        assert_eq!(
            resolved.documents[0].preview_url.as_deref(),
            Some("http://localhost:8000/api/ipfs/content/QmPreview")
        );
    }

    #[tokio::test]
    async fn test_multisig_details_flattened() {
        let f = fixture().await;
        let document = upload(&f, "QmMulti").await;
        let mut reviewer = User::new("Rita".into(), "rita@example.com".into(), "h".into(), None);
        reviewer.is_admin = true;
        let reviewer = f.users.insert(reviewer).await.unwrap();
        let ghost = Uuid::new_v4();

        f.documents
            .enable_multisig(
                document.id,
                2,
                MultiSigPayment {
                    tx_hash: "0xpay".into(),
                    from: "0xfrom".into(),
                    amount: "0.02".into(),
                },
            )
            .await
            .unwrap();
        for admin_id in [reviewer.id, ghost] {
            f.documents
                .append_signature(
                    document.id,
                    AdminSignature {
                        admin_id,
                        signed_at: Utc::now(),
                        signature: None,
                        tx_hash: None,
                    },
                )
                .await
                .unwrap();
        }

        let created = f
            .service
            .create(&f.owner, request(vec![document.id], true, true))
            .await
            .unwrap();
        let resolved = f.service.resolve(&created.code).await.unwrap();
        let json = serde_json::to_value(&resolved.documents[0]).unwrap();

        assert_eq!(json["verificationType"], "multi-signature");
        assert_eq!(json["verifiedBy"], serde_json::json!(["Rita", "Admin"]));
        assert_eq!(json["requiredSignatures"], 2);
        assert_eq!(json["currentSignatures"], 2);
        assert_eq!(json["isMultiSigComplete"], true);
        assert_eq!(json["ipfsHash"], "QmMulti");
    }

    #[tokio::test]
    async fn test_single_admin_details() {
        let f = fixture().await;
        let document = upload(&f, "QmSingle").await;
        f.documents
            .mark_verified(document.id, Uuid::new_v4(), None, None, Utc::now())
            .await
            .unwrap();

        let created = f
            .service
            .create(&f.owner, request(vec![document.id], true, false))
            .await
            .unwrap();
        let resolved = f.service.resolve(&created.code).await.unwrap();
        let json = serde_json::to_value(&resolved.documents[0]).unwrap();

        assert_eq!(json["verificationType"], "single-admin");
        assert_eq!(json["verifiedBy"], serde_json::json!(["Admin"]));
        assert!(json.get("requiredSignatures").is_none());
        // Shared without document access, so no preview link.
        assert!(resolved.documents[0].preview_url.is_none());
        assert!(json.get("previewUrl").is_none());
    }
}
