// src/services/multisig.rs
//! Multi-signature verification workflow.
//!
//! The owner enables N-of-M approval (2..=5) after paying a fee from their
//! wallet; admins then sign one at a time. The check-and-append for each
//! signature happens inside the document store's critical section, so the
//! signature that satisfies the count is the one that flips the document to
//! verified, exactly once.
//!
//! # Payment Trust
//! By default the payment hash supplied by the client is recorded without
//! looking it up on chain and a warning is logged. Setting
//! `verify_payment_on_chain` makes enabling wait for an on-chain check of the
//! receipt status, amount (within 1%) and sender.

use chrono::Utc;
use ethers::types::U256;
use ethers::utils::{format_ether, parse_ether, ConversionError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::blockchain::DocumentLedger;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::document::{AdminSignature, Document, MultiSigPayment};
use crate::models::user::User;
use crate::storage::document_store::DocumentStore;
use crate::storage::user_store::UserStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableMultiSigRequest {
    pub document_id: Uuid,
    pub required_signatures: u8,
    pub payment_tx_hash: String,
    #[serde(default)]
    pub user_wallet_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignRequest {
    /// Detached signature from the admin's own wallet, if any
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerView {
    pub admin_id: Uuid,
    pub admin_name: String,
    pub signed_at: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSigStatus {
    pub document_id: Uuid,
    pub requires_multi_sig: bool,
    pub required_signatures: u8,
    pub current_signatures: usize,
    pub is_multi_sig_complete: bool,
    pub is_verified: bool,
    pub signatures: Vec<SignerView>,
}

pub struct MultiSigService {
    documents: Arc<dyn DocumentStore>,
    users: Arc<dyn UserStore>,
    ledger: Option<Arc<dyn DocumentLedger>>,
    fee_eth: String,
    fee_wei: U256,
    gas_estimate_wei: U256,
    payment_receiver: Option<String>,
    verify_payment_on_chain: bool,
}

impl MultiSigService {
    /// # Errors
    /// Returns `ConversionError` if the configured fee or gas estimate is not a
    /// valid ether amount.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        users: Arc<dyn UserStore>,
        ledger: Option<Arc<dyn DocumentLedger>>,
        config: &AppConfig,
    ) -> Result<Self, ConversionError> {
        Ok(MultiSigService {
            documents,
            users,
            ledger,
            fee_wei: parse_ether(&config.multisig_fee_eth)?,
            gas_estimate_wei: parse_ether(&config.gas_estimate_eth)?,
            fee_eth: config.multisig_fee_eth.clone(),
            payment_receiver: config.payment_receiver.clone(),
            verify_payment_on_chain: config.verify_payment_on_chain,
        })
    }

    /// Switches one of the owner's documents to multi-signature verification.
    ///
    /// # Errors
    /// - `NotFound` if the document does not exist or belongs to someone else
    /// - `Conflict` if it is verified or multisig is already enabled
    /// - `BadRequest` for a count outside 2..=5, a missing payment hash, a
    ///   missing blockchain identity, insufficient balance or a failed
    ///   on-chain payment check
    pub async fn enable(&self, owner: &User, request: EnableMultiSigRequest) -> Result<Document, ApiError> {
        let document = self
            .documents
            .get(request.document_id)
            .await
            .filter(|d| d.user_id == owner.id)
            .ok_or_else(|| ApiError::not_found("Document not found"))?;

        let payment_tx = request.payment_tx_hash.trim().to_string();
        if payment_tx.is_empty() {
            return Err(ApiError::bad_request("Payment transaction hash is required"));
        }

        let identity = self.users.get_identity(owner.id).await.ok_or_else(|| {
            ApiError::bad_request(
                "A blockchain identity is required to enable multi-signature verification",
            )
        })?;
        let payer = request
            .user_wallet_address
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| identity.address.clone());
        let payment = MultiSigPayment {
            tx_hash: payment_tx.clone(),
            from: payer.clone(),
            amount: self.fee_eth.clone(),
        };

        // Dry run so state and range errors surface before any chain call.
        document
            .clone()
            .enable_multisig(request.required_signatures, payment.clone())?;

        if let Some(ledger) = &self.ledger {
            let wallet = identity.wallet_address().ok_or_else(|| {
                ApiError::Internal("Stored wallet key for this identity is unreadable".into())
            })?;
            let balance = ledger.balance_of(&wallet).await?;
            let required = self.fee_wei.saturating_add(self.gas_estimate_wei);
            if balance < required {
                return Err(ApiError::bad_request(format!(
                    "Insufficient balance: {} ETH available, {} ETH required",
                    format_ether(balance),
                    format_ether(required)
                )));
            }
        }

        if self.verify_payment_on_chain {
            let ledger = self.ledger.as_ref().ok_or_else(|| {
                ApiError::Unavailable("Blockchain integration is not configured".into())
            })?;
            let check = ledger
                .verify_payment(&payment_tx, &payer, self.payment_receiver.as_deref(), self.fee_wei)
                .await?;
            if !check.verified {
                return Err(ApiError::bad_request(format!(
                    "Payment verification failed: {}",
                    check.reason.unwrap_or_else(|| "payment does not match".into())
                )));
            }
        } else {
            warn!(
                "Trusting unverified payment {} from {} for document {}",
                payment_tx, payer, document.id
            );
        }

        let document = self
            .documents
            .enable_multisig(document.id, request.required_signatures, payment)
            .await?;
        info!(
            "Multi-signature enabled on document {} ({} signatures required)",
            document.id, document.required_signatures
        );
        Ok(document)
    }

    /// Adds `admin`'s signature to a multisig document.
    ///
    /// When a chain client is configured, `addAdminSignature` is sent first and
    /// its transaction hash recorded on the entry.
    ///
    /// # Returns
    /// The updated document and whether this signature completed verification.
    pub async fn add_signature(
        &self,
        admin: &User,
        document_id: Uuid,
        request: SignRequest,
    ) -> Result<(Document, bool), ApiError> {
        let document = self
            .documents
            .get(document_id)
            .await
            .ok_or_else(|| ApiError::not_found("Document not found"))?;
        document.check_can_sign(admin.id)?;

        let (signature, tx_hash) = match &self.ledger {
            Some(ledger) => {
                let receipt = ledger.add_admin_signature(document_id, admin.id).await?;
                (request.signature.or(Some(receipt.signature)), Some(receipt.tx_hash))
            }
            None => (request.signature, None),
        };

        let mined_tx = tx_hash.clone();
        let (document, completed) = match self
            .documents
            .append_signature(
                document_id,
                AdminSignature {
                    admin_id: admin.id,
                    signed_at: Utc::now(),
                    signature,
                    tx_hash,
                },
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                if let Some(tx) = mined_tx {
                    warn!(
                        "addAdminSignature tx {} for document {} by admin {} was mined but not recorded: {}",
                        tx, document_id, admin.id, e
                    );
                }
                return Err(e.into());
            }
        };

        info!(
            "Admin {} signed document {} ({}/{})",
            admin.id,
            document_id,
            document.admin_signatures.len(),
            document.required_signatures
        );
        if completed {
            info!("Document {} completed multi-signature verification", document_id);
        }
        Ok((document, completed))
    }

    /// Signature progress for the owner or any admin.
    pub async fn status(&self, user: &User, document_id: Uuid) -> Result<MultiSigStatus, ApiError> {
        let document = self
            .documents
            .get(document_id)
            .await
            .filter(|d| d.user_id == user.id || user.is_admin)
            .ok_or_else(|| ApiError::not_found("Document not found"))?;

        let signer_ids: Vec<Uuid> = document.admin_signatures.iter().map(|s| s.admin_id).collect();
        let names = self.users.names(&signer_ids).await;

        let signatures = document
            .admin_signatures
            .iter()
            .map(|s| SignerView {
                admin_id: s.admin_id,
                admin_name: names
                    .get(&s.admin_id)
                    .cloned()
                    .unwrap_or_else(|| "Admin".to_string()),
                signed_at: s.signed_at,
                tx_hash: s.tx_hash.clone(),
            })
            .collect();

        Ok(MultiSigStatus {
            document_id: document.id,
            requires_multi_sig: document.requires_multi_sig,
            required_signatures: document.required_signatures,
            current_signatures: document.admin_signatures.len(),
            is_multi_sig_complete: document.is_multi_sig_complete,
            is_verified: document.is_verified,
            signatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock_ledger::MockLedger;
    use crate::models::identity::BlockchainIdentity;
    use crate::storage::document_store::InMemoryDocumentStore;
    use crate::storage::user_store::InMemoryUserStore;
    use crate::storage::StoreError;

    const WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    struct Fixture {
        service: Arc<MultiSigService>,
        documents: Arc<InMemoryDocumentStore>,
        users: Arc<InMemoryUserStore>,
        owner: User,
        document: Document,
    }

    async fn fixture(ledger: Option<MockLedger>, config: AppConfig) -> Fixture {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let owner = users
            .insert(User::new("Owner".into(), "owner@example.com".into(), "h".into(), None))
            .await
            .unwrap();
        users
            .insert_identity(BlockchainIdentity::new(owner.id, WALLET.into(), "11".repeat(32)))
            .await
            .unwrap();
        let document = documents
            .insert(Document::new(
                owner.id,
                "passport".into(),
                "QmPassport".into(),
                "passport.pdf".into(),
                10,
                "application/pdf".into(),
            ))
            .await
            .unwrap();

        let ledger = ledger.map(|l| Arc::new(l) as Arc<dyn DocumentLedger>);
        let service =
            MultiSigService::new(documents.clone(), users.clone(), ledger, &config).unwrap();
        Fixture {
            service: Arc::new(service),
            documents,
            users,
            owner,
            document,
        }
    }

    async fn admin(users: &InMemoryUserStore, name: &str) -> User {
        let mut admin = User::new(name.into(), format!("{}@example.com", name), "h".into(), None);
        admin.is_admin = true;
        users.insert(admin).await.unwrap()
    }

    fn enable_request(document_id: Uuid, required: u8) -> EnableMultiSigRequest {
        EnableMultiSigRequest {
            document_id,
            required_signatures: required,
            payment_tx_hash: "0xabc123".into(),
            user_wallet_address: Some(WALLET.into()),
        }
    }

    #[tokio::test]
    async fn test_enable_records_payment() {
        let f = fixture(Some(MockLedger::new()), AppConfig::default()).await;
        let document = f
            .service
            .enable(&f.owner, enable_request(f.document.id, 3))
            .await
            .unwrap();

        assert!(document.requires_multi_sig);
        assert_eq!(document.required_signatures, 3);
        assert_eq!(document.multi_sig_payment_tx.as_deref(), Some("0xabc123"));
        assert_eq!(document.multi_sig_payment_amount.as_deref(), Some("0.02"));

        assert!(matches!(
            f.service.enable(&f.owner, enable_request(f.document.id, 3)).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_enable_rejected_for_verified_document() {
        let f = fixture(None, AppConfig::default()).await;
        f.documents
            .mark_verified(f.document.id, Uuid::new_v4(), None, None, Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            f.service.enable(&f.owner, enable_request(f.document.id, 2)).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_enable_validates_count_and_owner() {
        let f = fixture(None, AppConfig::default()).await;
        assert!(matches!(
            f.service.enable(&f.owner, enable_request(f.document.id, 1)).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            f.service.enable(&f.owner, enable_request(f.document.id, 6)).await,
            Err(ApiError::BadRequest(_))
        ));

        let stranger = User::new("Eve".into(), "eve@example.com".into(), "h".into(), None);
        assert!(matches!(
            f.service.enable(&stranger, enable_request(f.document.id, 2)).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_enable_requires_balance() {
        let poor = MockLedger::new().with_balance(parse_ether("0.0205").unwrap());
        let f = fixture(Some(poor), AppConfig::default()).await;
        let result = f.service.enable(&f.owner, enable_request(f.document.id, 2)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(msg)) if msg.starts_with("Insufficient balance")));
        assert!(!f.documents.get(f.document.id).await.unwrap().requires_multi_sig);
    }

    #[tokio::test]
    async fn test_on_chain_payment_check_is_opt_in() {
        let unpaid = MockLedger::new().with_unverified_payments();
        let config = AppConfig {
            verify_payment_on_chain: true,
            ..AppConfig::default()
        };
        let f = fixture(Some(unpaid), config).await;
        let result = f.service.enable(&f.owner, enable_request(f.document.id, 2)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(msg)) if msg.starts_with("Payment verification failed")));

        let unpaid = MockLedger::new().with_unverified_payments();
        let trusting = fixture(Some(unpaid), AppConfig::default()).await;
        assert!(trusting
            .service
            .enable(&trusting.owner, enable_request(trusting.document.id, 2))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_second_distinct_signature_completes() {
        let f = fixture(Some(MockLedger::new()), AppConfig::default()).await;
        f.service
            .enable(&f.owner, enable_request(f.document.id, 2))
            .await
            .unwrap();
        let first = admin(&f.users, "alice").await;
        let second = admin(&f.users, "bob").await;

        let (document, completed) = f
            .service
            .add_signature(&first, f.document.id, SignRequest::default())
            .await
            .unwrap();
        assert!(!completed);
        assert!(!document.is_verified);
        assert!(document.admin_signatures[0].tx_hash.is_some());

        assert!(matches!(
            f.service
                .add_signature(&first, f.document.id, SignRequest::default())
                .await,
            Err(ApiError::Conflict(_))
        ));

        let (document, completed) = f
            .service
            .add_signature(&second, f.document.id, SignRequest::default())
            .await
            .unwrap();
        assert!(completed);
        assert!(document.is_verified);
        assert!(document.is_multi_sig_complete);
        assert_eq!(document.verified_by, Some(second.id));

        let status = f.service.status(&f.owner, f.document.id).await.unwrap();
        assert_eq!(status.current_signatures, 2);
        let names: Vec<&str> = status.signatures.iter().map(|s| s.admin_name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_concurrent_admins_on_two_of_n() {
        let f = fixture(None, AppConfig::default()).await;
        f.service
            .enable(&f.owner, enable_request(f.document.id, 2))
            .await
            .unwrap();
        let first = admin(&f.users, "alice").await;
        let second = admin(&f.users, "bob").await;

        let (a, b) = tokio::join!(
            {
                let service = f.service.clone();
                let id = f.document.id;
                tokio::spawn(async move { service.add_signature(&first, id, SignRequest::default()).await })
            },
            {
                let service = f.service.clone();
                let id = f.document.id;
                tokio::spawn(async move { service.add_signature(&second, id, SignRequest::default()).await })
            }
        );
        let (_, a_completed) = a.unwrap().unwrap();
        let (_, b_completed) = b.unwrap().unwrap();
        assert!(a_completed ^ b_completed);

        let stored = f.documents.get(f.document.id).await.unwrap();
        assert_eq!(stored.admin_signatures.len(), 2);
        assert!(stored.is_verified);
        assert!(stored.is_multi_sig_complete);
    }

    /// Serves one fixed snapshot from `get` so a signature can land between
    /// the pre-check and the append.
    struct SnapshotStore {
        inner: Arc<InMemoryDocumentStore>,
        snapshot: Document,
    }

    #[async_trait::async_trait]
    impl DocumentStore for SnapshotStore {
        async fn insert(&self, document: Document) -> Result<Document, StoreError> {
            self.inner.insert(document).await
        }
        async fn get(&self, _id: Uuid) -> Option<Document> {
            Some(self.snapshot.clone())
        }
        async fn find_by_ipfs_hash(&self, ipfs_hash: &str) -> Option<Document> {
            self.inner.find_by_ipfs_hash(ipfs_hash).await
        }
        async fn get_many(&self, ids: &[Uuid]) -> Vec<Document> {
            self.inner.get_many(ids).await
        }
        async fn list_by_owner(&self, user_id: Uuid) -> Vec<Document> {
            self.inner.list_by_owner(user_id).await
        }
        async fn list_pending(&self) -> Vec<Document> {
            self.inner.list_pending().await
        }
        async fn set_blockchain_tx(&self, id: Uuid, tx_hash: String) -> Result<Document, StoreError> {
            self.inner.set_blockchain_tx(id, tx_hash).await
        }
        async fn submit_for_verification(
            &self,
            owner: Uuid,
            ids: &[Uuid],
            at: chrono::DateTime<Utc>,
        ) -> usize {
            self.inner.submit_for_verification(owner, ids, at).await
        }
        async fn mark_verified(
            &self,
            id: Uuid,
            admin_id: Uuid,
            tx_hash: Option<String>,
            feedback: Option<String>,
            at: chrono::DateTime<Utc>,
        ) -> Result<Document, StoreError> {
            self.inner.mark_verified(id, admin_id, tx_hash, feedback, at).await
        }
        async fn reject(
            &self,
            id: Uuid,
            admin_id: Uuid,
            feedback: Option<String>,
            at: chrono::DateTime<Utc>,
        ) -> Result<Document, StoreError> {
            self.inner.reject(id, admin_id, feedback, at).await
        }
        async fn enable_multisig(
            &self,
            id: Uuid,
            required_signatures: u8,
            payment: MultiSigPayment,
        ) -> Result<Document, StoreError> {
            self.inner.enable_multisig(id, required_signatures, payment).await
        }
        async fn append_signature(
            &self,
            id: Uuid,
            signature: AdminSignature,
        ) -> Result<(Document, bool), StoreError> {
            self.inner.append_signature(id, signature).await
        }
    }

    #[tokio::test]
    async fn test_signature_refused_after_chain_write_is_reported() {
        let f = fixture(None, AppConfig::default()).await;
        f.service
            .enable(&f.owner, enable_request(f.document.id, 2))
            .await
            .unwrap();
        let signer = admin(&f.users, "alice").await;
        let snapshot = f.documents.get(f.document.id).await.unwrap();

        // The same admin's signature lands after the snapshot was taken.
        f.documents
            .append_signature(
                f.document.id,
                AdminSignature {
                    admin_id: signer.id,
                    signed_at: Utc::now(),
                    signature: None,
                    tx_hash: None,
                },
            )
            .await
            .unwrap();

        let ledger = Arc::new(MockLedger::new());
        let stale = Arc::new(SnapshotStore {
            inner: f.documents.clone(),
            snapshot,
        });
        let service = MultiSigService::new(
            stale,
            f.users.clone(),
            Some(ledger.clone() as Arc<dyn DocumentLedger>),
            &AppConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            service
                .add_signature(&signer, f.document.id, SignRequest::default())
                .await,
            Err(ApiError::Conflict(_))
        ));
        // The chain write went through while the record kept a single entry.
        assert_eq!(
            ledger.get_admin_signatures(f.document.id).await.unwrap().len(),
            1
        );
        let stored = f.documents.get(f.document.id).await.unwrap();
        assert_eq!(stored.admin_signatures.len(), 1);
        assert!(stored.admin_signatures[0].tx_hash.is_none());
        assert!(!stored.is_verified);
    }

    #[tokio::test]
    async fn test_sign_requires_multisig() {
        let f = fixture(None, AppConfig::default()).await;
        let signer = admin(&f.users, "alice").await;
        assert!(matches!(
            f.service
                .add_signature(&signer, f.document.id, SignRequest::default())
                .await,
            Err(ApiError::Conflict(_))
        ));
    }
}
