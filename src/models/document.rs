// src/models/document.rs
//! Identity document record and its verification state machine.
//!
//! A document starts unverified. It reaches the verified state through exactly
//! one of two paths:
//! - **single-admin**: one admin approves it directly
//! - **multi-signature**: the owner pays to enable N-of-M approval, then N
//!   distinct admins sign; the signature that satisfies the count flips
//!   `is_verified` and `is_multi_sig_complete` in the same transition
//!
//! The transition methods below only mutate `self`; callers are expected to run
//! them inside the document store's critical section so the check and the write
//! happen atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Smallest signer count accepted when enabling multi-signature verification.
pub const MIN_MULTISIG_SIGNATURES: u8 = 2;
/// Largest signer count any document may require.
pub const MAX_REQUIRED_SIGNATURES: u8 = 5;

/// Rejected state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Document is already verified")]
    AlreadyVerified,

    #[error("Multi-signature verification is already enabled for this document")]
    MultiSigAlreadyEnabled,

    #[error("Multi-signature verification is not enabled for this document")]
    MultiSigNotEnabled,

    #[error("Document requires multi-signature verification")]
    RequiresMultiSig,

    #[error("Admin has already signed this document")]
    DuplicateSigner,

    #[error("Document was rejected and must be resubmitted before signing")]
    Rejected,

    #[error("Required signatures must be between {min} and {max}, got {got}")]
    InvalidSignatureCount { got: u8, min: u8, max: u8 },
}

/// One admin approval on a multi-signature document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminSignature {
    pub admin_id: Uuid,
    pub signed_at: DateTime<Utc>,
    /// Optional detached signature supplied by the admin's wallet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Hash of the `addAdminSignature` transaction, when anchored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Payment metadata captured when the owner enables multi-signature verification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiSigPayment {
    pub tx_hash: String,
    pub from: String,
    /// Amount in ETH, as a decimal string
    pub amount: String,
}

/// A KYC document owned by a user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_type: String,
    /// Content identifier returned by the storage adapter
    pub ipfs_hash: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,

    pub submitted_for_verification: bool,
    pub submission_date: Option<DateTime<Utc>>,

    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub verification_tx_hash: Option<String>,
    /// Hash of the `addDocument` anchoring transaction
    pub blockchain_tx_hash: Option<String>,

    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub review_feedback: Option<String>,

    pub requires_multi_sig: bool,
    pub required_signatures: u8,
    pub admin_signatures: Vec<AdminSignature>,
    pub is_multi_sig_complete: bool,

    pub multi_sig_payment_tx: Option<String>,
    pub multi_sig_payment_from: Option<String>,
    pub multi_sig_payment_amount: Option<String>,
}

impl Document {
    /// Creates a freshly uploaded, unverified document.
    pub fn new(
        user_id: Uuid,
        document_type: String,
        ipfs_hash: String,
        file_name: String,
        file_size: u64,
        mime_type: String,
    ) -> Self {
        Document {
            id: Uuid::new_v4(),
            user_id,
            document_type,
            ipfs_hash,
            file_name,
            file_size,
            mime_type,
            uploaded_at: Utc::now(),
            submitted_for_verification: false,
            submission_date: None,
            is_verified: false,
            verified_at: None,
            verified_by: None,
            verification_tx_hash: None,
            blockchain_tx_hash: None,
            rejected_at: None,
            rejected_by: None,
            review_feedback: None,
            requires_multi_sig: false,
            required_signatures: 1,
            admin_signatures: Vec::new(),
            is_multi_sig_complete: false,
            multi_sig_payment_tx: None,
            multi_sig_payment_from: None,
            multi_sig_payment_amount: None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected_at.is_some()
    }

    /// Submitted, not yet verified and not rejected.
    pub fn is_pending_review(&self) -> bool {
        self.submitted_for_verification && !self.is_verified && !self.is_rejected()
    }

    pub fn has_signed(&self, admin_id: Uuid) -> bool {
        self.admin_signatures.iter().any(|s| s.admin_id == admin_id)
    }

    pub fn signatures_satisfied(&self) -> bool {
        self.admin_signatures.len() >= self.required_signatures as usize
    }

    /// Marks the document as submitted for review, clearing any earlier rejection.
    /// Verified documents keep their review record untouched.
    pub fn submit(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.is_verified {
            return Err(TransitionError::AlreadyVerified);
        }
        self.submitted_for_verification = true;
        self.submission_date = Some(at);
        self.rejected_at = None;
        self.rejected_by = None;
        self.review_feedback = None;
        Ok(())
    }

    /// Checks that the single-admin path may verify this document.
    pub fn check_can_verify(&self) -> Result<(), TransitionError> {
        if self.is_verified {
            return Err(TransitionError::AlreadyVerified);
        }
        if self.requires_multi_sig {
            return Err(TransitionError::RequiresMultiSig);
        }
        Ok(())
    }

    /// Single-admin approval.
    pub fn verify(
        &mut self,
        admin_id: Uuid,
        tx_hash: Option<String>,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.check_can_verify()?;
        self.is_verified = true;
        self.verified_at = Some(at);
        self.verified_by = Some(admin_id);
        self.verification_tx_hash = tx_hash;
        self.review_feedback = feedback;
        self.rejected_at = None;
        self.rejected_by = None;
        Ok(())
    }

    /// Single-admin rejection. The owner may resubmit afterwards.
    pub fn reject(
        &mut self,
        admin_id: Uuid,
        feedback: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.is_verified {
            return Err(TransitionError::AlreadyVerified);
        }
        self.rejected_at = Some(at);
        self.rejected_by = Some(admin_id);
        self.review_feedback = feedback;
        self.submitted_for_verification = false;
        Ok(())
    }

    /// Switches the document to N-of-M approval. One way: nothing turns it back off.
    pub fn enable_multisig(
        &mut self,
        required_signatures: u8,
        payment: MultiSigPayment,
    ) -> Result<(), TransitionError> {
        if self.is_verified {
            return Err(TransitionError::AlreadyVerified);
        }
        if self.requires_multi_sig {
            return Err(TransitionError::MultiSigAlreadyEnabled);
        }
        if !(MIN_MULTISIG_SIGNATURES..=MAX_REQUIRED_SIGNATURES).contains(&required_signatures) {
            return Err(TransitionError::InvalidSignatureCount {
                got: required_signatures,
                min: MIN_MULTISIG_SIGNATURES,
                max: MAX_REQUIRED_SIGNATURES,
            });
        }

        self.requires_multi_sig = true;
        self.required_signatures = required_signatures;
        self.admin_signatures.clear();
        self.is_multi_sig_complete = false;
        self.multi_sig_payment_tx = Some(payment.tx_hash);
        self.multi_sig_payment_from = Some(payment.from);
        self.multi_sig_payment_amount = Some(payment.amount);
        Ok(())
    }

    /// Checks that `admin_id` may add a signature right now.
    pub fn check_can_sign(&self, admin_id: Uuid) -> Result<(), TransitionError> {
        if !self.requires_multi_sig {
            return Err(TransitionError::MultiSigNotEnabled);
        }
        if self.is_verified {
            return Err(TransitionError::AlreadyVerified);
        }
        if self.is_rejected() {
            return Err(TransitionError::Rejected);
        }
        if self.has_signed(admin_id) {
            return Err(TransitionError::DuplicateSigner);
        }
        Ok(())
    }

    /// Appends a signature and, if the count is now satisfied, completes verification.
    ///
    /// # Returns
    /// `true` when this signature completed the document.
    pub fn apply_signature(&mut self, signature: AdminSignature) -> Result<bool, TransitionError> {
        self.check_can_sign(signature.admin_id)?;

        let signer = signature.admin_id;
        let signed_at = signature.signed_at;
        self.admin_signatures.push(signature);

        if self.signatures_satisfied() {
            self.is_multi_sig_complete = true;
            self.is_verified = true;
            self.verified_at = Some(signed_at);
            self.verified_by = Some(signer);
            return Ok(true);
        }
        Ok(false)
    }
}
