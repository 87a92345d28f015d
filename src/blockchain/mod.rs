// src/blockchain/mod.rs
//! Blockchain adapter for document anchoring and multi-signature bookkeeping.
//!
//! The rest of the service talks to the chain only through [`DocumentLedger`],
//! which returns typed records instead of raw contract tuples. [`EthClient`] is
//! the `ethers` implementation; it is constructed only when RPC URL, contract
//! address and signer key are all configured.

pub mod eth_client;
#[cfg(test)]
pub mod mock_ledger;

use async_trait::async_trait;
use ethers::types::U256;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use eth_client::EthClient;

/// Errors raised by the chain adapter.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("Invalid signer key: {0}")]
    InvalidKey(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract call {method} failed: {reason}")]
    Contract { method: &'static str, reason: String },

    #[error("Transaction {0} not found or not confirmed")]
    TxNotFound(String),

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Blockchain call timed out after {0}s")]
    Timeout(u64),
}

/// Receipt of a write call that was mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// Result of `addAdminSignature`: the signature the service key produced and
/// the transaction that recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureReceipt {
    pub signature: String,
    pub tx_hash: String,
}

/// One entry of `getAdminSignatures`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainSignature {
    pub admin: String,
    /// Block timestamp, seconds since epoch
    pub signed_at: u64,
}

/// Outcome of checking a multisig fee payment on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCheck {
    pub verified: bool,
    pub from: String,
    pub to: Option<String>,
    /// Amount transferred, in ether
    pub actual_amount: String,
    pub reason: Option<String>,
}

/// Chain-side view of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatus {
    pub is_verified: bool,
    pub is_multi_sig_complete: bool,
    pub signatures: Vec<OnChainSignature>,
}

/// Fixed set of contract interactions the service relies on.
///
/// Document ids are mapped to `bytes32` with keccak-256 of their string form.
#[async_trait]
pub trait DocumentLedger: Send + Sync {
    /// Anchors an uploaded document under the owner's DID.
    async fn add_document(
        &self,
        did: &str,
        ipfs_hash: &str,
        document_id: Uuid,
    ) -> Result<AnchorReceipt, ChainError>;

    /// Marks a document verified on chain (single-admin path).
    async fn verify_document(&self, document_id: Uuid) -> Result<AnchorReceipt, ChainError>;

    async fn is_document_verified(&self, document_id: Uuid) -> Result<bool, ChainError>;

    /// Signs `(document, admin)` with the service key and records it on chain.
    async fn add_admin_signature(
        &self,
        document_id: Uuid,
        admin_id: Uuid,
    ) -> Result<SignatureReceipt, ChainError>;

    async fn get_admin_signatures(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<OnChainSignature>, ChainError>;

    async fn is_multi_sig_complete(&self, document_id: Uuid) -> Result<bool, ChainError>;

    /// Wallet balance in wei.
    async fn balance_of(&self, address: &str) -> Result<U256, ChainError>;

    /// Checks that `tx_hash` is a successful transfer of at least 99% of
    /// `expected_wei` sent by `expected_from` (and to `expected_to`, if given).
    async fn verify_payment(
        &self,
        tx_hash: &str,
        expected_from: &str,
        expected_to: Option<&str>,
        expected_wei: U256,
    ) -> Result<PaymentCheck, ChainError>;

    /// Reads the three view functions for one document concurrently.
    async fn chain_status(&self, document_id: Uuid) -> Result<ChainStatus, ChainError> {
        let (is_verified, is_multi_sig_complete, signatures) = futures::try_join!(
            self.is_document_verified(document_id),
            self.is_multi_sig_complete(document_id),
            self.get_admin_signatures(document_id),
        )?;
        Ok(ChainStatus {
            is_verified,
            is_multi_sig_complete,
            signatures,
        })
    }
}
