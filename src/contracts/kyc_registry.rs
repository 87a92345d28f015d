// src/contracts/kyc_registry.rs
//! KYC registry smart contract interface implementation.
//!
//! Binds the registry's human-readable ABI to an `ethers` contract handle and
//! exposes one method per contract function. Write calls are sent and awaited
//! to a receipt; reverted transactions surface as [`ChainError::Reverted`].

use ethers::providers::Middleware;
use ethers_contract::Contract;
use ethers_core::abi::{parse_abi, Abi, Detokenize, Tokenize};
use ethers_core::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use std::sync::Arc;
use uuid::Uuid;

use crate::blockchain::ChainError;
use crate::utils::crypto::hash_data;

/// Registry functions used by the service.
pub const KYC_REGISTRY_ABI: [&str; 6] = [
    "function addDocument(string did, string ipfsHash, bytes32 documentId) external returns (bool)",
    "function verifyDocument(bytes32 documentId) external returns (bool)",
    "function isDocumentVerified(bytes32 documentId) external view returns (bool)",
    "function addAdminSignature(bytes32 documentId, bytes signature) external returns (bool)",
    "function getAdminSignatures(bytes32 documentId) external view returns (address[], uint256[])",
    "function isMultiSigComplete(bytes32 documentId) external view returns (bool)",
];

/// Parses [`KYC_REGISTRY_ABI`].
pub fn kyc_registry_abi() -> Result<Abi, ChainError> {
    parse_abi(&KYC_REGISTRY_ABI).map_err(|e| ChainError::Contract {
        method: "abi",
        reason: e.to_string(),
    })
}

/// Maps a document id onto the contract's `bytes32` key.
pub fn document_key(document_id: &Uuid) -> H256 {
    H256::from(hash_data(document_id.to_string().as_bytes()))
}

/// KYC registry contract handle.
///
/// # Type Parameters
/// * `M` - Middleware used to sign and send transactions
pub struct KycRegistry<M> {
    contract: Contract<M>,
}

impl<M> KycRegistry<M>
where
    M: Middleware + 'static,
{
    /// Creates a handle for the registry deployed at `address`.
    pub fn new(address: Address, client: Arc<M>) -> Result<Self, ChainError> {
        let abi = kyc_registry_abi()?;
        Ok(KycRegistry {
            contract: Contract::new(address, abi, client),
        })
    }

    pub async fn add_document(
        &self,
        did: &str,
        ipfs_hash: &str,
        document_id: &Uuid,
    ) -> Result<TransactionReceipt, ChainError> {
        self.send(
            "addDocument",
            (did.to_string(), ipfs_hash.to_string(), document_key(document_id)),
        )
        .await
    }

    pub async fn verify_document(&self, document_id: &Uuid) -> Result<TransactionReceipt, ChainError> {
        self.send("verifyDocument", document_key(document_id)).await
    }

    pub async fn is_document_verified(&self, document_id: &Uuid) -> Result<bool, ChainError> {
        self.call("isDocumentVerified", document_key(document_id)).await
    }

    pub async fn add_admin_signature(
        &self,
        document_id: &Uuid,
        signature: Bytes,
    ) -> Result<TransactionReceipt, ChainError> {
        self.send("addAdminSignature", (document_key(document_id), signature))
            .await
    }

    /// Returns signer addresses and their block timestamps.
    pub async fn get_admin_signatures(
        &self,
        document_id: &Uuid,
    ) -> Result<(Vec<Address>, Vec<U256>), ChainError> {
        self.call("getAdminSignatures", document_key(document_id)).await
    }

    pub async fn is_multi_sig_complete(&self, document_id: &Uuid) -> Result<bool, ChainError> {
        self.call("isMultiSigComplete", document_key(document_id)).await
    }

    async fn send<T>(&self, method: &'static str, args: T) -> Result<TransactionReceipt, ChainError>
    where
        T: Tokenize + Send,
    {
        let call = self
            .contract
            .method::<_, bool>(method, args)
            .map_err(|e| ChainError::Contract {
                method,
                reason: e.to_string(),
            })?;
        let pending = call.send().await.map_err(|e| ChainError::Contract {
            method,
            reason: e.to_string(),
        })?;
        let tx_hash = format!("{:#x}", pending.tx_hash());

        let receipt = pending
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .ok_or_else(|| ChainError::TxNotFound(tx_hash.clone()))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(ChainError::Reverted(tx_hash));
        }
        Ok(receipt)
    }

    async fn call<T, R>(&self, method: &'static str, args: T) -> Result<R, ChainError>
    where
        T: Tokenize + Send,
        R: Detokenize + Send,
    {
        self.contract
            .method::<_, R>(method, args)
            .map_err(|e| ChainError::Contract {
                method,
                reason: e.to_string(),
            })?
            .call()
            .await
            .map_err(|e| ChainError::Contract {
                method,
                reason: e.to_string(),
            })
    }
}
