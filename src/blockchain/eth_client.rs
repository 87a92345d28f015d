// src/blockchain/eth_client.rs
//! Ethereum client implementation of [`DocumentLedger`].
//!
//! Wraps an `ethers` HTTP provider with a local signing wallet and the KYC
//! registry contract binding. Every network round trip is bounded by the
//! configured chain timeout.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use ethers::utils::{format_ether, hex};
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{
    AnchorReceipt, ChainError, DocumentLedger, OnChainSignature, PaymentCheck, SignatureReceipt,
};
use crate::config::ChainSettings;
use crate::contracts::kyc_registry::KycRegistry;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Ethereum client for the KYC registry.
///
/// This client provides:
/// - Wallet management with the service's private key
/// - Contract writes awaited to a receipt
/// - Read-only contract queries
/// - Balance and payment transaction reads
#[derive(Clone)]
pub struct EthClient {
    client: Arc<SignerClient>,
    registry: Arc<KycRegistry<SignerClient>>,
    timeout: Duration,
}

impl EthClient {
    /// Connects to the RPC endpoint and binds the registry contract.
    ///
    /// # Arguments
    /// * `settings` - RPC URL, contract address, signer key and timeout
    ///
    /// # Errors
    /// Returns error if:
    /// - RPC URL is malformed or the chain id cannot be retrieved
    /// - Private key is invalid
    /// - Contract address is invalid
    pub async fn connect(settings: &ChainSettings) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let chain_id = tokio::time::timeout(settings.timeout, provider.get_chainid())
            .await
            .map_err(|_| ChainError::Timeout(settings.timeout.as_secs()))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .as_u64();

        let wallet = settings
            .private_key
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?
            .with_chain_id(chain_id);
        let contract_address = parse_address(&settings.contract_address)?;

        info!(
            "Connected to chain {} as {:#x}, registry at {:#x}",
            chain_id,
            wallet.address(),
            contract_address
        );

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let registry = Arc::new(KycRegistry::new(contract_address, client.clone())?);

        Ok(EthClient {
            client,
            registry,
            timeout: settings.timeout,
        })
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout(self.timeout.as_secs()))?
    }
}

#[async_trait]
impl DocumentLedger for EthClient {
    async fn add_document(
        &self,
        did: &str,
        ipfs_hash: &str,
        document_id: Uuid,
    ) -> Result<AnchorReceipt, ChainError> {
        let receipt = self
            .bounded(self.registry.add_document(did, ipfs_hash, &document_id))
            .await?;
        info!("Document {} anchored in {:#x}", document_id, receipt.transaction_hash);
        Ok(anchor_receipt(&receipt))
    }

    async fn verify_document(&self, document_id: Uuid) -> Result<AnchorReceipt, ChainError> {
        let receipt = self
            .bounded(self.registry.verify_document(&document_id))
            .await?;
        info!("Document {} verified on chain in {:#x}", document_id, receipt.transaction_hash);
        Ok(anchor_receipt(&receipt))
    }

    async fn is_document_verified(&self, document_id: Uuid) -> Result<bool, ChainError> {
        self.bounded(self.registry.is_document_verified(&document_id))
            .await
    }

    async fn add_admin_signature(
        &self,
        document_id: Uuid,
        admin_id: Uuid,
    ) -> Result<SignatureReceipt, ChainError> {
        let message = format!("{}:{}", document_id, admin_id);
        let signature = self
            .client
            .signer()
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?
            .to_vec();

        let receipt = self
            .bounded(
                self.registry
                    .add_admin_signature(&document_id, Bytes::from(signature.clone())),
            )
            .await?;

        Ok(SignatureReceipt {
            signature: format!("0x{}", hex::encode(signature)),
            tx_hash: format!("{:#x}", receipt.transaction_hash),
        })
    }

    async fn get_admin_signatures(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<OnChainSignature>, ChainError> {
        let (admins, timestamps) = self
            .bounded(self.registry.get_admin_signatures(&document_id))
            .await?;

        Ok(admins
            .into_iter()
            .zip(timestamps)
            .map(|(admin, signed_at)| OnChainSignature {
                admin: format!("{:#x}", admin),
                signed_at: signed_at.low_u64(),
            })
            .collect())
    }

    async fn is_multi_sig_complete(&self, document_id: Uuid) -> Result<bool, ChainError> {
        self.bounded(self.registry.is_multi_sig_complete(&document_id))
            .await
    }

    async fn balance_of(&self, address: &str) -> Result<U256, ChainError> {
        let address = parse_address(address)?;
        self.bounded(async {
            self.client
                .get_balance(address, None)
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }

    async fn verify_payment(
        &self,
        tx_hash: &str,
        expected_from: &str,
        expected_to: Option<&str>,
        expected_wei: U256,
    ) -> Result<PaymentCheck, ChainError> {
        let hash: H256 = tx_hash
            .parse()
            .map_err(|_| ChainError::InvalidTxHash(tx_hash.to_string()))?;
        let expected_from = parse_address(expected_from)?;
        let expected_to = expected_to.map(parse_address).transpose()?;

        let (tx, receipt) = self
            .bounded(async {
                let tx = self
                    .client
                    .get_transaction(hash)
                    .await
                    .map_err(|e| ChainError::Rpc(e.to_string()))?;
                let receipt = self
                    .client
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(|e| ChainError::Rpc(e.to_string()))?;
                Ok((tx, receipt))
            })
            .await?;
        let (tx, receipt) = match (tx, receipt) {
            (Some(tx), Some(receipt)) => (tx, receipt),
            _ => return Err(ChainError::TxNotFound(tx_hash.to_string())),
        };

        let mut reason = None;
        if receipt.status != Some(U64::from(1)) {
            reason = Some("transaction failed".to_string());
        } else if !meets_payment_tolerance(tx.value, expected_wei) {
            reason = Some(format!(
                "paid {} ETH, expected {} ETH",
                format_ether(tx.value),
                format_ether(expected_wei)
            ));
        } else if tx.from != expected_from {
            reason = Some("sender does not match the user's wallet".to_string());
        } else if expected_to.is_some() && tx.to != expected_to {
            reason = Some("payment was not sent to the fee receiver".to_string());
        }
        if let Some(reason) = &reason {
            warn!("Payment {} rejected: {}", tx_hash, reason);
        }

        Ok(PaymentCheck {
            verified: reason.is_none(),
            from: format!("{:#x}", tx.from),
            to: tx.to.map(|to| format!("{:#x}", to)),
            actual_amount: format_ether(tx.value),
            reason,
        })
    }
}

fn parse_address(address: &str) -> Result<Address, ChainError> {
    address
        .parse::<Address>()
        .map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

fn anchor_receipt(receipt: &TransactionReceipt) -> AnchorReceipt {
    AnchorReceipt {
        tx_hash: format!("{:#x}", receipt.transaction_hash),
        block_number: receipt.block_number.map(|n| n.as_u64()),
    }
}

/// A payment counts when it covers at least 99% of the expected amount.
pub(crate) fn meets_payment_tolerance(actual: U256, expected: U256) -> bool {
    actual.saturating_mul(U256::from(100)) >= expected.saturating_mul(U256::from(99))
}
