// src/models/identity.rs
//! Blockchain identity data model.
//!
//! Each user may own exactly one blockchain identity: a generated secp256k1
//! wallet plus the DID derived from its address (`did:ethr:<address>`). The
//! wallet is what the multi-signature fee is paid from, so its balance gates
//! enabling multi-signature verification.

use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use serde::Serialize;
use uuid::Uuid;

/// A user's on-chain identity.
///
/// # Security Considerations
/// - `private_key` never leaves the service through serialization
/// - Production deployments should keep it in a KMS instead of the store
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainIdentity {
    pub user_id: Uuid,

    /// The complete DID string identifier
    /// Example: "did:ethr:0x52908400098527886E0F7030069857D2E4169EE7"
    pub did: String,

    /// Checksummed wallet address
    pub address: String,

    /// Hex-encoded signing key
    #[serde(skip_serializing)]
    pub private_key: String,

    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlockchainIdentity {
    pub fn new(user_id: Uuid, address: String, private_key: String) -> Self {
        let now = Utc::now();
        BlockchainIdentity {
            user_id,
            did: format!("did:ethr:{}", address),
            address,
            private_key,
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checksummed address of the wallet behind the stored key, or `None` if
    /// the key does not parse.
    pub fn wallet_address(&self) -> Option<String> {
        let wallet: LocalWallet = self.private_key.parse().ok()?;
        Some(to_checksum(&wallet.address(), None))
    }
}
