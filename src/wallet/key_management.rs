// src/wallet/key_management.rs
//! Key generation for users' blockchain identities.
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - Ethereum address derivation (via `ethers` signers)
//! - Cryptographically secure random number generation

use ethers::signers::{LocalWallet, Signer};
use ethers::utils::{hex, to_checksum};
use k256::ecdsa::SigningKey;
use k256::SecretKey;

/// Freshly generated wallet material.
///
/// # Security Notes
/// - `private_key` is hex without `0x`; it must never be serialized into a response
#[derive(Debug, Clone)]
pub struct GeneratedWallet {
    /// EIP-55 checksummed address
    pub address: String,
    pub private_key: String,
}

/// Generates a new random secp256k1 wallet.
pub fn generate_wallet() -> GeneratedWallet {
    let secret_key = SecretKey::random(&mut rand::thread_rng());
    let private_key = hex::encode(secret_key.to_bytes());
    let wallet = LocalWallet::from(SigningKey::from(secret_key));

    GeneratedWallet {
        address: to_checksum(&wallet.address(), None),
        private_key,
    }
}
