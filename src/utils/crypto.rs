// src/utils/crypto.rs
//! Cryptographic utilities.
//!
//! - Keccak-256 hashing (Ethereum's standard hash function)
//! - Argon2id password hashing in PHC string format
//! - Random share codes
//! - Filename sanitizing for `Content-Disposition` headers

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use ethers::utils::{hex, keccak256};
use rand::RngCore;

/// Number of random bytes behind a share code (hex-encoded to twice as many chars).
pub const SHARE_CODE_BYTES: usize = 6;

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Hashes a password with Argon2id and a fresh random salt.
///
/// # Errors
/// Returns the underlying `password_hash` error message if hashing fails.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| format!("Argon2 hashing failed: {}", e))
}

/// Checks `password` against a PHC-format hash. Malformed hashes never match.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Generates a lowercase hex share code from [`SHARE_CODE_BYTES`] random bytes.
pub fn generate_share_code() -> String {
    let mut bytes = [0u8; SHARE_CODE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
