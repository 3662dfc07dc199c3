//! Hashing helpers for record identifiers and script key hashes
//!
//! Record ids are SHA-256 digests over content plus a timestamp and a random
//! nonce, truncated to 16 bytes. Key hashes follow the Bitcoin-style
//! RIPEMD160(SHA256(x)) construction.

use chrono::Utc;
use rand::RngCore;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// RIPEMD160(SHA256(data)), 20 bytes
pub fn hash160(data: &[u8]) -> Vec<u8> {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    ripemd.finalize().to_vec()
}

/// Hex-encoded [`hash160`]
pub fn hash160_hex(data: &[u8]) -> String {
    hex::encode(hash160(data))
}

/// 32-hex-character id fixed by `data` alone
pub fn content_id(data: &str) -> String {
    hex::encode(&sha256(data.as_bytes())[..16])
}

/// Generate a fresh 32-hex-character record id
///
/// `seed` ties the id to the record it names; the timestamp and nonce make
/// repeated calls with the same seed produce distinct ids.
pub fn new_record_id(seed: &str) -> String {
    let mut nonce = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce);

    let id_data = format!(
        "{}{}{}",
        seed,
        Utc::now().timestamp_nanos_opt().unwrap_or(0),
        hex::encode(nonce)
    );
    content_id(&id_data)
}
