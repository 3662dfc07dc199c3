//! Hashing utilities
//!
//! This module provides:
//! - SHA-256 and HASH160 digests
//! - Record and content identifier generation

pub mod hash;

pub use hash::{content_id, hash160, hash160_hex, new_record_id, sha256, sha256_hex};
