//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 hashing (single and double)
//! - Deterministic message signing (RFC 6979 ECDSA over double SHA-256)

pub mod hash;
pub mod message;

pub use hash::{double_sha256, double_sha256_hex, sha256, sha256_hex};
pub use message::{sign_message, verify_message, MessageError};
