//! Deterministic message signing
//!
//! Signs arbitrary messages with ECDSA over a double SHA-256 digest using an
//! RFC 6979 deterministic nonce. Signing the same message with the same key
//! always yields byte-identical DER signatures, which is what allows every
//! co-signer (and the wallet service) to deduplicate and audit signatures.
//!
//! This primitive backs both application-level signing (the wallet-join
//! assertion, proposal publishing) and API request authentication.

use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::double_sha256;

/// Errors that can occur during message signing operations
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// Sign a message with a deterministic ECDSA signature.
///
/// The message is hashed with double SHA-256 and the nonce is derived from
/// the private key and digest alone, so the result is reproducible.
/// Returns the DER-encoded signature bytes.
pub fn sign_message(secret_key: &SecretKey, message: &[u8]) -> Result<Vec<u8>, MessageError> {
    let secp = Secp256k1::new();
    let digest = Message::from_digest_slice(&double_sha256(message))?;
    let signature = secp.sign_ecdsa(&digest, secret_key);
    Ok(signature.serialize_der().to_vec())
}

/// Verify a DER-encoded message signature against a public key
pub fn verify_message(
    public_key: &PublicKey,
    message: &[u8],
    signature_der: &[u8],
) -> Result<bool, MessageError> {
    let secp = Secp256k1::new();
    let digest = Message::from_digest_slice(&double_sha256(message))?;
    let signature =
        ecdsa::Signature::from_der(signature_der).map_err(|_| MessageError::InvalidSignature)?;

    match secp.verify_ecdsa(&digest, &signature, public_key) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
