//! Copay-Client: a multisig wallet client with deterministic credentials
//!
//! This crate provides the client side of an M-of-N multisig bitcoin wallet:
//! - Deterministic credential derivation: two seed strings produce the same
//!   hierarchy of keys, encrypting keys, and identifiers in every process
//!   that holds them
//! - BIP39 recovery mnemonics with optional passphrases
//! - Reconstruction of spend transactions from server-issued proposal
//!   documents, including Counterparty-style token payload outputs
//! - Deterministic (RFC 6979) per-input signatures for partial signing
//! - Synchronous clients for a Copay-compatible wallet service and the
//!   external symmetric encryption service
//!
//! # Example
//!
//! ```rust
//! use copay_client::wallet::WalletCredentials;
//!
//! // every holder of the same seeds derives the same credentials
//! let credentials = WalletCredentials::from_seeds("PLATFORMSEED1", "WALLETSEED1")?;
//!
//! println!("copayer id: {}", credentials.copayer_id()?);
//! println!("recovery mnemonic: {}", credentials.mnemonic());
//! # Ok::<(), copay_client::wallet::CredentialError>(())
//! ```

pub mod client;
pub mod crypto;
pub mod encryption;
pub mod proposal;
pub mod wallet;

// Re-export commonly used types
pub use client::{ClientError, CopayClient};
pub use crypto::{sign_message, verify_message, MessageError};
pub use encryption::{EncryptionError, EncryptionServiceClient};
pub use proposal::{
    change_slot_index, multisig_redeem_script, CounterpartyType, ProposalError, ProposalInput,
    ProposalKind, ProposalOutput, ProposalTransactionBuilder, TransactionProposal,
};
pub use wallet::{CredentialError, ExportError, WalletCredentials, WalletExport};
