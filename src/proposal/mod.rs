//! Transaction proposal handling
//!
//! This module contains everything needed to turn a server-issued proposal
//! document into a spendable multisig transaction:
//! - The proposal data model (inputs, outputs, output ordering, token
//!   payload variants)
//! - Redeem script reconstruction for M-of-N inputs
//! - Transaction assembly with the change slot convention
//! - Deterministic per-input signature generation
//!
//! # Example
//!
//! ```ignore
//! use copay_client::proposal::ProposalTransactionBuilder;
//!
//! let proposal = serde_json::from_str(&proposal_json)?;
//! let builder = ProposalTransactionBuilder::new();
//!
//! // every co-signer reconstructs the same transaction...
//! let transaction = builder.build_transaction(&proposal, true)?;
//!
//! // ...and contributes one deterministic signature per input
//! let signatures = builder.build_signatures(credentials.address_xpriv()?, &proposal)?;
//! ```

use thiserror::Error;

pub mod builder;
pub mod script;
pub mod types;

pub use builder::{change_slot_index, ProposalTransactionBuilder};
pub use script::{multisig_redeem_script, parse_public_keys, redeem_push_script, MAX_MULTISIG_KEYS};
pub use types::{
    ChangeAddress, CounterpartyType, ProposalInput, ProposalKind, ProposalOutput,
    TransactionProposal,
};

/// Errors raised while assembling or signing a proposal transaction
#[derive(Error, Debug)]
pub enum ProposalError {
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),
    #[error("Input {index} is missing a derivation path")]
    MissingInputPath { index: usize },
    #[error("Key derivation failed for path {path}: {source}")]
    KeyDerivation {
        path: String,
        source: bitcoin::bip32::Error,
    },
    #[error("Signature for input {input_index} has DER length {expected} but only {actual} bytes")]
    SignatureEncoding {
        input_index: usize,
        expected: usize,
        actual: usize,
    },
}
