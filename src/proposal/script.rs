//! Redeem script construction for multisig inputs
//!
//! Builds the standard M-of-N redeem script an input's unlocking script (and
//! signature hashing) is based on. Script reconstruction is purely a
//! function of `(M, ordered keys)`: the key order embedded in the proposal
//! is used as-is, and any reordering yields a different script hash.
//! Callers are responsible for supplying keys in the wallet's canonical
//! order; no sorting is performed here.

use std::str::FromStr;

use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::opcodes::OP_0;
use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::PublicKey;

use super::ProposalError;

/// Maximum keys in a standard P2SH multisig redeem script
pub const MAX_MULTISIG_KEYS: usize = 15;

/// Build a standard M-of-N multisig redeem script from an ordered key set
pub fn multisig_redeem_script(
    required: usize,
    public_keys: &[PublicKey],
) -> Result<ScriptBuf, ProposalError> {
    if required == 0 || required > public_keys.len() || public_keys.len() > MAX_MULTISIG_KEYS {
        return Err(ProposalError::InvalidProposal(format!(
            "invalid multisig shape: {}-of-{}",
            required,
            public_keys.len()
        )));
    }

    let mut builder = Builder::new().push_int(required as i64);
    for public_key in public_keys {
        builder = builder.push_key(public_key);
    }
    Ok(builder
        .push_int(public_keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

/// Build the unsigned unlocking-script placeholder for a multisig input: a
/// zero element followed by a push of the serialized redeem script
pub fn redeem_push_script(redeem_script: &ScriptBuf) -> Result<ScriptBuf, ProposalError> {
    let push = PushBytesBuf::try_from(redeem_script.to_bytes()).map_err(|_| {
        ProposalError::InvalidProposal("redeem script exceeds the push size limit".to_string())
    })?;
    Ok(Builder::new()
        .push_opcode(OP_0)
        .push_slice(push)
        .into_script())
}

/// Parse an ordered list of hex public keys from a proposal
pub fn parse_public_keys(hex_keys: &[String]) -> Result<Vec<PublicKey>, ProposalError> {
    hex_keys
        .iter()
        .map(|hex_key| {
            PublicKey::from_str(hex_key).map_err(|_| {
                ProposalError::InvalidProposal(format!("invalid public key: {}", hex_key))
            })
        })
        .collect()
}
