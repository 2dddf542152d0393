//! Transaction proposal data model
//!
//! Server-issued draft transaction documents that every co-signer
//! independently reconstructs and signs. Proposals are read-only inputs to
//! the assembler; field names on the wire are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Direction of an embedded token-protocol payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyType {
    Send,
    Issuance,
}

/// What a proposal moves: plain bitcoin value, or a token-protocol payload
/// embedded in a raw-script output
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ProposalKind {
    #[default]
    PlainTransfer,
    TokenPayload {
        counterparty_type: CounterpartyType,
        token: String,
        quantity: u64,
        divisible: bool,
    },
}

impl ProposalKind {
    /// True when this proposal carries an embedded token payload
    pub fn is_token(&self) -> bool {
        matches!(self, ProposalKind::TokenPayload { .. })
    }
}

// Wire shape of the service's customData field. The tagged ProposalKind is
// the in-memory model; these structs only exist at the serde boundary.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomDataWire {
    #[serde(default)]
    is_counterparty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    counterparty_type: Option<CounterpartyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    counterparty: Option<CounterpartyWire>,
}

#[derive(Serialize, Deserialize)]
struct CounterpartyWire {
    token: String,
    quantity: u64,
    divisible: bool,
}

pub(crate) fn deserialize_kind<'de, D>(deserializer: D) -> Result<ProposalKind, D::Error>
where
    D: Deserializer<'de>,
{
    let wire: Option<CustomDataWire> = Option::deserialize(deserializer)?;
    Ok(match wire {
        Some(wire) if wire.is_counterparty => {
            let counterparty = wire
                .counterparty
                .ok_or_else(|| serde::de::Error::missing_field("counterparty"))?;
            ProposalKind::TokenPayload {
                counterparty_type: wire.counterparty_type.unwrap_or(CounterpartyType::Send),
                token: counterparty.token,
                quantity: counterparty.quantity,
                divisible: counterparty.divisible,
            }
        }
        _ => ProposalKind::PlainTransfer,
    })
}

pub(crate) fn serialize_kind<S>(kind: &ProposalKind, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match kind {
        ProposalKind::PlainTransfer => serializer.serialize_none(),
        ProposalKind::TokenPayload {
            counterparty_type,
            token,
            quantity,
            divisible,
        } => CustomDataWire {
            is_counterparty: true,
            counterparty_type: Some(*counterparty_type),
            counterparty: Some(CounterpartyWire {
                token: token.clone(),
                quantity: *quantity,
                divisible: *divisible,
            }),
        }
        .serialize(serializer),
    }
}

/// A multisig UTXO spent by the proposal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalInput {
    /// Funding transaction id
    pub txid: String,
    /// Output index in the funding transaction
    pub vout: u32,
    /// Multisig address holding the coins
    pub address: String,
    /// Locking script of the spent output (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_pub_key: Option<String>,
    /// Value of the spent output in satoshis
    pub satoshis: u64,
    /// Wallet-relative derivation path of this address's keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Copayer public keys in redeem-script order
    pub public_keys: Vec<String>,
}

/// A proposal output: a standard pay-to-address, or a raw script carrying a
/// protocol payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalOutput {
    /// Satoshis carried by the output (zero for raw-script payloads)
    pub amount: u64,
    /// Destination address for standard outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    /// Raw locking script (hex) for protocol-payload outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// Change destination shared by the wallet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAddress {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub public_keys: Vec<String>,
}

/// A server-issued draft transaction description
///
/// Co-signers reconstruct the spend transaction from this document alone, so
/// every field that feeds assembly (`inputs`, `outputs`, `output_order`,
/// `fee`, `change_address`, `wallet_m`) must be identical for all parties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionProposal {
    /// Proposal id assigned by the wallet service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Creation time reported by the service (epoch seconds on the wire)
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_on: Option<DateTime<Utc>>,
    pub inputs: Vec<ProposalInput>,
    pub outputs: Vec<ProposalOutput>,
    /// Permutation over `outputs.len() + 1` slots; the slot valued
    /// `outputs.len()` is the change slot
    pub output_order: Vec<usize>,
    /// Mining fee in satoshis
    pub fee: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_address: Option<ChangeAddress>,
    /// Signatures required to spend (M)
    pub wallet_m: usize,
    /// Total copayers in the wallet (N)
    pub wallet_n: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_signatures: Option<u32>,
    /// Transfer kind carried in the service's customData field
    #[serde(
        default,
        rename = "customData",
        serialize_with = "serialize_kind",
        deserialize_with = "deserialize_kind"
    )]
    pub kind: ProposalKind,
}

impl TransactionProposal {
    /// Total satoshis provided by the inputs
    pub fn input_amount(&self) -> u64 {
        self.inputs.iter().map(|input| input.satoshis).sum()
    }

    /// Total satoshis consumed by the declared outputs
    pub fn output_amount(&self) -> u64 {
        self.outputs.iter().map(|output| output.amount).sum()
    }

    /// Satoshis left over for the change slot; non-positive means the
    /// change output is omitted entirely
    pub fn change_amount(&self) -> i64 {
        self.input_amount() as i64 - self.output_amount() as i64 - self.fee as i64
    }
}
