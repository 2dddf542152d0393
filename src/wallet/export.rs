//! Credential export and persistence
//!
//! Serializes the shareable view of a credential set (extended keys, request
//! key pair, encrypting keys, copayer id) into the document format wallet
//! tooling expects, and reads/writes it as JSON on disk.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::credentials::{CredentialError, WalletCredentials};

/// Errors that can occur while exporting or persisting credentials
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Exported view of a credential set
///
/// WARNING: contains private key material. Persist only to storage the
/// copayer controls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletExport {
    pub mnemonic: String,
    pub entropy_source: String,
    pub x_priv_key: String,
    pub x_pub_key: String,
    pub request_priv_key: String,
    pub request_pub_key: String,
    pub personal_encrypting_key: String,
    pub copayer_id: String,
    pub shared_encrypting_key: String,
    pub wallet_priv_key: String,
}

impl WalletExport {
    /// Save the export document as JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load an export document from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl WalletCredentials {
    /// Export the credential set in the document format wallet tooling
    /// expects
    pub fn export(&self) -> Result<WalletExport, ExportError> {
        Ok(WalletExport {
            mnemonic: self.mnemonic().to_string(),
            entropy_source: hex::encode(self.entropy_source()?),
            x_priv_key: self.xpriv()?.to_string(),
            x_pub_key: self.address_xpub()?.to_string(),
            request_priv_key: hex::encode(self.request_privkey()?.secret_bytes()),
            request_pub_key: self.request_pubkey()?.to_string(),
            personal_encrypting_key: self.personal_encrypting_key()?.to_string(),
            copayer_id: self.copayer_id()?.to_string(),
            shared_encrypting_key: self.shared_encrypting_key()?.to_string(),
            wallet_priv_key: hex::encode(self.wallet_privkey()?.secret_bytes()),
        })
    }
}
