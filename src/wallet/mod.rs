//! Wallet credential derivation and export
//!
//! Provides the deterministic credential tree shared by all co-signers:
//! every party holding the same two seed strings derives identical keys,
//! encrypting keys, and copayer identifiers.
//!
//! # Example
//!
//! ```rust
//! use copay_client::wallet::WalletCredentials;
//!
//! let credentials = WalletCredentials::from_seeds("PLATFORMSEED1", "WALLETSEED1")?;
//!
//! // the same seeds always derive the same identity
//! println!("copayer id: {}", credentials.copayer_id()?);
//! println!("recovery mnemonic: {}", credentials.mnemonic());
//! # Ok::<(), copay_client::wallet::CredentialError>(())
//! ```

pub mod credentials;
pub mod export;

pub use credentials::{CredentialError, WalletCredentials};
pub use export::{ExportError, WalletExport};
