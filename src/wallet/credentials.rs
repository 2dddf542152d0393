//! Deterministic wallet credential derivation
//!
//! Every co-signer holding the same platform and wallet seed strings derives
//! an identical tree of keys and identifiers: a BIP32 root key over the
//! concatenated seeds, a BIP39 recovery mnemonic, the master key grown from
//! that mnemonic, and the address / request / wallet key pairs plus the
//! symmetric encrypting keys and the copayer identifier.
//!
//! Derivation is referentially transparent: there is no randomness anywhere
//! in the tree, and re-deriving from identical inputs always yields
//! byte-identical credentials. Seed generation itself is the caller's
//! business.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::{Network, PrivateKey};
use once_cell::unsync::OnceCell;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use crate::crypto::{sha256, sha256_hex};

/// Errors that can occur during credential derivation
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(#[from] bip39::Error),
    #[error("Key derivation error: {0}")]
    KeyDerivation(#[from] bitcoin::bip32::Error),
    #[error("Invalid wallet id: {0}")]
    InvalidWalletId(String),
}

// Fixed derivation paths of the credential tree. The tree shape is closed:
// no path is ever supplied by a caller.
fn mnemonic_entropy_path() -> DerivationPath {
    two_step_path(1, 0)
}

fn request_key_path() -> DerivationPath {
    two_step_path(1, 0)
}

fn wallet_key_path() -> DerivationPath {
    two_step_path(2, 0)
}

fn personal_key_path() -> DerivationPath {
    two_step_path(3, 0)
}

/// The BIP44 account path whose xpub is shared with all co-signers
/// for per-address key derivation (m/44'/0'/0')
fn address_chain_path() -> DerivationPath {
    DerivationPath::master().extend([
        ChildNumber::from_hardened_idx(44).unwrap(),
        ChildNumber::from_hardened_idx(0).unwrap(),
        ChildNumber::from_hardened_idx(0).unwrap(),
    ])
}

/// Builds the path m/<hardened>'/<normal>
fn two_step_path(hardened: u32, normal: u32) -> DerivationPath {
    DerivationPath::master().extend([
        ChildNumber::from_hardened_idx(hardened).unwrap(),
        ChildNumber::from_normal_idx(normal).unwrap(),
    ])
}

/// Width the base58 wallet id is padded to inside an invitation code
const INVITATION_ID_WIDTH: usize = 22;

/// A copayer's complete set of deterministic wallet credentials.
///
/// Credentials are computed lazily on first access and cached for the
/// lifetime of this instance; the cache never feeds back into derivation
/// inputs. Instances are cheap enough to create per thread, which is the
/// intended concurrency model.
#[derive(Clone)]
pub struct WalletCredentials {
    secp: Secp256k1<All>,
    root_entropy_key: Xpriv,
    mnemonic: Mnemonic,
    master_seed: [u8; 64],

    xpriv: OnceCell<Xpriv>,
    address_xpriv: OnceCell<Xpriv>,
    address_xpub: OnceCell<Xpub>,
    request_privkey: OnceCell<SecretKey>,
    wallet_privkey: OnceCell<SecretKey>,
    personal_encrypting_key: OnceCell<String>,
    shared_encrypting_key: OnceCell<String>,
    entropy_source: OnceCell<[u8; 32]>,
    copayer_id: OnceCell<String>,
}

impl WalletCredentials {
    /// Derive a fresh credential set from the platform and wallet seeds.
    ///
    /// The recovery mnemonic is produced from the private key material at a
    /// fixed child of the root entropy key.
    pub fn from_seeds(platform_seed: &str, wallet_seed: &str) -> Result<Self, CredentialError> {
        let root = Self::root_key_from_seeds(platform_seed, wallet_seed)?;
        let secp = Secp256k1::new();
        let entropy_key = root.derive_priv(&secp, &mnemonic_entropy_path())?;
        let mnemonic = Mnemonic::from_entropy(&entropy_key.private_key.secret_bytes())?;
        Ok(Self::assemble(secp, root, mnemonic, ""))
    }

    /// Restore a credential set from a previously exported recovery
    /// mnemonic. The root entropy key is still rebuilt from the seeds;
    /// only the root-to-mnemonic step is skipped.
    pub fn from_mnemonic(
        mnemonic: &str,
        platform_seed: &str,
        wallet_seed: &str,
    ) -> Result<Self, CredentialError> {
        Self::from_mnemonic_with_passphrase(mnemonic, "", platform_seed, wallet_seed)
    }

    /// Restore a credential set from a recovery mnemonic protected by an
    /// additional passphrase
    pub fn from_mnemonic_with_passphrase(
        mnemonic: &str,
        passphrase: &str,
        platform_seed: &str,
        wallet_seed: &str,
    ) -> Result<Self, CredentialError> {
        let root = Self::root_key_from_seeds(platform_seed, wallet_seed)?;
        let secp = Secp256k1::new();
        let mnemonic = Mnemonic::parse_in(Language::English, mnemonic)?;
        Ok(Self::assemble(secp, root, mnemonic, passphrase))
    }

    fn root_key_from_seeds(
        platform_seed: &str,
        wallet_seed: &str,
    ) -> Result<Xpriv, CredentialError> {
        if platform_seed.is_empty() {
            return Err(CredentialError::InvalidSeed(
                "platform seed is empty".to_string(),
            ));
        }
        if wallet_seed.is_empty() {
            return Err(CredentialError::InvalidSeed(
                "wallet seed is empty".to_string(),
            ));
        }

        // The concatenated seeds are raw entropy, not a formatted seed phrase
        let mut entropy = Vec::with_capacity(platform_seed.len() + wallet_seed.len());
        entropy.extend_from_slice(platform_seed.as_bytes());
        entropy.extend_from_slice(wallet_seed.as_bytes());
        Ok(Xpriv::new_master(Network::Bitcoin, &entropy)?)
    }

    fn assemble(secp: Secp256k1<All>, root: Xpriv, mnemonic: Mnemonic, passphrase: &str) -> Self {
        let master_seed = mnemonic.to_seed(passphrase);
        Self {
            secp,
            root_entropy_key: root,
            mnemonic,
            master_seed,
            xpriv: OnceCell::new(),
            address_xpriv: OnceCell::new(),
            address_xpub: OnceCell::new(),
            request_privkey: OnceCell::new(),
            wallet_privkey: OnceCell::new(),
            personal_encrypting_key: OnceCell::new(),
            shared_encrypting_key: OnceCell::new(),
            entropy_source: OnceCell::new(),
            copayer_id: OnceCell::new(),
        }
    }

    // ------------------------------------------------------------------
    // credential accessors

    /// The BIP32 root key built from the concatenated seeds
    pub fn root_entropy_key(&self) -> &Xpriv {
        &self.root_entropy_key
    }

    /// The recovery mnemonic for this credential set
    pub fn mnemonic(&self) -> &Mnemonic {
        &self.mnemonic
    }

    /// The master extended private key grown from the mnemonic seed
    pub fn xpriv(&self) -> Result<&Xpriv, CredentialError> {
        self.xpriv
            .get_or_try_init(|| Ok(Xpriv::new_master(Network::Bitcoin, &self.master_seed)?))
    }

    /// The address chain extended private key (m/44'/0'/0' of the master
    /// key); per-address signing keys hang off this key
    pub fn address_xpriv(&self) -> Result<&Xpriv, CredentialError> {
        self.address_xpriv
            .get_or_try_init(|| Ok(self.xpriv()?.derive_priv(&self.secp, &address_chain_path())?))
    }

    /// The shared extended public key co-signers use to derive each other's
    /// address keys
    pub fn address_xpub(&self) -> Result<&Xpub, CredentialError> {
        self.address_xpub
            .get_or_try_init(|| Ok(Xpub::from_priv(&self.secp, self.address_xpriv()?)))
    }

    /// The private key that authenticates API requests; also usable for
    /// generic message signing
    pub fn request_privkey(&self) -> Result<&SecretKey, CredentialError> {
        self.request_privkey.get_or_try_init(|| {
            Ok(self
                .xpriv()?
                .derive_priv(&self.secp, &request_key_path())?
                .private_key)
        })
    }

    /// Public counterpart of the request key, registered with the wallet
    /// service on join
    pub fn request_pubkey(&self) -> Result<PublicKey, CredentialError> {
        Ok(self.request_privkey()?.public_key(&self.secp))
    }

    /// The private key that signs this copayer's wallet-join assertion
    pub fn wallet_privkey(&self) -> Result<&SecretKey, CredentialError> {
        self.wallet_privkey.get_or_try_init(|| {
            Ok(self
                .root_entropy_key
                .derive_priv(&self.secp, &wallet_key_path())?
                .private_key)
        })
    }

    /// Public counterpart of the wallet key
    pub fn wallet_pubkey(&self) -> Result<PublicKey, CredentialError> {
        Ok(self.wallet_privkey()?.public_key(&self.secp))
    }

    /// Symmetric key for fields only this copayer can read, handed to the
    /// external encryption service
    pub fn personal_encrypting_key(&self) -> Result<&str, CredentialError> {
        self.personal_encrypting_key
            .get_or_try_init(|| {
                let key = self
                    .root_entropy_key
                    .derive_priv(&self.secp, &personal_key_path())?
                    .private_key;
                Ok(BASE64.encode(&key.secret_bytes()[..16]))
            })
            .map(String::as_str)
    }

    /// Symmetric key shared by every copayer in the wallet, handed to the
    /// external encryption service
    pub fn shared_encrypting_key(&self) -> Result<&str, CredentialError> {
        self.shared_encrypting_key
            .get_or_try_init(|| {
                let digest = sha256(&self.wallet_privkey()?.secret_bytes());
                Ok(BASE64.encode(&digest[..16]))
            })
            .map(String::as_str)
    }

    /// Auxiliary entropy derived from the request key
    pub fn entropy_source(&self) -> Result<&[u8; 32], CredentialError> {
        self.entropy_source.get_or_try_init(|| {
            let digest = sha256(&self.request_privkey()?.secret_bytes());
            let mut source = [0u8; 32];
            source.copy_from_slice(&digest);
            Ok(source)
        })
    }

    /// The stable, publicly shareable copayer identity: the SHA-256 of the
    /// serialized address chain xpub
    pub fn copayer_id(&self) -> Result<&str, CredentialError> {
        self.copayer_id
            .get_or_try_init(|| Ok(sha256_hex(self.address_xpub()?.to_string().as_bytes())))
            .map(String::as_str)
    }

    /// Builds the secret invitation code a joining copayer needs for
    /// `wallet_id`: the base58 wallet id right-padded to a fixed width,
    /// followed by the wallet private key in WIF and a network marker
    pub fn invitation_code(&self, wallet_id: &str) -> Result<String, CredentialError> {
        let id_hex: String = wallet_id.chars().filter(|c| *c != '-').collect();
        let id_bytes = hex::decode(&id_hex)
            .map_err(|_| CredentialError::InvalidWalletId(wallet_id.to_string()))?;

        let mut encoded_id = bs58::encode(id_bytes).into_string();
        while encoded_id.len() < INVITATION_ID_WIDTH {
            encoded_id.push('0');
        }

        let wif = PrivateKey::new(*self.wallet_privkey()?, Network::Bitcoin).to_wif();
        Ok(format!("{}{}L", encoded_id, wif))
    }
}
