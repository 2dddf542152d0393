//! Wallet service HTTP client
//!
//! Synchronous client for a Copay-compatible multisig wallet service.
//! Authenticated calls carry an `x-identity` header naming the copayer and
//! an `x-signature` header holding a deterministic signature of
//! `method|path|body` made with the request private key. Wallet and copayer
//! names are encrypted by the external encryption service before they leave
//! the process.
//!
//! The deterministic core (credential derivation, transaction assembly,
//! signing) never performs I/O itself; this module is the synchronous
//! boundary that feeds proposals in and submits transactions and signatures
//! out. Errors are terminal: the client never retries on its own.

use log::debug;
use reqwest::Method;
use serde_json::{json, Value};
use thiserror::Error;

use crate::crypto::{sign_message, MessageError};
use crate::encryption::{EncryptionError, EncryptionServiceClient};
use crate::proposal::{ProposalError, ProposalTransactionBuilder, TransactionProposal};
use crate::wallet::{CredentialError, WalletCredentials};

/// Errors returned by the wallet service client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("No {0} encryption service configured")]
    MissingEncryptionService(&'static str),
    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
    #[error("Proposal error: {0}")]
    Proposal(#[from] ProposalError),
    #[error("Message signing error: {0}")]
    Message(#[from] MessageError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Proposal has no id")]
    MissingProposalId,
}

/// Synchronous client for the multisig wallet service
pub struct CopayClient {
    api_base_url: String,
    http: reqwest::blocking::Client,
    shared_encryption_service: Option<EncryptionServiceClient>,
    personal_encryption_service: Option<EncryptionServiceClient>,
}

impl CopayClient {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::new(),
            shared_encryption_service: None,
            personal_encryption_service: None,
        }
    }

    /// Attach the encryption service keyed with the wallet's shared
    /// encrypting key (wallet and copayer names)
    pub fn with_shared_encryption_service(mut self, service: EncryptionServiceClient) -> Self {
        self.shared_encryption_service = Some(service);
        self
    }

    /// Attach the encryption service keyed with this copayer's personal
    /// encrypting key (private custom data)
    pub fn with_personal_encryption_service(mut self, service: EncryptionServiceClient) -> Self {
        self.personal_encryption_service = Some(service);
        self
    }

    // ------------------------------------------------------------------
    // wallet lifecycle

    /// Create a new M-of-N wallet; returns the wallet id
    pub fn create_wallet(
        &self,
        credentials: &WalletCredentials,
        wallet_name: &str,
        m: usize,
        n: usize,
    ) -> Result<String, ClientError> {
        let encrypted_name = self.shared_encryption()?.encrypt(wallet_name)?;
        let args = json!({
            "name": encrypted_name,
            "m": m,
            "n": n,
            "pubKey": credentials.wallet_pubkey()?.to_string(),
            "network": "livenet",
            "singleAddress": true,
        });

        let result = self.post("/v2/wallets/", &args, None)?;
        result
            .get("walletId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ClientError::UnexpectedResponse("response has no walletId".to_string())
            })
    }

    /// Join this copayer to an existing wallet.
    ///
    /// The join assertion `name|xPubKey|requestPubKey` is signed with the
    /// wallet private key so the service can verify membership.
    pub fn join_wallet(
        &self,
        credentials: &WalletCredentials,
        wallet_id: &str,
        copayer_name: &str,
    ) -> Result<Value, ClientError> {
        let wallet_privkey = credentials.wallet_privkey()?;

        let custom_data = json!({
            "walletPrivKey": hex::encode(wallet_privkey.secret_bytes()),
        })
        .to_string();
        let encrypted_custom_data = self.personal_encryption()?.encrypt(&custom_data)?;
        let encrypted_name = self.shared_encryption()?.encrypt(copayer_name)?;

        let xpub = credentials.address_xpub()?.to_string();
        let request_pubkey = credentials.request_pubkey()?.to_string();

        let assertion = format!("{}|{}|{}", encrypted_name, xpub, request_pubkey);
        let copayer_signature = hex::encode(sign_message(wallet_privkey, assertion.as_bytes())?);

        let args = json!({
            "walletId": wallet_id,
            "name": encrypted_name,
            "xPubKey": xpub,
            "requestPubKey": request_pubkey,
            "customData": encrypted_custom_data,
            "copayerSignature": copayer_signature,
        });
        self.post(&format!("/v2/wallets/{}/copayers", wallet_id), &args, None)
    }

    /// Create a wallet and immediately join it; returns the wallet id
    pub fn create_and_join_wallet(
        &self,
        credentials: &WalletCredentials,
        wallet_name: &str,
        copayer_name: &str,
        m: usize,
        n: usize,
    ) -> Result<String, ClientError> {
        let wallet_id = self.create_wallet(credentials, wallet_name, m, n)?;
        self.join_wallet(credentials, &wallet_id, copayer_name)?;
        Ok(wallet_id)
    }

    /// Fetch the wallet this copayer belongs to
    pub fn get_wallet(&self, credentials: &WalletCredentials) -> Result<Value, ClientError> {
        self.get("/v2/wallets/", credentials)
    }

    /// Request a fresh receiving address
    pub fn create_address(&self, credentials: &WalletCredentials) -> Result<Value, ClientError> {
        self.post("/v3/addresses/", &Value::Null, Some(credentials))
    }

    /// List the wallet's spendable outputs
    pub fn get_utxos(&self, credentials: &WalletCredentials) -> Result<Value, ClientError> {
        self.get("/v1/utxos/", credentials)
    }

    // ------------------------------------------------------------------
    // transaction proposals

    /// Ask the service to draft a transaction proposal
    pub fn propose_transaction(
        &self,
        credentials: &WalletCredentials,
        args: &Value,
    ) -> Result<TransactionProposal, ClientError> {
        let result = self.post("/v1/txproposals/", args, Some(credentials))?;
        Ok(serde_json::from_value(result)?)
    }

    /// Fetch one transaction proposal by id
    pub fn get_transaction_proposal(
        &self,
        credentials: &WalletCredentials,
        proposal_id: &str,
    ) -> Result<TransactionProposal, ClientError> {
        let result = self.get(&format!("/v1/txproposals/{}", proposal_id), credentials)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Fetch all pending transaction proposals
    pub fn get_transaction_proposals(
        &self,
        credentials: &WalletCredentials,
    ) -> Result<Vec<TransactionProposal>, ClientError> {
        let result = self.get("/v1/txproposals/", credentials)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Publish a temporary proposal so the other copayers can see and sign
    /// it. The service expects a signature over the serialized placeholder
    /// transaction, made with the request key.
    pub fn publish_transaction_proposal(
        &self,
        credentials: &WalletCredentials,
        proposal: &TransactionProposal,
    ) -> Result<Value, ClientError> {
        let proposal_id = proposal.id.as_deref().ok_or(ClientError::MissingProposalId)?;

        let builder = ProposalTransactionBuilder::new();
        let transaction = builder.build_transaction(proposal, true)?;
        let raw_hex = bitcoin::consensus::encode::serialize_hex(&transaction);
        let proposal_signature =
            hex::encode(sign_message(credentials.request_privkey()?, raw_hex.as_bytes())?);

        self.post(
            &format!("/v1/txproposals/{}/publish/", proposal_id),
            &json!({ "proposalSignature": proposal_signature }),
            Some(credentials),
        )
    }

    /// Sign a proposal and submit this copayer's per-input signatures
    pub fn sign_transaction_proposal(
        &self,
        credentials: &WalletCredentials,
        proposal: &TransactionProposal,
    ) -> Result<Value, ClientError> {
        let proposal_id = proposal.id.as_deref().ok_or(ClientError::MissingProposalId)?;

        let builder = ProposalTransactionBuilder::new();
        let signatures: Vec<String> = builder
            .build_signatures(credentials.address_xpriv()?, proposal)?
            .iter()
            .map(hex::encode)
            .collect();
        debug!(
            "submitting {} signatures for proposal {}",
            signatures.len(),
            proposal_id
        );

        self.post(
            &format!("/v1/txproposals/{}/signatures/", proposal_id),
            &json!({ "signatures": signatures }),
            Some(credentials),
        )
    }

    /// Reject a pending proposal
    pub fn reject_transaction_proposal(
        &self,
        credentials: &WalletCredentials,
        proposal: &TransactionProposal,
    ) -> Result<Value, ClientError> {
        let proposal_id = proposal.id.as_deref().ok_or(ClientError::MissingProposalId)?;
        self.post(
            &format!("/v1/txproposals/{}/rejections/", proposal_id),
            &Value::Null,
            Some(credentials),
        )
    }

    // ------------------------------------------------------------------
    // request plumbing

    fn get(&self, path: &str, credentials: &WalletCredentials) -> Result<Value, ClientError> {
        self.request(Method::GET, path, &Value::Null, Some(credentials))
    }

    fn post(
        &self,
        path: &str,
        body: &Value,
        credentials: Option<&WalletCredentials>,
    ) -> Result<Value, ClientError> {
        self.request(Method::POST, path, body, credentials)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: &Value,
        credentials: Option<&WalletCredentials>,
    ) -> Result<Value, ClientError> {
        let api_path = normalized_path(path);
        let url = format!("{}{}", self.api_base_url, api_path);
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::USER_AGENT, "copay-client-rust");

        if let Some(credentials) = credentials {
            let message = request_signature_message(method.as_str(), &api_path, body);
            let signature = hex::encode(sign_message(
                credentials.request_privkey()?,
                message.as_bytes(),
            )?);
            request = request
                .header("x-identity", credentials.copayer_id()?)
                .header("x-signature", signature);
        }

        if method != Method::GET && !body.is_null() {
            request = request.json(body);
        }

        let response = request.send()?;
        Self::parse_response(response)
    }

    fn parse_response(response: reqwest::blocking::Response) -> Result<Value, ClientError> {
        let status = response.status();
        let body = response.text()?;
        let json: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

        if status.is_client_error() || status.is_server_error() {
            let code = json
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string);
            let message = match json.get("message") {
                Some(Value::String(message)) => message.clone(),
                // some service errors nest another code inside message
                Some(Value::Object(object)) => object
                    .get("code")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(object.clone()).to_string()),
                _ => format!("received bad status code: {}", status.as_u16()),
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
                code,
            });
        }

        if json.is_null() && !body.trim().is_empty() {
            return Err(ClientError::UnexpectedResponse(
                "body is not JSON".to_string(),
            ));
        }
        Ok(json)
    }

    fn shared_encryption(&self) -> Result<&EncryptionServiceClient, ClientError> {
        self.shared_encryption_service
            .as_ref()
            .ok_or(ClientError::MissingEncryptionService("shared"))
    }

    fn personal_encryption(&self) -> Result<&EncryptionServiceClient, ClientError> {
        self.personal_encryption_service
            .as_ref()
            .ok_or(ClientError::MissingEncryptionService("personal"))
    }
}

/// Service-relative path with a single leading slash and no trailing slash
fn normalized_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// The message signed into the `x-signature` header. Empty bodies are
/// rendered as `{}` so both sides hash the same string.
fn request_signature_message(method: &str, api_path: &str, body: &Value) -> String {
    let body_json = match body {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    };
    format!("{}|{}|{}", method.to_lowercase(), api_path, body_json)
}
