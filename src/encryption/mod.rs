//! Symmetric encryption service client
//!
//! Wallet names, copayer names, and transaction memos never reach the wallet
//! service in the clear. An external microservice encrypts and decrypts them
//! with the personal or shared encrypting key; the ciphertext it returns is
//! treated as an opaque string and embedded verbatim in service fields.

use log::debug;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors returned by the encryption service client
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption key was not provided")]
    MissingKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Synchronous client for the external encryption microservice
#[derive(Debug, Clone)]
pub struct EncryptionServiceClient {
    api_base_url: String,
    encryption_key: Option<String>,
    http: reqwest::blocking::Client,
}

impl EncryptionServiceClient {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            encryption_key: None,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Set the symmetric key sent along with every request
    pub fn with_encryption_key(mut self, encryption_key: &str) -> Self {
        self.encryption_key = Some(encryption_key.to_string());
        self
    }

    /// Encrypt a plaintext; returns the opaque ciphertext string
    pub fn encrypt(&self, message: &str) -> Result<String, EncryptionError> {
        self.call("/encrypt", message)
    }

    /// Decrypt an opaque ciphertext back to its plaintext
    pub fn decrypt(&self, message: &str) -> Result<String, EncryptionError> {
        self.call("/decrypt", message)
    }

    fn call(&self, path: &str, message: &str) -> Result<String, EncryptionError> {
        let encryption_key = self
            .encryption_key
            .as_ref()
            .ok_or(EncryptionError::MissingKey)?;

        let url = format!("{}{}", self.api_base_url, path);
        debug!("encryption service call: {}", url);

        let response = self
            .http
            .post(&url)
            .json(&json!({
                "message": message,
                "key": encryption_key,
            }))
            .send()?;

        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|_| EncryptionError::UnexpectedResponse("body is not JSON".to_string()))?;

        if status.is_client_error() || status.is_server_error() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("received bad status code: {}", status.as_u16()));
            return Err(EncryptionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        body.get("result")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                EncryptionError::UnexpectedResponse("response has no result field".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_rejected_before_any_network_call() {
        let client = EncryptionServiceClient::new("http://127.0.0.1:8088");
        assert!(matches!(
            client.encrypt("wallet name"),
            Err(EncryptionError::MissingKey)
        ));
        assert!(matches!(
            client.decrypt("ciphertext"),
            Err(EncryptionError::MissingKey)
        ));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = EncryptionServiceClient::new("http://127.0.0.1:8088/");
        assert_eq!(client.api_base_url, "http://127.0.0.1:8088");
    }
}
