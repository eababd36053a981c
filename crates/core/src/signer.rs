use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::intent::Commitment;
use crate::errors::IntentError;

pub const RAW_ED25519_STANDARD: &str = "raw_ed25519";
pub const ED25519_PREFIX: &str = "ed25519:";

/// Account identity plus the ed25519 key that signs on its behalf.
pub struct KeyMaterial {
    account_id: String,
    signing_key: SigningKey,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("account_id", &self.account_id)
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// Accepts `ed25519:<base58>` encoding either a 64-byte keypair or a
    /// 32-byte seed.
    pub fn from_secret_key(
        account_id: impl Into<String>,
        secret: &SecretString,
    ) -> Result<Self, IntentError> {
        let bytes = decode_prefixed(secret.expose_secret())?;
        let signing_key = match bytes.len() {
            64 => {
                let keypair: [u8; 64] = bytes
                    .try_into()
                    .map_err(|_| IntentError::SigningError("keypair must be 64 bytes".into()))?;
                SigningKey::from_keypair_bytes(&keypair).map_err(|_| {
                    IntentError::SigningError(
                        "secret key public half does not match its seed".to_string(),
                    )
                })?
            }
            32 => {
                let seed: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| IntentError::SigningError("seed must be 32 bytes".into()))?;
                SigningKey::from_bytes(&seed)
            }
            other => {
                return Err(IntentError::SigningError(format!(
                    "secret key must decode to 32 or 64 bytes, got {other}"
                )))
            }
        };

        Ok(Self { account_id: account_id.into(), signing_key })
    }

    pub fn from_seed(account_id: impl Into<String>, seed: [u8; 32]) -> Self {
        Self { account_id: account_id.into(), signing_key: SigningKey::from_bytes(&seed) }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key(&self) -> String {
        encode_prefixed(&self.public_key_bytes())
    }

    pub fn sign_bytes(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Signs the UTF-8 bytes of `payload` and wraps the result as a commitment.
/// EdDSA is deterministic, so identical payloads yield identical signatures.
pub fn sign_payload(payload: impl Into<String>, key: &KeyMaterial) -> Commitment {
    let payload = payload.into();
    let signature = key.sign_bytes(payload.as_bytes());
    Commitment {
        standard: RAW_ED25519_STANDARD.to_string(),
        payload,
        signature: encode_prefixed(&signature),
        public_key: key.public_key(),
    }
}

pub fn verify_commitment(commitment: &Commitment) -> Result<(), IntentError> {
    if commitment.standard != RAW_ED25519_STANDARD {
        return Err(IntentError::SigningError(format!(
            "unsupported signature standard `{}`",
            commitment.standard
        )));
    }

    let public_key: [u8; 32] = decode_prefixed(&commitment.public_key)?
        .try_into()
        .map_err(|_| IntentError::SigningError("public key must be 32 bytes".to_string()))?;
    let signature: [u8; 64] = decode_prefixed(&commitment.signature)?
        .try_into()
        .map_err(|_| IntentError::SigningError("signature must be 64 bytes".to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(&public_key)
        .map_err(|error| IntentError::SigningError(format!("invalid public key: {error}")))?;
    verifying_key
        .verify(commitment.payload.as_bytes(), &Signature::from_bytes(&signature))
        .map_err(|error| IntentError::SigningError(format!("signature mismatch: {error}")))
}

pub fn encode_prefixed(bytes: &[u8]) -> String {
    format!("{ED25519_PREFIX}{}", bs58::encode(bytes).into_string())
}

pub fn decode_prefixed(encoded: &str) -> Result<Vec<u8>, IntentError> {
    let body = encoded.trim().strip_prefix(ED25519_PREFIX).ok_or_else(|| {
        IntentError::SigningError(format!("key material must start with `{ED25519_PREFIX}`"))
    })?;
    bs58::decode(body)
        .into_vec()
        .map_err(|error| IntentError::SigningError(format!("invalid base58: {error}")))
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("could not read credentials file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse credentials file `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error(transparent)]
    Key(#[from] IntentError),
}

#[derive(Deserialize)]
struct CredentialsFile {
    account_id: String,
    #[serde(alias = "secret_key")]
    private_key: String,
}

/// JSON credentials as written by the network's CLI tooling.
pub struct AccountCredentials {
    pub account_id: String,
    pub private_key: SecretString,
}

impl AccountCredentials {
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CredentialsError::Read { path: path.to_path_buf(), source })?;
        let file: CredentialsFile = serde_json::from_str(&raw)
            .map_err(|source| CredentialsError::Parse { path: path.to_path_buf(), source })?;
        Ok(Self { account_id: file.account_id, private_key: file.private_key.into() })
    }

    pub fn into_key_material(self) -> Result<KeyMaterial, CredentialsError> {
        Ok(KeyMaterial::from_secret_key(self.account_id, &self.private_key)?)
    }
}
