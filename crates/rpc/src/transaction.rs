//! Binary transaction encoding for the settlement network.
//!
//! Only the function-call action is modelled; the enum tag written for it
//! matches its position in the network's action list.

use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use borsh::BorshSerialize;
use intentdesk_core::errors::IntentError;
use intentdesk_core::signer::KeyMaterial;
use sha2::{Digest, Sha256};

pub const ED25519_KEY_TYPE: u8 = 0;
const FUNCTION_CALL_ACTION_TAG: u8 = 2;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize)]
pub struct PublicKey {
    pub key_type: u8,
    pub data: [u8; 32],
}

impl PublicKey {
    pub fn ed25519(data: [u8; 32]) -> Self {
        Self { key_type: ED25519_KEY_TYPE, data }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize)]
pub struct FunctionCallAction {
    pub method_name: String,
    pub args: Vec<u8>,
    pub gas: u64,
    pub deposit: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    FunctionCall(FunctionCallAction),
}

impl BorshSerialize for Action {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Self::FunctionCall(call) => {
                FUNCTION_CALL_ACTION_TAG.serialize(writer)?;
                call.serialize(writer)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize)]
pub struct Transaction {
    pub signer_id: String,
    pub public_key: PublicKey,
    pub nonce: u64,
    pub receiver_id: String,
    pub block_hash: [u8; 32],
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize)]
pub struct Signature {
    pub key_type: u8,
    pub data: [u8; 64],
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
}

impl Transaction {
    pub fn encode(&self) -> Result<Vec<u8>, IntentError> {
        borsh::to_vec(self).map_err(|error| IntentError::Serialization(error.to_string()))
    }

    /// SHA-256 of the encoded transaction; this is what gets signed and what
    /// the network reports as the transaction hash.
    pub fn hash(&self) -> Result<[u8; 32], IntentError> {
        Ok(Sha256::digest(self.encode()?).into())
    }

    pub fn sign(self, key: &KeyMaterial) -> Result<SignedTransaction, IntentError> {
        let hash = self.hash()?;
        let signature = Signature { key_type: ED25519_KEY_TYPE, data: key.sign_bytes(&hash) };
        Ok(SignedTransaction { transaction: self, signature })
    }
}

impl SignedTransaction {
    /// Base64 envelope accepted by `broadcast_tx_commit`.
    pub fn to_base64(&self) -> Result<String, IntentError> {
        let bytes =
            borsh::to_vec(self).map_err(|error| IntentError::Serialization(error.to_string()))?;
        Ok(STANDARD.encode(bytes))
    }

    pub fn hash_base58(&self) -> Result<String, IntentError> {
        Ok(bs58::encode(self.transaction.hash()?).into_string())
    }
}

/// Decodes the base58 block hash reported by `view_access_key`.
pub fn decode_block_hash(encoded: &str) -> Result<[u8; 32], IntentError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|error| IntentError::Serialization(format!("block hash: {error}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        IntentError::Serialization(format!("block hash has {} bytes, expected 32", bytes.len()))
    })
}
