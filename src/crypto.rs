//! Secret codec using AES-256-GCM
//!
//! Encrypts and decrypts credential secrets stored in the database, using
//! AES-256-GCM with additional authenticated data (AAD) binding each blob to
//! its owning user and provider. Tampering is always detected: there is no
//! plaintext fallback for unrecognized payloads.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::providers::Provider;
use crate::secrets::{CredentialSecret, CredentialType};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Codec error types
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// Secure wrapper for the process-wide encryption key with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for the codec key
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new codec key from raw bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.len() != 32 {
            return Err(CodecError::InvalidKeyLength(bytes.len()));
        }
        Ok(ZeroizingKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(key: &CryptoKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?;

    // Version byte, then nonce, then ciphertext+tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM.
///
/// Unknown version bytes and truncated blobs are format errors; GCM tag
/// mismatches (tampering, wrong AAD, wrong key) are decryption failures.
pub fn decrypt_bytes(key: &CryptoKey, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
    if ciphertext.is_empty() {
        return Err(CodecError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CodecError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CodecError::DecryptionFailed(e.to_string()))
}

/// AAD binding a secret blob to its owning user and provider, so a blob
/// copied onto another row fails authentication.
fn secret_aad(user_id: &Uuid, provider: Provider) -> String {
    format!("{}|{}", user_id, provider)
}

/// Encrypt a credential secret for storage
pub fn encrypt_secret(
    key: &CryptoKey,
    user_id: &Uuid,
    secret: &CredentialSecret,
) -> Result<Vec<u8>, CodecError> {
    let aad = secret_aad(user_id, secret.provider());
    let plaintext = serde_json::to_vec(&secret.to_json())
        .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?;
    encrypt_bytes(key, aad.as_bytes(), &plaintext)
}

/// Decrypt a stored blob back into its typed secret shape
pub fn decrypt_secret(
    key: &CryptoKey,
    user_id: &Uuid,
    provider: Provider,
    credential_type: CredentialType,
    ciphertext: &[u8],
) -> Result<CredentialSecret, CodecError> {
    let aad = secret_aad(user_id, provider);
    let plaintext = decrypt_bytes(key, aad.as_bytes(), ciphertext)?;
    let value: serde_json::Value = serde_json::from_slice(&plaintext)
        .map_err(|e| CodecError::DecryptionFailed(format!("invalid JSON payload: {}", e)))?;
    CredentialSecret::from_json(credential_type, provider, &value)
        .map_err(|e| CodecError::DecryptionFailed(format!("unexpected secret shape: {}", e)))
}
