use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use thiserror::Error;

const NONCE_SIZE: usize = 12; // AES-GCM standard nonce size

/// Marks a stored value as ciphertext produced by `EncryptionService::encrypt_str`.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// AES-256-GCM for organisation secrets and channel signing keys.
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Creates a service from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, EncryptionError> {
        Ok(Self {
            cipher: Aes256Gcm::new_from_slice(key)
                .map_err(|_| EncryptionError::InvalidKey("key must be 32 bytes".to_string()))?,
        })
    }

    /// Creates a service from a hex-encoded 32-byte key, as kept in the environment.
    pub fn from_hex(key_hex: &str) -> Result<Self, EncryptionError> {
        let key_bytes = hex::decode(key_hex.trim())
            .map_err(|e| EncryptionError::InvalidKey(format!("invalid hex: {e}")))?;
        Self::new(&key_bytes)
    }

    /// Prepends a 12-byte nonce to the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Assumes the first 12 bytes are the nonce.
    pub fn decrypt(&self, encrypted_data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if encrypted_data.len() < NONCE_SIZE {
            return Err(EncryptionError::DecryptionFailed(
                "too short to contain a nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = encrypted_data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
    }

    /// Encrypts to the `enc:v1:<hex>` text form used in the database.
    pub fn encrypt_str(&self, plain_text: &str) -> Result<String, EncryptionError> {
        let encrypted = self.encrypt(plain_text.as_bytes())?;
        Ok(format!("{ENCRYPTED_PREFIX}{}", hex::encode(encrypted)))
    }

    /// Decrypts an `enc:v1:` value. Values without the prefix predate encryption
    /// and are returned unchanged.
    pub fn decrypt_str(&self, stored: &str) -> Result<String, EncryptionError> {
        let Some(cipher_hex) = stored.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(stored.to_string());
        };
        let encrypted = hex::decode(cipher_hex)
            .map_err(|e| EncryptionError::DecryptionFailed(format!("invalid hex: {e}")))?;
        let decrypted = self.decrypt(&encrypted)?;
        String::from_utf8(decrypted)
            .map_err(|e| EncryptionError::DecryptionFailed(format!("invalid UTF-8: {e}")))
    }
}

pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}
