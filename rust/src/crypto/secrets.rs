//! Authenticated credential vault built on ChaCha20-Poly1305.
//! Every credential is stored as nonce + ciphertext + auth tag so the
//! credentials file on disk never contains a plaintext value.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

const TAG_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
pub const MASTER_KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SecretVaultError {
    #[error("invalid master key length; expected {MASTER_KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("master key file unreadable: {0}")]
    KeySourceUnreadable(String),
    #[error("base64 decoding failed: {0}")]
    Base64DecodeFailed(String),
}

/// Serializable envelope for one encrypted credential. Values are base64
/// encoded so they sit directly inside the JSON credentials file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub nonce: String,
    pub ciphertext: String,
    pub tag: String,
}

/// Holds the master key used to seal and open credentials.
pub struct SecretVault {
    key: Key,
}

impl SecretVault {
    /// Builds a vault from raw key bytes.
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, SecretVaultError> {
        if key_bytes.len() != MASTER_KEY_LEN {
            return Err(SecretVaultError::InvalidKeyLength(key_bytes.len()));
        }
        let mut key = Key::default();
        key.copy_from_slice(key_bytes);
        Ok(Self { key })
    }

    /// Decodes a base64 master key, as stored in the master key variable or
    /// key file. Surrounding whitespace is ignored.
    pub fn from_base64(encoded: &str) -> Result<Self, SecretVaultError> {
        let mut decoded = STANDARD_NO_PAD
            .decode(encoded.trim().as_bytes())
            .map_err(|e| SecretVaultError::Base64DecodeFailed(format!("{e}")))?;
        let vault = Self::from_key_bytes(&decoded);
        decoded.zeroize();
        vault
    }

    /// Reads a base64-encoded master key from disk.
    pub fn from_key_file(path: &Path) -> Result<Self, SecretVaultError> {
        let content = fs::read_to_string(path)
            .map_err(|e| SecretVaultError::KeySourceUnreadable(format!("{}: {e}", path.display())))?;
        Self::from_base64(&content)
    }

    /// Produces a fresh random master key in the base64 form `from_base64` accepts.
    pub fn generate_key() -> String {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let encoded = STANDARD_NO_PAD.encode(bytes);
        bytes.zeroize();
        encoded
    }

    /// Seals a plaintext credential into a serializable envelope.
    pub fn encrypt_secret(&self, plaintext: &[u8]) -> Result<EncryptedSecret, SecretVaultError> {
        let cipher = ChaCha20Poly1305::new(&self.key);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

        let mut ciphertext_and_tag = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SecretVaultError::EncryptionFailed(format!("{e}")))?;
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(SecretVaultError::EncryptionFailed(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let tag_bytes = ciphertext_and_tag.split_off(ciphertext_and_tag.len() - TAG_SIZE);

        Ok(EncryptedSecret {
            nonce: STANDARD_NO_PAD.encode(nonce),
            ciphertext: STANDARD_NO_PAD.encode(ciphertext_and_tag),
            tag: STANDARD_NO_PAD.encode(tag_bytes),
        })
    }

    /// Opens an envelope back into plaintext bytes.
    pub fn decrypt_secret(&self, secret: &EncryptedSecret) -> Result<Vec<u8>, SecretVaultError> {
        let decode = |field: &str| {
            STANDARD_NO_PAD
                .decode(field.as_bytes())
                .map_err(|e| SecretVaultError::Base64DecodeFailed(format!("{e}")))
        };
        let nonce_bytes = decode(&secret.nonce)?;
        let mut combined = decode(&secret.ciphertext)?;
        combined.extend_from_slice(&decode(&secret.tag)?);

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(SecretVaultError::DecryptionFailed(
                "nonce length mismatch".to_string(),
            ));
        }

        let cipher = ChaCha20Poly1305::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), combined.as_ref())
            .map_err(|e| SecretVaultError::DecryptionFailed(format!("{e}")))
    }
}

impl Drop for SecretVault {
    fn drop(&mut self) {
        self.key.as_mut_slice().zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::{EncryptedSecret, SecretVault};
    use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn seals_and_opens_credentials() {
        let vault = SecretVault::from_key_bytes(&[42u8; 32]).expect("key should be valid");
        let sealed = vault
            .encrypt_secret(b"registry-password")
            .expect("encryption should succeed");
        assert_ne!(sealed.ciphertext, STANDARD_NO_PAD.encode(b"registry-password"));
        let opened = vault.decrypt_secret(&sealed).expect("decryption should succeed");
        assert_eq!(opened, b"registry-password");
    }

    #[test]
    fn generated_keys_are_accepted() {
        let key = SecretVault::generate_key();
        let vault = SecretVault::from_base64(&key).expect("generated key should decode");
        let sealed = vault.encrypt_secret(b"payload").expect("encrypt");
        assert_eq!(vault.decrypt_secret(&sealed).expect("decrypt"), b"payload");
        assert_ne!(key, SecretVault::generate_key());
    }

    #[test]
    fn reads_key_file_with_trailing_newline() {
        let key = SecretVault::generate_key();
        let file = NamedTempFile::new().expect("temp file");
        fs::write(file.path(), format!("{key}\n")).expect("write key");
        assert!(SecretVault::from_key_file(file.path()).is_ok());
    }

    #[test]
    fn rejects_short_keys() {
        let err = SecretVault::from_key_bytes(&[1u8; 16]).err().expect("short key must fail");
        assert!(format!("{err}").contains("invalid master key length"));
    }

    #[test]
    fn wrong_key_cannot_open() {
        let sealed = SecretVault::from_key_bytes(&[3u8; 32])
            .expect("valid key")
            .encrypt_secret(b"token")
            .expect("encrypt");
        let other = SecretVault::from_key_bytes(&[4u8; 32]).expect("valid key");
        let err = other.decrypt_secret(&sealed).unwrap_err();
        assert!(format!("{err}").contains("decryption failed"));
    }

    #[test]
    fn rejects_truncated_nonce() {
        let vault = SecretVault::from_key_bytes(&[9u8; 32]).expect("valid key");
        let mut sealed = vault.encrypt_secret(b"token").expect("encrypt");
        assert_eq!(STANDARD_NO_PAD.decode(&sealed.nonce).expect("nonce").len(), 12);
        sealed.nonce = STANDARD_NO_PAD.encode([0u8; 8]);
        let err = vault.decrypt_secret(&sealed).unwrap_err();
        assert!(format!("{err}").contains("nonce length mismatch"));
    }

    #[test]
    fn handles_invalid_ciphertext() {
        let vault = SecretVault::from_key_bytes(&[7u8; 32]).expect("valid key");
        let bogus = EncryptedSecret {
            nonce: STANDARD_NO_PAD.encode([0u8; 12]),
            ciphertext: STANDARD_NO_PAD.encode([0u8; 5]),
            tag: STANDARD_NO_PAD.encode([0u8; 16]),
        };
        let err = vault.decrypt_secret(&bogus).unwrap_err();
        assert!(format!("{err}").contains("decryption failed"));
    }
}
