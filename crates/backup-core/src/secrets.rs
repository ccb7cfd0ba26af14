//! At-rest encryption for secret material stored alongside target and
//! destination config (passwords, private keys, service-account JSON).
//!
//! The key is SHA-256 of the process-wide master key passphrase; each
//! value gets a fresh random 12-byte nonce. Stored as `base64(nonce ||
//! ciphertext)` in the `config_encrypted` column.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{BackupError, Result};

const NONCE_LEN: usize = 12;

pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        let key_bytes = hasher.finalize();
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, value: &serde_json::Value) -> Result<String> {
        let plaintext = serde_json::to_vec(value)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| BackupError::Crypto(format!("secret encryption failed: {e}")))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    pub fn decrypt(&self, blob: &str) -> Result<serde_json::Value> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(blob)
            .map_err(|e| BackupError::Crypto(format!("invalid secret encoding: {e}")))?;
        if bytes.len() < NONCE_LEN {
            return Err(BackupError::Crypto("truncated secret blob".into()));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| BackupError::Crypto("secret decryption failed: wrong master key or corrupted data".into()))?;
        serde_json::from_slice(&plaintext).map_err(BackupError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_secret_value() {
        let cipher = SecretCipher::from_passphrase("correct horse battery staple");
        let value = serde_json::json!({"password": "hunter2"});
        let blob = cipher.encrypt(&value).unwrap();
        let decrypted = cipher.decrypt(&blob).unwrap();
        assert_eq!(decrypted, value);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = SecretCipher::from_passphrase("key-a");
        let b = SecretCipher::from_passphrase("key-b");
        let blob = a.encrypt(&serde_json::json!({"password": "x"})).unwrap();
        assert!(b.decrypt(&blob).is_err());
    }
}
