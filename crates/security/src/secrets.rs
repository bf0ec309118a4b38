//! Credential encryption with AES-256-GCM.
//!
//! Payload format is `"<iv>:<tag>:<ciphertext>"`, each part lowercase hex.
//! The IV is 96 random bits drawn fresh for every call.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use persona_core::error::VaultError;
use sha2::{Digest, Sha256};

/// IV length in bytes.
pub const IV_LEN: usize = 12;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Encrypts and decrypts credential payloads under one master key.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Build a cipher from raw key bytes. Fails unless the key is 32 bytes.
    pub fn from_key(key: &[u8]) -> Result<Self, VaultError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            VaultError::Encryption(format!(
                "cipher key must be {KEY_LEN} bytes, got {}",
                key.len()
            ))
        })?;
        Ok(Self { cipher })
    }

    /// Build a cipher from configured key material.
    ///
    /// 64 hex characters are used as the raw key; anything else is treated
    /// as a passphrase and hashed with SHA-256.
    pub fn from_master_key(master_key: &str) -> Result<Self, VaultError> {
        let master_key = master_key.trim();
        if master_key.is_empty() {
            return Err(VaultError::Encryption("master key is empty".into()));
        }

        if master_key.len() == KEY_LEN * 2 {
            if let Ok(raw) = hex::decode(master_key) {
                return Self::from_key(&raw);
            }
        }

        Self::from_key(&derive_key(master_key))
    }

    /// Encrypt a plaintext secret into an `iv:tag:ciphertext` payload.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let iv = generate_iv();
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| VaultError::Encryption("AES-GCM seal failed".into()))?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt an `iv:tag:ciphertext` payload.
    ///
    /// Malformed payloads, tampered tags, and wrong keys all surface as
    /// [`VaultError::Decryption`]; wrong plaintext is never returned.
    pub fn decrypt(&self, payload: &str) -> Result<String, VaultError> {
        let parts: Vec<&str> = payload.split(':').collect();
        let [iv_hex, tag_hex, ciphertext_hex] = parts.as_slice() else {
            return Err(VaultError::Decryption(format!(
                "expected 3 colon-separated parts, got {}",
                parts.len()
            )));
        };

        let iv = decode_part("iv", iv_hex)?;
        let tag = decode_part("auth tag", tag_hex)?;
        let ciphertext = decode_part("ciphertext", ciphertext_hex)?;

        if iv.len() != IV_LEN {
            return Err(VaultError::Decryption(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::Decryption(format!(
                "auth tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| {
                VaultError::Decryption("authentication failed (tampered payload or wrong key)".into())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| VaultError::Decryption("invalid UTF-8 after decryption".into()))
    }
}

fn decode_part(name: &str, part: &str) -> Result<Vec<u8>, VaultError> {
    hex::decode(part).map_err(|e| VaultError::Decryption(format!("{name} is not valid hex: {e}")))
}

/// Derive a 32-byte key from a passphrase.
fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Generate a random IV.
fn generate_iv() -> [u8; IV_LEN] {
    use rand::Rng;
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill(&mut iv[..]);
    iv
}
