//! At-rest encryption of the API credential.
//!
//! The key is derived from the caller's context id (the vault path) with
//! PBKDF2-HMAC-SHA256, so a settings file copied to another vault cannot be
//! decrypted there. Blobs are `base64(nonce || ciphertext)` with a 12-byte
//! random nonce, byte-compatible with credentials written by the Snipd
//! Obsidian plugin.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecretCipher,
};
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

const KEY_MATERIAL_SUFFIX: &str = "snipd-obsidian-plugin";
const SALT: &[u8] = b"snipd-secure-storage-salt-v1";
const DEFAULT_ITERATIONS: u32 = 100_000;
const NONCE_LEN: usize = 12;

/// PBKDF2 + AES-256-GCM implementation of [`SecretCipher`].
#[derive(Debug, Clone)]
pub struct AesGcmSecretCipher {
    iterations: u32,
}

impl AesGcmSecretCipher {
    pub fn new() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Override the PBKDF2 round count. Blobs only decrypt with the same count.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    async fn cipher(&self, context_id: &str) -> Result<Aes256Gcm> {
        let password = format!("{context_id}{KEY_MATERIAL_SUFFIX}");
        let rounds = self.iterations;

        let key = tokio::task::spawn_blocking(move || {
            let mut key = [0u8; 32];
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), SALT, rounds, &mut key);
            key
        })
        .await
        .map_err(|e| BridgeError::Crypto(format!("key derivation task failed: {e}")))?;

        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| BridgeError::Crypto(format!("cipher init failed: {e}")))
    }
}

impl Default for AesGcmSecretCipher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretCipher for AesGcmSecretCipher {
    async fn encrypt(&self, plaintext: &str, context_id: &str) -> Result<String> {
        let cipher = self.cipher(context_id).await?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| BridgeError::Crypto(format!("encrypt secret: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        debug!(bytes = payload.len(), "Encrypted secret");
        Ok(BASE64.encode(payload))
    }

    async fn decrypt(&self, blob: &str, context_id: &str) -> Result<String> {
        let data = BASE64
            .decode(blob.trim())
            .map_err(|e| BridgeError::Crypto(format!("decode secret: {e}")))?;

        if data.len() <= NONCE_LEN {
            return Err(BridgeError::Crypto(
                "stored secret payload too small".into(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = self.cipher(context_id).await?;

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| BridgeError::Crypto(format!("decrypt secret: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| BridgeError::Crypto(format!("secret is not UTF-8: {e}")))
    }
}
