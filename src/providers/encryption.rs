//! AEAD encryption providers. Every provider produces and consumes the same
//! wire shape regardless of cipher: `nonce || ciphertext || tag`, mirroring
//! the nonce-prepended-to-ciphertext convention used throughout the corpus
//! this engine is grounded on.

use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AesGcmOsRng};
use aes_gcm::{Aes256Gcm, Nonce as AesGcmNonce};
use chacha20poly1305::aead::OsRng as ChaChaOsRng;
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::{ApackError, Result};
use crate::providers::Registry;

pub trait EncryptionProvider: Send + Sync {
    fn id(&self) -> &'static str;
    fn numeric_id(&self) -> u8;
    fn key_size(&self) -> usize;
    fn nonce_size(&self) -> usize;
    fn tag_size(&self) -> usize;

    /// Encrypts `plaintext` under `key`, returning `nonce || ciphertext || tag`.
    fn encrypt_block(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts a `nonce || ciphertext || tag` blob produced by
    /// `encrypt_block`. Any failure — truncated input, wrong key, flipped
    /// tag bit — collapses to `ApackError::Crypto` with no further detail.
    fn decrypt_block(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;
}

pub struct Aes256GcmProvider;

impl EncryptionProvider for Aes256GcmProvider {
    fn id(&self) -> &'static str {
        "aes-256-gcm"
    }
    fn numeric_id(&self) -> u8 {
        1
    }
    fn key_size(&self) -> usize {
        32
    }
    fn nonce_size(&self) -> usize {
        12
    }
    fn tag_size(&self) -> usize {
        16
    }

    fn encrypt_block(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ApackError::Crypto)?;
        let nonce = Aes256Gcm::generate_nonce(&mut AesGcmOsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| ApackError::Crypto)?;
        let mut out = Vec::with_capacity(self.nonce_size() + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt_block(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < self.nonce_size() + self.tag_size() {
            return Err(ApackError::Crypto);
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ApackError::Crypto)?;
        let nonce = AesGcmNonce::from_slice(&data[..self.nonce_size()]);
        cipher.decrypt(nonce, &data[self.nonce_size()..]).map_err(|_| ApackError::Crypto)
    }
}

pub struct ChaCha20Poly1305Provider;

impl EncryptionProvider for ChaCha20Poly1305Provider {
    fn id(&self) -> &'static str {
        "chacha20poly1305"
    }
    fn numeric_id(&self) -> u8 {
        2
    }
    fn key_size(&self) -> usize {
        32
    }
    fn nonce_size(&self) -> usize {
        12
    }
    fn tag_size(&self) -> usize {
        16
    }

    fn encrypt_block(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        use chacha20poly1305::aead::{Aead as ChaChaAead, AeadCore as ChaChaAeadCore, KeyInit as ChaChaKeyInit};
        let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| ApackError::Crypto)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut ChaChaOsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| ApackError::Crypto)?;
        let mut out = Vec::with_capacity(self.nonce_size() + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt_block(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        use chacha20poly1305::aead::{Aead as ChaChaAead, KeyInit as ChaChaKeyInit};
        if data.len() < self.nonce_size() + self.tag_size() {
            return Err(ApackError::Crypto);
        }
        let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| ApackError::Crypto)?;
        let nonce = chacha20poly1305::Nonce::from_slice(&data[..self.nonce_size()]);
        cipher.decrypt(nonce, &data[self.nonce_size()..]).map_err(|_| ApackError::Crypto)
    }
}

pub fn build_default_registry() -> Registry<dyn EncryptionProvider> {
    let mut reg = Registry::new();
    reg.register("aes-256-gcm", 1, Arc::new(Aes256GcmProvider));
    reg.register("chacha20poly1305", 2, Arc::new(ChaCha20Poly1305Provider));
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_gcm_round_trips() {
        let provider = Aes256GcmProvider;
        let key = [7u8; 32];
        let plaintext = b"confidential entry body";
        let sealed = provider.encrypt_block(&key, plaintext).unwrap();
        let opened = provider.decrypt_block(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn chacha_round_trips() {
        let provider = ChaCha20Poly1305Provider;
        let key = [9u8; 32];
        let plaintext = b"another confidential entry body";
        let sealed = provider.encrypt_block(&key, plaintext).unwrap();
        let opened = provider.decrypt_block(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let provider = Aes256GcmProvider;
        let key = [3u8; 32];
        let mut sealed = provider.encrypt_block(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        let err = provider.decrypt_block(&key, &sealed).unwrap_err();
        assert!(matches!(err, ApackError::Crypto));
    }
}
