//! Key-derivation providers. Each turns a password and a salt into a
//! 256-bit key-encryption key; the resulting KEK is used exactly once, to
//! wrap or unwrap the archive's random content-encryption key, and is
//! dropped (zeroized) immediately afterward.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{ApackError, Result};
use crate::format::KdfParams;
use crate::providers::Registry;

pub const SALT_LEN: usize = 16;

pub trait KdfProvider: Send + Sync {
    fn id(&self) -> &'static str;
    fn numeric_id(&self) -> u8;
    fn default_params(&self) -> KdfParams;

    fn generate_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Derives a 256-bit key. `password` is never retained by the caller
    /// past this call; see `crypto_envelope.rs` for where it is zeroized.
    fn derive(&self, password: &[u8], salt: &[u8], params: &KdfParams) -> Result<[u8; 32]>;
}

pub struct Argon2idProvider;

impl KdfProvider for Argon2idProvider {
    fn id(&self) -> &'static str {
        "argon2id"
    }
    fn numeric_id(&self) -> u8 {
        1
    }
    fn default_params(&self) -> KdfParams {
        KdfParams { iterations: 3, memory_kib: 64 * 1024, parallelism: 1 }
    }

    fn derive(&self, password: &[u8], salt: &[u8], params: &KdfParams) -> Result<[u8; 32]> {
        let argon_params = Params::new(params.memory_kib, params.iterations, params.parallelism, Some(32))
            .map_err(|_| ApackError::Crypto)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
        let mut out = [0u8; 32];
        argon2.hash_password_into(password, salt, &mut out).map_err(|_| ApackError::Crypto)?;
        Ok(out)
    }
}

pub struct Pbkdf2HmacSha256Provider;

impl KdfProvider for Pbkdf2HmacSha256Provider {
    fn id(&self) -> &'static str {
        "pbkdf2-hmac-sha256"
    }
    fn numeric_id(&self) -> u8 {
        2
    }
    fn default_params(&self) -> KdfParams {
        KdfParams { iterations: 600_000, memory_kib: 0, parallelism: 1 }
    }

    fn derive(&self, password: &[u8], salt: &[u8], params: &KdfParams) -> Result<[u8; 32]> {
        let mut out = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, params.iterations, &mut out);
        Ok(out)
    }
}

pub fn build_default_registry() -> Registry<dyn KdfProvider> {
    let mut reg = Registry::new();
    reg.register("argon2id", 1, Arc::new(Argon2idProvider));
    reg.register("pbkdf2-hmac-sha256", 2, Arc::new(Pbkdf2HmacSha256Provider));
    reg
}

/// Zeroizes a password buffer in place. A thin wrapper so call sites read
/// as an explicit security step rather than an incidental `drop`.
pub fn zeroize_password(password: &mut Vec<u8>) {
    password.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2id_is_deterministic_for_fixed_salt() {
        let provider = Argon2idProvider;
        let params = KdfParams { iterations: 2, memory_kib: 8 * 1024, parallelism: 1 };
        let salt = [1u8; SALT_LEN];
        let a = provider.derive(b"hunter2", &salt, &params).unwrap();
        let b = provider.derive(b"hunter2", &salt, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let provider = Pbkdf2HmacSha256Provider;
        let params = KdfParams { iterations: 1000, memory_kib: 0, parallelism: 1 };
        let salt = [2u8; SALT_LEN];
        let a = provider.derive(b"correct horse", &salt, &params).unwrap();
        let b = provider.derive(b"incorrect horse", &salt, &params).unwrap();
        assert_ne!(a, b);
    }
}
