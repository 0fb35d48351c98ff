//! Crypto envelope: turns a password into the archive's content-encryption
//! key, and back. A random CEK is generated per archive; it is what
//! actually encrypts chunk bodies. The CEK is never stored directly —
//! only wrapped under a key-encryption key derived from the caller's
//! password, so rotating a password never requires re-encrypting any
//! chunk, only re-wrapping the CEK.

use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{ApackError, Result};
use crate::format::{CipherAlgoId, EncryptionBlock, KdfAlgoId, KdfParams};
use crate::providers::encryption::EncryptionProvider;
use crate::providers::kdf::KdfProvider;
use crate::providers::keywrap;

pub const CEK_LEN: usize = 32;

/// Generates a fresh random content-encryption key.
pub fn generate_cek() -> [u8; CEK_LEN] {
    let mut cek = [0u8; CEK_LEN];
    rand::rngs::OsRng.fill_bytes(&mut cek);
    cek
}

/// Derives a key-encryption key from `password`, zeroizing the password
/// copy this function took ownership of as soon as derivation completes —
/// regardless of whether it succeeded.
fn derive_kek(kdf: &dyn KdfProvider, mut password: Vec<u8>, salt: &[u8], params: &KdfParams) -> Result<[u8; 32]> {
    let result = kdf.derive(&password, salt, params);
    password.zeroize();
    result
}

/// Builds the encryption block written once per archive: derives a KEK from
/// `password`, wraps `cek` under it, and records everything a future reader
/// needs to reverse the process (algorithm IDs, KDF params, salt, wrapped
/// key). The KEK itself is never stored.
pub fn build_encryption_block(
    kdf_algo: KdfAlgoId,
    kdf: &dyn KdfProvider,
    cipher_algo: CipherAlgoId,
    password: &str,
    cek: &[u8; CEK_LEN],
    params: KdfParams,
) -> Result<EncryptionBlock> {
    let salt = kdf.generate_salt();
    let kek = derive_kek(kdf, password.as_bytes().to_vec(), &salt, &params)?;
    let wrapped_cek = keywrap::wrap_key(&kek, cek)?;

    Ok(EncryptionBlock {
        kdf_algo,
        cipher_algo,
        kdf_params: params,
        salt,
        wrapped_cek,
        wrapped_key_tag: Vec::new(),
    })
}

/// Reverses `build_encryption_block`: derives the same KEK from `password`
/// and the stored salt/params, then unwraps the CEK. Any failure along the
/// way — wrong password or a tampered wrapped key — surfaces as the same
/// `ApackError::Crypto`, by design (see error.rs).
pub fn open_encryption_block(
    block: &EncryptionBlock,
    kdf: &dyn KdfProvider,
    password: &str,
) -> Result<[u8; CEK_LEN]> {
    let kek = derive_kek(kdf, password.as_bytes().to_vec(), &block.salt, &block.kdf_params)?;
    let unwrapped = keywrap::unwrap_key(&kek, &block.wrapped_cek)?;
    if unwrapped.len() != CEK_LEN {
        return Err(ApackError::Crypto);
    }
    let mut cek = [0u8; CEK_LEN];
    cek.copy_from_slice(&unwrapped);
    Ok(cek)
}

/// Resolves an `EncryptionProvider` from the cipher algorithm ID recorded in
/// an encryption block, so writer and reader always agree on which AEAD is
/// in play without re-negotiating it.
pub fn cipher_provider_for(
    registry: &crate::providers::Registry<dyn EncryptionProvider>,
    cipher_algo: CipherAlgoId,
) -> Result<std::sync::Arc<dyn EncryptionProvider>> {
    let numeric_id = cipher_algo as u8;
    registry
        .get_by_numeric_id(numeric_id)
        .ok_or_else(|| ApackError::format(format!("no encryption provider registered for numeric id {numeric_id}")))
}

pub fn kdf_provider_for(
    registry: &crate::providers::Registry<dyn KdfProvider>,
    kdf_algo: KdfAlgoId,
) -> Result<std::sync::Arc<dyn KdfProvider>> {
    let numeric_id = kdf_algo as u8;
    registry
        .get_by_numeric_id(numeric_id)
        .ok_or_else(|| ApackError::format(format!("no KDF provider registered for numeric id {numeric_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::kdf::Pbkdf2HmacSha256Provider;

    #[test]
    fn round_trips_with_correct_password() {
        let kdf = Pbkdf2HmacSha256Provider;
        let cek = generate_cek();
        let params = KdfParams { iterations: 1000, memory_kib: 0, parallelism: 1 };
        let block = build_encryption_block(
            KdfAlgoId::Pbkdf2HmacSha256,
            &kdf,
            CipherAlgoId::Aes256Gcm,
            "hunter2",
            &cek,
            params,
        )
        .unwrap();
        let recovered = open_encryption_block(&block, &kdf, "hunter2").unwrap();
        assert_eq!(recovered, cek);
    }

    #[test]
    fn wrong_password_is_rejected_without_detail() {
        let kdf = Pbkdf2HmacSha256Provider;
        let cek = generate_cek();
        let params = KdfParams { iterations: 1000, memory_kib: 0, parallelism: 1 };
        let block = build_encryption_block(
            KdfAlgoId::Pbkdf2HmacSha256,
            &kdf,
            CipherAlgoId::Aes256Gcm,
            "hunter2",
            &cek,
            params,
        )
        .unwrap();
        let err = open_encryption_block(&block, &kdf, "wrong password").unwrap_err();
        assert!(matches!(err, ApackError::Crypto));
    }
}
