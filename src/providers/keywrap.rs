//! AES Key Wrap (NIST SP 800-38F) — wraps the archive's random
//! content-encryption key under the password-derived key-encryption key so
//! the CEK itself never appears on disk or in the encryption block in the
//! clear.

use aes_kw::KekAes256;

use crate::error::{ApackError, Result};

pub fn wrap_key(kek: &[u8; 32], cek: &[u8]) -> Result<Vec<u8>> {
    let kek = KekAes256::from(*kek);
    kek.wrap_vec(cek).map_err(|_| ApackError::Crypto)
}

pub fn unwrap_key(kek: &[u8; 32], wrapped: &[u8]) -> Result<Vec<u8>> {
    let kek = KekAes256::from(*kek);
    // A failure here must look identical to a wrong password further up the
    // call chain: AES key wrap's own integrity check and a wrong KEK both
    // surface as this single variant.
    kek.unwrap_vec(wrapped).map_err(|_| ApackError::Crypto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_round_trips() {
        let kek = [5u8; 32];
        let cek = [9u8; 32];
        let wrapped = wrap_key(&kek, &cek).unwrap();
        let unwrapped = unwrap_key(&kek, &wrapped).unwrap();
        assert_eq!(unwrapped, cek);
    }

    #[test]
    fn wrong_kek_is_rejected() {
        let kek = [5u8; 32];
        let wrong_kek = [6u8; 32];
        let cek = [9u8; 32];
        let wrapped = wrap_key(&kek, &cek).unwrap();
        let err = unwrap_key(&wrong_kek, &wrapped).unwrap_err();
        assert!(matches!(err, ApackError::Crypto));
    }
}
