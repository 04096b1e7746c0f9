//! AEAD primitives: the extension trait for registered modes and the
//! RustCrypto-backed seal/open helpers used by the built-in modes.
//!
//! Output of every `encrypt` is `ciphertext || tag`; `decrypt` expects the
//! same concatenation. Authentication failure, a wrong-sized key and a
//! wrong-sized nonce are all reported as `CeffError::Crypto`.

use aes_gcm::aead::{generic_array::typenum::Unsigned, Aead, AeadCore, AeadInPlace, KeyInit, Payload};
use ceff_core::{CeffError, CeffResult};

use crate::KEY_SIZE;

/// An AEAD algorithm that can be registered under a custom mode byte.
///
/// Implementations must be stateless with respect to the key: the key is
/// passed to every call.
pub trait AeadCipher: Send + Sync + std::fmt::Debug {
    /// Algorithm name used in error messages and logs.
    fn name(&self) -> &str;

    fn tag_length(&self) -> usize;

    fn nonce_length(&self) -> usize;

    /// Key validity predicate. Defaults to "exactly 32 bytes".
    fn validate_key(&self, key: &[u8]) -> CeffResult<()> {
        check_key_length(self.name(), key)
    }

    fn encrypt(&self, plaintext: &[u8], aad: &[u8], key: &[u8], nonce: &[u8]) -> CeffResult<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8], aad: &[u8], key: &[u8], nonce: &[u8]) -> CeffResult<Vec<u8>>;
}

pub(crate) fn check_key_length(algorithm: &str, key: &[u8]) -> CeffResult<()> {
    if key.len() != KEY_SIZE {
        return Err(CeffError::crypto(
            algorithm,
            format!("invalid key length: {} bytes (expected {KEY_SIZE})", key.len()),
        ));
    }
    Ok(())
}

fn init_cipher<C: KeyInit + AeadCore>(algorithm: &str, key: &[u8], nonce: &[u8]) -> CeffResult<C> {
    let expected = <C as AeadCore>::NonceSize::to_usize();
    if nonce.len() != expected {
        return Err(CeffError::crypto(
            algorithm,
            format!("invalid nonce length: {} bytes (expected {expected})", nonce.len()),
        ));
    }
    check_key_length(algorithm, key)?;
    C::new_from_slice(key).map_err(|_| CeffError::crypto(algorithm, "invalid key length"))
}

/// Encrypt with any RustCrypto AEAD, returning `ciphertext || tag`.
pub(crate) fn seal<C: KeyInit + Aead>(
    algorithm: &str,
    plaintext: &[u8],
    aad: &[u8],
    key: &[u8],
    nonce: &[u8],
) -> CeffResult<Vec<u8>> {
    let cipher = init_cipher::<C>(algorithm, key, nonce)?;
    cipher
        .encrypt(
            aes_gcm::aead::Nonce::<C>::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CeffError::crypto(algorithm, format!("encryption failed: {e}")))
}

/// Decrypt and authenticate `ciphertext || tag` with any RustCrypto AEAD.
pub(crate) fn open<C: KeyInit + Aead>(
    algorithm: &str,
    ciphertext: &[u8],
    aad: &[u8],
    key: &[u8],
    nonce: &[u8],
) -> CeffResult<Vec<u8>> {
    let cipher = init_cipher::<C>(algorithm, key, nonce)?;
    cipher
        .decrypt(
            aes_gcm::aead::Nonce::<C>::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            CeffError::crypto(
                algorithm,
                "authentication failed: wrong key, corrupted data, or mismatched associated data",
            )
        })
}

/// Decrypt and authenticate `ciphertext || tag` into `out`, reusing its
/// allocation. `out` is left empty on failure.
pub(crate) fn open_into<C: KeyInit + AeadInPlace>(
    algorithm: &str,
    ciphertext: &[u8],
    aad: &[u8],
    key: &[u8],
    nonce: &[u8],
    out: &mut Vec<u8>,
) -> CeffResult<()> {
    out.clear();
    let cipher = init_cipher::<C>(algorithm, key, nonce)?;
    out.extend_from_slice(ciphertext);
    let result = cipher.decrypt_in_place(aes_gcm::aead::Nonce::<C>::from_slice(nonce), aad, out);
    if result.is_err() {
        out.clear();
        return Err(CeffError::crypto(
            algorithm,
            "authentication failed: wrong key, corrupted data, or mismatched associated data",
        ));
    }
    Ok(())
}
