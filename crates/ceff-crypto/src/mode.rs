//! Mode: the AEAD algorithm descriptor recorded in a file header.

use std::fmt;
use std::sync::Arc;

use aes_gcm::Aes256Gcm;
use ceff_core::{CeffError, CeffResult};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;

use crate::aead::{self, check_key_length, AeadCipher};
use crate::{NONCE_SIZE, TAG_SIZE};

/// An immutable AEAD mode. Built-in modes are closed variants; registered
/// modes carry their implementation behind `AeadCipher`.
#[derive(Clone)]
pub enum Mode {
    /// Identity transform with zero-length nonce and tag.
    Null,
    Aes256Gcm,
    ChaCha20Poly1305,
    Custom { id: u8, cipher: Arc<dyn AeadCipher> },
}

impl Mode {
    pub const NULL_ID: u8 = 0;
    pub const AES_256_GCM_ID: u8 = 1;
    pub const CHACHA20_POLY1305_ID: u8 = 2;

    /// The mode byte written to the file header.
    pub fn id(&self) -> u8 {
        match self {
            Self::Null => Self::NULL_ID,
            Self::Aes256Gcm => Self::AES_256_GCM_ID,
            Self::ChaCha20Poly1305 => Self::CHACHA20_POLY1305_ID,
            Self::Custom { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Null => "NULL",
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            Self::Custom { cipher, .. } => cipher.name(),
        }
    }

    pub fn tag_length(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => TAG_SIZE,
            Self::Custom { cipher, .. } => cipher.tag_length(),
        }
    }

    pub fn nonce_length(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => NONCE_SIZE,
            Self::Custom { cipher, .. } => cipher.nonce_length(),
        }
    }

    pub fn validate_key(&self, key: &[u8]) -> CeffResult<()> {
        match self {
            Self::Custom { cipher, .. } => cipher.validate_key(key),
            _ => check_key_length(self.name(), key),
        }
    }

    /// Encrypt `plaintext`, returning `ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8], key: &[u8], nonce: &[u8]) -> CeffResult<Vec<u8>> {
        match self {
            Self::Null => {
                self.check_null_nonce(nonce)?;
                Ok(plaintext.to_vec())
            }
            Self::Aes256Gcm => aead::seal::<Aes256Gcm>(self.name(), plaintext, aad, key, nonce),
            Self::ChaCha20Poly1305 => {
                aead::seal::<ChaCha20Poly1305>(self.name(), plaintext, aad, key, nonce)
            }
            Self::Custom { cipher, .. } => {
                self.check_nonce(nonce)?;
                cipher.encrypt(plaintext, aad, key, nonce)
            }
        }
    }

    /// Authenticate and decrypt `ciphertext || tag`.
    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8], key: &[u8], nonce: &[u8]) -> CeffResult<Vec<u8>> {
        self.check_sealed_length(ciphertext)?;
        match self {
            Self::Null => {
                self.check_null_nonce(nonce)?;
                Ok(ciphertext.to_vec())
            }
            Self::Aes256Gcm => aead::open::<Aes256Gcm>(self.name(), ciphertext, aad, key, nonce),
            Self::ChaCha20Poly1305 => {
                aead::open::<ChaCha20Poly1305>(self.name(), ciphertext, aad, key, nonce)
            }
            Self::Custom { cipher, .. } => {
                self.check_nonce(nonce)?;
                cipher.decrypt(ciphertext, aad, key, nonce)
            }
        }
    }

    /// Like `decrypt`, but writes the plaintext into `out` (replacing its
    /// contents) so a caller decrypting many records can keep one buffer.
    /// `out` is left empty on failure.
    pub fn decrypt_into(
        &self,
        ciphertext: &[u8],
        aad: &[u8],
        key: &[u8],
        nonce: &[u8],
        out: &mut Vec<u8>,
    ) -> CeffResult<()> {
        out.clear();
        self.check_sealed_length(ciphertext)?;
        match self {
            Self::Null => {
                self.check_null_nonce(nonce)?;
                out.extend_from_slice(ciphertext);
                Ok(())
            }
            Self::Aes256Gcm => aead::open_into::<Aes256Gcm>(self.name(), ciphertext, aad, key, nonce, out),
            Self::ChaCha20Poly1305 => {
                aead::open_into::<ChaCha20Poly1305>(self.name(), ciphertext, aad, key, nonce, out)
            }
            Self::Custom { cipher, .. } => {
                self.check_nonce(nonce)?;
                out.extend_from_slice(&cipher.decrypt(ciphertext, aad, key, nonce)?);
                Ok(())
            }
        }
    }

    /// A fresh random nonce of `nonce_length()` bytes.
    pub fn random_nonce(&self) -> Vec<u8> {
        let mut nonce = vec![0u8; self.nonce_length()];
        rand::thread_rng().fill_bytes(&mut nonce);
        nonce
    }

    fn check_sealed_length(&self, ciphertext: &[u8]) -> CeffResult<()> {
        if ciphertext.len() < self.tag_length() {
            return Err(CeffError::crypto(
                self.name(),
                format!(
                    "ciphertext too short: {} bytes (minimum {})",
                    ciphertext.len(),
                    self.tag_length()
                ),
            ));
        }
        Ok(())
    }

    fn check_null_nonce(&self, nonce: &[u8]) -> CeffResult<()> {
        if !nonce.is_empty() {
            return Err(CeffError::crypto(self.name(), "null mode takes no nonce"));
        }
        Ok(())
    }

    fn check_nonce(&self, nonce: &[u8]) -> CeffResult<()> {
        if nonce.len() != self.nonce_length() {
            return Err(CeffError::crypto(
                self.name(),
                format!(
                    "invalid nonce length: {} bytes (expected {})",
                    nonce.len(),
                    self.nonce_length()
                ),
            ));
        }
        Ok(())
    }
}

impl PartialEq for Mode {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Mode {}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}
