//! Key material: caller-supplied master key, per-file content key, and
//! wrapping of the content key into the file header.

use rand::RngCore;
use zeroize::Zeroize;

use ceff_core::{CeffError, CeffResult};

use crate::mode::Mode;
use crate::KEY_SIZE;

macro_rules! secret_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }

            /// Copy key material out of a caller-owned buffer.
            pub fn from_slice(bytes: &[u8]) -> CeffResult<Self> {
                let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
                    CeffError::InvalidConfiguration(format!(
                        "key must be {KEY_SIZE} bytes, got {}",
                        bytes.len()
                    ))
                })?;
                Ok(Self { bytes })
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

secret_key!(
    /// The 256-bit key supplied by the caller. Only ever used to wrap content keys.
    MasterKey
);

secret_key!(
    /// A per-file 256-bit key encrypting chunks and the footer. Zeroized on drop.
    ContentKey
);

impl ContentKey {
    /// Generate a random content key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        key
    }
}

/// A content key encrypted under a master key, as stored in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub nonce: Vec<u8>,
    /// `encrypted key || tag` (32 + tag_length bytes)
    pub ciphertext: Vec<u8>,
}

/// Wrap (encrypt) a content key under the master key.
pub fn wrap_content_key(mode: &Mode, master: &MasterKey, content: &ContentKey) -> CeffResult<WrappedKey> {
    mode.validate_key(master.as_bytes())?;
    let nonce = mode.random_nonce();
    let ciphertext = mode.encrypt(content.as_bytes(), &[], master.as_bytes(), &nonce)?;
    Ok(WrappedKey { nonce, ciphertext })
}

/// Unwrap (decrypt) a content key. A wrong master key is a `Crypto` error.
pub fn unwrap_content_key(mode: &Mode, master: &MasterKey, wrapped: &WrappedKey) -> CeffResult<ContentKey> {
    mode.validate_key(master.as_bytes())?;

    let mut plaintext = mode
        .decrypt(&wrapped.ciphertext, &[], master.as_bytes(), &wrapped.nonce)
        .map_err(|e| match e {
            CeffError::Crypto { algorithm, .. } => CeffError::Crypto {
                algorithm,
                message: "content key unwrapping failed: invalid master key or corrupted header"
                    .into(),
            },
            other => other,
        })?;

    let key = ContentKey::from_slice(&plaintext).map_err(|_| {
        CeffError::crypto(
            mode.name(),
            format!(
                "unwrapped key has wrong size: {} bytes (expected {KEY_SIZE})",
                plaintext.len()
            ),
        )
    });
    plaintext.zeroize();
    key
}
