//! Mode registry: maps header mode bytes to `Mode`s.
//!
//! A registry is built once and is immutable afterwards. Each codec
//! component receives one explicitly, so tests can run with isolated mode
//! sets instead of sharing process-wide state.

use std::collections::BTreeMap;
use std::sync::Arc;

use ceff_core::{CeffError, CeffResult};

use crate::aead::AeadCipher;
use crate::mode::Mode;
use crate::FIRST_CUSTOM_MODE;

#[derive(Debug, Clone, Default)]
pub struct ModeRegistry {
    custom: BTreeMap<u8, Arc<dyn AeadCipher>>,
}

impl ModeRegistry {
    pub fn builder() -> ModeRegistryBuilder {
        ModeRegistryBuilder::default()
    }

    /// Resolve a mode byte read from a header.
    pub fn get(&self, id: u8) -> CeffResult<Mode> {
        match id {
            Mode::NULL_ID => Ok(Mode::Null),
            Mode::AES_256_GCM_ID => Ok(Mode::Aes256Gcm),
            Mode::CHACHA20_POLY1305_ID => Ok(Mode::ChaCha20Poly1305),
            _ => self
                .custom
                .get(&id)
                .map(|cipher| Mode::Custom {
                    id,
                    cipher: Arc::clone(cipher),
                })
                .ok_or_else(|| CeffError::Format(format!("unknown mode byte {id}"))),
        }
    }

    /// The default mode for new files.
    pub fn strongest(&self) -> Mode {
        Mode::Aes256Gcm
    }

    /// All known mode bytes, built-ins first.
    pub fn ids(&self) -> Vec<u8> {
        [Mode::NULL_ID, Mode::AES_256_GCM_ID, Mode::CHACHA20_POLY1305_ID]
            .into_iter()
            .chain(self.custom.keys().copied())
            .collect()
    }
}

/// Append-only builder for `ModeRegistry`.
#[derive(Debug, Default)]
pub struct ModeRegistryBuilder {
    custom: BTreeMap<u8, Arc<dyn AeadCipher>>,
}

impl ModeRegistryBuilder {
    /// Register `cipher` under `id`. Ids below 10 are reserved and an id can
    /// only be registered once.
    pub fn register(mut self, id: u8, cipher: Arc<dyn AeadCipher>) -> CeffResult<Self> {
        if id < FIRST_CUSTOM_MODE {
            return Err(CeffError::InvalidConfiguration(format!(
                "mode byte {id} is reserved (custom modes start at {FIRST_CUSTOM_MODE})"
            )));
        }
        if self.custom.contains_key(&id) {
            return Err(CeffError::InvalidConfiguration(format!(
                "mode byte {id} is already registered"
            )));
        }

        tracing::debug!(mode = id, name = cipher.name(), "registering custom AEAD mode");
        self.custom.insert(id, cipher);
        Ok(self)
    }

    pub fn build(self) -> ModeRegistry {
        ModeRegistry {
            custom: self.custom,
        }
    }
}
