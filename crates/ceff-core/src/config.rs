use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{CeffError, CeffResult};
use crate::{validate_chunk_size, DEFAULT_CHUNK_SIZE};

/// Mode byte of AES-256-GCM, the default mode.
pub const DEFAULT_MODE: u8 = 1;

/// Codec configuration (loadable from a `ceff.toml` fragment).
///
/// The master key is deliberately absent: it is handed to the directory
/// facade by the caller and never persisted alongside the config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeffConfig {
    /// Plaintext bytes per chunk (default: 65536)
    pub chunk_size: u32,
    /// Mode byte: 0 = null, 1 = AES-256-GCM, 2 = ChaCha20-Poly1305, >= 10 registered
    pub mode: u8,
}

impl Default for CeffConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            mode: DEFAULT_MODE,
        }
    }
}

impl CeffConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("parsing ceff config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "ceff config file not found (using defaults)"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn validate(&self) -> CeffResult<()> {
        validate_chunk_size(self.chunk_size as u64)?;
        if (3..10).contains(&self.mode) {
            return Err(CeffError::InvalidConfiguration(format!(
                "mode byte {} is reserved",
                self.mode
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = CeffConfig::default();
        assert_eq!(config.chunk_size, 65536);
        assert_eq!(config.mode, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml() {
        let config = CeffConfig::from_toml_str("chunk_size = 16384").unwrap();
        assert_eq!(config.chunk_size, 16384);
        assert_eq!(config.mode, DEFAULT_MODE);
    }

    #[test]
    fn rejects_small_chunk_size() {
        let err = CeffConfig::from_toml_str("chunk_size = 1024").unwrap_err();
        let ceff = err.downcast_ref::<CeffError>().unwrap();
        assert!(matches!(ceff, CeffError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_reserved_mode() {
        let config = CeffConfig {
            mode: 5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CeffError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size = 32768\nmode = 2").unwrap();

        let config = CeffConfig::load(file.path()).unwrap();
        assert_eq!(
            config,
            CeffConfig {
                chunk_size: 32768,
                mode: 2
            }
        );
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CeffConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CeffConfig::default());
    }
}
