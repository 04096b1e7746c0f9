use std::io;

use thiserror::Error;

pub type CeffResult<T> = Result<T, CeffError>;

#[derive(Debug, Error)]
pub enum CeffError {
    /// Backend failure, propagated verbatim.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Bad magic, unknown mode byte, or a file too short to hold the framing.
    #[error("format error: {0}")]
    Format(String),

    #[error("crypto error ({algorithm}): {message}")]
    Crypto { algorithm: String, message: String },

    /// Chunk index or whole-file signature mismatch. The file must not be read.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unexpected end of file: {0}")]
    UnexpectedEof(String),
}

impl CeffError {
    pub fn crypto(algorithm: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Crypto {
            algorithm: algorithm.into(),
            message: message.into(),
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

/// Recover the `CeffError` carried inside an io error produced by the codec.
pub fn ceff_error(err: &io::Error) -> Option<&CeffError> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<CeffError>())
}

impl From<io::Error> for CeffError {
    fn from(err: io::Error) -> Self {
        if ceff_error(&err).is_none() {
            return CeffError::Io(err);
        }

        // codec error tunnelled through an io-typed backend trait
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<CeffError>()) {
            Some(Ok(ceff)) => *ceff,
            Some(Err(other)) => CeffError::Io(io::Error::new(kind, other)),
            None => CeffError::Io(io::Error::from(kind)),
        }
    }
}

impl From<CeffError> for io::Error {
    fn from(err: CeffError) -> Self {
        match err {
            CeffError::Io(inner) => inner,
            eof @ CeffError::UnexpectedEof(_) => io::Error::new(io::ErrorKind::UnexpectedEof, eof),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
