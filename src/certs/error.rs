//! Error types for certificate provisioning.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, generating, or persisting certificate material.
///
/// All of these are configuration errors: they abort startup before any
/// listener is opened.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// Filesystem error on a certificate or key file
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PEM or DER content could not be decoded
    #[error("certificate parsing error: {0}")]
    Parse(String),

    /// Key generation or signing failed
    #[error("certificate generation failed: {0}")]
    Generation(String),

    /// The private key does not belong to the certificate it was paired with
    #[error("private key does not match certificate for {0}")]
    KeyMismatch(String),

    /// The certificate directory path exists but is not a directory
    #[error("{} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

impl CertificateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CertificateError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for certificate operations
pub type Result<T> = std::result::Result<T, CertificateError>;
