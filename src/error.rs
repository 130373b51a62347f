//! Crate-level error type.
//!
//! Aggregates the per-concern errors with classification for whether the
//! process should give up.

use thiserror::Error;

use crate::certs::CertificateError;
use crate::config::ConfigError;
use crate::context::ContextError;
use crate::tls::TlsError;
use crate::webhooks::{RegistrationError, ServerError};

/// Error type for server setup and operation
#[derive(Error, Debug)]
pub enum Error {
    /// Environment configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// TLS policy rejected the inputs or provisioning failed
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Webhook registration failed
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Listener failed to start or failed while serving
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Cluster client could not be built
    #[error("Cluster context error: {0}")]
    Context(#[from] ContextError),
}

impl From<CertificateError> for Error {
    fn from(e: CertificateError) -> Self {
        Error::Tls(TlsError::Certificate(e))
    }
}

impl Error {
    /// Check if this error needs operator intervention before a restart can
    /// succeed
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) | Error::Tls(_) | Error::Registration(_) => true,
            Error::Server(e) => !matches!(e, ServerError::Transport(_)),
            Error::Context(e) => !matches!(e, ContextError::Client(_)),
        }
    }
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;
