//! TLS policy: decides where the listener's certificate comes from.
//!
//! Three sources, checked in order:
//! 1. insecure mode: plaintext listener, no certificates, no trust bundle
//! 2. operator-supplied certificate/key (and optional CA file)
//! 3. provisioned: self-signed authority + leaf under the certificate directory

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::certs::{CertificateError, CertificateIdentity, CertificatePaths, Provisioner, TrustBundle};

/// Default directory for provisioned certificates
pub const DEFAULT_CERT_DIR: &str = ".secrets";

/// Errors from resolving the TLS policy
#[derive(Debug, Error)]
pub enum TlsError {
    /// A key or CA file was supplied without the certificate it belongs to
    #[error("a private key or CA file may only be supplied together with a certificate")]
    MissingCertificate,

    /// A certificate was supplied without its private key
    #[error("certificate {} supplied without a private key", .0.display())]
    MissingPrivateKey(PathBuf),

    /// Loading, validating, or generating certificates failed
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

/// Operator inputs that drive the TLS policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    pub insecure: bool,
    pub certificate_file: Option<PathBuf>,
    pub private_key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    /// Where provisioned certificates are stored
    pub certificate_dir: PathBuf,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            insecure: false,
            certificate_file: None,
            private_key_file: None,
            ca_file: None,
            certificate_dir: PathBuf::from(DEFAULT_CERT_DIR),
        }
    }
}

impl TlsOptions {
    fn has_file_inputs(&self) -> bool {
        self.certificate_file.is_some() || self.private_key_file.is_some() || self.ca_file.is_some()
    }
}

/// How the listener terminates connections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerSecurity {
    Plaintext,
    Tls(CertificatePaths),
}

impl ListenerSecurity {
    pub fn is_tls(&self) -> bool {
        matches!(self, ListenerSecurity::Tls(_))
    }
}

/// Outcome of the TLS policy.
#[derive(Clone, Debug)]
pub struct TlsSetup {
    pub listener: ListenerSecurity,
    /// Absent in insecure mode and when an external certificate comes
    /// without a CA file
    pub trust_bundle: Option<TrustBundle>,
}

/// Install the process-wide rustls crypto provider; later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Apply the TLS policy to the operator's inputs.
pub fn resolve(options: &TlsOptions, identity: &CertificateIdentity) -> Result<TlsSetup, TlsError> {
    if options.insecure {
        if options.has_file_inputs() {
            warn!("TLS files will be ignored because insecure mode is enabled");
        }
        return Ok(TlsSetup {
            listener: ListenerSecurity::Plaintext,
            trust_bundle: None,
        });
    }

    match &options.certificate_file {
        Some(certificate) => {
            let private_key = options
                .private_key_file
                .clone()
                .ok_or_else(|| TlsError::MissingPrivateKey(certificate.clone()))?;
            let paths = CertificatePaths {
                certificate: certificate.clone(),
                private_key,
            };

            // Validation only: an external pair is never regenerated
            let material = paths.load()?;
            info!(
                path = %paths.certificate.display(),
                common_name = %material.common_name(),
                "Using supplied certificate"
            );

            let trust_bundle = options
                .ca_file
                .as_deref()
                .map(TrustBundle::from_ca_file)
                .transpose()?;

            Ok(TlsSetup {
                listener: ListenerSecurity::Tls(paths),
                trust_bundle,
            })
        }
        None => {
            if options.private_key_file.is_some() || options.ca_file.is_some() {
                return Err(TlsError::MissingCertificate);
            }

            let provisioner = Provisioner::new(&options.certificate_dir, identity.clone());
            let provisioned = provisioner.provision()?;
            Ok(TlsSetup {
                trust_bundle: Some(provisioned.trust_bundle()),
                listener: ListenerSecurity::Tls(provisioned.leaf_paths),
            })
        }
    }
}
