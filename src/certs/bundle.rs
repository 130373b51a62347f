//! Trust bundle handed to webhook registrations.

use std::fs;
use std::path::Path;

use base64::{Engine, prelude::BASE64_STANDARD};

use super::error::{CertificateError, Result};
use super::material::{CertificateMaterial, parse_pem};

/// PEM of the certificate authority the API server should trust when it
/// dials the webhook.
///
/// Derived on demand from the authority, or taken verbatim from an
/// operator-supplied CA file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustBundle {
    pem: Vec<u8>,
}

impl TrustBundle {
    pub fn from_authority(authority: &CertificateMaterial) -> Self {
        Self {
            pem: authority.certificate_pem().as_bytes().to_vec(),
        }
    }

    pub fn from_pem(pem: Vec<u8>) -> Self {
        Self { pem }
    }

    /// Raw bytes of a CA file, not re-encoded
    pub fn from_ca_file(path: &Path) -> Result<Self> {
        let pem = fs::read(path).map_err(|e| CertificateError::io(path, e))?;
        Ok(Self { pem })
    }

    pub fn pem_bytes(&self) -> &[u8] {
        &self.pem
    }

    /// Base64 of the PEM, the form embedded as `caBundle`
    pub fn encoded(&self) -> String {
        BASE64_STANDARD.encode(&self.pem)
    }

    /// Reverse of [`TrustBundle::encoded`] followed by PEM decoding; yields
    /// the authority certificate as DER.
    pub fn decode_certificate(encoded: &str) -> Result<Vec<u8>> {
        let pem = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| CertificateError::Parse(format!("invalid base64 trust bundle: {}", e)))?;
        let pem = String::from_utf8(pem)
            .map_err(|e| CertificateError::Parse(format!("trust bundle is not UTF-8: {}", e)))?;
        parse_pem(&pem, "CERTIFICATE")
    }
}

/// Base64-encoded PEM of the authority certificate.
pub fn build_trust_bundle(authority: &CertificateMaterial) -> String {
    TrustBundle::from_authority(authority).encoded()
}
