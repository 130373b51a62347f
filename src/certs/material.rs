//! Certificate and private key pairs.

use std::fmt;

use rcgen::{Issuer, KeyPair, PublicKeyData};
use ::time::OffsetDateTime;
use x509_parser::prelude::*;

use super::error::{CertificateError, Result};

/// Decode a single PEM block and return its DER contents.
///
/// The block must carry the expected tag (e.g. `CERTIFICATE`).
pub fn parse_pem(pem_data: &str, expected_tag: &str) -> Result<Vec<u8>> {
    let block = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| CertificateError::Parse(format!("failed to parse PEM: {}", e)))?;
    if block.tag() != expected_tag {
        return Err(CertificateError::Parse(format!(
            "expected PEM block '{}', found '{}'",
            expected_tag,
            block.tag()
        )));
    }
    Ok(block.contents().to_vec())
}

/// A certificate and its private key, always handled as a pair.
///
/// The PEM text is kept exactly as it was generated or read from disk, so
/// material loaded twice from the same files compares equal byte for byte.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateMaterial {
    certificate_pem: String,
    private_key_pem: String,
    common_name: String,
    is_authority: bool,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("common_name", &self.common_name)
            .field("is_authority", &self.is_authority)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

impl CertificateMaterial {
    /// Decode a certificate/key pair from PEM text.
    ///
    /// Fails when either half does not decode, or when the key is not the
    /// one the certificate was issued for.
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> Result<Self> {
        let der = parse_pem(certificate_pem, "CERTIFICATE")?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| CertificateError::Parse(format!("failed to parse certificate: {}", e)))?;

        let key_pair = KeyPair::from_pem(private_key_pem)
            .map_err(|e| CertificateError::Parse(format!("failed to parse private key: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        if key_pair.der_bytes() != cert.public_key().subject_public_key.data.as_ref() {
            return Err(CertificateError::KeyMismatch(common_name));
        }

        Ok(Self {
            certificate_pem: certificate_pem.to_string(),
            private_key_pem: private_key_pem.to_string(),
            is_authority: cert.is_ca(),
            not_before: cert.validity().not_before.to_datetime(),
            not_after: cert.validity().not_after.to_datetime(),
            common_name,
        })
    }

    /// PEM-encoded certificate
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// PEM-encoded private key
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// DER-encoded certificate
    pub fn certificate_der(&self) -> Result<Vec<u8>> {
        parse_pem(&self.certificate_pem, "CERTIFICATE")
    }

    /// Subject common name
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Whether this certificate carries CA basic constraints
    pub fn is_authority(&self) -> bool {
        self.is_authority
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Check whether this certificate's signature verifies against `authority`'s
    /// public key.
    ///
    /// Returns `Ok(false)` on a signature mismatch; parse failures are errors.
    pub fn verify_issued_by(&self, authority: &CertificateMaterial) -> Result<bool> {
        let der = self.certificate_der()?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| CertificateError::Parse(format!("failed to parse certificate: {}", e)))?;

        let authority_der = authority.certificate_der()?;
        let (_, authority_cert) = X509Certificate::from_der(&authority_der).map_err(|e| {
            CertificateError::Parse(format!("failed to parse authority certificate: {}", e))
        })?;

        Ok(cert
            .verify_signature(Some(authority_cert.public_key()))
            .is_ok())
    }

    /// Build an rcgen issuer from this material so it can sign leaves.
    pub(crate) fn issuer(&self) -> Result<Issuer<'static, KeyPair>> {
        let key_pair = KeyPair::from_pem(&self.private_key_pem).map_err(|e| {
            CertificateError::Parse(format!("failed to load authority key: {}", e))
        })?;
        Issuer::from_ca_cert_pem(&self.certificate_pem, key_pair)
            .map_err(|e| CertificateError::Parse(format!("failed to create issuer: {}", e)))
    }
}
