//! Certificate provisioning for the webhook's HTTPS listener.
//!
//! Produces a self-signed certificate authority plus a serving certificate
//! chained to it, persists both as PEM files, and derives the trust bundle
//! the webhook registration needs so the API server accepts the listener.

mod bundle;
mod error;
mod material;
mod provisioner;

pub use bundle::{TrustBundle, build_trust_bundle};
pub use error::{CertificateError, Result};
pub use material::{CertificateMaterial, parse_pem};
pub use provisioner::{
    CERT_EXTENSION, CertificateIdentity, CertificatePaths, CertificateRole, KEY_EXTENSION,
    ProvisionedIdentity, Provisioner, VALIDITY_YEARS,
};
