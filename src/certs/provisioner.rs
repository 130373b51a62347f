//! Load-or-create provisioning of the webhook's TLS identity.
//!
//! Two roles live side by side in one directory:
//! - authority: `ca.cert` / `ca.key`, self-signed
//! - leaf: `srv.cert` / `srv.key`, signed by the authority
//!
//! Presence of both files for a role is the only "already provisioned" signal.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType, string::Ia5String,
};
use tempfile::NamedTempFile;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use super::bundle::TrustBundle;
use super::error::{CertificateError, Result};
use super::material::CertificateMaterial;

/// Validity of every generated certificate, in years
pub const VALIDITY_YEARS: i32 = 5;

/// File extension of certificate files
pub const CERT_EXTENSION: &str = "cert";
/// File extension of private key files
pub const KEY_EXTENSION: &str = "key";

/// Names the webhook the certificates are issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateIdentity {
    pub namespace: String,
    pub application_name: String,
    /// Service the API server dials; defaults to the application name
    pub service_name: String,
}

impl CertificateIdentity {
    pub fn new(namespace: impl Into<String>, application_name: impl Into<String>) -> Self {
        let application_name = application_name.into();
        Self {
            namespace: namespace.into(),
            service_name: application_name.clone(),
            application_name,
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// `<namespace>/<application>`
    pub fn leaf_common_name(&self) -> String {
        format!("{}/{}", self.namespace, self.application_name)
    }

    /// `CA for <namespace>/<application>`
    pub fn authority_common_name(&self) -> String {
        format!("CA for {}", self.leaf_common_name())
    }

    /// DNS names the API server may use to reach the service
    pub fn dns_names(&self) -> Vec<String> {
        let service = &self.service_name;
        let namespace = &self.namespace;
        vec![
            service.clone(),
            format!("{service}.{namespace}"),
            format!("{service}.{namespace}.svc"),
            format!("{service}.{namespace}.svc.cluster.local"),
        ]
    }
}

/// Which half of the chain to load or create.
#[derive(Clone, Copy, Debug)]
pub enum CertificateRole<'a> {
    /// Self-signed certificate authority
    Authority,
    /// Serving certificate signed by `issuer`
    Leaf { issuer: &'a CertificateMaterial },
}

impl CertificateRole<'_> {
    /// Fixed file basename for this role
    pub fn basename(&self) -> &'static str {
        match self {
            CertificateRole::Authority => "ca",
            CertificateRole::Leaf { .. } => "srv",
        }
    }
}

/// Locations of a role's certificate and key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificatePaths {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

impl CertificatePaths {
    fn in_directory(directory: &Path, basename: &str) -> Self {
        Self {
            certificate: directory.join(format!("{basename}.{CERT_EXTENSION}")),
            private_key: directory.join(format!("{basename}.{KEY_EXTENSION}")),
        }
    }

    /// Both files exist as regular files
    pub fn exist(&self) -> bool {
        self.certificate.is_file() && self.private_key.is_file()
    }

    /// Read and decode the pair
    pub fn load(&self) -> Result<CertificateMaterial> {
        let certificate = fs::read_to_string(&self.certificate)
            .map_err(|e| CertificateError::io(&self.certificate, e))?;
        let private_key = fs::read_to_string(&self.private_key)
            .map_err(|e| CertificateError::io(&self.private_key, e))?;
        CertificateMaterial::from_pem(&certificate, &private_key)
    }
}

/// Authority and leaf produced by [`Provisioner::provision`].
#[derive(Clone, Debug)]
pub struct ProvisionedIdentity {
    pub authority: CertificateMaterial,
    pub leaf: CertificateMaterial,
    /// Files the listener should serve
    pub leaf_paths: CertificatePaths,
    /// Whether the leaf was (re)issued during this call
    pub leaf_created: bool,
}

impl ProvisionedIdentity {
    pub fn trust_bundle(&self) -> TrustBundle {
        TrustBundle::from_authority(&self.authority)
    }
}

/// Loads or synthesizes certificate material under one directory.
#[derive(Clone, Debug)]
pub struct Provisioner {
    directory: PathBuf,
    identity: CertificateIdentity,
}

impl Provisioner {
    pub fn new(directory: impl Into<PathBuf>, identity: CertificateIdentity) -> Self {
        Self {
            directory: directory.into(),
            identity,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn identity(&self) -> &CertificateIdentity {
        &self.identity
    }

    pub fn paths(&self, role: CertificateRole<'_>) -> CertificatePaths {
        CertificatePaths::in_directory(&self.directory, role.basename())
    }

    /// Load the role's pair from disk, or generate and persist a new one.
    ///
    /// Returns the material and whether it was newly created. Existing files
    /// that fail to decode are an error and are never regenerated.
    pub fn load_or_create(
        &self,
        role: CertificateRole<'_>,
        force_create: bool,
    ) -> Result<(CertificateMaterial, bool)> {
        let paths = self.paths(role);
        if !force_create && paths.exist() {
            let material = paths.load()?;
            debug!(
                path = %paths.certificate.display(),
                common_name = %material.common_name(),
                "Loaded existing certificate"
            );
            return Ok((material, false));
        }

        self.ensure_directory()?;
        let material = match role {
            CertificateRole::Authority => self.generate_authority()?,
            CertificateRole::Leaf { issuer } => self.generate_leaf(issuer)?,
        };

        write_atomically(&paths.private_key, material.private_key_pem().as_bytes())?;
        write_atomically(&paths.certificate, material.certificate_pem().as_bytes())?;

        info!(
            path = %paths.certificate.display(),
            common_name = %material.common_name(),
            not_after = %material.not_after(),
            "Created certificate"
        );
        Ok((material, true))
    }

    /// Provision the full chain: the authority first, then a leaf that is
    /// force-reissued whenever the authority was just created.
    pub fn provision(&self) -> Result<ProvisionedIdentity> {
        let (authority, authority_created) =
            self.load_or_create(CertificateRole::Authority, false)?;
        let role = CertificateRole::Leaf { issuer: &authority };
        let (leaf, leaf_created) = self.load_or_create(role, authority_created)?;
        let leaf_paths = self.paths(role);

        Ok(ProvisionedIdentity {
            authority,
            leaf,
            leaf_paths,
            leaf_created,
        })
    }

    fn ensure_directory(&self) -> Result<()> {
        if self.directory.exists() {
            if !self.directory.is_dir() {
                return Err(CertificateError::NotADirectory(self.directory.clone()));
            }
            return Ok(());
        }
        fs::create_dir_all(&self.directory).map_err(|e| CertificateError::io(&self.directory, e))
    }

    fn generate_authority(&self) -> Result<CertificateMaterial> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(&self.identity.authority_common_name());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let (not_before, not_after) = compute_validity(VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate().map_err(|e| {
            CertificateError::Generation(format!("failed to generate CA key: {}", e))
        })?;
        let cert = params.self_signed(&key_pair).map_err(|e| {
            CertificateError::Generation(format!("failed to create CA cert: {}", e))
        })?;

        CertificateMaterial::from_pem(&cert.pem(), &key_pair.serialize_pem())
    }

    fn generate_leaf(&self, issuer_material: &CertificateMaterial) -> Result<CertificateMaterial> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(&self.identity.leaf_common_name());
        params.is_ca = IsCa::NoCa;
        params.use_authority_key_identifier_extension = true;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.subject_alt_names = self
            .identity
            .dns_names()
            .into_iter()
            .map(|name| {
                Ia5String::try_from(name.clone())
                    .map(SanType::DnsName)
                    .map_err(|e| {
                        CertificateError::Generation(format!("invalid DNS name '{}': {}", name, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        // A leaf never outlives the authority that signed it
        let (not_before, not_after) = compute_validity(VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after.min(issuer_material.not_after());

        let key_pair = KeyPair::generate().map_err(|e| {
            CertificateError::Generation(format!("failed to generate server key: {}", e))
        })?;
        let issuer = issuer_material.issuer()?;
        let cert = params.signed_by(&key_pair, &issuer).map_err(|e| {
            CertificateError::Generation(format!("failed to sign server cert: {}", e))
        })?;

        CertificateMaterial::from_pem(&cert.pem(), &key_pair.serialize_pem())
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn
}

/// Validity window starting now and ending `years` calendar years later.
///
/// Falls back to whole days when the anniversary does not exist (Feb 29).
fn compute_validity(years: i32) -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    let not_after = now
        .replace_year(now.year() + years)
        .unwrap_or_else(|_| now + Duration::days(i64::from(years) * 365 + 1));
    (now, not_after)
}

/// Write `contents` to a temporary file next to `path` and rename it into
/// place, so a crash never leaves a truncated file behind.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file =
        NamedTempFile::new_in(directory).map_err(|e| CertificateError::io(directory, e))?;
    file.write_all(contents)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| CertificateError::io(path, e))?;
    file.persist(path)
        .map_err(|e| CertificateError::io(path, e.error))?;
    Ok(())
}
