//! Certificate provisioning against a temporary directory.

use std::fs;

use kube_admission_core::certs::{
    CertificateError, CertificateIdentity, CertificateRole, Provisioner, TrustBundle,
    build_trust_bundle,
};
use tempfile::TempDir;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

fn identity() -> CertificateIdentity {
    CertificateIdentity::new("webhooks", "pod-guard")
}

#[test]
fn test_provisioning_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let provisioner = Provisioner::new(dir.path().join(".secrets"), identity());

    let first = provisioner.provision().unwrap();
    assert!(first.leaf_created);
    let leaf_pem = fs::read(&first.leaf_paths.certificate).unwrap();
    let ca_pem = fs::read(dir.path().join(".secrets/ca.cert")).unwrap();

    let second = provisioner.provision().unwrap();
    assert!(!second.leaf_created);
    assert_eq!(fs::read(&second.leaf_paths.certificate).unwrap(), leaf_pem);
    assert_eq!(fs::read(dir.path().join(".secrets/ca.cert")).unwrap(), ca_pem);
    assert_eq!(
        build_trust_bundle(&first.authority),
        build_trust_bundle(&second.authority)
    );
}

#[test]
fn test_files_are_named_by_role() {
    let dir = TempDir::new().unwrap();
    Provisioner::new(dir.path(), identity()).provision().unwrap();

    let mut names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["ca.cert", "ca.key", "srv.cert", "srv.key"]);
}

#[test]
fn test_leaf_chains_to_authority_only() {
    let dir = TempDir::new().unwrap();
    let provisioned = Provisioner::new(dir.path().join("a"), identity())
        .provision()
        .unwrap();
    let unrelated = Provisioner::new(dir.path().join("b"), identity())
        .provision()
        .unwrap();

    assert!(provisioned.authority.is_authority());
    assert!(!provisioned.leaf.is_authority());
    assert!(provisioned.leaf.verify_issued_by(&provisioned.authority).unwrap());
    assert!(!provisioned.leaf.verify_issued_by(&unrelated.authority).unwrap());
}

#[test]
fn test_common_names_and_dns_names() {
    let dir = TempDir::new().unwrap();
    let provisioned = Provisioner::new(dir.path(), identity().with_service_name("guard-svc"))
        .provision()
        .unwrap();

    assert_eq!(provisioned.authority.common_name(), "CA for webhooks/pod-guard");
    assert_eq!(provisioned.leaf.common_name(), "webhooks/pod-guard");

    let der = provisioned.leaf.certificate_der().unwrap();
    let (_, cert) = X509Certificate::from_der(&der).unwrap();
    let san = cert.subject_alternative_name().unwrap().unwrap();
    let dns: Vec<String> = san
        .value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect();
    assert!(dns.contains(&"guard-svc.webhooks.svc".to_string()));
    assert!(dns.contains(&"guard-svc.webhooks.svc.cluster.local".to_string()));
}

#[test]
fn test_leaf_never_outlives_authority() {
    let dir = TempDir::new().unwrap();
    let provisioned = Provisioner::new(dir.path(), identity()).provision().unwrap();
    assert!(provisioned.leaf.not_after() <= provisioned.authority.not_after());
    assert!(provisioned.leaf.not_before() < provisioned.leaf.not_after());
}

#[test]
fn test_new_authority_forces_new_leaf() {
    let dir = TempDir::new().unwrap();
    let provisioner = Provisioner::new(dir.path(), identity());
    let first = provisioner.provision().unwrap();

    fs::remove_file(dir.path().join("ca.cert")).unwrap();
    let second = provisioner.provision().unwrap();

    assert!(second.leaf_created);
    assert_ne!(first.authority, second.authority);
    assert!(second.leaf.verify_issued_by(&second.authority).unwrap());
    assert!(!second.leaf.verify_issued_by(&first.authority).unwrap());
}

#[test]
fn test_leaf_only_missing_is_reissued_under_existing_authority() {
    let dir = TempDir::new().unwrap();
    let provisioner = Provisioner::new(dir.path(), identity());
    let first = provisioner.provision().unwrap();

    fs::remove_file(dir.path().join("srv.key")).unwrap();
    let second = provisioner.provision().unwrap();

    assert!(second.leaf_created);
    assert_eq!(first.authority, second.authority);
    assert!(second.leaf.verify_issued_by(&first.authority).unwrap());
}

#[test]
fn test_corrupt_files_are_an_error() {
    let dir = TempDir::new().unwrap();
    let provisioner = Provisioner::new(dir.path(), identity());
    provisioner.provision().unwrap();

    fs::write(dir.path().join("ca.cert"), "garbage").unwrap();
    assert!(matches!(
        provisioner.load_or_create(CertificateRole::Authority, false),
        Err(CertificateError::Parse(_))
    ));
}

#[test]
fn test_directory_path_that_is_a_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-dir");
    fs::write(&file, "").unwrap();

    assert!(matches!(
        Provisioner::new(&file, identity()).provision(),
        Err(CertificateError::NotADirectory(_))
    ));
}

#[test]
fn test_trust_bundle_round_trip() {
    let dir = TempDir::new().unwrap();
    let provisioned = Provisioner::new(dir.path(), identity()).provision().unwrap();

    let encoded = provisioned.trust_bundle().encoded();
    assert_eq!(encoded, build_trust_bundle(&provisioned.authority));
    assert_eq!(
        TrustBundle::decode_certificate(&encoded).unwrap(),
        provisioned.authority.certificate_der().unwrap()
    );
}
