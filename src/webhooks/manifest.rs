//! Webhook configuration objects for registering the server with the API
//! server.

use std::collections::HashSet;

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::registry::{Registration, Registry};
use super::webhook::{
    DEFAULT_ADMISSION_REVIEW_VERSIONS, DEFAULT_SIDE_EFFECTS, DEFAULT_TIMEOUT_SECONDS, WebhookKind,
};
use crate::certs::TrustBundle;

/// The Service fronting the webhook server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceCoordinates {
    pub name: String,
    pub namespace: String,
    /// Service port; 443 with TLS and 80 without
    pub port: i32,
}

impl ServiceCoordinates {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, tls: bool) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            port: if tls { 443 } else { 80 },
        }
    }

    /// `<service>.<namespace>.svc`
    pub fn host(&self) -> String {
        format!("{}.{}.svc", self.name, self.namespace)
    }
}

/// Configuration objects for one server; a kind with no webhooks has none.
#[derive(Clone, Debug, Default)]
pub struct RegistrationManifests {
    pub mutating: Option<MutatingWebhookConfiguration>,
    pub validating: Option<ValidatingWebhookConfiguration>,
}

struct WebhookEntry {
    name: String,
    client_config: WebhookClientConfig,
    rules: Option<Vec<RuleWithOperations>>,
    admission_review_versions: Vec<String>,
    side_effects: String,
    timeout_seconds: i32,
}

impl WebhookEntry {
    fn new(
        registration: &Registration,
        service: &ServiceCoordinates,
        trust_bundle: Option<&TrustBundle>,
    ) -> Self {
        let client_config = WebhookClientConfig {
            ca_bundle: trust_bundle.map(|bundle| ByteString(bundle.pem_bytes().to_vec())),
            service: Some(ServiceReference {
                name: service.name.clone(),
                namespace: service.namespace.clone(),
                path: Some(registration.path().to_string()),
                port: Some(service.port),
            }),
            url: None,
        };

        let provider = registration.webhook().as_rule_provider();
        Self {
            name: format!("{}.{}", registration.name(), service.host()),
            client_config,
            rules: provider.map(|p| p.rules()),
            admission_review_versions: provider
                .map(|p| p.admission_review_versions())
                .unwrap_or_else(|| {
                    DEFAULT_ADMISSION_REVIEW_VERSIONS
                        .iter()
                        .map(|v| v.to_string())
                        .collect()
                }),
            side_effects: provider
                .map(|p| p.side_effects())
                .unwrap_or_else(|| DEFAULT_SIDE_EFFECTS.to_string()),
            timeout_seconds: provider
                .map(|p| p.timeout_seconds())
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

/// Build the webhook configurations for every registered webhook.
///
/// Webhooks of one kind sharing a path are registered once, with the
/// metadata of the first one. `caBundle` is only set when a trust bundle
/// exists; an external certificate without a CA file leaves it to the
/// cluster's own trust.
pub fn build_manifests(
    registry: &Registry,
    service: &ServiceCoordinates,
    trust_bundle: Option<&TrustBundle>,
) -> RegistrationManifests {
    let metadata = ObjectMeta {
        name: Some(service.host()),
        ..Default::default()
    };

    let mut seen = HashSet::new();
    let mutating: Vec<MutatingWebhook> = registry
        .of_kind(WebhookKind::Mutating)
        .filter(|r| seen.insert(r.path()))
        .map(|r| WebhookEntry::new(r, service, trust_bundle))
        .map(|e| MutatingWebhook {
            name: e.name,
            client_config: e.client_config,
            rules: e.rules,
            admission_review_versions: e.admission_review_versions,
            side_effects: e.side_effects,
            timeout_seconds: Some(e.timeout_seconds),
            ..Default::default()
        })
        .collect();

    let mut seen = HashSet::new();
    let validating: Vec<ValidatingWebhook> = registry
        .of_kind(WebhookKind::Validating)
        .filter(|r| seen.insert(r.path()))
        .map(|r| WebhookEntry::new(r, service, trust_bundle))
        .map(|e| ValidatingWebhook {
            name: e.name,
            client_config: e.client_config,
            rules: e.rules,
            admission_review_versions: e.admission_review_versions,
            side_effects: e.side_effects,
            timeout_seconds: Some(e.timeout_seconds),
            ..Default::default()
        })
        .collect();

    RegistrationManifests {
        mutating: (!mutating.is_empty()).then(|| MutatingWebhookConfiguration {
            metadata: metadata.clone(),
            webhooks: Some(mutating),
        }),
        validating: (!validating.is_empty()).then(|| ValidatingWebhookConfiguration {
            metadata,
            webhooks: Some(validating),
        }),
    }
}
