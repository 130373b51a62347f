//! The webhook capability and its optional metadata capabilities.
//!
//! A minimal webhook implements [`AdmissionWebhook`] only. Webhooks that want
//! to describe their registration (rules, side effects, timeout) or expose
//! environment settings opt in through [`RuleProvider`] and
//! [`SettingsProvider`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use k8s_openapi::api::admissionregistration::v1::RuleWithOperations;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};

use super::registry::RegistrationError;

/// Timeout applied to a webhook that does not declare one, in seconds
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 5;

/// Admission review versions a webhook accepts unless it says otherwise
pub const DEFAULT_ADMISSION_REVIEW_VERSIONS: [&str; 2] = ["v1", "v1beta1"];

/// Side effect class reported unless a webhook says otherwise
pub const DEFAULT_SIDE_EFFECTS: &str = "None";

/// Error returned by a webhook handler; its text becomes the 400 body.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The two admission webhook kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WebhookKind {
    /// May patch the reviewed object
    Mutating,
    /// May only allow or deny
    Validating,
}

impl WebhookKind {
    /// URL path segment the kind's webhooks are mounted under
    pub fn path_segment(&self) -> &'static str {
        match self {
            WebhookKind::Mutating => "mutate",
            WebhookKind::Validating => "validate",
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookKind::Mutating => write!(f, "mutating"),
            WebhookKind::Validating => write!(f, "validating"),
        }
    }
}

impl FromStr for WebhookKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mutating" => Ok(WebhookKind::Mutating),
            "validating" => Ok(WebhookKind::Validating),
            other => Err(RegistrationError::UnsupportedKind(other.to_string())),
        }
    }
}

/// The HTTP side of an admission call, as seen by a handler.
///
/// The body has already been decoded into the admission request.
#[derive(Clone, Debug)]
pub struct WebhookRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Path remainder after the webhook's own path; empty for exact matches
    pub action: String,
}

impl WebhookRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// A webhook mounted on the dispatcher.
#[async_trait]
pub trait AdmissionWebhook: Send + Sync {
    /// Unique within the webhook's kind; becomes the last path segment
    fn name(&self) -> &str;

    fn kind(&self) -> WebhookKind;

    /// URL path the webhook is mounted at; `/mutate/<name>` or
    /// `/validate/<name>` when `None`.
    ///
    /// Webhooks that share a mount path are tried in registration order in
    /// shared-prefix mode.
    fn path(&self) -> Option<&str> {
        None
    }

    /// Called once at registration, before the listener starts.
    fn initialize(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Decide on one admission request.
    ///
    /// `Ok(None)` means the path matched but this webhook declines the
    /// request; the dispatcher then tries the next candidate.
    async fn handle(
        &self,
        request: &WebhookRequest,
        review: &AdmissionRequest<DynamicObject>,
    ) -> Result<Option<AdmissionResponse>, HandlerError>;

    /// Registration metadata, when the webhook provides it
    fn as_rule_provider(&self) -> Option<&dyn RuleProvider> {
        None
    }

    /// Environment settings, when the webhook declares any
    fn as_settings_provider(&self) -> Option<&dyn SettingsProvider> {
        None
    }
}

/// Describes how a webhook should be registered with the API server.
pub trait RuleProvider: Send + Sync {
    /// Operations and resources the webhook intercepts
    fn rules(&self) -> Vec<RuleWithOperations>;

    fn side_effects(&self) -> String {
        DEFAULT_SIDE_EFFECTS.to_string()
    }

    fn admission_review_versions(&self) -> Vec<String> {
        DEFAULT_ADMISSION_REVIEW_VERSIONS
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    /// Also bounds handler execution inside the dispatcher
    fn timeout_seconds(&self) -> i32 {
        DEFAULT_TIMEOUT_SECONDS
    }
}

/// An environment setting a webhook reads, with its default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookSetting {
    pub name: String,
    pub description: String,
    pub default_value: Option<String>,
}

impl WebhookSetting {
    pub fn new(
        name: impl Into<String>,
        default_value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default_value: Some(default_value.into()),
        }
    }
}

/// Declares the settings a webhook reads from its environment.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Vec<WebhookSetting>;
}
