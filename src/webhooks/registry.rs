//! Registration table mapping URL paths to webhooks.
//!
//! Populated once before the listener starts and read concurrently
//! afterwards; there is no way to mutate it once it is handed to a
//! dispatcher.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::webhook::{AdmissionWebhook, DEFAULT_TIMEOUT_SECONDS, WebhookKind, WebhookSetting};

/// Errors raised while building the registration table
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Two webhooks share a kind and name
    #[error("duplicate {kind} webhook '{name}'")]
    Duplicate { kind: WebhookKind, name: String },

    /// Two webhooks share a mount path in exact-path mode
    #[error("webhook '{name}' is mounted at '{path}', which is already taken")]
    PathConflict { name: String, path: String },

    /// A webhook kind string was not `mutating` or `validating`
    #[error("unsupported webhook kind '{0}'")]
    UnsupportedKind(String),

    /// The name cannot be used as a path segment
    #[error("invalid webhook name '{0}'")]
    InvalidName(String),

    /// A mount path must start with `/` and must not end with one
    #[error("invalid mount path '{path}' for webhook '{name}'")]
    InvalidPath { name: String, path: String },

    /// The webhook's initialize hook failed
    #[error("failed to initialize webhook '{name}': {reason}")]
    Initialization { name: String, reason: String },
}

/// How request paths select webhooks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One webhook per path, no action suffix
    #[default]
    ExactPath,
    /// Several webhooks may share a mount path; prefix match with an
    /// action suffix, first answer in registration order wins
    SharedPrefix,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::ExactPath => write!(f, "exact"),
            DispatchMode::SharedPrefix => write!(f, "prefix"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown dispatch mode '{0}', expected 'exact' or 'prefix'")]
pub struct UnknownDispatchMode(pub String);

impl FromStr for DispatchMode {
    type Err = UnknownDispatchMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(DispatchMode::ExactPath),
            "prefix" => Ok(DispatchMode::SharedPrefix),
            other => Err(UnknownDispatchMode(other.to_string())),
        }
    }
}

/// `/mutate/<name>` or `/validate/<name>`
pub fn webhook_path(kind: WebhookKind, name: &str) -> String {
    format!("/{}/{}", kind.path_segment(), name)
}

/// Match `request_path` against a webhook's `prefix` and return the action
/// suffix.
///
/// The prefix must end on a segment boundary: `/mutate/foo` matches
/// `/mutate/foo` (action `""`) and `/mutate/foo/scale` (action `scale`),
/// but not `/mutate/foobar`.
pub fn resolve_action<'a>(request_path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = request_path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix('/')
}

/// One mounted webhook.
#[derive(Clone)]
pub struct Registration {
    name: String,
    kind: WebhookKind,
    path: String,
    timeout: Duration,
    webhook: Arc<dyn AdmissionWebhook>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Registration {
    fn new(webhook: Arc<dyn AdmissionWebhook>) -> Self {
        let name = webhook.name().to_string();
        let kind = webhook.kind();
        let timeout_seconds = webhook
            .as_rule_provider()
            .map(|rules| rules.timeout_seconds())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        let path = match webhook.path() {
            Some(path) => path.to_string(),
            None => webhook_path(kind, &name),
        };

        Self {
            path,
            timeout: Duration::from_secs(u64::from(timeout_seconds.unsigned_abs())),
            name,
            kind,
            webhook,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> WebhookKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Upper bound on one handler invocation
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn webhook(&self) -> &Arc<dyn AdmissionWebhook> {
        &self.webhook
    }

    /// Action suffix if this registration's path is a prefix of `request_path`
    pub fn action_for<'a>(&self, request_path: &'a str) -> Option<&'a str> {
        resolve_action(request_path, &self.path)
    }
}

/// Ordered registration table.
///
/// Registration order is preserved; it is the only ordering guarantee when
/// several webhooks share a prefix.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    mode: DispatchMode,
    entries: Vec<Registration>,
    /// First registration at each path
    by_path: HashMap<String, usize>,
    identities: HashSet<(WebhookKind, String)>,
}

impl Registry {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Build a table from webhooks in the given order.
    pub fn from_webhooks<I>(mode: DispatchMode, webhooks: I) -> Result<Self, RegistrationError>
    where
        I: IntoIterator<Item = Arc<dyn AdmissionWebhook>>,
    {
        let mut registry = Self::new(mode);
        for webhook in webhooks {
            registry.register(webhook)?;
        }
        Ok(registry)
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Initialize and mount a webhook.
    pub fn register(&mut self, webhook: Arc<dyn AdmissionWebhook>) -> Result<(), RegistrationError> {
        let name = webhook.name();
        if name.is_empty() || name.contains('/') {
            return Err(RegistrationError::InvalidName(name.to_string()));
        }

        let registration = Registration::new(webhook);
        let path = registration.path();
        if !path.starts_with('/') || path.ends_with('/') {
            return Err(RegistrationError::InvalidPath {
                name: registration.name().to_string(),
                path: path.to_string(),
            });
        }

        let identity = (registration.kind(), registration.name().to_string());
        if self.identities.contains(&identity) {
            return Err(RegistrationError::Duplicate {
                kind: identity.0,
                name: identity.1,
            });
        }

        let shared = self.by_path.contains_key(path);
        if shared && self.mode == DispatchMode::ExactPath {
            return Err(RegistrationError::PathConflict {
                name: registration.name().to_string(),
                path: path.to_string(),
            });
        }

        registration
            .webhook()
            .initialize()
            .map_err(|e| RegistrationError::Initialization {
                name: registration.name().to_string(),
                reason: e.to_string(),
            })?;

        info!(
            name = %registration.name(),
            kind = %registration.kind(),
            path = %registration.path(),
            "Registered webhook"
        );
        if !shared {
            self.by_path
                .insert(registration.path().to_string(), self.entries.len());
        }
        self.identities.insert(identity);
        self.entries.push(registration);
        Ok(())
    }

    /// First registration whose path equals `path` exactly
    pub fn exact(&self, path: &str) -> Option<&Registration> {
        self.by_path.get(path).and_then(|i| self.entries.get(*i))
    }

    /// Registrations whose path prefixes `path`, in registration order,
    /// paired with the extracted action.
    pub fn candidates<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Iterator<Item = (&'a Registration, &'a str)> + 'a {
        self.entries.iter().filter_map(move |registration| {
            let action = registration.action_for(path)?;
            debug!(name = %registration.name(), action = %action, "Candidate webhook");
            Some((registration, action))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: WebhookKind) -> impl Iterator<Item = &Registration> {
        self.entries.iter().filter(move |r| r.kind() == kind)
    }

    /// Environment settings declared by registered webhooks, paired with the
    /// declaring webhook's name
    pub fn settings(&self) -> Vec<(&str, WebhookSetting)> {
        self.entries
            .iter()
            .filter_map(|r| {
                let provider = r.webhook().as_settings_provider()?;
                Some((r.name(), provider.settings()))
            })
            .flat_map(|(name, settings)| settings.into_iter().map(move |s| (name, s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
