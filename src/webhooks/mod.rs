//! Admission webhook registration, dispatch, and serving.
//!
//! Webhooks implement [`AdmissionWebhook`] and are mounted under
//! `/mutate/<name>` or `/validate/<name>`. The [`Dispatcher`] decodes each
//! admission review, routes it, and wraps the handler's answer in a
//! response envelope matching the request's version.

mod dispatcher;
mod lifecycle;
mod manifest;
mod registry;
mod review;
mod server;
mod webhook;

pub use dispatcher::{DispatchOutcome, Dispatcher, INVALID_CONTENT, NOT_FOUND};
pub use lifecycle::{ServerEvent, ServerPhase, TransitionResult, transition, valid_events};
pub use manifest::{RegistrationManifests, ServiceCoordinates, build_manifests};
pub use registry::{
    DispatchMode, Registration, RegistrationError, Registry, UnknownDispatchMode, resolve_action,
    webhook_path,
};
pub use review::{
    ADMISSION_GROUP, AdmissionExchange, ReviewError, SUPPORTED_ADMISSION_VERSIONS,
};
pub use server::{
    RunningServer, ServerError, WebhookServer, run_to_termination, shutdown_signal,
};
pub use webhook::{
    AdmissionWebhook, DEFAULT_ADMISSION_REVIEW_VERSIONS, DEFAULT_SIDE_EFFECTS,
    DEFAULT_TIMEOUT_SECONDS, HandlerError, RuleProvider, SettingsProvider, WebhookKind,
    WebhookRequest, WebhookSetting,
};

// Re-export kube-rs admission types for webhook implementors
pub use kube::core::DynamicObject;
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
