//! kube-admission-core library crate
//!
//! Building blocks for Kubernetes admission webhook servers: certificate
//! provisioning for the HTTPS listener, the TLS policy that picks between
//! provisioned, supplied, and plaintext listeners, and an admission review
//! dispatcher that routes requests to registered webhooks.

pub mod certs;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod telemetry;
pub mod tls;
pub mod webhooks;

pub use config::{ConfigError, ServerConfig};
pub use context::{ClusterContext, ContextError};
pub use error::{Error, Result};
pub use metrics::AdmissionMetrics;
pub use tls::{ListenerSecurity, TlsError, TlsOptions, TlsSetup};
pub use webhooks::{
    AdmissionWebhook, DispatchMode, Dispatcher, Registry, RunningServer, WebhookKind,
    WebhookServer, run_to_termination,
};
