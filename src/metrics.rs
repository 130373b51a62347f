//! In-process admission metrics.
//!
//! Collected into a Prometheus registry and exposed through
//! [`AdmissionMetrics::encode`]; serving them is left to the embedding
//! process.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::webhooks::WebhookKind;

/// Labels identifying one webhook
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct WebhookLabels {
    pub kind: String,
    pub name: String,
}

impl WebhookLabels {
    pub fn new(kind: WebhookKind, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

impl EncodeLabelSet for WebhookLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for requests that never reached a handler
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RejectLabels {
    pub reason: String,
}

impl EncodeLabelSet for RejectLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("reason", self.reason.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Counters and timings for admission traffic
pub struct AdmissionMetrics {
    /// Handler invocations that produced a response
    pub requests_total: Family<WebhookLabels, Counter>,
    /// Handler invocations that failed or timed out
    pub request_errors_total: Family<WebhookLabels, Counter>,
    /// Handler execution time
    pub handler_duration_seconds: Family<WebhookLabels, Histogram>,
    /// Requests answered with 400/404 before any handler ran
    pub rejected_total: Family<RejectLabels, Counter>,
    registry: Registry,
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<WebhookLabels, Counter>::default();
        registry.register(
            "admission_requests",
            "Total number of admission requests answered by a webhook",
            requests_total.clone(),
        );

        let request_errors_total = Family::<WebhookLabels, Counter>::default();
        registry.register(
            "admission_request_errors",
            "Total number of admission handler failures",
            request_errors_total.clone(),
        );

        let handler_duration_seconds =
            Family::<WebhookLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0005, 2.0, 15))
            });
        registry.register(
            "admission_handler_duration_seconds",
            "Duration of admission handler execution in seconds",
            handler_duration_seconds.clone(),
        );

        let rejected_total = Family::<RejectLabels, Counter>::default();
        registry.register(
            "admission_rejected",
            "Total number of admission requests rejected before dispatch",
            rejected_total.clone(),
        );

        Self {
            requests_total,
            request_errors_total,
            handler_duration_seconds,
            rejected_total,
            registry,
        }
    }

    /// Record a handler that produced a response
    pub fn record_response(&self, kind: WebhookKind, name: &str, duration_secs: f64) {
        let labels = WebhookLabels::new(kind, name);
        self.requests_total.get_or_create(&labels).inc();
        self.handler_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a handler failure
    pub fn record_error(&self, kind: WebhookKind, name: &str, duration_secs: f64) {
        let labels = WebhookLabels::new(kind, name);
        self.request_errors_total.get_or_create(&labels).inc();
        self.handler_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a request turned away before dispatch (`not_found`, `invalid_content`)
    pub fn record_rejected(&self, reason: &str) {
        let labels = RejectLabels {
            reason: reason.to_string(),
        };
        self.rejected_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}
