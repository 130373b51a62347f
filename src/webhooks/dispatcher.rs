//! Routes admission requests to registered webhooks.
//!
//! Two routing modes, chosen by the registry:
//! - exact path: the URL path selects one webhook; unknown paths get 404
//! - shared prefix: every webhook whose path prefixes the URL is tried in
//!   registration order and the first one to answer wins
//!
//! Protocol errors (400), handler errors (400) and routing misses (404) are
//! answered here and never escape the request.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionResponse, AdmissionReview};
use tracing::{debug, error, info, warn};

use super::registry::{DispatchMode, Registration, Registry};
use super::review::AdmissionExchange;
use super::webhook::{HandlerError, WebhookRequest};
use crate::metrics::AdmissionMetrics;

/// Body of a 400 answer to an undecodable envelope
pub const INVALID_CONTENT: &str = "Invalid content";

/// Body of a 404 answer
pub const NOT_FOUND: &str = "Not found";

/// What the dispatcher answered
#[derive(Debug)]
pub enum DispatchOutcome {
    /// 200 with the response envelope
    Responded(AdmissionReview<DynamicObject>),
    /// 400, body was not a supported admission review
    InvalidContent,
    /// 404, no webhook answered
    NotFound,
    /// 400, a handler failed or timed out
    HandlerFailed(String),
}

impl DispatchOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchOutcome::Responded(_) => StatusCode::OK,
            DispatchOutcome::InvalidContent | DispatchOutcome::HandlerFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchOutcome::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            DispatchOutcome::Responded(review) => (status, Json(review)).into_response(),
            DispatchOutcome::InvalidContent => (status, INVALID_CONTENT).into_response(),
            DispatchOutcome::NotFound => (status, NOT_FOUND).into_response(),
            DispatchOutcome::HandlerFailed(message) => (
                status,
                format!("Error in handling admission request: {}", message),
            )
                .into_response(),
        }
    }
}

/// Shared request router over an immutable registry.
pub struct Dispatcher {
    registry: Arc<Registry>,
    metrics: Arc<AdmissionMetrics>,
}

impl Dispatcher {
    /// Routing follows the registry's [`DispatchMode`].
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(AdmissionMetrics::new()),
        }
    }

    /// Record into an externally owned metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<AdmissionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn mode(&self) -> DispatchMode {
        self.registry.mode()
    }

    pub fn metrics(&self) -> &Arc<AdmissionMetrics> {
        &self.metrics
    }

    /// Answer one admission request.
    pub async fn dispatch(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: &[u8],
    ) -> DispatchOutcome {
        debug!(
            path = %uri.path(),
            content_type = ?headers.get("content-type"),
            content_length = body.len(),
            "Received admission request"
        );

        let outcome = match self.mode() {
            DispatchMode::ExactPath => self.dispatch_exact(method, uri, headers, body).await,
            DispatchMode::SharedPrefix => self.dispatch_prefix(method, uri, headers, body).await,
        };

        match &outcome {
            DispatchOutcome::InvalidContent => self.metrics.record_rejected("invalid_content"),
            DispatchOutcome::NotFound => self.metrics.record_rejected("not_found"),
            _ => {}
        }
        outcome
    }

    async fn dispatch_exact(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: &[u8],
    ) -> DispatchOutcome {
        let Some(registration) = self.registry.exact(uri.path()) else {
            debug!(path = %uri.path(), "No webhook registered for path");
            return DispatchOutcome::NotFound;
        };

        let exchange = match decode(body) {
            Some(exchange) => exchange,
            None => return DispatchOutcome::InvalidContent,
        };

        let request = WebhookRequest {
            method,
            uri,
            headers,
            action: String::new(),
        };
        match self.invoke(registration, &request, &exchange).await {
            Ok(Some(response)) => DispatchOutcome::Responded(exchange.respond(response)),
            Ok(None) => {
                warn!(name = %registration.name(), uid = %exchange.uid(), "Webhook returned no response");
                DispatchOutcome::NotFound
            }
            Err(e) => DispatchOutcome::HandlerFailed(e.to_string()),
        }
    }

    async fn dispatch_prefix(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: &[u8],
    ) -> DispatchOutcome {
        let exchange = match decode(body) {
            Some(exchange) => exchange,
            None => return DispatchOutcome::InvalidContent,
        };

        let mut request = WebhookRequest {
            method,
            uri,
            headers,
            action: String::new(),
        };
        let path = request.path().to_string();

        for (registration, action) in self.registry.candidates(&path) {
            request.action = action.to_string();
            debug!(
                name = %registration.name(),
                path = %registration.path(),
                action = %action,
                "Trying webhook"
            );

            match self.invoke(registration, &request, &exchange).await {
                Ok(Some(response)) => {
                    return DispatchOutcome::Responded(exchange.respond(response));
                }
                Ok(None) => continue,
                Err(e) => return DispatchOutcome::HandlerFailed(e.to_string()),
            }
        }

        debug!(path = %path, uid = %exchange.uid(), "No webhook answered");
        DispatchOutcome::NotFound
    }

    /// Run one handler under its timeout and record the outcome.
    async fn invoke(
        &self,
        registration: &Registration,
        request: &WebhookRequest,
        exchange: &AdmissionExchange,
    ) -> Result<Option<AdmissionResponse>, HandlerError> {
        let start = Instant::now();
        let timeout = registration.timeout();

        let result = match tokio::time::timeout(
            timeout,
            registration.webhook().handle(request, exchange.request()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!("handler timed out after {}s", timeout.as_secs()).into()),
        };
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(Some(response)) => {
                info!(
                    name = %registration.name(),
                    uid = %exchange.uid(),
                    allowed = response.allowed,
                    "Admission request handled"
                );
                self.metrics
                    .record_response(registration.kind(), registration.name(), elapsed);
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    name = %registration.name(),
                    uid = %exchange.uid(),
                    error = %e,
                    "Error in handling admission request"
                );
                self.metrics
                    .record_error(registration.kind(), registration.name(), elapsed);
            }
        }
        result
    }

    /// Router answering every path through this dispatcher.
    ///
    /// Bodies are not size-capped: an UPDATE review carries two copies of
    /// the object and the API server already bounds each one.
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(admit)
            .layer(DefaultBodyLimit::disable())
            .with_state(Arc::new(self))
    }
}

fn decode(body: &[u8]) -> Option<AdmissionExchange> {
    match AdmissionExchange::decode(body) {
        Ok(exchange) => Some(exchange),
        Err(e) => {
            error!(error = %e, "Error in deserializing admission request");
            None
        }
    }
}

async fn admit(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> DispatchOutcome {
    dispatcher.dispatch(method, uri, headers, &body).await
}
