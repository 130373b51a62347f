//! Test fixtures: admission review bodies and scripted webhooks.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::RuleWithOperations;
use kube_admission_core::webhooks::{
    AdmissionRequest, AdmissionResponse, AdmissionWebhook, DynamicObject, HandlerError,
    RuleProvider, WebhookKind, WebhookRequest,
};
use serde_json::{Value, json};

/// Builder for admission review request bodies.
///
/// # Example
/// ```
/// let body = ReviewBuilder::new().api_version("admission.k8s.io/v1beta1").uid("abc").body();
/// ```
#[derive(Clone, Debug)]
pub struct ReviewBuilder {
    api_version: String,
    uid: String,
    operation: String,
    name: String,
    namespace: String,
    padding: usize,
}

impl Default for ReviewBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewBuilder {
    pub fn new() -> Self {
        Self {
            api_version: "admission.k8s.io/v1".to_string(),
            uid: "705ab4f5-6393-11e8-b7cc-42010a800002".to_string(),
            operation: "CREATE".to_string(),
            name: "web".to_string(),
            namespace: "default".to_string(),
            padding: 0,
        }
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// An UPDATE whose object and oldObject each carry an annotation of
    /// `bytes` bytes.
    pub fn padded_update(mut self, bytes: usize) -> Self {
        self.operation = "UPDATE".to_string();
        self.padding = bytes;
        self
    }

    fn pod(&self) -> Value {
        let mut metadata = json!({"name": self.name, "namespace": self.namespace});
        if self.padding > 0 {
            metadata["annotations"] = json!({"example.com/blob": "x".repeat(self.padding)});
        }
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": metadata,
            "spec": {"containers": [{"name": "web", "image": "nginx"}]}
        })
    }

    pub fn json(&self) -> Value {
        let mut review = json!({
            "apiVersion": self.api_version,
            "kind": "AdmissionReview",
            "request": {
                "uid": self.uid,
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": self.name,
                "namespace": self.namespace,
                "operation": self.operation,
                "userInfo": {"username": "system:admin", "groups": ["system:masters"]},
                "object": self.pod(),
                "dryRun": false
            }
        });
        if self.padding > 0 {
            review["request"]["oldObject"] = self.pod();
        }
        review
    }

    pub fn body(&self) -> Vec<u8> {
        serde_json::to_vec(&self.json()).expect("review serializes")
    }
}

/// What a [`ScriptedWebhook`] does when called
#[derive(Clone, Debug)]
pub enum Script {
    Allow,
    Deny(&'static str),
    Decline,
    Fail(&'static str),
    Sleep(Duration),
}

/// A webhook with a fixed answer that counts its calls and remembers the
/// last action it saw.
pub struct ScriptedWebhook {
    name: String,
    kind: WebhookKind,
    path: Option<String>,
    script: Script,
    timeout_seconds: Option<i32>,
    calls: AtomicUsize,
    last_action: std::sync::Mutex<Option<String>>,
}

impl ScriptedWebhook {
    pub fn new(name: impl Into<String>, kind: WebhookKind, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            path: None,
            script,
            timeout_seconds: None,
            calls: AtomicUsize::new(0),
            last_action: std::sync::Mutex::new(None),
        })
    }

    pub fn with_timeout(
        name: impl Into<String>,
        kind: WebhookKind,
        script: Script,
        timeout_seconds: i32,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            path: None,
            script,
            timeout_seconds: Some(timeout_seconds),
            calls: AtomicUsize::new(0),
            last_action: std::sync::Mutex::new(None),
        })
    }

    /// Mounted at `path` instead of the kind's default
    pub fn mounted(
        name: impl Into<String>,
        kind: WebhookKind,
        path: impl Into<String>,
        script: Script,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            path: Some(path.into()),
            script,
            timeout_seconds: None,
            calls: AtomicUsize::new(0),
            last_action: std::sync::Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_action(&self) -> Option<String> {
        self.last_action.lock().unwrap().clone()
    }
}

impl RuleProvider for ScriptedWebhook {
    fn rules(&self) -> Vec<RuleWithOperations> {
        Vec::new()
    }

    fn timeout_seconds(&self) -> i32 {
        self.timeout_seconds.unwrap_or(5)
    }
}

#[async_trait]
impl AdmissionWebhook for ScriptedWebhook {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> WebhookKind {
        self.kind
    }

    fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    async fn handle(
        &self,
        request: &WebhookRequest,
        review: &AdmissionRequest<DynamicObject>,
    ) -> Result<Option<AdmissionResponse>, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_action.lock().unwrap() = Some(request.action.clone());

        match &self.script {
            Script::Allow => Ok(Some(AdmissionResponse::from(review))),
            Script::Deny(reason) => Ok(Some(AdmissionResponse::from(review).deny(*reason))),
            Script::Decline => Ok(None),
            Script::Fail(message) => Err((*message).into()),
            Script::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Some(AdmissionResponse::from(review)))
            }
        }
    }

    fn as_rule_provider(&self) -> Option<&dyn RuleProvider> {
        self.timeout_seconds.map(|_| self as &dyn RuleProvider)
    }
}

/// Erase the concrete type for registration
pub fn erased(webhook: &Arc<ScriptedWebhook>) -> Arc<dyn AdmissionWebhook> {
    webhook.clone()
}
