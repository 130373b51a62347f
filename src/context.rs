//! Explicit cluster client handle.
//!
//! Built once by the caller and passed to whatever needs cluster lookups,
//! so nothing in the crate depends on process-wide client state.

use std::path::Path;

use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Api, Client, Config};
use thiserror::Error;
use tracing::{debug, info};

use crate::tls::install_crypto_provider;

/// Errors building a cluster client
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to read kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] InferConfigError),

    #[error("failed to create kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

/// Kubernetes client plus the lookups webhooks commonly need.
#[derive(Clone)]
pub struct ClusterContext {
    client: Client,
}

impl ClusterContext {
    /// Build a client from the in-cluster service account, falling back to
    /// `kubeconfig` (or the default kubeconfig search when `None`).
    pub async fn init(kubeconfig: Option<&Path>) -> Result<Self, ContextError> {
        install_crypto_provider();

        let config = match Config::incluster() {
            Ok(config) => {
                info!("Using in-cluster configuration");
                config
            }
            Err(e) => {
                debug!(error = %e, "In-cluster configuration unavailable");
                match kubeconfig {
                    Some(path) => {
                        info!(path = %path.display(), "Using kubeconfig");
                        let kubeconfig = Kubeconfig::read_from(path)?;
                        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                            .await?
                    }
                    None => Config::infer().await?,
                }
            }
        };

        Ok(Self::from_client(Client::try_from(config)?))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch a namespace by name
    pub async fn namespace(&self, name: &str) -> Result<Namespace, kube::Error> {
        Api::<Namespace>::all(self.client.clone()).get(name).await
    }

    /// Fetch a pod by namespace and name
    pub async fn pod(&self, namespace: &str, name: &str) -> Result<Pod, kube::Error> {
        Api::<Pod>::namespaced(self.client.clone(), namespace)
            .get(name)
            .await
    }
}
