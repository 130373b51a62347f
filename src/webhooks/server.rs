//! Admission webhook server.
//!
//! Binds one listener, plaintext or rustls-terminated, and answers every
//! path through the [`Dispatcher`]. Lifecycle phases are published on a
//! watch channel so callers can observe startup and shutdown.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::lifecycle::{ServerEvent, ServerPhase, TransitionResult, transition};
use super::manifest::{RegistrationManifests, ServiceCoordinates, build_manifests};
use super::registry::Registry;
use super::webhook::AdmissionWebhook;
use crate::certs::TrustBundle;
use crate::config::ServerConfig;
use crate::tls::{ListenerSecurity, TlsSetup, install_crypto_provider, resolve};

/// Errors that can occur when running the webhook server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Certificate or key could not be loaded into rustls
    #[error("TLS configuration error: {0}")]
    TlsConfig(#[source] io::Error),

    /// The listener never came up
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    /// The listener failed while serving
    #[error("webhook server error: {0}")]
    Transport(#[source] io::Error),

    #[error("invalid lifecycle transition from {current} on {event}")]
    InvalidTransition {
        current: ServerPhase,
        event: ServerEvent,
    },
}

/// A configured, not yet started server.
pub struct WebhookServer {
    addr: SocketAddr,
    listener: ListenerSecurity,
    trust_bundle: Option<TrustBundle>,
    dispatcher: Dispatcher,
}

impl WebhookServer {
    pub fn new(addr: SocketAddr, tls: TlsSetup, dispatcher: Dispatcher) -> Self {
        Self {
            addr,
            listener: tls.listener,
            trust_bundle: tls.trust_bundle,
            dispatcher,
        }
    }

    /// Register `webhooks` and resolve the TLS policy for `config`.
    /// Certificates are provisioned here when needed.
    pub fn from_config(
        config: &ServerConfig,
        webhooks: Vec<Arc<dyn AdmissionWebhook>>,
    ) -> crate::Result<Self> {
        let registry = Registry::from_webhooks(config.dispatch, webhooks)?;
        if registry.is_empty() {
            warn!("No webhooks registered; every request will be answered with 404");
        }

        let tls = resolve(&config.tls, &config.identity())?;
        let addr = SocketAddr::new(config.host, config.effective_port());
        Ok(Self::new(addr, tls, Dispatcher::new(registry)))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn listener(&self) -> &ListenerSecurity {
        &self.listener
    }

    /// CA bundle registrations should carry, if any
    pub fn trust_bundle(&self) -> Option<&TrustBundle> {
        self.trust_bundle.as_ref()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Webhook configurations pointing at `service`
    pub fn manifests(&self, service: &ServiceCoordinates) -> RegistrationManifests {
        build_manifests(
            self.dispatcher.registry(),
            service,
            self.trust_bundle.as_ref(),
        )
    }

    /// Bind the listener and start serving in the background.
    ///
    /// Returns once the socket is bound, so `local_addr` is usable
    /// immediately.
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        let (phase, _) = watch::channel(ServerPhase::Created);
        let handle = Handle::new();
        let addr = self.addr;
        let tls = self.listener.is_tls();
        let app = self.dispatcher.into_router();

        let serve: JoinHandle<io::Result<()>> = match &self.listener {
            ListenerSecurity::Plaintext => {
                let server = axum_server::bind(addr).handle(handle.clone());
                tokio::spawn(async move { server.serve(app.into_make_service()).await })
            }
            ListenerSecurity::Tls(paths) => {
                install_crypto_provider();
                let config = RustlsConfig::from_pem_file(&paths.certificate, &paths.private_key)
                    .await
                    .map_err(ServerError::TlsConfig)?;
                let server = axum_server::bind_rustls(addr, config).handle(handle.clone());
                tokio::spawn(async move { server.serve(app.into_make_service()).await })
            }
        };

        let Some(local_addr) = handle.listening().await else {
            let reason = match serve.await {
                Ok(Err(e)) => e.to_string(),
                Ok(Ok(())) => "listener exited before binding".to_string(),
                Err(e) => e.to_string(),
            };
            return Err(ServerError::Bind { addr, reason });
        };

        advance(&phase, ServerEvent::Bound)?;
        info!(addr = %local_addr, tls, "Webhook server listening");

        Ok(RunningServer {
            local_addr,
            handle,
            phase,
            serve,
        })
    }
}

/// A bound, serving listener.
pub struct RunningServer {
    local_addr: SocketAddr,
    handle: Handle,
    phase: watch::Sender<ServerPhase>,
    serve: JoinHandle<io::Result<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn phase(&self) -> ServerPhase {
        *self.phase.borrow()
    }

    /// Observe phase changes
    pub fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    /// Stop accepting and wait for in-flight requests to finish.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        advance(&self.phase, ServerEvent::ShutdownRequested)?;
        info!(connections = self.handle.connection_count(), "Draining webhook server");
        self.handle.graceful_shutdown(None);

        let joined = self.serve.await;
        conclude(&self.phase, joined)
    }

    /// Serve until `signal` resolves, then shut down gracefully.
    ///
    /// Returns early with an error if the listener fails first.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let exited = tokio::select! {
            joined = &mut self.serve => Some(joined),
            _ = signal => None,
        };

        match exited {
            Some(joined) => {
                let result = match joined {
                    Ok(Ok(())) => Ok(Err(io::Error::other("listener exited unexpectedly"))),
                    other => other,
                };
                conclude(&self.phase, result)
            }
            None => {
                info!("Received shutdown signal, initiating graceful shutdown...");
                self.shutdown().await
            }
        }
    }
}

fn advance(phase: &watch::Sender<ServerPhase>, event: ServerEvent) -> Result<ServerPhase, ServerError> {
    let current = *phase.borrow();
    match transition(current, event) {
        TransitionResult::Success {
            from,
            to,
            description,
        } => {
            debug!(from = %from, to = %to, event = %event, "{}", description);
            phase.send_replace(to);
            Ok(to)
        }
        TransitionResult::InvalidTransition { current, event } => {
            warn!(current = %current, event = %event, "Invalid server lifecycle transition");
            Err(ServerError::InvalidTransition { current, event })
        }
    }
}

fn conclude(
    phase: &watch::Sender<ServerPhase>,
    joined: Result<io::Result<()>, JoinError>,
) -> Result<(), ServerError> {
    let result = match joined {
        Ok(result) => result,
        Err(e) => Err(io::Error::other(e)),
    };

    match result {
        Ok(()) => {
            advance(phase, ServerEvent::Drained)?;
            info!("Webhook server stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Webhook server failed");
            advance(phase, ServerEvent::TransportFailed)?;
            Err(ServerError::Transport(e))
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// If a handler cannot be installed that source is ignored and the other
/// still applies.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Register `webhooks`, resolve TLS from `config`, and serve until SIGTERM
/// or SIGINT.
pub async fn run_to_termination(
    config: ServerConfig,
    webhooks: Vec<Arc<dyn AdmissionWebhook>>,
) -> crate::Result<()> {
    let server = WebhookServer::from_config(&config, webhooks)?;
    let running = server.start().await?;
    running.run_until(shutdown_signal()).await?;
    Ok(())
}
