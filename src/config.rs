//! Server configuration read from the environment.

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::certs::CertificateIdentity;
use crate::tls::{DEFAULT_CERT_DIR, TlsOptions};
use crate::webhooks::DispatchMode;

pub const ENV_HOST: &str = "WEBHOOK_HOST";
pub const ENV_PORT: &str = "WEBHOOK_PORT";
pub const ENV_INSECURE: &str = "WEBHOOK_INSECURE";
pub const ENV_CERT_FILE: &str = "WEBHOOK_CERT_FILE";
pub const ENV_KEY_FILE: &str = "WEBHOOK_KEY_FILE";
pub const ENV_CA_FILE: &str = "WEBHOOK_CA_FILE";
pub const ENV_CERT_DIR: &str = "WEBHOOK_CERT_DIR";
pub const ENV_NAMESPACE: &str = "WEBHOOK_NAMESPACE";
pub const ENV_POD_NAMESPACE: &str = "POD_NAMESPACE";
pub const ENV_APP_NAME: &str = "WEBHOOK_APP_NAME";
pub const ENV_SERVICE_NAME: &str = "WEBHOOK_SERVICE_NAME";
pub const ENV_DISPATCH: &str = "WEBHOOK_DISPATCH";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_APP_NAME: &str = "admission-webhook";

/// Invalid configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(variable: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidValue {
            variable,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Everything needed to stand up a webhook server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// 0 picks 443 with TLS and 80 without
    pub port: u16,
    pub tls: TlsOptions,
    pub namespace: String,
    pub application_name: String,
    /// Defaults to the application name
    pub service_name: Option<String>,
    pub dispatch: DispatchMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 0,
            tls: TlsOptions::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            application_name: DEFAULT_APP_NAME.to_string(),
            service_name: None,
            dispatch: DispatchMode::default(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`; unset and empty variables fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host_value = get(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host_value
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::invalid(ENV_HOST, &host_value, e))?;

        let port = match get(ENV_PORT) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid(ENV_PORT, &value, e))?,
            None => 0,
        };

        let insecure = match get(ENV_INSECURE) {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| ConfigError::invalid(ENV_INSECURE, &value, "expected a boolean"))?,
            None => false,
        };

        let dispatch = match get(ENV_DISPATCH) {
            Some(value) => value
                .parse::<DispatchMode>()
                .map_err(|e| ConfigError::invalid(ENV_DISPATCH, &value, e))?,
            None => DispatchMode::default(),
        };

        let namespace = get(ENV_NAMESPACE)
            .or_else(|| get(ENV_POD_NAMESPACE))
            .unwrap_or_else(|| {
                warn!(
                    "{} and {} not set, using '{}'",
                    ENV_NAMESPACE, ENV_POD_NAMESPACE, DEFAULT_NAMESPACE
                );
                DEFAULT_NAMESPACE.to_string()
            });

        let application_name = get(ENV_APP_NAME).unwrap_or_else(|| {
            debug!("{} not set, using '{}'", ENV_APP_NAME, DEFAULT_APP_NAME);
            DEFAULT_APP_NAME.to_string()
        });

        let tls = TlsOptions {
            insecure,
            certificate_file: get(ENV_CERT_FILE).map(PathBuf::from),
            private_key_file: get(ENV_KEY_FILE).map(PathBuf::from),
            ca_file: get(ENV_CA_FILE).map(PathBuf::from),
            certificate_dir: PathBuf::from(
                get(ENV_CERT_DIR).unwrap_or_else(|| DEFAULT_CERT_DIR.to_string()),
            ),
        };

        Ok(Self {
            host,
            port,
            tls,
            namespace,
            application_name,
            service_name: get(ENV_SERVICE_NAME),
            dispatch,
        })
    }

    /// Listener port after applying the automatic default
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.tls.insecure) {
            (0, true) => 80,
            (0, false) => 443,
            (port, _) => port,
        }
    }

    pub fn service_name(&self) -> &str {
        self.service_name
            .as_deref()
            .unwrap_or(&self.application_name)
    }

    /// Identity that provisioned certificates are issued for
    pub fn identity(&self) -> CertificateIdentity {
        CertificateIdentity::new(&self.namespace, &self.application_name)
            .with_service_name(self.service_name())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
