//! webhook-certs - prepare TLS material for an admission webhook.
//!
//! Reads the server configuration from the environment, applies the TLS
//! policy (provisioning a self-signed authority and serving certificate
//! when nothing was supplied), and prints where the listener's files are
//! and the trust bundle registrations should carry.

use std::process::ExitCode;

use tracing::{error, info};

use kube_admission_core::ServerConfig;
use kube_admission_core::telemetry::init_tracing;
use kube_admission_core::tls::{ListenerSecurity, resolve};

fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Failed to prepare webhook certificates");
            ExitCode::FAILURE
        }
    }
}

fn run() -> kube_admission_core::Result<()> {
    let config = ServerConfig::from_env()?;
    info!(
        namespace = %config.namespace,
        application = %config.application_name,
        service = %config.service_name(),
        port = config.effective_port(),
        "Resolving webhook TLS"
    );

    let setup = resolve(&config.tls, &config.identity())?;
    match &setup.listener {
        ListenerSecurity::Plaintext => println!("listener: plaintext"),
        ListenerSecurity::Tls(paths) => {
            println!("certificate: {}", paths.certificate.display());
            println!("private-key: {}", paths.private_key.display());
        }
    }
    match &setup.trust_bundle {
        Some(bundle) => println!("ca-bundle: {}", bundle.encoded()),
        None => println!("ca-bundle: none"),
    }
    Ok(())
}
