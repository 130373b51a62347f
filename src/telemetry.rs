//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

/// Directives applied on top of `RUST_LOG`
const DEFAULT_DIRECTIVES: [&str; 2] = ["kube_admission_core=info", "kube=info"];

/// Build the env filter used by [`init_tracing`].
pub fn env_filter() -> Result<EnvFilter, ParseError> {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Install a JSON subscriber for the process. Call once, from `main`.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .json()
        .try_init()
}
