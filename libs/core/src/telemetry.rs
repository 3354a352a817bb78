use anyhow::Result;
use tracing::info_span;
use tracing_subscriber::EnvFilter;

use crate::config::TransportKind;

/// Installs a `fmt` subscriber on stderr configured from `RUST_LOG` (default `info`).
pub fn install(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    tracing::debug!(service = service_name, "telemetry installed");
    Ok(())
}

pub fn span_for(action: &'static str, transport: TransportKind) -> tracing::Span {
    info_span!("chat.transport", action, transport = transport.as_str())
}
