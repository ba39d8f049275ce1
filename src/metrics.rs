use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and serve `/metrics` on `listen`.
/// Must be called from inside the tokio runtime.
pub fn install(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid metrics_listen address {listen:?}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install recorder")?;

    crate::ingest::ensure_metrics_described();
    tracing::info!(%addr, "prometheus metrics listener started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_address() {
        assert!(install("not-an-address").is_err());
    }
}
