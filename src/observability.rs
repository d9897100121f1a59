// src/observability.rs
//! Logging and metrics setup for the proxy binary
//!
//! Metrics recorded across the crate:
//!
//! | name                              | kind      | labels    |
//! |-----------------------------------|-----------|-----------|
//! | `agentwall_decisions_total`       | counter   | `outcome` |
//! | `agentwall_forward_seconds`       | histogram |           |
//! | `agentwall_payment_retries_total` | counter   |           |

use crate::utils::config::{LogFormat, ObservabilityConfig};
use crate::utils::errors::{FirewallError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured filter when set.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| FirewallError::ConfigError(format!("Invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| FirewallError::Internal(format!("Failed to install tracing: {}", e)))
}

/// Start the Prometheus exporter when an address is configured
///
/// Must run inside the tokio runtime. Returns the bound address, if any.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<Option<SocketAddr>> {
    let Some(addr) = config.metrics_addr.as_deref() else {
        return Ok(None);
    };
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| FirewallError::ConfigError(format!("Invalid metrics address {}: {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| FirewallError::Internal(format!("Failed to start metrics exporter: {}", e)))?;

    info!("Prometheus metrics exposed on http://{}/metrics", addr);
    Ok(Some(addr))
}
