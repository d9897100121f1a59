// src/main.rs
//! Agentwall proxy
//!
//! Runs the decision pipeline behind `POST /check`.

use agentwall::observability::{init_metrics, init_tracing};
use agentwall::pipeline::DecisionPipeline;
use agentwall::server::ProxyServer;
use agentwall::utils::config::FirewallConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = FirewallConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    info!("Starting Agentwall proxy v{}", agentwall::VERSION);
    info!("Configuration loaded: {:?}", config);

    let pipeline = DecisionPipeline::from_config(&config.pipeline)?;
    info!(
        "Leakage check restricted to: {}",
        pipeline
            .entities()
            .iter()
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let server = Arc::new(ProxyServer::new(config.server.clone(), Arc::new(pipeline)));

    // Graceful shutdown handler
    tokio::select! {
        result = server.start() => {
            if let Err(e) = &result {
                error!("Server error: {}", e);
            }
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to install CTRL+C signal handler")?;
            info!("Received shutdown signal, stopping proxy");
        }
    }

    Ok(())
}
