// src/utils/config.rs
//! Layered configuration
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `agentwall.{toml,yaml,json}` in the working directory, or the file
//!    named by `AGENTWALL_CONFIG`
//! 3. `AGENTWALL__<SECTION>__<KEY>` environment variables
//!    (e.g. `AGENTWALL__SERVER__PORT=8080`,
//!    `AGENTWALL__PIPELINE__ENTITIES=CRYPTO,CREDIT_CARD`)

use crate::detection::EntityKind;
use crate::utils::errors::{FirewallError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "AGENTWALL_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Proxy server listener
    pub server: ServerConfig,

    /// Decision pipeline settings
    pub pipeline: PipelineConfig,

    /// Client-side settings (proxy location, payment matching)
    pub client: ClientConfig,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// Proxy server listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Largest `/check` body accepted (bytes)
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4021,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| FirewallError::ConfigError(format!("Invalid server address: {}", e)))
    }
}

/// Decision pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Entity kinds the leakage check looks for
    pub entities: Vec<EntityKind>,

    /// Timeout for the forwarded upstream request
    pub forward_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entities: EntityKind::default_allow_list(),
            forward_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }
}

/// Client-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the firewall proxy
    pub proxy_url: String,

    /// Timeout for one proxy round trip
    pub timeout_secs: u64,

    /// Retry the explicit match without the scheme constraint
    pub allow_scheme_fallback: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://127.0.0.1:4021".to_string(),
            timeout_secs: 60,
            allow_scheme_fallback: true,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log line format
    pub log_format: LogFormat,

    /// Default filter when `RUST_LOG` is unset
    pub log_filter: String,

    /// Prometheus exporter address; metrics are off when unset
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "agentwall=info".to_string(),
            metrics_addr: None,
        }
    }
}

impl FirewallConfig {
    /// Load from the default file (if any) and the environment
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from(Some(Path::new(&path))),
            Err(_) => Self::load_from(None),
        }
    }

    /// Load with an explicit file; a missing explicit file is an error
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => {
                debug!("Loading configuration from {:?}", path);
                builder.add_source(File::from(path).required(true))
            }
            None => builder.add_source(File::with_name("agentwall").required(false)),
        };

        let config = builder
            .add_source(
                Environment::with_prefix("AGENTWALL")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("pipeline.entities")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        self.server.listen_addr()?;

        url::Url::parse(&self.client.proxy_url).map_err(|e| {
            FirewallError::ConfigError(format!(
                "Invalid proxy URL {}: {}",
                self.client.proxy_url, e
            ))
        })?;

        if self.pipeline.forward_timeout_secs == 0 {
            return Err(FirewallError::ConfigError(
                "pipeline.forward_timeout_secs must be positive".to_string(),
            ));
        }

        if let Some(addr) = &self.observability.metrics_addr {
            addr.parse::<SocketAddr>().map_err(|e| {
                FirewallError::ConfigError(format!("Invalid metrics address {}: {}", addr, e))
            })?;
        }

        Ok(())
    }
}
