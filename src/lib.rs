// src/lib.rs
//! Agentwall: outbound request firewall for autonomous agents
//!
//! HTTP calls made by agent code are redirected through a policy-enforcing
//! proxy. The proxy blocks secrets and PII on the way out, blocks prompt
//! injection on the way back, and reports x402 payment demands so the
//! client can pay and retry once.
//!
//! # Architecture
//!
//! The crate is structured into these modules:
//!
//! - **model**: canonical request/response every surface converges to
//! - **adapters**: blocking, two-phase connection and async client surfaces
//! - **interception**: call sites, registry, per-context guard, session
//! - **client**: firewall client driving the proxy round trip and payment retry
//! - **payment**: x402 requirements, selection and negotiation state machine
//! - **protocol**: `/check` wire format shared by client and proxy
//! - **detection**: leakage and prompt-injection detectors
//! - **pipeline**: proxy-side input check, forward, output check
//! - **server**: the proxy's HTTP listener
//! - **observability**: tracing and metrics setup
//! - **utils**: errors and configuration

// Public module exports
pub mod adapters;
pub mod client;
pub mod detection;
pub mod interception;
pub mod model;
pub mod observability;
pub mod payment;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use adapters::{AsyncClient, BlockingClient, Connector};
pub use client::FirewallClient;
pub use interception::{FirewallSession, InterceptionRegistry};
pub use model::{Body, CanonicalRequest, CanonicalResponse, HeaderList};
pub use payment::{PaymentCriteria, PaymentPolicy, PaymentRequirement, Wallet};
pub use pipeline::DecisionPipeline;
pub use server::ProxyServer;
pub use utils::config::FirewallConfig;
pub use utils::errors::{FirewallError, Result, Stage};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
