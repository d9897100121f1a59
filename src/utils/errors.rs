// src/utils/errors.rs
//! Error taxonomy for the firewall
//!
//! Every failure an adapter can observe maps onto one of five kinds:
//! invalid input, transport failure, security rejection, payment
//! negotiation failure, or an opaque internal error. Security rejections
//! stay a distinct variant all the way up so calling code can branch on
//! them instead of treating them as ordinary HTTP errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which side of the decision pipeline produced a security rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Outbound request checked for leaked secrets/PII
    Input,

    /// Upstream response checked for prompt injection
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Errors surfaced by the firewall
#[derive(Error, Debug)]
pub enum FirewallError {
    /// Request could not be normalized; never reaches the network
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection, timeout or upstream failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Blocked by the leakage or injection check
    #[error("Security rejection at {stage} check: {reason}")]
    SecurityRejection { stage: Stage, reason: String },

    /// No acceptable payment requirement, or no proof could be produced
    #[error("Payment negotiation failed: {0}")]
    PaymentNegotiation(String),

    /// Anything unexpected; message is safe to show
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FirewallError {
    /// True when the proxy refused the call on security grounds
    pub fn is_security_rejection(&self) -> bool {
        matches!(self, Self::SecurityRejection { .. })
    }

    /// Stage that rejected the call, if this is a security rejection
    pub fn rejection_stage(&self) -> Option<Stage> {
        match self {
            Self::SecurityRejection { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// True for payment negotiation failures
    pub fn is_payment_failure(&self) -> bool {
        matches!(self, Self::PaymentNegotiation(_))
    }
}

impl From<reqwest::Error> for FirewallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<config::ConfigError> for FirewallError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, FirewallError>;
