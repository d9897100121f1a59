// src/payment/wallet.rs
//! Wallet capability
//!
//! Signing and settlement are outside this crate. The firewall only needs a
//! signer identity, a way to tell which requirements a wallet can pay, and a
//! proof for the one it chose.

use crate::payment::requirement::PaymentRequirement;
use crate::utils::errors::Result;
use std::fmt;

/// Header carrying the payment proof on the retried call
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Opaque signed payment artifact, already encoded for the header
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentProof(String);

impl PaymentProof {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// proofs are bearer credentials; keep them out of logs
impl fmt::Debug for PaymentProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentProof({} bytes)", self.0.len())
    }
}

/// Payer side of the x402 flow
pub trait Wallet: Send + Sync {
    /// Address or key id that signs payments
    fn signer(&self) -> &str;

    /// Whether this wallet can pay `requirement`
    fn supports(&self, requirement: &PaymentRequirement) -> bool;

    /// Pick a requirement under the auto policy
    fn choose<'a>(&self, accepts: &'a [PaymentRequirement]) -> Option<&'a PaymentRequirement> {
        accepts.iter().find(|requirement| self.supports(requirement))
    }

    /// Sign a payment for exactly this requirement
    fn produce_proof(&self, requirement: &PaymentRequirement) -> Result<PaymentProof>;
}
