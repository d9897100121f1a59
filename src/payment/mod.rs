// src/payment/mod.rs
//! x402 payment negotiation
//!
//! - **requirement**: payment requirements, caller criteria, selection policy
//! - **negotiator**: selection algorithm and the one-retry state machine
//! - **wallet**: the signing capability consumed by the negotiator

pub mod negotiator;
pub mod requirement;
pub mod wallet;

pub use negotiator::{
    select_requirement, NegotiationState, Negotiator, NegotiatorConfig, NO_MATCHING_REQUIREMENT,
};
pub use requirement::{PaymentCriteria, PaymentPolicy, PaymentRequirement};
pub use wallet::{PaymentProof, Wallet, PAYMENT_HEADER};
