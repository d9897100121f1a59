// src/client/mod.rs
//! Client half of the firewall
//!
//! [`FirewallClient`] is what redirected call sites hand their canonical
//! requests to. It owns the proxy uplinks, the payment policy and the
//! optional wallet.

pub mod firewall;

pub use firewall::{Fetched, FirewallClient, FirewallClientBuilder};
