// src/utils/mod.rs
//! Common utilities shared by the client and proxy halves
//!
//! - **errors**: crate-wide error taxonomy and `Result` alias
//! - **config**: layered configuration (defaults, file, environment)

pub mod config;
pub mod errors;

pub use config::FirewallConfig;
pub use errors::{FirewallError, Result, Stage};
