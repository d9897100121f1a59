// src/model/mod.rs
//! Canonical data model shared by adapters, client and proxy
//!
//! ```text
//! native call ──► CanonicalRequest ──► (firewall) ──► CanonicalResponse ──► native response
//! ```

pub mod body;
pub mod canonical;
pub mod headers;

pub use body::{Body, WireEncoding};
pub use canonical::{CanonicalRequest, CanonicalResponse};
pub use headers::HeaderList;
