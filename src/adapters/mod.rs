// src/adapters/mod.rs
//! Client surfaces
//!
//! Each surface is built on its own call site and translates between its
//! native call shape and the canonical request/response:
//!
//! - **blocking**: synchronous request builder
//! - **connection**: two-phase request / get_response connection object
//! - **nonblocking**: async request builder with awaited body readers

pub mod blocking;
pub mod connection;
pub mod nonblocking;

pub use blocking::{BlockingClient, BlockingResponse, RequestBuilder};
pub use connection::{Connection, ConnectionResponse, Connector};
pub use nonblocking::{AsyncClient, AsyncRequestBuilder, AsyncResponse};
