// src/pipeline/forwarder.rs
//! Forward step of the decision pipeline
//!
//! Issues the real request to the target and decodes the reply: JSON when
//! the target declares a JSON content type and the body parses, text
//! otherwise.

use crate::model::{Body, CanonicalRequest, HeaderList};
use crate::payment::PAYMENT_HEADER;
use crate::transport::AsyncTransport;
use crate::utils::errors::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Decoded target reply
#[derive(Debug, Clone, PartialEq)]
pub struct Forwarded {
    pub status: u16,
    pub headers: HeaderList,
    pub data: Body,
}

/// Sends checked requests upstream
#[derive(Clone)]
pub struct Forwarder {
    transport: Arc<dyn AsyncTransport>,
}

impl Forwarder {
    pub fn new(transport: Arc<dyn AsyncTransport>) -> Self {
        Self { transport }
    }

    /// Forward `request`, attaching a payment proof when one was supplied
    pub async fn forward(&self, mut request: CanonicalRequest, payment: Option<&str>) -> Result<Forwarded> {
        if matches!(request.body, Body::Json(_)) && !request.headers.contains("content-type") {
            request.headers.append("Content-Type", "application/json");
        }
        if let Some(proof) = payment {
            request.headers.set(PAYMENT_HEADER, proof);
        }

        let started = Instant::now();
        let result = self.transport.send(request).await;
        metrics::histogram!("agentwall_forward_seconds").record(started.elapsed().as_secs_f64());

        let response = result?;
        debug!("Target answered {}", response.status);
        let data = Body::decode(response.body.to_bytes(), response.headers.is_json());

        Ok(Forwarded {
            status: response.status,
            headers: response.headers,
            data,
        })
    }
}
