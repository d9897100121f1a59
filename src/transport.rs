// src/transport.rs
//! Transport seam
//!
//! A transport turns a [`CanonicalRequest`] into a [`CanonicalResponse`].
//! Call sites hold one, the firewall client sends its proxy envelope through
//! one, and the proxy forwards upstream through one. Two flavours exist
//! because the blocking and async surfaces must not share an executor.
//!
//! The `reqwest` implementations here are the "original" behaviour of a call
//! site before the firewall is installed over it.

use crate::model::{Body, CanonicalRequest, CanonicalResponse, HeaderList};
use crate::utils::errors::{FirewallError, Result};
use futures::future::BoxFuture;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

/// Headers describing the upstream encoding; stale once the body is re-read
const HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "keep-alive",
];

/// Synchronous, thread-per-call transport
pub trait Transport: Send + Sync {
    fn send(&self, request: CanonicalRequest) -> Result<CanonicalResponse>;
}

/// Asynchronous transport
pub trait AsyncTransport: Send + Sync {
    fn send(&self, request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>>;
}

/// Blocking HTTP transport backed by `reqwest::blocking`
///
/// The inner client is built on first use so constructing this type inside
/// an async runtime is harmless. `reqwest::blocking` must not run on a
/// runtime worker, so a call made from inside tokio is moved off it: through
/// `block_in_place` on a multi-thread runtime, onto a scoped thread on a
/// current-thread one.
pub struct HttpTransport {
    timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Err(_) => self.execute(request),
            Ok(RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| self.execute(request))
            }
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| self.execute(request))
                    .join()
                    .unwrap_or_else(|_| {
                        Err(FirewallError::Internal("blocking transport thread panicked".to_string()))
                    })
            }),
        }
    }
}

impl HttpTransport {
    fn execute(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        debug!("{} {} (direct, blocking)", request.method, request.url);

        let mut builder = self
            .client()?
            .request(request.http_method()?, request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_bytes().to_vec());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = HeaderList::from_header_map(response.headers());
        let bytes = response.bytes()?;

        CanonicalResponse::new(status, strip_hop_headers(headers), Body::Bytes(bytes))
    }
}

/// Async HTTP transport backed by `reqwest`
#[derive(Clone)]
pub struct AsyncHttpTransport {
    client: reqwest::Client,
}

impl AsyncHttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn execute(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        debug!("{} {} (direct, async)", request.method, request.url);

        let mut builder = self
            .client
            .request(request.http_method()?, request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_bytes());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = HeaderList::from_header_map(response.headers());
        let bytes = response.bytes().await?;

        CanonicalResponse::new(status, strip_hop_headers(headers), Body::Bytes(bytes))
    }
}

impl AsyncTransport for AsyncHttpTransport {
    fn send(&self, request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>> {
        Box::pin(self.execute(request))
    }
}

/// Drop headers that describe the upstream wire encoding
pub fn strip_hop_headers(mut headers: HeaderList) -> HeaderList {
    for name in HOP_HEADERS {
        headers.remove(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_headers() {
        let headers: HeaderList = vec![
            ("Content-Length", "12"),
            ("Content-Type", "text/plain"),
            ("Transfer-Encoding", "chunked"),
        ]
        .into();
        let stripped = strip_hop_headers(headers);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_blocking_transport_is_lazy() {
        let transport = HttpTransport::default();
        assert!(transport.client.get().is_none());
    }

    #[test]
    fn test_connection_refused_is_transport_error() {
        let transport = HttpTransport::new(Duration::from_millis(500));
        let request = CanonicalRequest::new("test", "GET", "http://127.0.0.1:1/unreachable").unwrap();
        let err = transport.send(request).unwrap_err();
        assert!(matches!(err, FirewallError::Transport(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_send_from_multi_thread_runtime() {
        let transport = HttpTransport::new(Duration::from_millis(500));
        let request = CanonicalRequest::new("test", "GET", "http://127.0.0.1:1/unreachable").unwrap();
        let err = transport.send(request).unwrap_err();
        assert!(matches!(err, FirewallError::Transport(_)));
    }

    #[tokio::test]
    async fn test_blocking_send_from_current_thread_runtime() {
        let transport = HttpTransport::new(Duration::from_millis(500));
        let request = CanonicalRequest::new("test", "GET", "http://127.0.0.1:1/unreachable").unwrap();
        let err = transport.send(request).unwrap_err();
        assert!(matches!(err, FirewallError::Transport(_)));
    }
}
