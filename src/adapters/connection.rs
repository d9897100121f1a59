// src/adapters/connection.rs
//! Two-phase connection surface
//!
//! Calling code opens a connection to one host, issues `request()` and
//! later collects the reply with `get_response()`. The call itself happens
//! in `request()`; its canonical response is stashed on the connection
//! until `get_response()` turns it into a readable [`ConnectionResponse`].

use crate::interception::site::{CallSite, SiteId};
use crate::model::{Body, CanonicalRequest, CanonicalResponse, HeaderList};
use crate::transport::{HttpTransport, Transport};
use crate::utils::errors::{FirewallError, Result};
use bytes::buf::Reader;
use bytes::{Buf, Bytes};
use std::io::{self, Read};
use std::sync::Arc;
use tracing::debug;

/// Source tag for requests captured by this surface
pub const SOURCE: &str = "connection";

/// Opens connections that share one call site
#[derive(Clone)]
pub struct Connector {
    site: Arc<CallSite>,
}

impl Connector {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(HttpTransport::default()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            site: CallSite::blocking(SiteId::unique(SOURCE), transport),
        }
    }

    pub fn site(&self) -> &Arc<CallSite> {
        &self.site
    }

    /// Plain-HTTP connection to `host`
    pub fn http(&self, host: &str, port: Option<u16>) -> Connection {
        Connection::new(Arc::clone(&self.site), "http", host, port)
    }

    /// TLS connection to `host`
    pub fn https(&self, host: &str, port: Option<u16>) -> Connection {
        Connection::new(Arc::clone(&self.site), "https", host, port)
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection; holds at most one pending response
pub struct Connection {
    site: Arc<CallSite>,
    scheme: &'static str,
    host: String,
    port: Option<u16>,
    pending: Option<CanonicalResponse>,
}

impl Connection {
    fn new(site: Arc<CallSite>, scheme: &'static str, host: &str, port: Option<u16>) -> Self {
        Self {
            site,
            scheme,
            host: host.to_string(),
            port,
            pending: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Absolute URL for a request path on this connection
    fn url_for(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        match self.port {
            Some(port) => format!("{}://{}:{}{}", self.scheme, self.host, port, path),
            None => format!("{}://{}{}", self.scheme, self.host, path),
        }
    }

    /// Send phase: perform the call and stash its response
    pub fn request(
        &mut self,
        method: &str,
        path: &str,
        body: Option<Body>,
        headers: &[(&str, &str)],
    ) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(FirewallError::InvalidRequest("Connection has no host".to_string()));
        }
        let headers: HeaderList = headers.iter().copied().collect();
        let request = CanonicalRequest::new(SOURCE, method, &self.url_for(path))?
            .with_headers(headers)
            .with_body(body.unwrap_or_default());

        // a new request replaces an unread response, as on a real connection
        if self.pending.take().is_some() {
            debug!("Discarding unread response on {}", self.host);
        }
        self.pending = Some(self.site.blocking_handler()?.send(request)?);
        Ok(())
    }

    /// Receive phase: hand out the stashed response
    pub fn get_response(&mut self) -> Result<ConnectionResponse> {
        self.pending
            .take()
            .map(ConnectionResponse::from)
            .ok_or_else(|| {
                FirewallError::InvalidRequest("No request pending on this connection".to_string())
            })
    }

    pub fn close(&mut self) {
        self.pending = None;
    }
}

/// Response read as a byte stream
pub struct ConnectionResponse {
    status: u16,
    reason: &'static str,
    headers: HeaderList,
    body: Reader<Bytes>,
}

impl ConnectionResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        self.reason
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> usize {
        self.body.get_ref().remaining()
    }
}

impl Read for ConnectionResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl From<CanonicalResponse> for ConnectionResponse {
    fn from(response: CanonicalResponse) -> Self {
        Self {
            status: response.status,
            reason: response.reason(),
            body: response.body.to_bytes().reader(),
            headers: response.headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirewallClient;
    use crate::interception::FirewallSession;
    use crate::testing::{fidelity_cases, FixedAsyncTarget, FixedTarget, PipelineUplink, Unreachable};

    fn target() -> FixedTarget {
        let headers: HeaderList = vec![("Content-Type", "text/plain"), ("X-Trace", "abc")].into();
        FixedTarget::with(200, headers, Body::Text("hello from target".into()))
    }

    fn read_all(response: &mut ConnectionResponse) -> Vec<u8> {
        let mut out = Vec::new();
        response.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_url_for_paths() {
        let connector = Connector::with_transport(Arc::new(target()));
        assert_eq!(
            connector.https("api.example.com", None).url_for("data"),
            "https://api.example.com/data"
        );
        assert_eq!(
            connector.http("localhost", Some(8080)).url_for("/x?y=1"),
            "http://localhost:8080/x?y=1"
        );
    }

    #[test]
    fn test_response_without_request_is_invalid() {
        let connector = Connector::with_transport(Arc::new(target()));
        let mut conn = connector.https("api.example.com", None);
        assert!(matches!(conn.get_response(), Err(FirewallError::InvalidRequest(_))));

        conn.request("GET", "/", None, &[]).unwrap();
        assert!(conn.get_response().is_ok());
        // the stash is consumed by the first read
        assert!(conn.get_response().is_err());
    }

    #[test]
    fn test_empty_host_fails_before_network() {
        let target = Arc::new(target());
        let connector = Connector::with_transport(target.clone());
        let mut conn = connector.http("", None);
        assert!(matches!(
            conn.request("GET", "/", None, &[]),
            Err(FirewallError::InvalidRequest(_))
        ));
        assert_eq!(target.calls(), 0);
    }

    #[test]
    fn test_stash_is_per_connection() {
        let connector = Connector::with_transport(Arc::new(target()));
        let mut first = connector.https("a.test", None);
        let mut second = connector.https("b.test", None);

        first.request("GET", "/", None, &[]).unwrap();
        assert!(second.get_response().is_err());
        assert!(first.get_response().is_ok());
    }

    #[test]
    fn test_redirected_call_matches_direct_call() {
        let connector = Connector::with_transport(Arc::new(target()));
        let mut conn = connector.https("api.example.com", None);
        conn.request("GET", "/data", None, &[("Accept", "text/plain")]).unwrap();
        let mut direct = conn.get_response().unwrap();

        let firewall = FirewallClient::builder("http://proxy.test")
            .uplink(Arc::new(PipelineUplink::new(FixedAsyncTarget::with(
                200,
                vec![("Content-Type", "text/plain"), ("X-Trace", "abc")].into(),
                Body::Text("hello from target".into()),
            ))))
            .async_uplink(Arc::new(Unreachable))
            .build()
            .unwrap();
        let session = FirewallSession::new(Arc::new(firewall));
        let mut proxied = session
            .run(&[connector.site().clone()], || {
                let mut conn = connector.https("api.example.com", None);
                conn.request("GET", "/data", None, &[("Accept", "text/plain")])?;
                conn.get_response()
            })
            .unwrap()
            .unwrap();

        assert_eq!(proxied.status(), direct.status());
        assert_eq!(proxied.reason(), "OK");
        assert_eq!(proxied.get_header("x-trace"), direct.get_header("x-trace"));
        assert_eq!(read_all(&mut proxied), read_all(&mut direct));
    }

    #[test]
    fn test_proxied_responses_are_byte_identical() {
        for (status, headers, body) in fidelity_cases() {
            let connector = Connector::with_transport(Arc::new(FixedTarget::with(
                status,
                headers.clone(),
                body.clone(),
            )));
            let mut conn = connector.https("api.example.com", None);
            conn.request("GET", "/asset", None, &[]).unwrap();
            let mut direct = conn.get_response().unwrap();

            let firewall = FirewallClient::builder("http://proxy.test")
                .uplink(Arc::new(PipelineUplink::new(FixedAsyncTarget::with(status, headers, body))))
                .async_uplink(Arc::new(Unreachable))
                .build()
                .unwrap();
            let session = FirewallSession::new(Arc::new(firewall));
            let mut proxied = session
                .run(&[connector.site().clone()], || {
                    let mut conn = connector.https("api.example.com", None);
                    conn.request("GET", "/asset", None, &[])?;
                    conn.get_response()
                })
                .unwrap()
                .unwrap();

            assert_eq!(proxied.status(), direct.status());
            assert_eq!(proxied.reason(), direct.reason());
            assert_eq!(proxied.headers(), direct.headers());
            assert_eq!(read_all(&mut proxied), read_all(&mut direct));
        }
    }

    #[test]
    fn test_partial_reads() {
        let connector = Connector::with_transport(Arc::new(target()));
        let mut conn = connector.http("a.test", None);
        conn.request("GET", "/", None, &[]).unwrap();
        let mut response = conn.get_response().unwrap();

        let mut head = [0u8; 5];
        response.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"hello");
        assert_eq!(response.remaining(), "hello from target".len() - 5);
    }
}
