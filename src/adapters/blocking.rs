// src/adapters/blocking.rs
//! Blocking request-builder surface
//!
//! Mirrors the shape of a synchronous HTTP client: build a request, `send()`
//! it, read status, headers and body from the returned response. Every call
//! goes through the client's call site, so installing the firewall over
//! that site redirects it without changes to the calling code.

use crate::interception::site::{CallSite, SiteId};
use crate::model::{Body, CanonicalRequest, CanonicalResponse, HeaderList};
use crate::transport::{HttpTransport, Transport};
use crate::utils::errors::{FirewallError, Result};
use bytes::Bytes;
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Source tag for requests captured by this surface
pub const SOURCE: &str = "blocking";

/// Synchronous HTTP client
#[derive(Clone)]
pub struct BlockingClient {
    site: Arc<CallSite>,
}

impl BlockingClient {
    /// Client backed by a real HTTP transport
    pub fn new() -> Self {
        Self::with_transport(Arc::new(HttpTransport::default()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            site: CallSite::blocking(SiteId::unique(SOURCE), transport),
        }
    }

    /// Extension point the firewall is installed over
    pub fn site(&self) -> &Arc<CallSite> {
        &self.site
    }

    pub fn request(&self, method: &str, url: &str) -> RequestBuilder {
        RequestBuilder {
            site: Arc::clone(&self.site),
            method: method.to_string(),
            url: url.to_string(),
            headers: HeaderList::new(),
            body: Body::Empty,
            error: None,
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request("GET", url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request("POST", url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request("PUT", url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request("DELETE", url)
    }
}

impl Default for BlockingClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending request on a [`BlockingClient`]
pub struct RequestBuilder {
    site: Arc<CallSite>,
    method: String,
    url: String,
    headers: HeaderList,
    body: Body,
    error: Option<FirewallError>,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body; sets the content type unless one is present
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                if !self.headers.contains("content-type") {
                    self.headers.append("Content-Type", "application/json");
                }
                self.body = Body::Json(value);
            }
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    /// Normalize and send through the call site
    pub fn send(self) -> Result<BlockingResponse> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let request = CanonicalRequest::new(SOURCE, &self.method, &self.url)?
            .with_headers(self.headers)
            .with_body(self.body);

        let response = self.site.blocking_handler()?.send(request)?;
        Ok(BlockingResponse::from(response))
    }
}

/// Response handed back to calling code
#[derive(Debug, Clone)]
pub struct BlockingResponse {
    status: StatusCode,
    headers: HeaderList,
    body: Bytes,
}

impl BlockingResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Body as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn 4xx/5xx into an error, like the native client
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            return Err(FirewallError::Transport(format!(
                "HTTP status {}",
                self.status
            )));
        }
        Ok(self)
    }
}

impl From<CanonicalResponse> for BlockingResponse {
    fn from(response: CanonicalResponse) -> Self {
        Self {
            status: response.status_code(),
            body: response.body.to_bytes(),
            headers: response.headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirewallClient;
    use crate::interception::FirewallSession;
    use crate::testing::{
        fidelity_cases, json_headers, FixedAsyncTarget, FixedTarget, PipelineUplink, Unreachable,
    };
    use serde_json::json;

    fn target() -> FixedTarget {
        FixedTarget::with(
            201,
            json_headers(),
            Body::Bytes(Bytes::from_static(br#"{"id":7,"ok":true}"#)),
        )
    }

    #[test]
    fn test_missing_url_fails_before_network() {
        let transport = Arc::new(FixedTarget::ok("unused"));
        let client = BlockingClient::with_transport(transport.clone());

        let err = client.get("").send().unwrap_err();
        assert!(matches!(err, FirewallError::InvalidRequest(_)));
        let err = client.request("G E T", "http://a.test/").send().unwrap_err();
        assert!(matches!(err, FirewallError::InvalidRequest(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_redirected_call_matches_direct_call() {
        let client = BlockingClient::with_transport(Arc::new(target()));
        let direct = client.post("https://api.example.com/items").json(&json!({"n": 1})).send().unwrap();

        let firewall = FirewallClient::builder("http://proxy.test")
            .uplink(Arc::new(PipelineUplink::new(FixedAsyncTarget::with(
                201,
                json_headers(),
                Body::Bytes(Bytes::from_static(br#"{"id":7,"ok":true}"#)),
            ))))
            .async_uplink(Arc::new(Unreachable))
            .build()
            .unwrap();
        let session = FirewallSession::new(Arc::new(firewall));
        let proxied = session
            .run(&[client.site().clone()], || {
                client.post("https://api.example.com/items").json(&json!({"n": 1})).send()
            })
            .unwrap()
            .unwrap();

        assert_eq!(proxied.status(), direct.status());
        assert_eq!(proxied.header("content-type"), direct.header("content-type"));
        assert_eq!(proxied.text(), direct.text());
        assert_eq!(
            proxied.json::<serde_json::Value>().unwrap(),
            json!({"id": 7, "ok": true})
        );
    }

    #[test]
    fn test_proxied_responses_are_byte_identical() {
        for (status, headers, body) in fidelity_cases() {
            let client = BlockingClient::with_transport(Arc::new(FixedTarget::with(
                status,
                headers.clone(),
                body.clone(),
            )));
            let direct = client.get("https://api.example.com/asset").send().unwrap();

            let uplink = Arc::new(PipelineUplink::new(FixedAsyncTarget::with(status, headers, body)));
            let firewall = FirewallClient::builder("http://proxy.test")
                .uplink(uplink.clone())
                .async_uplink(Arc::new(Unreachable))
                .build()
                .unwrap();
            let session = FirewallSession::new(Arc::new(firewall));
            let proxied = session
                .run(&[client.site().clone()], || {
                    client.get("https://api.example.com/asset").send()
                })
                .unwrap()
                .unwrap();

            assert_eq!(uplink.target_calls(), 1);
            assert_eq!(proxied.status(), direct.status());
            assert_eq!(proxied.headers(), direct.headers());
            assert_eq!(proxied.bytes(), direct.bytes());
        }
    }

    #[test]
    fn test_security_rejection_surfaces_as_typed_error() {
        use crate::testing::ScriptedUplink;

        let client = BlockingClient::with_transport(Arc::new(FixedTarget::ok("unused")));
        let uplink = Arc::new(ScriptedUplink::new(vec![(
            403,
            json!({"error": "Data leakage detected", "reason": "Data leakage detected: Password detected", "stage": "input"}),
        )]));
        let firewall = FirewallClient::builder("http://proxy.test")
            .uplink(uplink)
            .async_uplink(Arc::new(Unreachable))
            .build()
            .unwrap();
        let session = FirewallSession::new(Arc::new(firewall));

        let result = session
            .run(&[client.site().clone()], || {
                client.post("https://api.example.com/").body("password: Sup3rSecret!").send()
            })
            .unwrap();
        assert!(result.unwrap_err().is_security_rejection());
    }

    #[test]
    fn test_error_for_status() {
        let client = BlockingClient::with_transport(Arc::new(FixedTarget::with(
            404,
            HeaderList::new(),
            Body::Empty,
        )));
        let response = client.get("http://a.test/").send().unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.error_for_status().is_err());
    }
}
