// src/adapters/nonblocking.rs
//! Async request-builder surface
//!
//! The awaited counterpart of [`super::blocking`]: `send().await` yields an
//! [`AsyncResponse`] whose body readers are themselves awaited, as on a
//! native async client.

use crate::interception::site::{CallSite, SiteId};
use crate::model::{Body, CanonicalRequest, CanonicalResponse, HeaderList};
use crate::transport::{AsyncHttpTransport, AsyncTransport};
use crate::utils::errors::{FirewallError, Result};
use bytes::Bytes;
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Source tag for requests captured by this surface
pub const SOURCE: &str = "async";

/// Asynchronous HTTP client
#[derive(Clone)]
pub struct AsyncClient {
    site: Arc<CallSite>,
}

impl AsyncClient {
    /// Client backed by a real HTTP transport
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self::with_transport(Arc::new(AsyncHttpTransport::new(timeout)?)))
    }

    pub fn with_transport(transport: Arc<dyn AsyncTransport>) -> Self {
        Self {
            site: CallSite::nonblocking(SiteId::unique(SOURCE), transport),
        }
    }

    pub fn site(&self) -> &Arc<CallSite> {
        &self.site
    }

    pub fn request(&self, method: &str, url: &str) -> AsyncRequestBuilder {
        AsyncRequestBuilder {
            site: Arc::clone(&self.site),
            method: method.to_string(),
            url: url.to_string(),
            headers: HeaderList::new(),
            body: Body::Empty,
            error: None,
        }
    }

    pub fn get(&self, url: &str) -> AsyncRequestBuilder {
        self.request("GET", url)
    }

    pub fn post(&self, url: &str) -> AsyncRequestBuilder {
        self.request("POST", url)
    }
}

/// Pending request on an [`AsyncClient`]
pub struct AsyncRequestBuilder {
    site: Arc<CallSite>,
    method: String,
    url: String,
    headers: HeaderList,
    body: Body,
    error: Option<FirewallError>,
}

impl AsyncRequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

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

    pub async fn send(self) -> Result<AsyncResponse> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let request = CanonicalRequest::new(SOURCE, &self.method, &self.url)?
            .with_headers(self.headers)
            .with_body(self.body);

        let handler = self.site.async_handler()?;
        let response = handler.send(request).await?;
        Ok(AsyncResponse::from(response))
    }
}

/// Response with awaited body readers
#[derive(Debug)]
pub struct AsyncResponse {
    status: StatusCode,
    headers: HeaderList,
    body: Bytes,
}

impl AsyncResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub async fn bytes(self) -> Result<Bytes> {
        Ok(self.body)
    }

    pub async fn text(self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.body).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl From<CanonicalResponse> for AsyncResponse {
    fn from(response: CanonicalResponse) -> Self {
        Self {
            status: response.status_code(),
            body: response.body.to_bytes(),
            headers: response.headers,
        }
    }
}
