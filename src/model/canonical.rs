// src/model/canonical.rs
//! Canonical request and response
//!
//! The library-agnostic shape every client adapter converges to before a
//! call is redirected, and rebuilds its native response from afterwards.

use crate::model::{Body, HeaderList};
use crate::utils::errors::{FirewallError, Result};
use hyper::{Method, StatusCode};
use url::Url;

/// A captured outbound call
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    /// Adapter that captured the call (e.g. "blocking", "connection")
    pub source: String,

    /// Upper-case HTTP method
    pub method: String,

    /// Absolute http(s) URL
    pub url: String,

    /// Headers as supplied by the caller
    pub headers: HeaderList,

    /// Request payload
    pub body: Body,
}

impl CanonicalRequest {
    /// Validate method and URL; fails before any network activity
    pub fn new(
        source: impl Into<String>,
        method: &str,
        url: &str,
    ) -> Result<Self> {
        let method = normalize_method(method)?;
        let url = normalize_url(url)?;

        Ok(Self {
            source: source.into(),
            method,
            url,
            headers: HeaderList::new(),
            body: Body::Empty,
        })
    }

    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Parsed method for transports
    pub fn http_method(&self) -> Result<Method> {
        Method::from_bytes(self.method.as_bytes())
            .map_err(|e| FirewallError::InvalidRequest(format!("Invalid method: {}", e)))
    }
}

/// A response as seen by calling code
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalResponse {
    /// HTTP status code (100-599)
    pub status: u16,

    /// Response headers
    pub headers: HeaderList,

    /// Response payload
    pub body: Body,
}

impl CanonicalResponse {
    pub fn new(status: u16, headers: HeaderList, body: impl Into<Body>) -> Result<Self> {
        let status = StatusCode::from_u16(status)
            .map_err(|_| FirewallError::Internal(format!("Invalid status code: {}", status)))?;
        if status.as_u16() >= 600 {
            return Err(FirewallError::Internal(format!(
                "Invalid status code: {}",
                status.as_u16()
            )));
        }

        Ok(Self {
            status: status.as_u16(),
            headers,
            body: body.into(),
        })
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Canonical reason phrase, empty when unknown
    pub fn reason(&self) -> &'static str {
        self.status_code().canonical_reason().unwrap_or("")
    }

    pub fn is_success(&self) -> bool {
        self.status_code().is_success()
    }
}

fn normalize_method(method: &str) -> Result<String> {
    let method = method.trim();
    if method.is_empty() {
        return Err(FirewallError::InvalidRequest("Missing method".to_string()));
    }
    let upper = method.to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| FirewallError::InvalidRequest(format!("Invalid method: {}", method)))?;
    Ok(upper)
}

fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FirewallError::InvalidRequest("Missing URL".to_string()));
    }
    let parsed = Url::parse(url)
        .map_err(|e| FirewallError::InvalidRequest(format!("Invalid URL {}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FirewallError::InvalidRequest(format!(
                "Unsupported URL scheme: {}",
                other
            )))
        }
    }
    if parsed.host_str().is_none() {
        return Err(FirewallError::InvalidRequest(format!("URL has no host: {}", url)));
    }
    Ok(url.to_string())
}
