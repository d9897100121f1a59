// src/protocol.rs
//! Proxy wire protocol
//!
//! ```text
//! POST /check  {url, method, headers?, body?, body_encoding?, payment_info?}   (+ X-PAYMENT on paid retries)
//!
//! 200 {status_code, data, encoding?, headers}      completed
//! 200 {status: 402, status_code: 402, accepts: []}  target wants payment
//! 403 {error, reason, stage}                        leakage / injection
//! 400 {error, reason}                               malformed envelope
//! 502 {error, details}                              upstream unreachable
//! 500 {error}                                       anything else
//! ```
//!
//! `body_encoding` / `encoding` is `"base64"` when the body is not UTF-8.
//! A completed reply may itself carry `status_code: 402`: that is a target
//! 402 without usable payment requirements and is returned to the caller
//! like any other response. Only the top-level `status: 402` marker starts
//! a payment.

use crate::model::{Body, CanonicalRequest, CanonicalResponse, HeaderList, WireEncoding};
use crate::payment::{PaymentCriteria, PaymentPolicy, PaymentRequirement};
use crate::utils::errors::{Result, Stage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path of the proxy's decision endpoint
pub const CHECK_PATH: &str = "/check";

/// Path of the liveness endpoint
pub const HEALTH_PATH: &str = "/health";

fn default_method() -> String {
    "GET".to_string()
}

/// Payment information attached to a `/check` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentInfo {
    /// `{auto_payment: true}`
    Auto { auto_payment: bool },

    /// `{network, scheme, max_amount_required, pay_to, asset}`
    Explicit(PaymentCriteria),
}

impl PaymentInfo {
    /// Wire form for a policy after `requirement` was chosen
    pub fn for_policy(policy: &PaymentPolicy, requirement: &PaymentRequirement) -> Self {
        match policy {
            PaymentPolicy::Auto => Self::Auto { auto_payment: true },
            PaymentPolicy::Explicit(_) | PaymentPolicy::Review => {
                Self::Explicit(PaymentCriteria::for_requirement(requirement))
            }
        }
    }
}

/// Envelope posted to `/check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Destination URL
    #[serde(default)]
    pub url: String,

    /// HTTP method, GET when omitted
    #[serde(default = "default_method")]
    pub method: String,

    /// Headers for the destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderList>,

    /// Body for the destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Set when `body` is a base64 string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<WireEncoding>,

    /// Present on paid retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_info: Option<PaymentInfo>,
}

impl CheckRequest {
    pub fn from_canonical(request: &CanonicalRequest, payment_info: Option<PaymentInfo>) -> Self {
        let (body, body_encoding) = match request.body.to_wire() {
            (Value::Null, _) => (None, None),
            (value, encoding) => (Some(value), encoding),
        };

        Self {
            url: request.url.clone(),
            method: request.method.clone(),
            headers: Some(request.headers.clone()),
            body,
            body_encoding,
            payment_info,
        }
    }

    /// Canonical form on the proxy side; fails on missing/invalid url or method
    pub fn to_canonical(&self, source: &str) -> Result<CanonicalRequest> {
        let request = CanonicalRequest::new(source, &self.method, &self.url)?
            .with_headers(self.headers.clone().unwrap_or_default());
        Ok(match &self.body {
            Some(value) => request.with_body(Body::from_wire(value.clone(), self.body_encoding)?),
            None => request,
        })
    }
}

/// Successful (HTTP 200) reply from the proxy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckReply {
    /// Set to 402 when the target requires payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Target's status code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Target's body: JSON value or text
    #[serde(default)]
    pub data: Value,

    /// Set when `data` is a base64 string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<WireEncoding>,

    /// Target's headers
    #[serde(default)]
    pub headers: HeaderList,

    /// Payment requirements offered by the target
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepts: Vec<PaymentRequirement>,
}

impl CheckReply {
    pub fn completed(status_code: u16, data: &Body, headers: HeaderList) -> Self {
        let (data, encoding) = data.to_wire();
        Self {
            status: None,
            status_code: Some(status_code),
            data,
            encoding,
            headers,
            accepts: Vec::new(),
        }
    }

    pub fn payment_required(accepts: Vec<PaymentRequirement>, data: &Body, headers: HeaderList) -> Self {
        Self {
            status: Some(402),
            accepts,
            ..Self::completed(402, data, headers)
        }
    }

    /// True only for the proxy's payment marker, not for a forwarded 402
    pub fn is_payment_required(&self) -> bool {
        self.status == Some(402)
    }

    /// Target response as seen by the caller
    pub fn into_response(self) -> Result<CanonicalResponse> {
        let status = self.status_code.or(self.status).unwrap_or(200);
        let body = Body::from_wire(self.data, self.encoding)?;
        CanonicalResponse::new(status, self.headers, body)
    }
}

/// Non-200 reply body from the proxy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RejectionBody {
    /// Short category, e.g. "Data leakage detected"
    pub error: String,

    /// Detector or validation reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Transport failure description (502 only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Pipeline stage for security rejections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl RejectionBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Best description for the caller: reason, then details, then error
    pub fn message(&self) -> String {
        self.reason
            .clone()
            .or_else(|| self.details.clone())
            .unwrap_or_else(|| self.error.clone())
    }

    /// Stage, inferred from the error category when the field is absent
    pub fn effective_stage(&self) -> Stage {
        self.stage.unwrap_or_else(|| {
            if self.error.to_ascii_lowercase().contains("response") {
                Stage::Output
            } else {
                Stage::Input
            }
        })
    }
}
