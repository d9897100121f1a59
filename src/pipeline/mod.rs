// src/pipeline/mod.rs
//! Proxy-side decision pipeline
//!
//! ```text
//! Received ──► InputChecked ──► Forwarded ──► OutputChecked ──► Completed
//!    │              │               │               │
//!    └── 400        └── 403         └── 502         └── 403      (Rejected)
//! ```
//!
//! Stages run strictly in order for one request. An input rejection never
//! reaches the network; an output rejection never returns the target's body.
//! Anything unexpected, panics included, becomes a bare 500.

pub mod forwarder;

pub use forwarder::{Forwarded, Forwarder};

use crate::detection::{
    EntityKind, InjectionDetector, LeakageDetector, PatternInjectionDetector,
    PatternLeakageDetector, Verdict,
};
use crate::model::{Body, CanonicalRequest};
use crate::payment::PaymentRequirement;
use crate::protocol::{CheckReply, CheckRequest, RejectionBody};
use crate::transport::{AsyncHttpTransport, AsyncTransport};
use crate::utils::config::PipelineConfig;
use crate::utils::errors::{Result, Stage};
use futures::FutureExt;
use hyper::StatusCode;
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Source tag for requests rebuilt from `/check` envelopes
const SOURCE: &str = "proxy";

/// Progress of one proxied request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    InputChecked,
    Forwarded,
    OutputChecked,
    Completed,
    Rejected,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Final answer for one `/check` call
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Completed(CheckReply),
    Rejected {
        status: StatusCode,
        body: RejectionBody,
    },
}

impl Decision {
    fn rejected(status: StatusCode, body: RejectionBody) -> Self {
        Self::Rejected { status, body }
    }

    pub fn internal() -> Self {
        Self::rejected(
            StatusCode::INTERNAL_SERVER_ERROR,
            RejectionBody::new("Internal server error"),
        )
    }

    /// HTTP status of the proxy's own reply
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Completed(_) => StatusCode::OK,
            Self::Rejected { status, .. } => *status,
        }
    }

    /// Metric label
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Completed(reply) if reply.is_payment_required() => "payment_required",
            Self::Completed(_) => "completed",
            Self::Rejected { status, body } => match (status.as_u16(), body.stage) {
                (403, Some(Stage::Input)) => "rejected_input",
                (403, _) => "rejected_output",
                (400, _) => "invalid",
                (502, _) => "upstream_error",
                _ => "internal_error",
            },
        }
    }

    /// Reply body as JSON bytes; repeated headers stay repeated
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Completed(reply) => serde_json::to_vec(reply)?,
            Self::Rejected { body, .. } => serde_json::to_vec(body)?,
        })
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.encode()?)?)
    }
}

/// Input check, forward, output check
pub struct DecisionPipeline {
    leakage: Arc<dyn LeakageDetector>,
    injection: Arc<dyn InjectionDetector>,
    forwarder: Forwarder,
    entities: Vec<EntityKind>,
}

impl DecisionPipeline {
    pub fn new(
        leakage: Arc<dyn LeakageDetector>,
        injection: Arc<dyn InjectionDetector>,
        transport: Arc<dyn AsyncTransport>,
        entities: Vec<EntityKind>,
    ) -> Self {
        Self {
            leakage,
            injection,
            forwarder: Forwarder::new(transport),
            entities,
        }
    }

    /// Built-in detectors and a real upstream transport
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let transport = AsyncHttpTransport::new(config.forward_timeout())?;
        Ok(Self::new(
            Arc::new(PatternLeakageDetector::new()),
            Arc::new(PatternInjectionDetector::new()),
            Arc::new(transport),
            config.entities.clone(),
        ))
    }

    pub fn entities(&self) -> &[EntityKind] {
        &self.entities
    }

    /// Decide one `/check` envelope; `payment` is the proof header, if any
    pub async fn process(&self, envelope: CheckRequest, payment: Option<String>) -> Decision {
        let request_id = Ulid::new();
        let span = info_span!("check", id = %request_id, method = %envelope.method);

        let result = AssertUnwindSafe(self.run(envelope, payment.as_deref()))
            .catch_unwind()
            .instrument(span)
            .await;

        let decision = result.unwrap_or_else(|_| {
            error!("Pipeline panicked while handling request {}", request_id);
            Decision::internal()
        });
        metrics::counter!("agentwall_decisions_total", "outcome" => decision.outcome()).increment(1);
        decision
    }

    async fn run(&self, envelope: CheckRequest, payment: Option<&str>) -> Decision {
        let request = match envelope.to_canonical(SOURCE) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting malformed envelope: {}", e);
                return Decision::rejected(
                    StatusCode::BAD_REQUEST,
                    RejectionBody::new("Invalid request").with_reason(e.to_string()),
                );
            }
        };
        debug!("{} {} {}", PipelineState::Received, request.method, request.url);

        let input = render_input(&request);
        if let Verdict::Unsafe(reason) = self.leakage.check(&input, &self.entities) {
            warn!("{}: input rejected: {}", PipelineState::Rejected, reason);
            return Decision::rejected(
                StatusCode::FORBIDDEN,
                RejectionBody::new("Data leakage detected")
                    .with_reason(reason)
                    .with_stage(Stage::Input),
            );
        }
        debug!("{}", PipelineState::InputChecked);

        let forwarded = match self.forwarder.forward(request, payment).await {
            Ok(forwarded) => forwarded,
            Err(e) => {
                error!("{}: upstream request failed: {}", PipelineState::Rejected, e);
                return Decision::rejected(
                    StatusCode::BAD_GATEWAY,
                    RejectionBody::new("Failed to make request").with_details(e.to_string()),
                );
            }
        };
        debug!("{} ({})", PipelineState::Forwarded, forwarded.status);

        if let Verdict::Unsafe(reason) = self.injection.check(&forwarded.data.render()) {
            warn!("{}: output rejected: {}", PipelineState::Rejected, reason);
            return Decision::rejected(
                StatusCode::FORBIDDEN,
                RejectionBody::new("Prompt injection detected in response")
                    .with_reason(reason)
                    .with_stage(Stage::Output),
            );
        }
        debug!("{}", PipelineState::OutputChecked);

        if forwarded.status == 402 {
            if let Some(accepts) = payment_requirements(&forwarded.data) {
                info!("Target requires payment ({} option(s))", accepts.len());
                return Decision::Completed(CheckReply::payment_required(
                    accepts,
                    &forwarded.data,
                    forwarded.headers,
                ));
            }
        }

        debug!("{} ({})", PipelineState::Completed, forwarded.status);
        Decision::Completed(CheckReply::completed(
            forwarded.status,
            &forwarded.data,
            forwarded.headers,
        ))
    }
}

/// Text blob handed to the leakage detector
pub fn render_input(request: &CanonicalRequest) -> String {
    format!(
        "Method: {}\nURL: {}\nHeaders: {}\nBody: {}",
        request.method,
        request.url,
        request.headers,
        request.body.render()
    )
}

/// `accepts` of an x402 JSON body, when present and well formed
fn payment_requirements(data: &Body) -> Option<Vec<PaymentRequirement>> {
    let Body::Json(value) = data else {
        return None;
    };
    serde_json::from_value(value.get("accepts")?.clone()).ok()
}
