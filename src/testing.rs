// src/testing.rs
//! In-memory collaborators for unit tests
//!
//! Targets, uplinks and wallets that never touch the network. Uplinks
//! record every envelope they receive together with the guard state seen
//! at the moment of the call.

use crate::detection::{EntityKind, PatternInjectionDetector, PatternLeakageDetector};
use crate::interception::guard;
use crate::model::{Body, CanonicalRequest, CanonicalResponse, HeaderList};
use crate::payment::{PaymentProof, PaymentRequirement, Wallet, PAYMENT_HEADER};
use crate::pipeline::DecisionPipeline;
use crate::protocol::CheckRequest;
use crate::transport::{AsyncTransport, Transport};
use crate::utils::errors::{FirewallError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Target that always answers with the same response
pub struct FixedTarget {
    response: CanonicalResponse,
    calls: AtomicUsize,
}

impl FixedTarget {
    pub fn ok(body: &str) -> Self {
        Self::with(200, HeaderList::new(), Body::Text(body.to_string()))
    }

    pub fn with(status: u16, headers: HeaderList, body: Body) -> Self {
        Self {
            response: CanonicalResponse::new(status, headers, body).unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for FixedTarget {
    fn send(&self, _request: CanonicalRequest) -> Result<CanonicalResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Async twin of [`FixedTarget`]
pub struct FixedAsyncTarget {
    inner: FixedTarget,
}

impl FixedAsyncTarget {
    pub fn ok(body: &str) -> Self {
        Self {
            inner: FixedTarget::ok(body),
        }
    }

    pub fn with(status: u16, headers: HeaderList, body: Body) -> Self {
        Self {
            inner: FixedTarget::with(status, headers, body),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }
}

impl AsyncTransport for FixedAsyncTarget {
    fn send(&self, request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>> {
        Box::pin(async move { Transport::send(&self.inner, request) })
    }
}

/// Transport that always fails like an unreachable host
pub struct Unreachable;

impl AsyncTransport for Unreachable {
    fn send(&self, _request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>> {
        Box::pin(async { Err(FirewallError::Transport("connection refused".to_string())) })
    }
}

impl Transport for Unreachable {
    fn send(&self, _request: CanonicalRequest) -> Result<CanonicalResponse> {
        Err(FirewallError::Transport("connection refused".to_string()))
    }
}

/// One envelope as received by a scripted uplink
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: CanonicalRequest,
    pub guard_disabled: bool,
}

impl Recorded {
    pub fn envelope(&self) -> CheckRequest {
        self.request.body.deserialize().unwrap()
    }
}

/// Uplink replaying canned proxy replies in order
pub struct ScriptedUplink {
    replies: Mutex<VecDeque<(u16, Value)>>,
    recorded: Mutex<Vec<Recorded>>,
}

impl ScriptedUplink {
    pub fn new(replies: Vec<(u16, Value)>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }

    fn answer(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        self.recorded.lock().push(Recorded {
            request,
            guard_disabled: guard::is_disabled(),
        });
        let (status, body) = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| FirewallError::Transport("uplink script exhausted".to_string()))?;
        CanonicalResponse::new(status, json_headers(), Body::Bytes(body.to_string().into()))
    }
}

impl Transport for ScriptedUplink {
    fn send(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        self.answer(request)
    }
}

impl AsyncTransport for ScriptedUplink {
    fn send(&self, request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.answer(request)
        })
    }
}

/// Uplink backed by a real [`DecisionPipeline`] in front of a fixed target
pub struct PipelineUplink {
    pipeline: DecisionPipeline,
    target: Arc<FixedAsyncTarget>,
}

impl PipelineUplink {
    pub fn new(target: FixedAsyncTarget) -> Self {
        let target = Arc::new(target);
        let pipeline = DecisionPipeline::new(
            Arc::new(PatternLeakageDetector::new()),
            Arc::new(PatternInjectionDetector::new()),
            target.clone(),
            EntityKind::default_allow_list(),
        );
        Self { pipeline, target }
    }

    pub fn target_calls(&self) -> usize {
        self.target.calls()
    }

    async fn relay(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        let envelope: CheckRequest = request.body.deserialize()?;
        let payment = request.headers.get(PAYMENT_HEADER).map(str::to_string);
        let decision = self.pipeline.process(envelope, payment).await;
        CanonicalResponse::new(
            decision.status().as_u16(),
            json_headers(),
            Body::Bytes(decision.encode()?.into()),
        )
    }
}

impl Transport for PipelineUplink {
    fn send(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        futures::executor::block_on(self.relay(request))
    }
}

impl AsyncTransport for PipelineUplink {
    fn send(&self, request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>> {
        Box::pin(self.relay(request))
    }
}

/// Target responses whose bytes, status and headers must survive the proxy
/// unchanged: unsorted JSON keys, binary content, a plain 402 and a
/// repeated header
pub fn fidelity_cases() -> Vec<(u16, HeaderList, Body)> {
    let cookies: HeaderList = vec![
        ("Content-Type", "text/plain"),
        ("Set-Cookie", "theme=dark"),
        ("Set-Cookie", "lang=en"),
    ]
    .into();
    vec![
        (
            200,
            json_headers(),
            Body::Bytes(Bytes::from_static(br#"{"zeta":1,"alpha":{"z":[3,1],"a":null}}"#)),
        ),
        (
            200,
            vec![("Content-Type", "image/png")].into(),
            Body::Bytes(Bytes::from_static(b"\x89PNG\xff\0")),
        ),
        (
            402,
            vec![("Content-Type", "text/plain")].into(),
            Body::Text("Payment Required".to_string()),
        ),
        (200, cookies, Body::Text("cookies set".to_string())),
    ]
}

/// Wallet paying on a fixed set of networks with a readable fake proof
pub struct StaticWallet {
    networks: Option<Vec<String>>,
    broken: bool,
}

impl StaticWallet {
    pub fn any() -> Self {
        Self {
            networks: None,
            broken: false,
        }
    }

    pub fn on_networks(networks: &[&str]) -> Self {
        Self {
            networks: Some(networks.iter().map(|n| n.to_string()).collect()),
            broken: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            networks: None,
            broken: true,
        }
    }
}

impl Wallet for StaticWallet {
    fn signer(&self) -> &str {
        "0xSIGNER"
    }

    fn supports(&self, requirement: &PaymentRequirement) -> bool {
        match &self.networks {
            Some(networks) => networks.iter().any(|n| *n == requirement.network),
            None => true,
        }
    }

    fn produce_proof(&self, requirement: &PaymentRequirement) -> Result<PaymentProof> {
        if self.broken {
            return Err(FirewallError::Internal("signer unavailable".to_string()));
        }
        Ok(PaymentProof::new(format!(
            "proof:{}:{}:{}:{}:{}",
            requirement.network,
            requirement.scheme,
            requirement.pay_to,
            requirement.asset,
            requirement.max_amount_required
        )))
    }
}

pub fn json_headers() -> HeaderList {
    vec![("Content-Type", "application/json")].into()
}
