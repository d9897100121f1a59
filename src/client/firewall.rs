// src/client/firewall.rs
//! Firewall client
//!
//! Sends a canonical request to the proxy's `/check` endpoint, interprets the
//! reply, and drives the x402 flow when the target asks for payment:
//!
//! ```text
//! submit ──► /check ──► 200 completed ───────────────────────────► response
//!                  └──► 200 {status: 402, accepts} ──► negotiate ──► /check + X-PAYMENT
//!                                                                    └──► response | failure
//! ```
//!
//! Interception is disabled in the calling context for the whole exchange,
//! so the uplink call itself is never redirected back into the firewall.
//!
//! Under [`PaymentPolicy::Review`] nothing is paid automatically: `submit`
//! returns the target's 402 as is, and callers that want to look at the
//! offer first use [`FirewallClient::fetch`] then [`FirewallClient::pay`].

use crate::interception::guard;
use crate::model::{Body, CanonicalRequest, CanonicalResponse};
use crate::payment::{
    Negotiator, NegotiatorConfig, PaymentPolicy, PaymentProof, PaymentRequirement, Wallet,
    PAYMENT_HEADER,
};
use crate::protocol::{CheckReply, CheckRequest, PaymentInfo, RejectionBody, CHECK_PATH};
use crate::transport::{AsyncHttpTransport, AsyncTransport, HttpTransport, Transport};
use crate::utils::config::ClientConfig;
use crate::utils::errors::{FirewallError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source tag on envelopes built by the client
const UPLINK_SOURCE: &str = "firewall";

/// Proxy answer to an unpaid call
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Completed(CanonicalResponse),

    /// The target wants payment; `response` is its 402 as the caller would see it
    PaymentRequired {
        accepts: Vec<PaymentRequirement>,
        response: CanonicalResponse,
    },
}

impl Fetched {
    pub fn is_payment_required(&self) -> bool {
        matches!(self, Self::PaymentRequired { .. })
    }

    /// Payment options, empty when the call completed
    pub fn accepts(&self) -> &[PaymentRequirement] {
        match self {
            Self::Completed(_) => &[],
            Self::PaymentRequired { accepts, .. } => accepts,
        }
    }

    pub fn into_response(self) -> CanonicalResponse {
        match self {
            Self::Completed(response) | Self::PaymentRequired { response, .. } => response,
        }
    }
}

/// Client half of the firewall
pub struct FirewallClient {
    check_url: String,
    policy: PaymentPolicy,
    negotiator_config: NegotiatorConfig,
    wallet: Option<Arc<dyn Wallet>>,
    uplink: Arc<dyn Transport>,
    async_uplink: Arc<dyn AsyncTransport>,
}

impl FirewallClient {
    pub fn builder(proxy_url: impl Into<String>) -> FirewallClientBuilder {
        FirewallClientBuilder::new(proxy_url)
    }

    /// Client wired from configuration, with real HTTP uplinks
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::builder(&config.proxy_url)
            .timeout(config.timeout())
            .negotiator_config(NegotiatorConfig {
                allow_scheme_fallback: config.allow_scheme_fallback,
            })
            .build()
    }

    /// Full URL of the proxy's decision endpoint
    pub fn check_url(&self) -> &str {
        &self.check_url
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    fn reviews_payments(&self) -> bool {
        matches!(self.policy, PaymentPolicy::Review)
    }

    /// Send `request` through the proxy from blocking code
    pub fn submit_blocking(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        let _scope = guard::disabled_scope();
        debug!("Submitting {} {} via {}", request.method, request.url, self.check_url);

        let accepts = match self.exchange_blocking(self.envelope(&request, None)?)? {
            Fetched::PaymentRequired { accepts, .. } if !self.reviews_payments() => accepts,
            fetched => return Ok(fetched.into_response()),
        };

        let mut negotiator = self.negotiator();
        let selection = negotiator.on_payment_required(&accepts, self.wallet.as_deref())?;
        let retry = self.paid_envelope(&request, selection)?;
        let reply = self.exchange_blocking(retry)?;
        self.finish(&mut negotiator, reply)
    }

    /// Send `request` through the proxy from async code
    ///
    /// Dropping the returned future restores interception for the task.
    pub async fn submit(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        guard::suppressed(self.submit_async(request)).await
    }

    async fn submit_async(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        debug!("Submitting {} {} via {}", request.method, request.url, self.check_url);

        let accepts = match self.exchange(self.envelope(&request, None)?).await? {
            Fetched::PaymentRequired { accepts, .. } if !self.reviews_payments() => accepts,
            fetched => return Ok(fetched.into_response()),
        };

        let mut negotiator = self.negotiator();
        let selection = negotiator.on_payment_required(&accepts, self.wallet.as_deref())?;
        let retry = self.paid_envelope(&request, selection)?;
        let reply = self.exchange(retry).await?;
        self.finish(&mut negotiator, reply)
    }

    /// First step of the reviewed flow: send unpaid and report any payment demand
    pub fn fetch_blocking(&self, request: &CanonicalRequest) -> Result<Fetched> {
        let _scope = guard::disabled_scope();
        self.exchange_blocking(self.envelope(request, None)?)
    }

    /// Async form of [`FirewallClient::fetch_blocking`]
    pub async fn fetch(&self, request: &CanonicalRequest) -> Result<Fetched> {
        guard::suppressed(async move { self.exchange(self.envelope(request, None)?).await }).await
    }

    /// Second step of the reviewed flow: pay for `requirement` and retry once
    pub fn pay_blocking(
        &self,
        request: &CanonicalRequest,
        requirement: &PaymentRequirement,
    ) -> Result<CanonicalResponse> {
        let _scope = guard::disabled_scope();
        let mut negotiator = self.negotiator();
        let selection = negotiator.on_requirement_chosen(requirement, self.wallet.as_deref())?;
        let retry = self.paid_envelope(request, selection)?;
        let reply = self.exchange_blocking(retry)?;
        self.finish(&mut negotiator, reply)
    }

    /// Async form of [`FirewallClient::pay_blocking`]
    pub async fn pay(
        &self,
        request: &CanonicalRequest,
        requirement: &PaymentRequirement,
    ) -> Result<CanonicalResponse> {
        guard::suppressed(async move {
            let mut negotiator = self.negotiator();
            let selection = negotiator.on_requirement_chosen(requirement, self.wallet.as_deref())?;
            let retry = self.paid_envelope(request, selection)?;
            let reply = self.exchange(retry).await?;
            self.finish(&mut negotiator, reply)
        })
        .await
    }

    fn exchange_blocking(&self, envelope: CanonicalRequest) -> Result<Fetched> {
        self.interpret(self.uplink.send(envelope)?)
    }

    async fn exchange(&self, envelope: CanonicalRequest) -> Result<Fetched> {
        self.interpret(self.async_uplink.send(envelope).await?)
    }

    fn negotiator(&self) -> Negotiator {
        Negotiator::new(self.policy.clone(), self.negotiator_config)
    }

    /// The single retry for a signed requirement
    fn paid_envelope(
        &self,
        request: &CanonicalRequest,
        (requirement, proof): (PaymentRequirement, PaymentProof),
    ) -> Result<CanonicalRequest> {
        info!("Paying {} for {}", requirement.describe(), request.url);
        let info = PaymentInfo::for_policy(&self.policy, &requirement);

        metrics::counter!("agentwall_payment_retries_total").increment(1);
        self.envelope(request, Some((info, &proof)))
    }

    fn finish(&self, negotiator: &mut Negotiator, reply: Fetched) -> Result<CanonicalResponse> {
        match reply {
            Fetched::Completed(response) => {
                negotiator.on_retry_reply(false)?;
                Ok(response)
            }
            Fetched::PaymentRequired { .. } => {
                negotiator.on_retry_reply(true)?;
                Err(FirewallError::PaymentNegotiation(
                    "retried request still requires payment".to_string(),
                ))
            }
        }
    }

    /// `/check` envelope for `request`, optionally carrying a payment
    fn envelope(
        &self,
        request: &CanonicalRequest,
        payment: Option<(PaymentInfo, &PaymentProof)>,
    ) -> Result<CanonicalRequest> {
        let (info, proof) = match payment {
            Some((info, proof)) => (Some(info), Some(proof)),
            None => (None, None),
        };

        let check = CheckRequest::from_canonical(request, info);
        let mut envelope = CanonicalRequest::new(UPLINK_SOURCE, "POST", &self.check_url)?
            .with_header("Content-Type", "application/json")
            .with_body(Body::Bytes(serde_json::to_vec(&check)?.into()));
        if let Some(proof) = proof {
            envelope.headers.set(PAYMENT_HEADER, proof.as_str());
        }
        Ok(envelope)
    }

    /// Map the proxy's own reply onto an outcome or a typed failure
    fn interpret(&self, reply: CanonicalResponse) -> Result<Fetched> {
        if reply.status == 200 {
            let check: CheckReply = reply.body.deserialize().map_err(|e| {
                FirewallError::Internal(format!("Malformed proxy reply: {}", e))
            })?;
            if check.is_payment_required() {
                let accepts = check.accepts.clone();
                debug!("Target requires payment ({} option(s))", accepts.len());
                return Ok(Fetched::PaymentRequired {
                    accepts,
                    response: check.into_response()?,
                });
            }
            return Ok(Fetched::Completed(check.into_response()?));
        }

        let rejection = reply
            .body
            .deserialize::<RejectionBody>()
            .unwrap_or_else(|_| RejectionBody::new(reply.body.to_text()));

        match reply.status {
            403 => {
                let stage = rejection.effective_stage();
                let reason = rejection.message();
                warn!("Proxy rejected call at {} check: {}", stage, reason);
                Err(FirewallError::SecurityRejection { stage, reason })
            }
            502 => Err(FirewallError::Transport(rejection.message())),
            400 => Err(FirewallError::InvalidRequest(rejection.message())),
            status => Err(FirewallError::Internal(format!(
                "Proxy returned {}: {}",
                status, rejection.error
            ))),
        }
    }
}

/// Builder for [`FirewallClient`]
pub struct FirewallClientBuilder {
    proxy_url: String,
    policy: PaymentPolicy,
    negotiator_config: NegotiatorConfig,
    wallet: Option<Arc<dyn Wallet>>,
    timeout: Duration,
    uplink: Option<Arc<dyn Transport>>,
    async_uplink: Option<Arc<dyn AsyncTransport>>,
}

impl FirewallClientBuilder {
    fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            policy: PaymentPolicy::Auto,
            negotiator_config: NegotiatorConfig::default(),
            wallet: None,
            timeout: Duration::from_secs(60),
            uplink: None,
            async_uplink: None,
        }
    }

    pub fn policy(mut self, policy: PaymentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn wallet(mut self, wallet: Arc<dyn Wallet>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn negotiator_config(mut self, config: NegotiatorConfig) -> Self {
        self.negotiator_config = config;
        self
    }

    /// Timeout of the default HTTP uplinks
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transport used by `submit_blocking`
    pub fn uplink(mut self, uplink: Arc<dyn Transport>) -> Self {
        self.uplink = Some(uplink);
        self
    }

    /// Transport used by `submit`
    pub fn async_uplink(mut self, uplink: Arc<dyn AsyncTransport>) -> Self {
        self.async_uplink = Some(uplink);
        self
    }

    pub fn build(self) -> Result<FirewallClient> {
        let base = url::Url::parse(&self.proxy_url).map_err(|e| {
            FirewallError::ConfigError(format!("Invalid proxy URL {}: {}", self.proxy_url, e))
        })?;
        let check_url = base
            .join(CHECK_PATH)
            .map_err(|e| FirewallError::ConfigError(format!("Invalid proxy URL: {}", e)))?
            .to_string();

        let uplink = match self.uplink {
            Some(uplink) => uplink,
            None => Arc::new(HttpTransport::new(self.timeout)),
        };
        let async_uplink = match self.async_uplink {
            Some(uplink) => uplink,
            None => Arc::new(AsyncHttpTransport::new(self.timeout)?),
        };

        Ok(FirewallClient {
            check_url,
            policy: self.policy,
            negotiator_config: self.negotiator_config,
            wallet: self.wallet,
            uplink,
            async_uplink,
        })
    }
}
