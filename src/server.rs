// src/server.rs
//! Proxy HTTP server
//!
//! Accepts `/check` envelopes, runs them through the decision pipeline and
//! replies with the pipeline's decision. One task per connection, HTTP/1.1.

use crate::pipeline::{Decision, DecisionPipeline};
use crate::payment::PAYMENT_HEADER;
use crate::protocol::{CheckRequest, RejectionBody, CHECK_PATH, HEALTH_PATH};
use crate::utils::config::ServerConfig;
use crate::utils::errors::{FirewallError, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Requests refused before they reach the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
enum Refusal {
    BodyTooLarge(usize),
    UnreadableBody(String),
    MalformedEnvelope(String),
    MethodNotAllowed,
    NotFound,
}

impl Refusal {
    fn status(&self) -> StatusCode {
        match self {
            Self::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnreadableBody(_) | Self::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn body(&self) -> RejectionBody {
        match self {
            Self::BodyTooLarge(limit) => RejectionBody::new("Request body too large")
                .with_reason(format!("limit is {} bytes", limit)),
            Self::UnreadableBody(reason) => {
                RejectionBody::new("Unreadable request body").with_reason(reason.clone())
            }
            Self::MalformedEnvelope(reason) => {
                RejectionBody::new("Invalid request").with_reason(reason.clone())
            }
            Self::MethodNotAllowed => RejectionBody::new("Method not allowed"),
            Self::NotFound => RejectionBody::new("Not found"),
        }
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        json_response(self.status(), &self.body())
    }
}

/// The firewall proxy
pub struct ProxyServer {
    config: ServerConfig,
    pipeline: Arc<DecisionPipeline>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, pipeline: Arc<DecisionPipeline>) -> Self {
        Self { config, pipeline }
    }

    /// Bind the configured address and serve until the task is dropped
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            FirewallError::Internal(format!("Failed to bind proxy on {}: {}", addr, e))
        })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("Firewall proxy listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(Arc::clone(&self).serve_connection(stream, peer));
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    }

    /// One HTTP/1.1 connection; requests on it are handled in order
    async fn serve_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        debug!("Accepted connection from {}", peer);
        let service = service_fn(move |req| {
            let server = Arc::clone(&self);
            async move { Ok::<_, Infallible>(server.route(req).await) }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            warn!("Connection error from {}: {}", peer, e);
        }
    }

    async fn route(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let (method, path) = (req.method().clone(), req.uri().path().to_string());
        let outcome = match (&method, path.as_str()) {
            (&Method::POST, CHECK_PATH) => self.check(req).await,
            (&Method::GET, HEALTH_PATH) => {
                return json_response(
                    StatusCode::OK,
                    &serde_json::json!({"status": "ok", "version": crate::VERSION}),
                )
            }
            (_, CHECK_PATH) | (_, HEALTH_PATH) => Err(Refusal::MethodNotAllowed),
            _ => Err(Refusal::NotFound),
        };

        match outcome {
            Ok(decision) => decision_response(&decision),
            Err(refusal) => {
                warn!("Refused request: {:?}", refusal);
                refusal.into_response()
            }
        }
    }

    /// Read the envelope and run it through the pipeline
    async fn check(&self, req: Request<Incoming>) -> std::result::Result<Decision, Refusal> {
        let payment = req
            .headers()
            .get(PAYMENT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let limit = self.config.max_body_bytes;
        let body = Limited::new(req.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    Refusal::BodyTooLarge(limit)
                } else {
                    Refusal::UnreadableBody(e.to_string())
                }
            })?
            .to_bytes();

        let envelope: CheckRequest = serde_json::from_slice(&body)
            .map_err(|e| Refusal::MalformedEnvelope(e.to_string()))?;

        Ok(self.pipeline.process(envelope, payment).await)
    }
}

fn decision_response(decision: &Decision) -> Response<Full<Bytes>> {
    match decision.encode() {
        Ok(body) => bytes_response(decision.status(), body),
        Err(e) => {
            error!("Failed to encode decision: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &RejectionBody::new("Internal server error"),
            )
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body)
        .unwrap_or_else(|_| br#"{"error":"Internal server error"}"#.to_vec());
    bytes_response(status, bytes)
}

fn bytes_response(status: StatusCode, bytes: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Bind an ephemeral local port and serve in the background
pub async fn spawn_local(pipeline: Arc<DecisionPipeline>) -> Result<SocketAddr> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let server = Arc::new(ProxyServer::new(ServerConfig::default(), pipeline));

    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            error!("Proxy stopped: {}", e);
        }
    });
    Ok(addr)
}
