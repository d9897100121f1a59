// src/interception/site.rs
//! Call sites
//!
//! A call site is the extension point a client surface is built on: it holds
//! the handler the surface sends through. Before installation that is the
//! native transport; while the firewall is installed it is a redirect. The
//! surface itself never changes, only the handler behind the site.

use crate::model::{CanonicalRequest, CanonicalResponse};
use crate::transport::{AsyncTransport, Transport};
use crate::utils::errors::{FirewallError, Result};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SITE: AtomicU64 = AtomicU64::new(1);

/// Identifier of a call site, unique within a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Fresh id for one surface instance, e.g. `blocking#3`
    pub fn unique(prefix: &str) -> Self {
        Self(format!("{}#{}", prefix, NEXT_SITE.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Execution model of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Blocking,
    Async,
}

/// Handler currently wired into a site
#[derive(Clone)]
pub enum Handler {
    Blocking(Arc<dyn Transport>),
    Async(Arc<dyn AsyncTransport>),
}

impl Handler {
    pub fn kind(&self) -> SiteKind {
        match self {
            Self::Blocking(_) => SiteKind::Blocking,
            Self::Async(_) => SiteKind::Async,
        }
    }

    /// Identity comparison (same underlying transport object)
    pub fn same_as(&self, other: &Handler) -> bool {
        match (self, other) {
            (Self::Blocking(a), Self::Blocking(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Self::Async(a), Self::Async(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking(t) => write!(f, "Handler::Blocking({:p})", Arc::as_ptr(t) as *const ()),
            Self::Async(t) => write!(f, "Handler::Async({:p})", Arc::as_ptr(t) as *const ()),
        }
    }
}

/// A swappable handler slot shared by a client surface and the registry
pub struct CallSite {
    id: SiteId,
    kind: SiteKind,
    current: RwLock<Handler>,
}

impl CallSite {
    /// Site for a blocking surface
    pub fn blocking(id: impl Into<SiteId>, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kind: SiteKind::Blocking,
            current: RwLock::new(Handler::Blocking(transport)),
        })
    }

    /// Site for an async surface
    pub fn nonblocking(id: impl Into<SiteId>, transport: Arc<dyn AsyncTransport>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kind: SiteKind::Async,
            current: RwLock::new(Handler::Async(transport)),
        })
    }

    pub fn id(&self) -> &SiteId {
        &self.id
    }

    pub fn kind(&self) -> SiteKind {
        self.kind
    }

    /// Snapshot of the handler in place right now
    pub fn current(&self) -> Handler {
        self.current.read().clone()
    }

    /// Swap the handler; kinds must match
    pub(crate) fn replace(&self, handler: Handler) -> Result<Handler> {
        if handler.kind() != self.kind {
            return Err(FirewallError::Internal(format!(
                "Handler kind {:?} does not fit {:?} site {}",
                handler.kind(),
                self.kind,
                self.id
            )));
        }
        Ok(std::mem::replace(&mut *self.current.write(), handler))
    }

    /// Current handler of a blocking site
    pub fn blocking_handler(&self) -> Result<Arc<dyn Transport>> {
        match self.current() {
            Handler::Blocking(transport) => Ok(transport),
            Handler::Async(_) => Err(FirewallError::Internal(format!(
                "Site {} is not a blocking site",
                self.id
            ))),
        }
    }

    /// Current handler of an async site
    pub fn async_handler(&self) -> Result<Arc<dyn AsyncTransport>> {
        match self.current() {
            Handler::Async(transport) => Ok(transport),
            Handler::Blocking(_) => Err(FirewallError::Internal(format!(
                "Site {} is not an async site",
                self.id
            ))),
        }
    }
}

// A site is itself a transport: it sends through whatever handler is wired in.
impl Transport for CallSite {
    fn send(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        self.blocking_handler()?.send(request)
    }
}

impl AsyncTransport for CallSite {
    fn send(&self, request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>> {
        Box::pin(async move { self.async_handler()?.send(request).await })
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
