// src/interception/redirect.rs
//! Redirect handlers
//!
//! The handlers the registry wires into call sites. Each consults the guard
//! first: with interception disabled in the current context the call goes
//! to the site's original handler, otherwise to the firewall client.

use crate::client::FirewallClient;
use crate::interception::guard;
use crate::interception::registry::InterceptionRegistry;
use crate::interception::site::{Handler, SiteId};
use crate::model::{CanonicalRequest, CanonicalResponse};
use crate::transport::{AsyncTransport, Transport};
use crate::utils::errors::{FirewallError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::trace;

fn missing_original(site: &SiteId) -> FirewallError {
    FirewallError::Internal(format!("No original handler recorded for site {}", site))
}

/// Redirect for blocking sites
pub struct Redirect {
    site: SiteId,
    registry: Arc<InterceptionRegistry>,
    firewall: Arc<FirewallClient>,
}

impl Redirect {
    pub fn new(site: SiteId, registry: Arc<InterceptionRegistry>, firewall: Arc<FirewallClient>) -> Self {
        Self {
            site,
            registry,
            firewall,
        }
    }
}

impl Transport for Redirect {
    fn send(&self, request: CanonicalRequest) -> Result<CanonicalResponse> {
        if !guard::is_disabled() {
            return self.firewall.submit_blocking(request);
        }

        trace!("Interception disabled, {} goes direct", self.site);
        match self.registry.original(&self.site) {
            Some(Handler::Blocking(original)) => original.send(request),
            _ => Err(missing_original(&self.site)),
        }
    }
}

/// Redirect for async sites
pub struct AsyncRedirect {
    site: SiteId,
    registry: Arc<InterceptionRegistry>,
    firewall: Arc<FirewallClient>,
}

impl AsyncRedirect {
    pub fn new(site: SiteId, registry: Arc<InterceptionRegistry>, firewall: Arc<FirewallClient>) -> Self {
        Self {
            site,
            registry,
            firewall,
        }
    }
}

impl AsyncTransport for AsyncRedirect {
    fn send(&self, request: CanonicalRequest) -> BoxFuture<'_, Result<CanonicalResponse>> {
        Box::pin(async move {
            if !guard::is_disabled() {
                return self.firewall.submit(request).await;
            }

            trace!("Interception disabled, {} goes direct", self.site);
            match self.registry.original(&self.site) {
                Some(Handler::Async(original)) => original.send(request).await,
                _ => Err(missing_original(&self.site)),
            }
        })
    }
}
