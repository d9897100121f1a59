// src/interception/session.rs
//! Firewall session
//!
//! Owns the interception registry and the firewall client, and gives the
//! install/uninstall lifecycle a scoped form:
//!
//! ```text
//! let _active = session.activate(&[client.site().clone()])?;
//! client.get(url).send()?;          // redirected
//! drop(_active);                    // originals restored
//! ```

use crate::client::FirewallClient;
use crate::interception::redirect::{AsyncRedirect, Redirect};
use crate::interception::registry::InterceptionRegistry;
use crate::interception::site::{CallSite, Handler, SiteKind};
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::info;

/// Install/uninstall owner for one firewall client
pub struct FirewallSession {
    registry: Arc<InterceptionRegistry>,
    firewall: Arc<FirewallClient>,
}

impl FirewallSession {
    pub fn new(firewall: Arc<FirewallClient>) -> Self {
        Self {
            registry: Arc::new(InterceptionRegistry::new()),
            firewall,
        }
    }

    pub fn registry(&self) -> &Arc<InterceptionRegistry> {
        &self.registry
    }

    pub fn firewall(&self) -> &Arc<FirewallClient> {
        &self.firewall
    }

    /// Redirect one site through the firewall
    pub fn install(&self, site: &Arc<CallSite>) -> Result<()> {
        let id = site.id().clone();
        let registry = Arc::clone(&self.registry);
        let firewall = Arc::clone(&self.firewall);

        let handler = match site.kind() {
            SiteKind::Blocking => Handler::Blocking(Arc::new(Redirect::new(id, registry, firewall))),
            SiteKind::Async => Handler::Async(Arc::new(AsyncRedirect::new(id, registry, firewall))),
        };
        self.registry.install(site, handler)
    }

    pub fn install_all(&self, sites: &[Arc<CallSite>]) -> Result<()> {
        for site in sites {
            self.install(site)?;
        }
        info!("Firewall installed on {} site(s)", self.registry.len());
        Ok(())
    }

    /// Restore every redirected site
    pub fn uninstall_all(&self) -> usize {
        self.registry.uninstall_all()
    }

    /// Install on `sites` until the returned guard is dropped
    ///
    /// A failed install restores whatever was installed before failing.
    pub fn activate(&self, sites: &[Arc<CallSite>]) -> Result<SessionGuard> {
        let guard = SessionGuard {
            registry: Arc::clone(&self.registry),
        };
        self.install_all(sites)?;
        Ok(guard)
    }

    /// Run `f` with `sites` redirected, restoring them afterwards
    pub fn run<T>(&self, sites: &[Arc<CallSite>], f: impl FnOnce() -> T) -> Result<T> {
        let _active = self.activate(sites)?;
        Ok(f())
    }
}

/// Uninstalls the session's sites when dropped
#[must_use = "the firewall is uninstalled as soon as the guard is dropped"]
pub struct SessionGuard {
    registry: Arc<InterceptionRegistry>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.uninstall_all();
    }
}
