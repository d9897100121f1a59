// src/interception/registry.rs
//! Interception registry
//!
//! Records which call sites are redirected and owns their original handlers
//! between install and uninstall. Adapters read it concurrently (through the
//! redirect handlers) while a single owner installs and uninstalls.

use crate::interception::site::{CallSite, Handler, SiteId};
use crate::utils::errors::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One redirected site and the handler it had before installation
struct Entry {
    site: Arc<CallSite>,
    original: Handler,
}

/// Table of redirected call sites
pub struct InterceptionRegistry {
    /// Site id to original handler
    entries: RwLock<HashMap<SiteId, Entry>>,
}

impl InterceptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Wire `handler` into `site`
    ///
    /// The first install records the site's original handler. Later installs
    /// on the same site replace the current handler but keep that original.
    pub fn install(&self, site: &Arc<CallSite>, handler: Handler) -> Result<()> {
        let mut entries = self.entries.write();

        let previous = site.replace(handler)?;
        if entries.contains_key(site.id()) {
            debug!("Site {} already redirected, keeping stored original", site.id());
        } else {
            info!("Redirecting call site {}", site.id());
            entries.insert(
                site.id().clone(),
                Entry {
                    site: Arc::clone(site),
                    original: previous,
                },
            );
        }

        Ok(())
    }

    /// Restore every stored original and clear the table
    ///
    /// Returns the number of sites restored.
    pub fn uninstall_all(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();

        for (id, entry) in entries.drain() {
            // kinds were checked on install, so this cannot mismatch
            if entry.site.replace(entry.original).is_ok() {
                debug!("Restored call site {}", id);
            }
        }

        if count > 0 {
            info!("Restored {} call site(s)", count);
        }
        count
    }

    /// Original handler recorded for `id`
    pub fn original(&self, id: &SiteId) -> Option<Handler> {
        self.entries.read().get(id).map(|entry| entry.original.clone())
    }

    pub fn is_installed(&self, id: &SiteId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Ids of all redirected sites, sorted
    pub fn installed_sites(&self) -> Vec<SiteId> {
        let mut ids: Vec<SiteId> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InterceptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedAsyncTarget, FixedTarget};
    use crate::transport::Transport;

    fn blocking(body: &str) -> Handler {
        Handler::Blocking(Arc::new(FixedTarget::ok(body)))
    }

    #[test]
    fn test_install_records_original() {
        let registry = InterceptionRegistry::new();
        let site = CallSite::blocking("blocking", Arc::new(FixedTarget::ok("native")));
        let native = site.current();

        registry.install(&site, blocking("redirect")).unwrap();

        assert!(registry.is_installed(site.id()));
        assert!(registry.original(site.id()).unwrap().same_as(&native));
        assert!(!site.current().same_as(&native));
    }

    #[test]
    fn test_repeated_install_keeps_true_original() {
        let registry = InterceptionRegistry::new();
        let site = CallSite::blocking("blocking", Arc::new(FixedTarget::ok("native")));
        let native = site.current();

        registry.install(&site, blocking("first")).unwrap();
        registry.install(&site, blocking("second")).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.original(site.id()).unwrap().same_as(&native));
    }

    #[test]
    fn test_uninstall_restores_pre_install_state() {
        let registry = InterceptionRegistry::new();
        let sync_site = CallSite::blocking("blocking", Arc::new(FixedTarget::ok("native")));
        let async_site =
            CallSite::nonblocking("async", Arc::new(FixedAsyncTarget::ok("native")));
        let sync_native = sync_site.current();
        let async_native = async_site.current();

        registry.install(&sync_site, blocking("redirect")).unwrap();
        registry.install(&sync_site, blocking("again")).unwrap();
        registry
            .install(
                &async_site,
                Handler::Async(Arc::new(FixedAsyncTarget::ok("redirect"))),
            )
            .unwrap();
        assert_eq!(
            registry.installed_sites(),
            vec![SiteId::from("async"), SiteId::from("blocking")]
        );

        assert_eq!(registry.uninstall_all(), 2);
        assert!(registry.is_empty());
        assert!(sync_site.current().same_as(&sync_native));
        assert!(async_site.current().same_as(&async_native));

        let response = sync_site
            .blocking_handler()
            .unwrap()
            .send(crate::model::CanonicalRequest::new("t", "GET", "http://x.test/").unwrap())
            .unwrap();
        assert_eq!(response.body.to_text(), "native");
    }

    #[test]
    fn test_kind_mismatch_leaves_registry_untouched() {
        let registry = InterceptionRegistry::new();
        let site = CallSite::blocking("blocking", Arc::new(FixedTarget::ok("native")));
        let wrong = Handler::Async(Arc::new(FixedAsyncTarget::ok("x")));

        assert!(registry.install(&site, wrong).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_reads_during_install_window() {
        let registry = Arc::new(InterceptionRegistry::new());
        let site = CallSite::blocking("blocking", Arc::new(FixedTarget::ok("native")));
        registry.install(&site, blocking("redirect")).unwrap();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = site.id().clone();
                std::thread::spawn(move || {
                    (0..1000).all(|_| registry.original(&id).is_some())
                })
            })
            .collect();

        for reader in readers {
            assert!(reader.join().unwrap());
        }
        registry.uninstall_all();
    }
}
