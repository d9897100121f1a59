// src/interception/mod.rs
//! Request interception layer
//!
//! Outbound calls are redirected without touching the calling code:
//!
//! - **Call sites**: swappable handler slots every client surface sends through
//! - **Registry**: records redirected sites and their original handlers
//! - **Guard**: per-thread / per-task flag that lets the firewall's own
//!   uplink call bypass redirection
//! - **Redirects**: the handlers installed over sites
//! - **Session**: install/uninstall lifecycle around a firewall client
//!
//! # Architecture
//!
//! ```text
//! Agent Code (Unmodified)
//!     │
//!     └─ Client surface → CallSite ─┬─ guard enabled  → Redirect → FirewallClient → proxy
//!                                   └─ guard disabled → original handler → target
//! ```

pub mod guard;
pub mod redirect;
pub mod registry;
pub mod session;
pub mod site;

// Re-export commonly used types
pub use guard::{disable, disabled_scope, enable, is_disabled, DisableScope, GuardToken};
pub use redirect::{AsyncRedirect, Redirect};
pub use registry::InterceptionRegistry;
pub use session::{FirewallSession, SessionGuard};
pub use site::{CallSite, Handler, SiteId, SiteKind};
