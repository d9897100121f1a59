// src/interception/guard.rs
//! Per-context interception guard
//!
//! The firewall's own proxy round trip must bypass redirection, while every
//! other call from every other thread or task is still redirected. The
//! "disabled" flag therefore lives in the current call context:
//!
//! - blocking code: a thread-local cell
//! - async code: a tokio task-local cell installed by [`suppressed`]
//!
//! Inside a task-local scope the task-local cell wins, so the flag follows
//! the task across worker threads and never leaks to other tasks sharing
//! the same thread.
//!
//! `enable(token)` restores the state captured by the matching `disable()`
//! rather than clearing it, so nested pairs compose.

use std::cell::Cell;
use std::future::Future;
use std::marker::PhantomData;

thread_local! {
    static THREAD_DISABLED: Cell<bool> = const { Cell::new(false) };
}

tokio::task_local! {
    static TASK_DISABLED: Cell<bool>;
}

/// State captured by [`disable`]; hand it back to [`enable`]
///
/// Not `Send`: a token must be restored in the context that created it.
#[must_use = "pass the token to `enable` to restore interception"]
#[derive(Debug)]
pub struct GuardToken {
    prior: bool,
    _context: PhantomData<*const ()>,
}

impl GuardToken {
    /// Whether interception was already disabled when the token was taken
    pub fn was_disabled(&self) -> bool {
        self.prior
    }
}

/// True when redirection is suppressed in the current context
pub fn is_disabled() -> bool {
    TASK_DISABLED
        .try_with(Cell::get)
        .unwrap_or_else(|_| THREAD_DISABLED.with(Cell::get))
}

fn replace(disabled: bool) -> bool {
    match TASK_DISABLED.try_with(|cell| cell.replace(disabled)) {
        Ok(prior) => prior,
        Err(_) => THREAD_DISABLED.with(|cell| cell.replace(disabled)),
    }
}

/// Suppress redirection in the current context
pub fn disable() -> GuardToken {
    GuardToken {
        prior: replace(true),
        _context: PhantomData,
    }
}

/// Restore the state captured by `token`
pub fn enable(token: GuardToken) {
    replace(token.prior);
}

/// RAII form of `disable`/`enable`; restores on every exit path
#[must_use = "interception is restored as soon as the scope is dropped"]
#[derive(Debug)]
pub struct DisableScope {
    token: Option<GuardToken>,
}

impl Drop for DisableScope {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            enable(token);
        }
    }
}

/// Disable redirection until the returned scope is dropped
pub fn disabled_scope() -> DisableScope {
    DisableScope {
        token: Some(disable()),
    }
}

/// Run `future` with redirection suppressed for its task only
///
/// The flag is restored when the future completes or is dropped, so a
/// cancelled call cannot leave interception disabled.
pub async fn suppressed<F: Future>(future: F) -> F::Output {
    TASK_DISABLED.scope(Cell::new(true), future).await
}

/// Run `future` with a fresh, enabled task-local flag
///
/// Spawned tasks start here so they never inherit a parent thread's state.
pub async fn isolated<F: Future>(future: F) -> F::Output {
    TASK_DISABLED.scope(Cell::new(false), future).await
}
