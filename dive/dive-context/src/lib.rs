//! Context (C9): a cooperative cancellation token passed to long-running
//! operations (capture load, stats gathering, accept/recv loops).
//!
//! The contract is cooperative: work that never polls [`Context::is_cancelled`]
//! cannot be cancelled by this mechanism. [`Context`] is the cheap, cloneable
//! observer handle; [`CancelHandle`] is the single non-cloneable capability
//! held by the originator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared cancellation flag. Cheap to clone; `is_cancelled()` returns
/// `false` for [`Context::background`].
#[derive(Clone, Debug)]
pub struct Context {
    flag: Option<Arc<AtomicBool>>,
}

impl Context {
    /// A context that can never be cancelled — the null handle.
    pub fn background() -> Self {
        Self { flag: None }
    }

    /// Creates a new cancellable context and the handle that can cancel it.
    pub fn new() -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = CancelHandle { flag: flag.clone() };
        (Self { flag: Some(flag) }, handle)
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.flag {
            Some(flag) => flag.load(Ordering::Acquire),
            None => false,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// The originator's capability to cancel a [`Context`]. Not `Clone`: exactly
/// one holder may cancel, per the data model's ownership rule.
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_never_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn default_is_background() {
        assert!(!Context::default().is_cancelled());
    }

    #[test]
    fn cancel_is_observed_by_every_clone() {
        let (ctx, handle) = Context::new();
        let observer = ctx.clone();
        assert!(!ctx.is_cancelled());
        assert!(!observer.is_cancelled());
        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(observer.is_cancelled());
    }
}
