//! Cooperative cancellation.
//!
//! An explicit token is passed down every call chain and checked at
//! well-defined safe points (page boundaries, per-organization boundaries).
//! Tokens can be linked (a child observes its parent) and can carry a
//! deadline, so a single check covers shutdown and timeout together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
}

/// Cooperative cancellation token.
///
/// Clones share cancellation state. A token is considered cancelled when it
/// was cancelled directly, its deadline passed, or any ancestor is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
    deadline: Option<Instant>,
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is already cancelled (try-once semantics for lock
    /// acquisition and similar fail-fast paths).
    pub fn cancelled() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }

    /// Derive a child token: cancelling the parent cancels the child, not the
    /// other way around.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            deadline: None,
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Attach a deadline after which the token reads as cancelled.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_observed_by_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn child_observes_parent_but_not_vice_versa() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child2 = parent.child();
        parent.cancel();
        assert!(child2.is_cancelled());
    }

    #[test]
    fn deadline_cancels() {
        let token = CancellationToken::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(token.is_cancelled());

        let token =
            CancellationToken::new().with_deadline(Instant::now() + Duration::from_secs(60));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn pre_cancelled_token() {
        assert!(CancellationToken::cancelled().is_cancelled());
    }
}
