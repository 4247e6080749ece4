//! Cooperative cancellation token, checked at stage boundaries and inner loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheaply cloneable, cooperative cancellation signal.
///
/// Modeled as `Arc<AtomicBool>` rather than an async runtime's cancellation
/// primitive, since `wharf` schedules work on OS threads (spec §5).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// A token that is already canceled, for tests and pre-canceled invocations.
    pub fn already_canceled() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncanceled() {
        let token = CancellationToken::new();
        assert!(!token.is_canceled());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_canceled());
    }

    #[test]
    fn already_canceled_constructor() {
        assert!(CancellationToken::already_canceled().is_canceled());
    }
}
