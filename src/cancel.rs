//! Cooperative cancellation for parsing.
//!
//! The parser polls the token once per physical line and aborts with
//! [`Error::Cancelled`](crate::Error::Cancelled) once it has fired. A
//! cancelled token stays cancelled.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// One-shot cancellation flag shared between a caller and a parse.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token (idempotent).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
