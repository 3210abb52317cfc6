//! Cancellation and deadline signal for multi-step writes.
//!
//! Repositories check the signal before opening a transaction, right after
//! opening it, on every pass over an item list and right before commit. A hit
//! rolls the transaction back and surfaces `Cancelled` or `Timeout`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Fires the signal for every clone.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Explicit cancellation wins over an expired deadline.
    pub fn check(&self) -> Result<(), ServiceError> {
        if self.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ServiceError::Timeout),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn none_never_fires() {
        assert!(CancelSignal::none().check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let signal = CancelSignal::with_timeout(Duration::from_secs(60));
        let clone = signal.clone();
        signal.cancel();
        assert_matches!(clone.check(), Err(ServiceError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_reports_timeout() {
        let signal = CancelSignal::with_timeout(Duration::from_millis(50));
        assert!(signal.check().is_ok());
        tokio::time::advance(Duration::from_millis(51)).await;
        assert_matches!(signal.check(), Err(ServiceError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_beats_timeout() {
        let signal = CancelSignal::with_timeout(Duration::from_millis(1));
        tokio::time::advance(Duration::from_millis(5)).await;
        signal.cancel();
        assert_matches!(signal.check(), Err(ServiceError::Cancelled));
    }
}
