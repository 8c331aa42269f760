//! Cancellation and deadlines for I/O and subprocess work.
//!
//! A [`Ctx`] is threaded through every operation that reaches the
//! filesystem, a subprocess, the secret provider, or the network. Each of
//! those calls `ctx.check()?` before doing work, so a cancelled run stops at
//! the next suspension point with [`BlueprintError::Cancelled`].

use crate::error::{BlueprintError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Ctx {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child context that shares cancellation but expires after `timeout`
    /// (or at the parent's deadline, whichever is sooner).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BlueprintError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_live() {
        assert!(Ctx::new().check().is_ok());
    }

    #[test]
    fn cancel_is_shared_with_children() {
        let parent = Ctx::new();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(matches!(child.check(), Err(BlueprintError::Cancelled)));
    }

    #[test]
    fn expired_deadline_cancels() {
        let ctx = Ctx::new().with_timeout(Duration::ZERO);
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn child_keeps_earlier_parent_deadline() {
        let parent = Ctx::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
