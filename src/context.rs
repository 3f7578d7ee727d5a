//! Per-request cancellation and deadline scope.
//!
//! A [`DispatchContext`] travels with one transaction through the router, the gateway retry
//! loop, and the sender. It combines a [`CancellationToken`] with an optional deadline; whichever
//! fires first ends every suspension point that is raced against [`DispatchContext::done`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The owner cancelled the context explicitly.
    Cancelled,
    /// The deadline elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "context canceled"),
            CancelReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation token plus optional deadline. Clones share the same token.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl DispatchContext {
    /// A context that never expires on its own.
    pub fn background() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one tied to server shutdown.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Derive a context with a deadline. An earlier existing deadline is kept.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self { token: self.token.child_token(), deadline: Some(deadline) }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context: cancelled when the parent is, but can be cancelled on its own.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// `Some(reason)` once the context is done; explicit cancellation wins over the deadline.
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CancelReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    /// Run `fut` until it completes or the context is done, whichever comes first.
    /// The future is dropped on cancellation.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        if let Some(reason) = self.err() {
            return Err(reason);
        }
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_is_not_done() {
        let ctx = DispatchContext::background();
        assert_eq!(ctx.err(), None);
        assert_eq!(ctx.remaining(), None);
    }

    #[tokio::test]
    async fn cancel_propagates_to_children_not_parents() {
        let parent = DispatchContext::background();
        let child = parent.child();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        child.cancel();
        assert_eq!(parent.err(), None);
        assert_eq!(child.err(), Some(CancelReason::Cancelled));
        assert_eq!(grandchild.err(), Some(CancelReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = DispatchContext::background().with_timeout(Duration::from_millis(50));
        assert_eq!(ctx.err(), None);
        let reason = ctx.done().await;
        assert_eq!(reason, CancelReason::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_is_kept() {
        let ctx = DispatchContext::background().with_timeout(Duration::from_secs(1));
        let later = ctx.with_timeout(Duration::from_secs(10));
        assert_eq!(later.deadline(), ctx.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn run_aborts_slow_future() {
        let ctx = DispatchContext::background().with_timeout(Duration::from_millis(10));
        let result = ctx.run(tokio::time::sleep(Duration::from_secs(30))).await;
        assert_eq!(result, Err(CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn run_returns_output_when_not_cancelled() {
        let ctx = DispatchContext::background();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn run_fails_fast_when_already_cancelled() {
        let ctx = DispatchContext::background();
        ctx.cancel();
        assert_eq!(ctx.run(async { 7 }).await, Err(CancelReason::Cancelled));
    }
}
