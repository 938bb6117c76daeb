//! Cancellation and deadline handling shared by every step of a request
//!
//! A [`CallContext`] is threaded through the dial, the request write, the
//! response head read and the body read. Each step runs inside
//! [`CallContext::run`], which stops it as soon as the token is cancelled or
//! the deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::Interruption;

#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl CallContext {
    /// Context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            timeout: None,
        }
    }

    /// Context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// Child context cancelled together with `self`, expiring at the earlier
    /// of the two deadlines
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let token = self.token.child_token();
        let Some(candidate) = Instant::now().checked_add(timeout) else {
            return Self {
                token,
                deadline: self.deadline,
                timeout: self.timeout,
            };
        };

        let (deadline, timeout) = match (self.deadline, self.timeout) {
            (Some(existing), Some(existing_timeout)) if existing <= candidate => {
                (existing, existing_timeout)
            }
            _ => (candidate, timeout),
        };

        Self {
            token,
            deadline: Some(deadline),
            timeout: Some(timeout),
        }
    }

    /// Context driven by an externally owned token
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            timeout: None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Check whether the context has already stopped
    pub fn check(&self) -> Result<(), Interruption> {
        if self.token.is_cancelled() {
            return Err(Interruption::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(self.deadline_exceeded());
            }
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context stops first
    ///
    /// An already-stopped context returns immediately without polling `fut`.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interruption>
    where
        F: Future,
    {
        self.check()?;

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interruption::Cancelled),
            _ = expiry => Err(self.deadline_exceeded()),
            output = fut => Ok(output),
        }
    }

    fn deadline_exceeded(&self) -> Interruption {
        Interruption::DeadlineExceeded {
            duration_ms: self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = CallContext::background();
        assert!(ctx.remaining().is_none());
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_future() {
        let ctx = CallContext::background();
        ctx.cancel();

        let mut polled = false;
        let result = ctx
            .run(async {
                polled = true;
            })
            .await;

        assert_eq!(result, Err(Interruption::Cancelled));
        assert!(!polled);
    }

    #[tokio::test]
    async fn test_deadline_stops_pending_future() {
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        let started = std::time::Instant::now();

        let result = ctx.run(std::future::pending::<()>()).await;

        assert_eq!(
            result,
            Err(Interruption::DeadlineExceeded { duration_ms: 20 })
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_while_in_flight() {
        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(Interruption::Cancelled));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_is_unbounded() {
        let ctx = CallContext::with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.run(async { 3 }).await, Ok(3));

        let parent = CallContext::with_timeout(Duration::from_secs(5));
        let child = parent.child_with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_child_keeps_earlier_deadline() {
        let parent = CallContext::with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());

        parent.cancel();
        assert!(child.is_cancelled());
    }
}
