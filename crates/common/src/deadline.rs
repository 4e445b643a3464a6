//! Request deadlines.
//!
//! The edge assigns a budget to every inbound request and each downstream
//! call spends from what is left. A [`Deadline`] is `Copy` so it can be passed
//! by value through every layer.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::Status;

/// Header used to forward the remaining budget, in milliseconds.
pub const TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Point in time after which work for a request should be abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + budget),
        }
    }

    /// No deadline at all. Used by background jobs that bound their own work.
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// Time left before expiry; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// The earlier of this deadline and `budget` from now.
    pub fn min(self, budget: Duration) -> Self {
        let candidate = Instant::now() + budget;
        match self.expires_at {
            Some(at) if at <= candidate => self,
            _ => Self {
                expires_at: Some(candidate),
            },
        }
    }

    /// Runs `fut` to completion or fails with `DEADLINE_EXCEEDED`.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Status>
    where
        F: Future<Output = Result<T, Status>>,
    {
        match self.remaining() {
            None => fut.await,
            Some(left) if left.is_zero() => Err(Status::deadline_exceeded("deadline exceeded")),
            Some(left) => tokio::time::timeout(left, fut)
                .await
                .map_err(|_| Status::deadline_exceeded("deadline exceeded"))?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Code;

    #[tokio::test(start_paused = true)]
    async fn remaining_shrinks_over_time() {
        let deadline = Deadline::after(Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(deadline.remaining(), Some(Duration::from_secs(3)));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn unbounded_deadline_never_expires() {
        let deadline = Deadline::none();
        assert_eq!(deadline.remaining(), None);
        assert!(!deadline.is_expired());
        let value = deadline.run(async { Ok::<_, Status>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn run_times_out_slow_work() {
        let deadline = Deadline::after(Duration::from_millis(100));
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, Status>(())
            })
            .await;
        assert_eq!(result.unwrap_err().code, Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn run_fails_fast_when_already_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        let result = deadline.run(async { Ok::<_, Status>(()) }).await;
        assert_eq!(result.unwrap_err().code, Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn run_passes_through_inner_errors() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let result: Result<(), Status> = deadline
            .run(async { Err(Status::not_found("missing")) })
            .await;
        assert_eq!(result.unwrap_err().code, Code::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn min_keeps_the_earlier_deadline() {
        let tight = Deadline::after(Duration::from_secs(1));
        assert_eq!(tight.min(Duration::from_secs(10)), tight);

        let loose = Deadline::none().min(Duration::from_secs(2));
        assert_eq!(loose.remaining(), Some(Duration::from_secs(2)));
    }
}
