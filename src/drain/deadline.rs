//! Bounds on how long a drain wait may take.

use std::future::{Future, pending};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::drain::error::DrainError;

/// A point in time, a cancellation token, or both. Whichever fires first ends
/// the wait. With neither set the wait is unbounded.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    /// No time limit and no cancellation
    pub fn never() -> Self {
        Self::default()
    }

    /// Expire `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// Expire at `at`
    pub fn at(at: Instant) -> Self {
        Self {
            at: Some(at),
            cancel: None,
        }
    }

    /// End the wait only when `token` is cancelled
    pub fn cancelled_by(token: CancellationToken) -> Self {
        Self {
            at: None,
            cancel: Some(token),
        }
    }

    /// Also end the wait when `token` is cancelled
    pub fn or_cancelled_by(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Instant at which the deadline expires, if any
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    /// Time left before expiry. `None` when there is no time limit.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Drive `fut` until it completes or the deadline fires.
    ///
    /// `fut` is polled first, so a future that is already ready wins even when
    /// the deadline has passed too.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DrainError> {
        let expired = async {
            match self.at {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            output = fut => Ok(output),
            _ = expired => Err(DrainError::DeadlineExceeded),
            _ = cancelled => Err(DrainError::Cancelled),
        }
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        Self::after(timeout)
    }
}

impl From<CancellationToken> for Deadline {
    fn from(token: CancellationToken) -> Self {
        Self::cancelled_by(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_has_no_instant() {
        let deadline = Deadline::never();
        assert!(deadline.instant().is_none());
        assert!(deadline.remaining().is_none());
    }

    #[tokio::test]
    async fn test_ready_future_wins_over_expired_deadline() {
        let deadline = Deadline::at(Instant::now());
        let result = deadline.run(async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_expires() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result = deadline.run(pending::<()>()).await;
        assert_eq!(result, Err(DrainError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let token = CancellationToken::new();
        let deadline = Deadline::cancelled_by(token.clone());
        token.cancel();
        let result = deadline.run(pending::<()>()).await;
        assert_eq!(result, Err(DrainError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_before_expiry() {
        let token = CancellationToken::new();
        let deadline = Deadline::after(Duration::from_secs(60)).or_cancelled_by(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = deadline.run(pending::<()>()).await;
        assert_eq!(result, Err(DrainError::Cancelled));
        canceller.await.unwrap();
    }

    #[test]
    fn test_from_duration() {
        let deadline: Deadline = Duration::from_secs(5).into();
        let remaining = deadline.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }
}
