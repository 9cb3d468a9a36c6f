use std::sync::{Arc, OnceLock};

use tokio::time::{Duration, Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Why a [`Context`] was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// Plain caller-initiated cancellation, e.g. a shutdown signal.
    Cancelled,
    /// The context's deadline passed.
    DeadlineExceeded,
    /// Cancelled with an explicit reason.
    Aborted(Arc<str>),
}

impl Cause {
    /// Plain cancellation is a clean stop, every other cause is an error.
    pub fn into_result(self) -> crate::Result<()> {
        match self {
            Cause::Cancelled => Ok(()),
            Cause::DeadlineExceeded => Err(Error::DeadlineExceeded),
            Cause::Aborted(reason) => Err(Error::Aborted(reason)),
        }
    }
}

/// Cancellation context shared between the listener loop, its handler and
/// whoever decides when the process stops.
///
/// - `cancel()`: request a clean stop
/// - `abort(reason)`: stop with an error
/// - `with_timeout(d)` / `with_deadline(t)`: stop with [`Cause::DeadlineExceeded`]
///   once the deadline passes
/// - `done()`: wait until the context is cancelled and get the [`Cause`]
///
/// Clones share the same state, so a clone moved into a signal task cancels
/// the original.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    cause: Arc<OnceLock<Cause>>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the context automatically `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel the context automatically at `deadline`.
    /// An earlier deadline already set on the context wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Request a clean stop.
    #[inline]
    pub fn cancel(&self) {
        self.cancel_with(Cause::Cancelled);
    }

    /// Stop with an error carrying `reason`.
    pub fn abort<R: Into<Arc<str>>>(&self, reason: R) {
        self.cancel_with(Cause::Aborted(reason.into()));
    }

    /// The first cause wins; later calls only make sure the token is cancelled.
    fn cancel_with(&self, cause: Cause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Whether the context has been cancelled (or its deadline has passed).
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The cancellation cause, if the context is done.
    pub fn cause(&self) -> Option<Cause> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.cancel_with(Cause::DeadlineExceeded);
            return self.cause.get().cloned();
        }
        None
    }

    /// Resolves once the context is cancelled, returning the cause.
    ///
    /// Cancel safe: dropping the future has no effect on the context.
    pub async fn done(&self) -> Cause {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(deadline) => self.cancel_with(Cause::DeadlineExceeded),
                }
            }
            None => self.token.cancelled().await,
        }
        self.cause.get().cloned().unwrap_or(Cause::Cancelled)
    }

    /// The underlying token, for APIs that only speak `tokio_util`.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for Context {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            cause: Arc::new(OnceLock::new()),
            deadline: None,
        }
    }
}
