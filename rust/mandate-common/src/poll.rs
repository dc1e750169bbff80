//! Cooperative, cancellable polling.
//!
//! Authorization flows that wait on an out-of-band event (for example a user
//! clicking a confirmation link) repeatedly ask a remote party for fresh state
//! until it satisfies some condition. [`poll_until`] is the single primitive
//! for that pattern; cancellation is expressed through an [`AbortSignal`]
//! handed out by an [`AbortController`].

use std::{
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

const ABORTED: &str = "aborted";

/// Owner side of an abort signal. Cloning shares the same underlying signal.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortController {
    /// Creates a controller whose signal has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
            reason: self.reason.clone(),
        }
    }

    /// Fires the signal with a reason. Only the first reason is kept.
    pub fn abort_with(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    /// Fires the signal without a specific reason.
    pub fn abort(&self) {
        self.token.cancel();
    }
}

/// Observer side of an [`AbortController`].
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortSignal {
    /// A signal that is never aborted.
    pub fn never() -> Self {
        Self::default()
    }

    /// Whether the signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason the signal fired with, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once the signal fires.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}

/// Options for [`poll_until`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Time to sleep between attempts that did not satisfy the predicate.
    pub interval: Duration,
    /// Cancels the loop when fired.
    pub signal: AbortSignal,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            signal: AbortSignal::never(),
        }
    }
}

/// Errors produced by [`poll_until`].
#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The signal fired before the predicate was satisfied.
    #[error("polling aborted: {reason}")]
    Aborted {
        /// Reason given to the controller, or `"aborted"`.
        reason: String,
    },

    /// The polled operation failed. Failures are never retried.
    #[error(transparent)]
    Operation(E),
}

impl<E> PollError<E> {
    fn aborted(signal: &AbortSignal) -> Self {
        PollError::Aborted {
            reason: signal.reason().unwrap_or(ABORTED).to_owned(),
        }
    }

    /// Whether this error is the result of cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, PollError::Aborted { .. })
    }
}

/// Invokes `operation` until its output satisfies `predicate`.
///
/// The loop checks the signal before every attempt, so an already-aborted
/// signal rejects without calling `operation` at all. Each attempt and each
/// sleep race against the signal; when it fires the pending future (including
/// the timer) is dropped and the call rejects with the signal's reason.
pub async fn poll_until<T, E, Op, Fut, P>(
    mut operation: Op,
    predicate: P,
    options: &PollOptions,
) -> Result<T, PollError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let PollOptions { interval, signal } = options;
    let mut attempt: usize = 0;

    loop {
        if signal.is_aborted() {
            return Err(PollError::aborted(signal));
        }

        attempt += 1;
        let output = tokio::select! {
            biased;
            _ = signal.aborted() => return Err(PollError::aborted(signal)),
            output = operation() => output.map_err(PollError::Operation)?,
        };

        if predicate(&output) {
            tracing::debug!(attempt, "poll condition satisfied");
            return Ok(output);
        }

        tracing::trace!(attempt, ?interval, "poll condition not met, sleeping");
        tokio::select! {
            biased;
            _ = signal.aborted() => return Err(PollError::aborted(signal)),
            _ = tokio::time::sleep(*interval) => {}
        }
    }
}
