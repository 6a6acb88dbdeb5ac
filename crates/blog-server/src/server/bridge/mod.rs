//! Request bridge between async dispatch and blocking storage work.
//!
//! Every call runs its storage operation on its own worker task and waits for
//! the first of three events: the caller's cancellation (or deadline), the
//! worker reporting a failure, or the worker reporting success.
//!
//! The worker reports through a [`oneshot`] channel created for that call
//! alone. The slot is buffered, so the worker never blocks delivering its
//! outcome, and once the caller has resolved the receiver is gone: a late
//! result is dropped on the floor and cannot reach any other call.
//!
//! Workers are not preempted. A worker whose caller was cancelled keeps
//! running until its storage call returns, and any write it performed stays
//! committed even though the caller saw a cancellation error.
//!
//! ## Submodules
//!
//! - [`context`] - Per-call cancellation scope ([`CallContext`]).

pub mod context;

pub use context::CallContext;

use blog_core::{Error, Result};
use core::time::Duration;
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;

/// Runs storage operations on worker tasks and races them against the
/// caller's cancellation.
#[derive(Clone)]
pub struct RequestBridge {
    shutdown: CancellationToken,
    refusing: Arc<AtomicBool>,
    default_timeout: Option<Duration>,
}

impl RequestBridge {
    pub fn new(shutdown: CancellationToken, default_timeout: Option<Duration>) -> Self {
        Self {
            shutdown,
            refusing: Arc::new(AtomicBool::new(false)),
            default_timeout,
        }
    }

    /// Opens the cancellation scope for a new call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once the service stopped accepting
    /// calls.
    pub fn open(&self, metadata: &MetadataMap) -> Result<CallContext> {
        if self.is_refusing() {
            return Err(Error::ServiceShutdown);
        }
        Ok(CallContext::for_metadata(
            metadata,
            &self.shutdown,
            self.default_timeout,
        ))
    }

    /// Stops accepting new calls. Calls already running are unaffected.
    pub fn refuse_new_calls(&self) {
        self.refusing.store(true, Ordering::Release);
    }

    pub fn is_refusing(&self) -> bool {
        self.refusing.load(Ordering::Acquire) || self.shutdown.is_cancelled()
    }

    /// Cancels every call still in flight.
    pub fn cancel_all(&self) {
        self.refuse_new_calls();
        self.shutdown.cancel();
    }

    /// Runs `op` on a fresh worker and resolves with whichever comes first:
    /// the worker's outcome or the cancellation of `ctx`.
    ///
    /// # Errors
    ///
    /// - the error returned by `op`;
    /// - [`Error::RequestCancelled`], [`Error::DeadlineExceeded`] or
    ///   [`Error::ServiceShutdown`] when `ctx` is cancelled first;
    /// - [`Error::WorkerLost`] if the worker panicked.
    pub async fn run<T, F>(&self, ctx: &CallContext, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
    {
        let outcome = spawn_worker(ctx.token().clone(), op);
        resolve(ctx, outcome).await
    }
}

/// Spawns `op` on the blocking pool and returns the receiving end of its
/// private outcome channel.
pub(crate) fn spawn_worker<T, F>(token: CancellationToken, op: F) -> oneshot::Receiver<Result<T>>
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let outcome = op(&token);
        if tx.send(outcome).is_err() {
            tracing::debug!("Caller already resolved, discarding worker outcome");
        }
    });
    rx
}

/// Waits for the worker's outcome or the call's cancellation.
///
/// An outcome that is already available wins over a cancellation observed at
/// the same instant.
pub(crate) async fn resolve<T>(ctx: &CallContext, outcome: oneshot::Receiver<Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        outcome = outcome => outcome.unwrap_or_else(|_| {
            tracing::error!("Worker exited without reporting an outcome");
            Err(Error::WorkerLost)
        }),
        err = ctx.cancelled() => {
            tracing::debug!("Call abandoned before the worker finished: {err}");
            Err(err)
        }
    }
}
