//! Per-call cancellation scope.
//!
//! A [`CallContext`] is created when a call is dispatched and lives exactly as
//! long as the dispatch future. It combines three cancellation sources:
//!
//! - the caller's deadline, taken from the `grpc-timeout` request header or the
//!   server's default timeout;
//! - the dispatch future being dropped (the client hung up), via a drop guard;
//! - service shutdown, through the parent token.

use blog_core::Error;
use core::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::metadata::MetadataMap;

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Cancellation scope of a single call.
pub struct CallContext {
    token: CancellationToken,
    shutdown: CancellationToken,
    deadline: Option<Instant>,
    _guard: DropGuard,
}

impl CallContext {
    /// Creates a scope whose token is a child of `shutdown`.
    pub fn new(shutdown: &CancellationToken, timeout: Option<Duration>) -> Self {
        let token = shutdown.child_token();
        let guard = token.clone().drop_guard();
        Self {
            token,
            shutdown: shutdown.clone(),
            deadline: timeout.map(|t| Instant::now() + t),
            _guard: guard,
        }
    }

    /// Creates a scope for a call, honouring the caller's `grpc-timeout`
    /// header and falling back to `default_timeout`.
    pub fn for_metadata(
        metadata: &MetadataMap,
        shutdown: &CancellationToken,
        default_timeout: Option<Duration>,
    ) -> Self {
        let timeout = match grpc_timeout(metadata) {
            Some(requested) => Some(default_timeout.map_or(requested, |d| d.min(requested))),
            None => default_timeout,
        };
        Self::new(shutdown, timeout)
    }

    /// Token handed to the worker so it can stop cooperatively.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once the call must be abandoned, yielding the reason.
    ///
    /// A missed deadline also cancels the token so the worker observes it.
    pub async fn cancelled(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => self.cancel_reason(),
                    () = tokio::time::sleep_until(deadline) => {
                        self.token.cancel();
                        Error::DeadlineExceeded
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                self.cancel_reason()
            }
        }
    }

    fn cancel_reason(&self) -> Error {
        if self.shutdown.is_cancelled() {
            Error::ServiceShutdown
        } else {
            Error::RequestCancelled
        }
    }
}

/// Parses the `grpc-timeout` header: up to eight ASCII digits followed by a
/// unit (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn grpc_timeout(metadata: &MetadataMap) -> Option<Duration> {
    let raw = metadata.get(GRPC_TIMEOUT_HEADER)?.to_str().ok()?;
    parse_grpc_timeout(raw)
}

fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    if raw.len() < 2 || raw.len() > 9 || !raw.is_ascii() {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let value: u64 = digits.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(value.checked_mul(3600)?),
        "M" => Duration::from_secs(value.checked_mul(60)?),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("7u"), Some(Duration::from_micros(7)));
        assert_eq!(parse_grpc_timeout("9n"), Some(Duration::from_nanos(9)));
    }

    #[test]
    fn rejects_malformed_grpc_timeout() {
        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
        assert_eq!(parse_grpc_timeout("-1S"), None);
    }

    #[test]
    fn header_takes_precedence_when_shorter() {
        let shutdown = CancellationToken::new();
        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, "100m".parse().unwrap());

        let before = Instant::now();
        let ctx = CallContext::for_metadata(&metadata, &shutdown, Some(Duration::from_secs(30)));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_millis(100));
        assert!(deadline >= before + Duration::from_millis(100));

        let ctx = CallContext::for_metadata(&MetadataMap::new(), &shutdown, None);
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_token() {
        let shutdown = CancellationToken::new();
        let ctx = CallContext::new(&shutdown, Some(Duration::from_millis(50)));

        assert_eq!(ctx.cancelled().await, Error::DeadlineExceeded);
        assert!(ctx.token().is_cancelled());
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_is_reported_as_such() {
        let shutdown = CancellationToken::new();
        let ctx = CallContext::new(&shutdown, None);
        shutdown.cancel();
        assert_eq!(ctx.cancelled().await, Error::ServiceShutdown);
    }

    #[tokio::test]
    async fn dropping_context_cancels_worker_token() {
        let shutdown = CancellationToken::new();
        let ctx = CallContext::new(&shutdown, None);
        let worker_token = ctx.token().clone();

        drop(ctx);
        assert!(worker_token.is_cancelled());
        assert!(!shutdown.is_cancelled());
    }
}
