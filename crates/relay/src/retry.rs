//! Deadlines and bounded backoff for single RPC round-trips.
//!
//! The driver retries whole polls forever at the poll cadence; this module
//! only smooths over short hiccups inside one poll.

use std::{future::Future, time::Duration};

use alloy::{
    rpc::json_rpc::RpcError,
    transports::{TransportError, TransportErrorKind},
};
use rand::Rng;
use tracing::debug;

use crate::error::RpcTimeout;

const INITIAL_DELAY_MS: u64 = 100;
const MAX_DELAY_MS: u64 = 5_000;
const MAX_RETRIES: u32 = 3;

/// Whether retrying the same request may succeed.
///
/// Only deadlines and alloy transport failures are considered. Errors the node
/// answered with are transient only when they are rate limits.
pub fn is_transient_error(err: &eyre::Report) -> bool {
    if err.downcast_ref::<RpcTimeout>().is_some() {
        return true;
    }
    err.downcast_ref::<TransportError>()
        .is_some_and(is_transient_transport_error)
}

fn is_transient_transport_error(err: &TransportError) -> bool {
    match err {
        RpcError::Transport(TransportErrorKind::HttpError(http)) => {
            matches!(http.status, 429 | 502 | 503 | 504)
        }
        // The HTTP client reports connect and read failures as custom errors.
        RpcError::Transport(TransportErrorKind::Custom(_)) => true,
        RpcError::Transport(kind) => kind.is_retry_err(),
        RpcError::ErrorResp(payload) => payload.is_retry_err(),
        _ => false,
    }
}

fn backoff(retry: u32) -> Duration {
    let base = INITIAL_DELAY_MS
        .checked_shl(retry)
        .map_or(MAX_DELAY_MS, |delay| delay.min(MAX_DELAY_MS));
    let jitter = rand::thread_rng().gen_range(0..=base / 4);
    Duration::from_millis(base + jitter)
}

/// Run `call`, retrying transient failures up to three times with backoff.
pub async fn with_retry<F, Fut, T>(operation: &str, mut call: F) -> eyre::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = eyre::Result<T>>,
{
    let mut retries = 0;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if retries == MAX_RETRIES || !is_transient_error(&err) {
            debug!(operation, retries, error = %err, "RPC call failed");
            return Err(err);
        }

        let delay = backoff(retries);
        retries += 1;
        debug!(operation, retry = retries, ?delay, error = %err, "Retrying RPC call");
        tokio::time::sleep(delay).await;
    }
}

/// Fail `call` with [`RpcTimeout`] if it does not finish within `timeout`.
pub async fn with_timeout<Fut, T>(
    operation: &'static str,
    timeout: Duration,
    call: Fut,
) -> eyre::Result<T>
where
    Fut: Future<Output = eyre::Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(RpcTimeout { operation, timeout }.into()))
}

/// [`with_retry`] where every attempt is bounded by `timeout`.
pub async fn rpc_call<F, Fut, T>(
    operation: &'static str,
    timeout: Duration,
    mut call: F,
) -> eyre::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = eyre::Result<T>>,
{
    with_retry(operation, || with_timeout(operation, timeout, call())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{rpc::json_rpc::ErrorPayload, transports::HttpError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn error_response(code: i64, message: &'static str) -> eyre::Report {
        TransportError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        })
        .into()
    }

    fn http_status(status: u16) -> eyre::Report {
        TransportError::Transport(TransportErrorKind::HttpError(HttpError {
            status,
            body: String::new(),
        }))
        .into()
    }

    #[test]
    fn test_transport_failures_are_transient() {
        assert!(is_transient_error(&http_status(503)));
        assert!(is_transient_error(&http_status(429)));
        assert!(is_transient_error(&TransportErrorKind::backend_gone().into()));
        assert!(is_transient_error(&TransportErrorKind::custom_str("connection refused").into()));
        assert!(is_transient_error(
            &RpcTimeout {
                operation: "get_logs",
                timeout: Duration::from_secs(1),
            }
            .into()
        ));
    }

    #[test]
    fn test_rate_limit_response_is_transient() {
        assert!(is_transient_error(&error_response(429, "Too Many Requests")));
        assert!(is_transient_error(&error_response(-32005, "limit exceeded")));
    }

    #[test]
    fn test_rejections_are_not_transient() {
        assert!(!is_transient_error(&http_status(400)));
        assert!(!is_transient_error(&error_response(-32000, "execution reverted")));
        assert!(!is_transient_error(&error_response(
            -32602,
            "block range 0x1503..0x2503 exceeds the 429 block limit"
        )));
        // Untyped errors are never retried, whatever their text says.
        assert!(!is_transient_error(&eyre::eyre!("query returned 503 results, connection ok")));
    }

    #[test]
    fn test_delay_is_capped() {
        for retry in 0..70 {
            let delay = backoff(retry);
            assert!(delay >= Duration::from_millis(INITIAL_DELAY_MS));
            assert!(delay <= Duration::from_millis(MAX_DELAY_MS + MAX_DELAY_MS / 4));
        }
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: eyre::Result<()> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(error_response(-32000, "execution reverted"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_recovers() {
        let calls = AtomicUsize::new(0);
        let result = with_retry("test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportErrorKind::backend_gone().into())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicUsize::new(0);
        let result: eyre::Result<()> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(http_status(502))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn test_stalled_call_times_out() {
        let err = with_timeout("get_logs", Duration::from_millis(10), async {
            std::future::pending::<eyre::Result<()>>().await
        })
        .await
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<RpcTimeout>(),
            Some(&RpcTimeout {
                operation: "get_logs",
                timeout: Duration::from_millis(10),
            })
        );
    }

    #[tokio::test]
    async fn test_each_attempt_gets_its_own_deadline() {
        let calls = AtomicUsize::new(0);
        let result = rpc_call("get_block_number", Duration::from_millis(20), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    std::future::pending::<()>().await;
                }
                Ok(call)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
