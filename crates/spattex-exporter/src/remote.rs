use std::future::Future;
use std::time::Duration;

use spattex_store::StoreError;
use tokio_util::sync::CancellationToken;

/// Why a bounded remote call did not produce a value.
#[derive(Debug)]
pub(crate) enum CallError {
    Store(StoreError),
    Cancelled,
}

/// Runs one store call, bounded by `timeout` and aborted by `cancel`.
///
/// An elapsed timeout surfaces as [`StoreError::Timeout`].
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, CallError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CallError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(outcome) => outcome.map_err(CallError::Store),
            Err(_) => Err(CallError::Store(StoreError::Timeout)),
        },
    }
}

/// Sleeps for `delay` unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn settle(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
