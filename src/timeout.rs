//! # Timeout Racing
//!
//! Every bounded wait in the crate goes through [`race`]: the operation and a timer
//! are polled together and whichever settles first wins. Losing to the timer yields a
//! [`TimeoutError`], a distinct type so callers can tell "absent" apart from "failed"
//! without inspecting messages.

use std::{future::Future, time::Duration};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Timed out after {}ms: {context}", .after.as_millis())]
pub struct TimeoutError {
    pub context: String,
    pub after: Duration,
}

/// Polls `operation` against a timer of length `after`.
pub async fn race<F>(operation: F, after: Duration, context: &str) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    let sleep = tokio::time::sleep(after);
    tokio::pin!(sleep);
    tokio::pin!(operation);

    tokio::select! {
        biased;
        output = &mut operation => Ok(output),
        _ = &mut sleep => Err(TimeoutError {
            context: context.to_string(),
            after,
        }),
    }
}

/// Resolves to `value` once `after` has elapsed.
pub async fn delay<T>(value: T, after: Duration) -> T {
    tokio::time::sleep(after).await;
    value
}
