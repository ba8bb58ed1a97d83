//! Settle-all merging of concurrent operations.

use std::{fmt, future::Future};

use futures::future::join_all;

/// Every failure collected from one merged batch, in input order.
#[derive(Debug)]
pub struct AggregateError<E> {
    pub errors: Vec<E>,
}

impl<E> AggregateError<E> {
    pub fn new(errors: Vec<E>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} operation(s) failed", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, error)?;
        }
        Ok(())
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AggregateError<E> {}

/// Drives all operations concurrently and waits for every one of them to settle.
///
/// Never short-circuits: a failure in one operation does not stop its siblings, and
/// the returned error carries all failures.
pub async fn merge_all<I, F, T, E>(operations: I) -> Result<Vec<T>, AggregateError<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let settled = join_all(operations).await;

    let mut values = Vec::with_capacity(settled.len());
    let mut errors = Vec::new();
    for outcome in settled {
        match outcome {
            Ok(value) => values.push(value),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(AggregateError::new(errors))
    }
}
