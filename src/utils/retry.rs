// Retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Outcome of one failed attempt
#[derive(Debug)]
pub enum Attempt<E> {
    /// Transient failure (rate limit, 5xx, connection reset)
    Retry(E),
    /// Permanent failure, returned immediately
    Abort(E),
}

/// Run `operation` until it succeeds, aborts, or `max_retries` retries are spent.
///
/// The delay doubles after every retry starting at `base_delay`, capped at 32x.
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(Attempt::Abort(error)) => return Err(error),
            Err(Attempt::Retry(error)) => {
                if attempt >= max_retries {
                    return Err(error);
                }
                let delay = base_delay * 2u32.pow(attempt.min(5));
                warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %error, "Retrying");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
