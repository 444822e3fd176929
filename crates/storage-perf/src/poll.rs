//! Polling until a resource reaches a state

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::Error;

/// Poll until a condition is met or the timeout is reached
///
/// `check_fn` returns `Ok(true)` when the condition holds and `Ok(false)` to
/// keep polling. Errors from `check_fn` are logged and retried; if the
/// condition never holds the result is `Error::StateTimeout`.
///
/// # Arguments
/// * `resource` - Namespaced name of the resource, used in the timeout error
/// * `expected` - Human-readable target state, used in the timeout error
/// * `timeout` - Maximum time to wait for the condition
/// * `poll_interval` - Time between polling attempts
///
/// # Returns
/// `Ok(())` once the condition holds, `Error::StateTimeout` otherwise
pub async fn poll_until<F, Fut>(
    resource: &str,
    expected: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut check_fn: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = Instant::now();

    loop {
        match check_fn().await {
            Ok(true) => return Ok(()),
            Ok(false) => trace!(resource, expected, "condition not yet met"),
            Err(e) => trace!(resource, expected, error = %e, "check failed, retrying"),
        }
        if start.elapsed() >= timeout {
            return Err(Error::state_timeout(resource, expected, timeout));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
