//! Network bring-up with a bounded wait.
//!
//! Association is the only startup step with a deadline. Missing it is a
//! startup fault: the caller shows the fault indicator and never starts the
//! control loop.

use core::future::Future;

use embassy_net::{Stack, StaticConfigV4};
use embassy_time::{with_timeout, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// The network interface could not be opened.
    Device,
    /// No address was assigned before the association timeout.
    AssociationTimeout,
}

/// Wait for `link` to complete, giving up after `timeout`.
pub async fn within<F: Future>(
    timeout: Duration,
    link: F,
) -> Result<F::Output, NetworkError> {
    with_timeout(timeout, link).await.map_err(|_| {
        tracing::error!(timeout_ms = timeout.as_millis(), "network association timed out");
        NetworkError::AssociationTimeout
    })
}

/// Wait until `stack` holds an IPv4 configuration.
pub async fn associate(
    stack: Stack<'_>,
    timeout: Duration,
) -> Result<StaticConfigV4, NetworkError> {
    within(timeout, stack.wait_config_up()).await?;
    let config = stack.config_v4().ok_or(NetworkError::AssociationTimeout)?;
    tracing::info!("network up at {}", config.address);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{
        pin::pin,
        task::{Context, Poll, Waker},
    };

    fn block_on<F: Future>(fut: F) -> F::Output {
        let mut fut = pin!(fut);
        let mut cx = Context::from_waker(Waker::noop());
        loop {
            if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
            std::thread::yield_now();
        }
    }

    #[test]
    fn link_that_never_comes_up_times_out() {
        let start = embassy_time::Instant::now();
        let result = block_on(within(Duration::from_millis(30), core::future::pending::<()>()));
        assert_eq!(result, Err(NetworkError::AssociationTimeout));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn link_already_up_passes_through() {
        let result = block_on(within(Duration::from_millis(30), core::future::ready(7u8)));
        assert_eq!(result, Ok(7));
    }
}
