//! Timeout defaults and async timeout wrappers.

use std::future::Future;
use std::time::Duration;

use crate::error::ProtocolError;

/// A connection that delivers nothing for this long is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Ping period announced to MRIM clients in HELLO_ACK.
pub const PING_PERIOD: Duration = Duration::from_secs(30);

/// How long shutdown waits for open connections to finish.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Window after which an exhausted search quota is refilled.
pub const SEARCH_REFILL_WINDOW: Duration = Duration::from_secs(60);

/// Longest a session waits on a single user-store call.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut`, failing with [`ProtocolError::Timeout`] (converted into the future's own error
/// type) if it does not finish in `duration`.
pub async fn with_timeout_error<F, T, E>(fut: F, duration: Duration) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: From<ProtocolError>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapses() {
        let result: Result<()> = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let result: Result<u32> = with_timeout_error(async { Ok(7u32) }, Duration::from_secs(1)).await;
        assert_eq!(result.ok(), Some(7));
    }
}
