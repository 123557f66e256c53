//! Timeout enforcement.
//!
//! Every upstream call runs under a deadline. A call that misses it is
//! reported as `UpstreamFailure::Timeout`, which the gateway maps to 504.

use std::future::Future;
use std::time::Duration;

use crate::upstream::UpstreamFailure;

/// Run an upstream call, failing it if it outlives `limit`.
pub async fn with_deadline<F, T>(limit: Duration, call: F) -> Result<T, UpstreamFailure>
where
    F: Future<Output = Result<T, UpstreamFailure>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamFailure::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let result: Result<(), _> = with_deadline(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(UpstreamFailure::Timeout(d)) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok::<_, UpstreamFailure>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
