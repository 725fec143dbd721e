//! Injectable delay so scans can run against a fake clock in tests.

use async_trait::async_trait;
use std::time::Duration;

/// Cooperative suspension used for rate control and drain waits.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delay backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_delay_advances_paused_clock() {
        let start = tokio::time::Instant::now();
        TokioDelay.sleep(Duration::from_millis(600)).await;
        assert!(start.elapsed() >= Duration::from_millis(600));
    }
}
