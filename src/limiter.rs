use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};

/// Enforces a minimum interval between outbound geocoding calls. The first
/// call of a run passes immediately; every later call waits out the remainder
/// of the interval since the previous one. Skipped records never tick the
/// limiter, so they consume no delay.
pub struct RateLimiter {
    interval: Duration,
    last_call: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: AsyncMutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut guard = self.last_call.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}
