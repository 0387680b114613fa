//! Token-bucket throughput limiter

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::errors::AgentError;

/// Limits throughput to `kbps * 1024` bytes per second with a burst of one
/// second's worth. One token is one byte.
pub struct Throttle {
    limiter: DefaultDirectRateLimiter,
    burst: NonZeroU32,
}

impl Throttle {
    pub fn new(kbps: u32) -> Result<Self, AgentError> {
        let bytes_per_sec = kbps
            .checked_mul(1024)
            .and_then(NonZeroU32::new)
            .ok_or_else(|| {
                AgentError::DownloadError(format!("invalid bandwidth limit: {}", kbps))
            })?;

        let quota = Quota::per_second(bytes_per_sec).allow_burst(bytes_per_sec);
        Ok(Self {
            limiter: RateLimiter::direct(quota),
            burst: bytes_per_sec,
        })
    }

    /// Wait until `n` bytes worth of tokens are available.
    ///
    /// Requests larger than the burst are split so they never exceed the
    /// bucket capacity.
    pub async fn consume(&self, n: usize) -> Result<(), AgentError> {
        let mut remaining = n;
        while remaining > 0 {
            let step = remaining.min(self.burst.get() as usize);
            // step is in 1..=burst
            let cells = NonZeroU32::new(step as u32)
                .ok_or_else(|| AgentError::Internal("empty throttle request".to_string()))?;
            self.limiter
                .until_n_ready(cells)
                .await
                .map_err(|e| AgentError::DownloadError(format!("rate limiter: {}", e)))?;
            remaining -= step;
        }
        Ok(())
    }
}
