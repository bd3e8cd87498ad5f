//! Batch pacing for throttled bulk copies.
//!
//! Mirrors how Elasticsearch applies `requests_per_second` to `_reindex`:
//! each scroll batch is written at full speed, then the worker waits long
//! enough that the batch as a whole took `batch_len / rate` seconds.

use std::time::{Duration, Instant};

/// Documents fetched per enumeration batch (the `_reindex` default scroll size).
pub const SCROLL_BATCH_SIZE: usize = 1000;

pub struct Throttle {
    rate: Option<f64>,
    batch_started: Instant,
}

impl Throttle {
    /// `rate` in docs/sec. `None`, a non-positive or a non-finite rate
    /// disables pacing.
    pub fn new(rate: Option<f64>) -> Self {
        Self {
            rate: rate.filter(|r| r.is_finite() && *r > 0.0),
            batch_started: Instant::now(),
        }
    }

    /// Wait needed after writing `batch_len` docs in `elapsed` time.
    pub fn delay_for(&self, batch_len: usize, elapsed: Duration) -> Duration {
        match self.rate {
            Some(rate) => {
                // Rates too small for a `Duration` saturate instead of panicking.
                let target = Duration::try_from_secs_f64(batch_len as f64 / rate)
                    .unwrap_or(Duration::MAX);
                target.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    /// Sleep out the remainder of the current batch's time slot, then start the next one.
    pub async fn pace(&mut self, batch_len: usize) {
        let wait = self.delay_for(batch_len, self.batch_started.elapsed());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.batch_started = Instant::now();
    }
}
