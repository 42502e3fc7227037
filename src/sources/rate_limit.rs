//! Per-source token bucket sized from the source's declared rate budget.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::RateSpec;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Classic token bucket: capacity `max_requests`, refilled continuously at
/// `max_requests / per_seconds` tokens per second.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(spec: RateSpec) -> Self {
        let capacity = spec.max_requests.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / spec.per_seconds.max(1) as f64,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
    }

    /// Take one token, waiting cooperatively for a refill when the bucket is
    /// empty. Callers bound the total wait with their own deadline.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Seconds until a token would be available. Zero when one is ready.
    pub async fn wait_hint_secs(&self) -> u64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            0
        } else {
            (((1.0 - state.tokens) / self.refill_per_sec).ceil()) as u64
        }
    }

    /// Drain the bucket and push the next token out by `secs`. Applied when
    /// the upstream answers 429, so the declared budget and the observed one
    /// converge.
    pub async fn penalize(&self, secs: u64) {
        let mut state = self.state.lock().await;
        state.tokens = 0.0;
        // last_refill in the future: elapsed() saturates at zero until the
        // penalty lapses, so no tokens accrue before then.
        state.last_refill = Instant::now() + Duration::from_secs(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_requests_pass_immediately() {
        let bucket = TokenBucket::new(RateSpec::new(3, 60));
        let start = Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(bucket.wait_hint_secs().await > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_waits_for_refill() {
        let bucket = TokenBucket::new(RateSpec::new(1, 1));
        bucket.acquire().await;
        // Second acquire needs ~1s of refill; with paused time, tokio
        // auto-advances the clock past the sleep.
        bucket.acquire().await;
    }
}
