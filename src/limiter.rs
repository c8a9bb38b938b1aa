//! Token-bucket rate limiter for dispatch attempts.
//!
//! Tokens refill continuously at a fixed rate up to a burst capacity;
//! [`TokenBucket::acquire`] suspends the calling task until a token is
//! available. Over any window of length T this bounds attempts to
//! `rate · T + burst`, regardless of arrival pattern.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct TokenBucket {
    /// Tokens added per second.
    rate: f64,
    /// Maximum tokens the bucket can hold.
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    pub fn new(rate_per_sec: f64, burst_capacity: u32) -> Self {
        let capacity = f64::from(burst_capacity);
        Self {
            rate: rate_per_sec,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, suspending until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("token bucket lock poisoned");
                refill(&mut state, self.rate, self.capacity);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Time until the deficit is refilled.
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take one token only if immediately available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("token bucket lock poisoned");
        refill(&mut state, self.rate, self.capacity);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

fn refill(state: &mut BucketState, rate: f64, capacity: f64) {
    let now = Instant::now();
    let elapsed = now.duration_since(state.last_refill);
    state.tokens = (state.tokens + elapsed.as_secs_f64() * rate).min(capacity);
    state.last_refill = now;
}
