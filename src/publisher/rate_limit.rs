// Copyright (c) 2026 Sentrybus
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! An optional token bucket applied before a direct send attempt.
//!
//! Per `spec.md` §9's resolution of an ambiguous source behavior: a
//! rate-limited envelope is never dropped, only denied a direct-send token.
//! The caller is expected to append it to the WAL instead, where the drain
//! loop picks it up later — this module only answers "may I send now", it
//! never owns the decision to drop.

use std::sync::Mutex;
use std::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single-bucket token-bucket rate limiter. `rate_per_sec == 0` means
/// unlimited (every call is always permitted).
pub struct RateLimiter {
    rate_per_sec: u32,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Build a limiter. Burst capacity equals one second's worth of tokens.
    pub fn new(rate_per_sec: u32) -> Self {
        Self {
            rate_per_sec,
            capacity: rate_per_sec.max(1) as f64,
            state: Mutex::new(BucketState { tokens: rate_per_sec as f64, last_refill: Instant::now() }),
        }
    }

    /// Attempt to consume one token. Returns `true` if a direct send is
    /// permitted right now.
    pub fn try_acquire(&self) -> bool {
        if self.rate_per_sec == 0 {
            return true;
        }
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec as f64).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_always_permits() {
        let limiter = RateLimiter::new(0);
        for _ in 0..1000 {
            assert!(limiter.try_acquire());
        }
    }

    #[test]
    fn bucket_exhausts_then_denies() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
