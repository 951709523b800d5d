// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use spray_task::ShutdownToken;
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket that hands out send slots at a sustained `rate` per second,
/// allowing up to `burst` back-to-back slots after an idle period.
///
/// Reservations never fail. If no token is available the bucket goes into debt
/// and the caller is told how long to wait for its slot.
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(rate: f64, burst: u32) -> Self {
        Self::new_at(rate, burst, Instant::now())
    }

    pub(crate) fn new_at(rate: f64, burst: u32, now: Instant) -> Self {
        debug_assert!(rate > 0.0);
        let burst = f64::from(burst.max(1));
        TokenBucket {
            rate,
            burst,
            tokens: burst,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
            self.last_refill = now;
        }
    }

    /// Reserve a single slot and return how long the caller has to wait before using it.
    pub(crate) fn reserve_at(&mut self, now: Instant) -> Duration {
        if self.rate.is_infinite() {
            return Duration::ZERO;
        }

        self.refill(now);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            return Duration::ZERO;
        }

        Duration::try_from_secs_f64(-self.tokens / self.rate).unwrap_or(Duration::MAX)
    }

    /// Wait for the next slot. Returns `false` if the token got cancelled in the meantime.
    pub(crate) async fn acquire(&mut self, shutdown: &ShutdownToken) -> bool {
        let wait = self.reserve_at(Instant::now());
        if wait.is_zero() {
            return !shutdown.is_cancelled();
        }
        shutdown
            .run_until_cancelled(tokio::time::sleep(wait))
            .await
            .is_some()
    }
}
