//! Per-client token-bucket rate limiting on top of `governor`.
//!
//! Each client key owns a bucket holding up to `burst` tokens that refills
//! at `requests_per_minute` tokens per minute. A request spends one token;
//! with none left it is rejected. Keys live in governor's dashmap-backed
//! keyed store, which makes check-and-spend atomic per key.
//!
//! Once the table reaches `max_clients` keys, buckets that have refilled to
//! capacity are dropped. A dropped key comes back as a fresh, full bucket,
//! which is exactly the state it was dropped in.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::Quota;

use crate::config::RateLimitConfig;

type KeyedLimiter<C> =
    governor::RateLimiter<String, DefaultKeyedStateStore<String>, C, StateInformationMiddleware>;

/// Outcome of one [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Sustained allowance in requests per minute.
    pub limit: u32,
    /// Whole tokens left after this request.
    pub remaining: u32,
    /// One replenish interval after an admitted request; on rejection, the
    /// exact wait before a retry can pass.
    pub reset_after: Duration,
}

pub struct RateLimiter<C: Clock = DefaultClock> {
    limit: u32,
    replenish: Duration,
    max_clients: usize,
    // table size that triggers the next prune
    prune_at: AtomicUsize,
    inner: KeyedLimiter<C>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Self {
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        let max_clients = config.max_clients.max(1);

        Self {
            limit: config.requests_per_minute,
            replenish: quota.replenish_interval(),
            max_clients,
            prune_at: AtomicUsize::new(max_clients),
            inner: governor::RateLimiter::dashmap_with_clock(quota, clock)
                .with_middleware::<StateInformationMiddleware>(),
        }
    }

    /// Spends one token from `key`'s bucket if it has one.
    pub fn check(&self, key: &str) -> RateDecision {
        self.prune_if_crowded();

        match self.inner.check_key(&key.to_owned()) {
            Ok(snapshot) => RateDecision {
                allowed: true,
                limit: self.limit,
                remaining: snapshot.remaining_burst_capacity(),
                reset_after: self.replenish,
            },
            Err(not_until) => RateDecision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                reset_after: not_until.wait_time_from(self.inner.clock().now()),
            },
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    fn clock(&self) -> &C {
        self.inner.clock()
    }

    fn prune_if_crowded(&self) {
        if self.inner.len() < self.prune_at.load(Ordering::Relaxed) {
            return;
        }
        self.inner.retain_recent();
        self.inner.shrink_to_fit();

        // every survivor is still refilling; wait for the table to grow
        // before scanning it again
        let kept = self.inner.len();
        self.prune_at
            .store(self.max_clients.max(kept.saturating_mul(2)), Ordering::Relaxed);
    }
}
