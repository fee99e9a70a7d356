//! Fixed-cycle resource buckets for request-rate and token-rate limits.
//!
//! A bucket starts full and its clock starts on first use. Refills happen on
//! equidistant boundaries: when one or more whole cycles have elapsed, the
//! anchor advances by exactly that many cycles and the bucket is topped up.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::DispatchError;

/// Shortest accepted refill cycle.
pub const MIN_CYCLE: Duration = Duration::from_secs(1);

/// One refillable counter with its own cycle anchor.
#[derive(Debug, Clone)]
pub struct TimedResourceBucket {
    capacity: u32,
    remaining: u32,
    cycle: Duration,
    anchor: Option<Instant>,
}

impl TimedResourceBucket {
    /// Create a full bucket whose clock has not started.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] when `capacity` is zero or
    /// `cycle` is shorter than [`MIN_CYCLE`].
    pub fn new(capacity: u32, cycle: Duration) -> Result<Self, DispatchError> {
        if capacity == 0 {
            return Err(DispatchError::InvalidConfig(
                "bucket capacity must be greater than 0".into(),
            ));
        }
        if cycle < MIN_CYCLE {
            return Err(DispatchError::InvalidConfig(format!(
                "bucket cycle must be at least {MIN_CYCLE:?}, got {cycle:?}"
            )));
        }
        Ok(Self {
            capacity,
            remaining: capacity,
            cycle,
            anchor: None,
        })
    }

    /// Anchor the cycle at `now` unless already started. Returns true when
    /// this call started the clock.
    pub fn start_clock(&mut self, now: Instant) -> bool {
        if self.anchor.is_some() {
            return false;
        }
        self.anchor = Some(now);
        true
    }

    /// Whether the cycle clock is running.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.anchor.is_some()
    }

    /// Start of the current cycle.
    #[must_use]
    pub const fn anchor(&self) -> Option<Instant> {
        self.anchor
    }

    /// Time since the anchor, zero before the clock starts.
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.anchor
            .map_or(Duration::ZERO, |anchor| now.saturating_duration_since(anchor))
    }

    /// Refill if at least one whole cycle has passed. Returns true on refill.
    ///
    /// The anchor moves by `floor(elapsed / cycle) * cycle`, never to `now`.
    pub fn refill_if_due(&mut self, now: Instant) -> bool {
        let Some(anchor) = self.anchor else {
            return false;
        };
        let elapsed = now.saturating_duration_since(anchor);
        if elapsed < self.cycle {
            return false;
        }
        let partial = elapsed.as_nanos() % self.cycle.as_nanos();
        let partial = Duration::from_nanos(u64::try_from(partial).unwrap_or(u64::MAX));
        self.anchor = Some(anchor + elapsed.saturating_sub(partial));
        self.remaining = self.capacity;
        true
    }

    /// Time left in the current cycle. Zero once a refill is due but not yet
    /// applied; the full cycle before the clock starts.
    #[must_use]
    pub fn time_until_next_refill(&self, now: Instant) -> Duration {
        if self.anchor.is_none() {
            return self.cycle;
        }
        self.cycle.saturating_sub(self.elapsed(now))
    }

    /// Whether `cost` units are available.
    #[must_use]
    pub const fn can_admit(&self, cost: u32) -> bool {
        self.remaining >= cost
    }

    /// Take `cost` units, clamping at zero.
    pub const fn consume(&mut self, cost: u32) {
        self.remaining = self.remaining.saturating_sub(cost);
    }

    /// Units left in this cycle.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Units spent in this cycle.
    #[must_use]
    pub const fn consumed(&self) -> u32 {
        self.capacity - self.remaining
    }

    /// Units restored on every refill.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Refill period.
    #[must_use]
    pub const fn cycle(&self) -> Duration {
        self.cycle
    }
}

/// Which pool(s) lack quota for the next dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPools {
    /// Only the request-count pool.
    Requests,
    /// Only the token-cost pool.
    Tokens,
    /// Both pools.
    Both,
}

/// How long to suspend before re-checking admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPlan {
    /// Pools that blocked admission.
    pub pools: ExhaustedPools,
    /// Remaining cycle time of the blocking pool(s), plus the safety margin.
    pub delay: Duration,
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Both pools can pay for the dispatch now.
    Admit,
    /// Quota is short; wait before retrying.
    Wait(WaitPlan),
}

/// Serializable view of both pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    /// Requests left in the current cycle.
    pub requests_left: u32,
    /// Request capacity per cycle.
    pub request_capacity: u32,
    /// Tokens left in the current cycle.
    pub tokens_left: u32,
    /// Token capacity per cycle.
    pub token_capacity: u32,
}

/// Request-count and token-cost buckets gating a single dispatcher.
#[derive(Debug, Clone)]
pub struct DualResourceBucket {
    requests: TimedResourceBucket,
    tokens: TimedResourceBucket,
}

impl DualResourceBucket {
    /// Build both pools.
    ///
    /// # Errors
    ///
    /// Propagates [`TimedResourceBucket::new`] validation failures.
    pub fn new(
        request_capacity: u32,
        request_cycle: Duration,
        token_capacity: u32,
        token_cycle: Duration,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            requests: TimedResourceBucket::new(request_capacity, request_cycle)?,
            tokens: TimedResourceBucket::new(token_capacity, token_cycle)?,
        })
    }

    /// Start both clocks; later calls have no effect.
    pub fn start_clock(&mut self, now: Instant) {
        if self.requests.start_clock(now) | self.tokens.start_clock(now) {
            tracing::debug!("bucket clocks started");
        }
    }

    /// Refill whichever pools are due. Returns `(requests, tokens)` flags.
    pub fn refill_if_due(&mut self, now: Instant) -> (bool, bool) {
        let refilled = (self.requests.refill_if_due(now), self.tokens.refill_if_due(now));
        if refilled.0 {
            tracing::debug!(requests_left = self.requests.remaining(), "request bucket refilled");
        }
        if refilled.1 {
            tracing::debug!(tokens_left = self.tokens.remaining(), "token bucket refilled");
        }
        refilled
    }

    /// Whether both pools can pay `request_cost` and `token_cost`.
    #[must_use]
    pub const fn can_admit(&self, request_cost: u32, token_cost: u32) -> bool {
        self.requests.can_admit(request_cost) && self.tokens.can_admit(token_cost)
    }

    /// Charge both pools, clamping each at zero.
    pub const fn consume(&mut self, request_cost: u32, token_cost: u32) {
        self.requests.consume(request_cost);
        self.tokens.consume(token_cost);
    }

    /// Decide whether to dispatch now or how long to wait.
    ///
    /// When both pools are short the delay covers the later of the two
    /// refills. Call [`DualResourceBucket::refill_if_due`] first.
    #[must_use]
    pub fn admission(
        &self,
        request_cost: u32,
        token_cost: u32,
        now: Instant,
        margin: Duration,
    ) -> Admission {
        let requests_short = !self.requests.can_admit(request_cost);
        let tokens_short = !self.tokens.can_admit(token_cost);
        let (pools, until) = match (requests_short, tokens_short) {
            (false, false) => return Admission::Admit,
            (true, false) => (
                ExhaustedPools::Requests,
                self.requests.time_until_next_refill(now),
            ),
            (false, true) => (
                ExhaustedPools::Tokens,
                self.tokens.time_until_next_refill(now),
            ),
            (true, true) => (
                ExhaustedPools::Both,
                self.requests
                    .time_until_next_refill(now)
                    .max(self.tokens.time_until_next_refill(now)),
            ),
        };
        Admission::Wait(WaitPlan {
            pools,
            delay: until + margin,
        })
    }

    /// Request-count pool.
    #[must_use]
    pub const fn requests(&self) -> &TimedResourceBucket {
        &self.requests
    }

    /// Token-cost pool.
    #[must_use]
    pub const fn tokens(&self) -> &TimedResourceBucket {
        &self.tokens
    }

    /// Remaining and capacity of both pools.
    #[must_use]
    pub const fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            requests_left: self.requests.remaining(),
            request_capacity: self.requests.capacity(),
            tokens_left: self.tokens.remaining(),
            token_capacity: self.tokens.capacity(),
        }
    }
}
