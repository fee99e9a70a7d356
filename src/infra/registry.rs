//! Per-client bucket pairs for the receiving side of a rate limit.
//!
//! Each client key (typically a peer address) gets its own
//! [`DualResourceBucket`], created on first sight from a shared template.
//! Unlike the dispatcher, the registry never waits: an exhausted client is
//! rejected with the time left until its blocking pool refills.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::DispatcherConfig;
use crate::core::{Admission, BucketSnapshot, DispatchError, DualResourceBucket, REQUEST_COST};

/// Bucket registry keyed by client.
pub struct BucketRegistry {
    template: DualResourceBucket,
    buckets: Mutex<HashMap<String, DualResourceBucket>>,
}

impl BucketRegistry {
    /// Create an empty registry whose buckets follow `config`'s capacities
    /// and cycles.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] when validation fails.
    pub fn new(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        let template = DualResourceBucket::new(
            config.request_capacity,
            config.request_cycle(),
            config.token_capacity,
            config.token_cycle(),
        )?;
        Ok(Self {
            template,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// Charge one request and `tokens` tokens to `client`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QuotaExceeded`] when either pool is short;
    /// nothing is charged in that case.
    pub fn try_consume(&self, client: &str, tokens: u32) -> Result<BucketSnapshot, DispatchError> {
        self.try_consume_at(client, tokens, Instant::now())
    }

    /// [`BucketRegistry::try_consume`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// See [`BucketRegistry::try_consume`].
    pub fn try_consume_at(
        &self,
        client: &str,
        tokens: u32,
        now: Instant,
    ) -> Result<BucketSnapshot, DispatchError> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(client.to_owned())
            .or_insert_with(|| self.template.clone());
        bucket.start_clock(now);
        bucket.refill_if_due(now);
        match bucket.admission(REQUEST_COST, tokens, now, Duration::ZERO) {
            Admission::Admit => {
                bucket.consume(REQUEST_COST, tokens);
                tracing::debug!(client, tokens, "client quota charged");
                Ok(bucket.snapshot())
            }
            Admission::Wait(plan) => {
                tracing::debug!(client, tokens, pools = ?plan.pools, "client quota exceeded");
                Err(DispatchError::QuotaExceeded {
                    client: client.to_owned(),
                    retry_after_ms: u64::try_from(plan.delay.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Current quota of `client`, if it has been seen.
    #[must_use]
    pub fn snapshot(&self, client: &str) -> Option<BucketSnapshot> {
        self.buckets.lock().get(client).map(DualResourceBucket::snapshot)
    }

    /// Quota of every known client, sorted by key.
    #[must_use]
    pub fn snapshots(&self) -> Vec<(String, BucketSnapshot)> {
        let mut all: Vec<_> = self
            .buckets
            .lock()
            .iter()
            .map(|(k, b)| (k.clone(), b.snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop clients whose pools have both gone at least `max_idle` without a
    /// refill. Returns how many were removed.
    ///
    /// `max_idle` is raised to the longer pool cycle: past that point both
    /// pools would refill on the next request anyway, so a fresh bucket is
    /// equivalent and no quota is forgiven.
    pub fn prune_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let max_idle = max_idle
            .max(self.template.requests().cycle())
            .max(self.template.tokens().cycle());
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            bucket.requests().elapsed(now) < max_idle || bucket.tokens().elapsed(now) < max_idle
        });
        let pruned = before - buckets.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = buckets.len(), "idle clients pruned");
        }
        pruned
    }

    /// Forget a client; its next request starts a fresh bucket.
    pub fn remove(&self, client: &str) -> bool {
        self.buckets.lock().remove(client).is_some()
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// True when no client has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }
}
