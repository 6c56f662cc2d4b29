use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::RefreshConfig;
use crate::types::rate::{BaseRateSnapshot, RawReading};

/// Result of asking the cache for permission to refresh. Throttling, the
/// in-flight check and the generation bump are one atomic decision under the
/// cache lock, so concurrent triggers collapse into at most one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshClaim {
    Granted { generation: u64 },
    /// Attempted too recently and the cache is not yet stale.
    Throttled,
    /// Another attempt is already running; this trigger is a no-op.
    InFlight,
}

/// Terminal state of one refresh cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Updated,
    Unchanged,
    Failed,
    Skipped,
}

struct CacheInner {
    snapshot: Arc<BaseRateSnapshot>,
    /// Still the hardcoded fallback; a store reseed may replace it.
    from_seed: bool,
    last_attempt_at: Option<Instant>,
    last_success_at: Option<Instant>,
    consecutive_failures: u32,
    /// Bumped whenever an attempt is claimed or abandoned. A completion
    /// whose generation is no longer current is discarded.
    generation: u64,
    in_flight: bool,
}

/// The process-wide last-known-good base rate. Readers clone an `Arc` to an
/// immutable snapshot; updates swap the whole record, so a reader racing a
/// refresh sees either the old or the new snapshot, never a mix.
pub struct RateCache {
    inner: RwLock<CacheInner>,
    min_interval: Duration,
    staleness_override: Duration,
}

impl RateCache {
    pub fn new(refresh: &RefreshConfig) -> Self {
        RateCache {
            inner: RwLock::new(CacheInner {
                snapshot: Arc::new(BaseRateSnapshot::seed()),
                from_seed: true,
                last_attempt_at: None,
                last_success_at: None,
                consecutive_failures: 0,
                generation: 0,
                in_flight: false,
            }),
            min_interval: refresh.min_interval(),
            staleness_override: refresh.staleness_override(),
        }
    }

    pub async fn snapshot(&self) -> Arc<BaseRateSnapshot> {
        self.inner.read().await.snapshot.clone()
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.inner.read().await.consecutive_failures
    }

    /// Time since the last successful fetch, if there ever was one.
    pub async fn success_age(&self) -> Option<Duration> {
        self.inner.read().await.last_success_at.map(|t| t.elapsed())
    }

    /// Claim the right to run one refresh attempt. `force` bypasses the
    /// throttle (never the single-flight guard).
    pub async fn begin_refresh(&self, force: bool) -> RefreshClaim {
        let mut inner = self.inner.write().await;
        if inner.in_flight {
            return RefreshClaim::InFlight;
        }

        if !force {
            let now = Instant::now();
            let attempted_recently = inner
                .last_attempt_at
                .is_some_and(|t| now.duration_since(t) < self.min_interval);
            // A cache that has not succeeded within the staleness bound (or
            // ever) overrides the throttle rather than going stale forever.
            let success_fresh = inner
                .last_success_at
                .is_some_and(|t| now.duration_since(t) <= self.staleness_override);
            if attempted_recently && success_fresh {
                return RefreshClaim::Throttled;
            }
        }

        inner.in_flight = true;
        inner.last_attempt_at = Some(Instant::now());
        inner.generation += 1;
        RefreshClaim::Granted {
            generation: inner.generation,
        }
    }

    /// Apply a successful reading. Returns `None` when the attempt was
    /// superseded, in which case the reading is discarded untouched.
    pub async fn commit_success(
        &self,
        generation: u64,
        reading: RawReading,
    ) -> Option<RefreshOutcome> {
        let mut inner = self.inner.write().await;
        if generation != inner.generation {
            return None;
        }
        inner.in_flight = false;
        inner.consecutive_failures = 0;
        inner.last_success_at = Some(Instant::now());

        let unchanged = inner.snapshot.rate_per_gram == reading.rate_per_gram
            && inner.snapshot.source_name == reading.source_name;

        // Stamped with wall-clock now, clamped so last_updated_at never
        // regresses across cycles.
        let last_updated_at = Utc::now().max(inner.snapshot.last_updated_at);
        inner.snapshot = Arc::new(BaseRateSnapshot {
            rate_per_gram: reading.rate_per_gram,
            rate_per_kg: reading.rate_per_kg,
            source_name: reading.source_name,
            last_updated_at,
            usd_inr_rate: reading.usd_inr_rate.or(inner.snapshot.usd_inr_rate),
        });
        inner.from_seed = false;

        Some(if unchanged {
            RefreshOutcome::Unchanged
        } else {
            RefreshOutcome::Updated
        })
    }

    /// Record a failed attempt. The snapshot is left untouched; readers keep
    /// getting last-known-good. Returns the failure streak, or `None` when
    /// the attempt was superseded.
    pub async fn commit_failure(&self, generation: u64) -> Option<u32> {
        let mut inner = self.inner.write().await;
        if generation != inner.generation {
            return None;
        }
        inner.in_flight = false;
        inner.consecutive_failures += 1;
        Some(inner.consecutive_failures)
    }

    /// Abandon an attempt that exceeded the outer timeout. The generation is
    /// bumped so a late-arriving result from it can never apply.
    pub async fn abandon(&self, generation: u64) -> Option<u32> {
        let mut inner = self.inner.write().await;
        if generation != inner.generation {
            return None;
        }
        inner.in_flight = false;
        inner.generation += 1;
        inner.consecutive_failures += 1;
        Some(inner.consecutive_failures)
    }

    /// Initialization hook: adopt the most recently persisted base rate, but
    /// only while the cache still holds the hardcoded seed. A live fetch
    /// that lands first wins.
    pub async fn reseed(&self, snapshot: BaseRateSnapshot) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.from_seed {
            return false;
        }
        inner.snapshot = Arc::new(snapshot);
        inner.from_seed = false;
        true
    }
}
