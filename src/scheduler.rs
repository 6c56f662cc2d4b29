use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::RateBroadcaster;
use crate::cache::{RateCache, RefreshClaim, RefreshOutcome};
use crate::catalog::CatalogRow;
use crate::config::RefreshConfig;
use crate::engine::{derive, AdjustmentBook};
use crate::error::Error;
use crate::feeds::resolver::Resolver;
use crate::interfaces::catalog_store::CatalogStore;
use crate::types::product::{ProductDefinition, PRODUCT_CATALOG};
use crate::types::rate::DerivedRate;
use rust_decimal::Decimal;

/// Drives refresh cycles: claims the cache's single-flight guard, runs the
/// resolver under the outer timeout, applies or discards the result by
/// generation, then recomputes/persists/broadcasts the derived catalog.
pub struct Scheduler {
    cache: Arc<RateCache>,
    resolver: Resolver,
    store: Arc<dyn CatalogStore>,
    broadcaster: RateBroadcaster,
    adjustments: Arc<AdjustmentBook>,
    refresh: RefreshConfig,
    location: String,
}

impl Scheduler {
    pub fn new(
        cache: Arc<RateCache>,
        resolver: Resolver,
        store: Arc<dyn CatalogStore>,
        broadcaster: RateBroadcaster,
        adjustments: Arc<AdjustmentBook>,
        refresh: RefreshConfig,
        location: String,
    ) -> Arc<Self> {
        Arc::new(Scheduler {
            cache,
            resolver,
            store,
            broadcaster,
            adjustments,
            refresh,
            location,
        })
    }

    /// Startup hook: rehydrate manual adjustments and reseed the cache from
    /// the most recently persisted row, so a restart does not serve the
    /// hardcoded fallback while the first live fetch is still out.
    pub async fn initialize_from_store(&self) {
        match self.store.all().await {
            Ok(rows) => {
                for row in rows {
                    if row.rate.manual_adjustment != Decimal::ZERO {
                        self.adjustments
                            .set(&row.rate.product_name, row.rate.manual_adjustment);
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not rehydrate manual adjustments"),
        }

        match self.store.latest().await {
            Ok(Some(row)) => {
                let snapshot = row.base_snapshot();
                if self.cache.reseed(snapshot.clone()).await {
                    info!(
                        rate_per_gram = %snapshot.rate_per_gram,
                        source = %snapshot.source_name,
                        "cache reseeded from catalog store"
                    );
                }
            }
            Ok(None) => debug!("catalog store empty, keeping hardcoded seed"),
            Err(e) => warn!(error = %e, "catalog store unavailable during init"),
        }
    }

    /// The long-lived-process refresh path: a fixed-period loop guarded by
    /// the same single-flight discipline as request-driven triggers.
    pub fn spawn_background(self: Arc<Self>) -> JoinHandle<()> {
        let scheduler = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.refresh.loop_period());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(period_ms = scheduler.refresh.loop_period_ms, "background refresh loop started");
            loop {
                ticker.tick().await;
                scheduler.run_cycle(false).await;
            }
        })
    }

    /// Fire-and-forget refresh used as a read-path side effect. The reader
    /// is never blocked; failures are still logged inside the cycle.
    pub fn trigger(self: Arc<Self>) {
        let scheduler = self;
        tokio::spawn(async move {
            scheduler.run_cycle(false).await;
        });
    }

    /// One full refresh cycle: Idle → Fetching → {Updated|Unchanged|Failed}.
    pub async fn run_cycle(&self, force: bool) -> RefreshOutcome {
        let generation = match self.cache.begin_refresh(force).await {
            RefreshClaim::Granted { generation } => generation,
            RefreshClaim::Throttled | RefreshClaim::InFlight => return RefreshOutcome::Skipped,
        };

        let resolved =
            tokio::time::timeout(self.refresh.outer_timeout(), self.resolver.resolve()).await;

        match resolved {
            Ok(Ok(reading)) => match self.cache.commit_success(generation, reading).await {
                Some(RefreshOutcome::Updated) => {
                    self.sync_catalog().await;
                    RefreshOutcome::Updated
                }
                Some(outcome) => outcome,
                // Superseded while in flight; the reading was discarded.
                None => RefreshOutcome::Skipped,
            },
            Ok(Err(e)) => {
                let failures = self.cache.commit_failure(generation).await;
                self.log_failure(&e, failures).await;
                RefreshOutcome::Failed
            }
            Err(_) => {
                let failures = self.cache.abandon(generation).await;
                let e = Error::FeedTimeout {
                    feed: "resolver".to_string(),
                    timeout_ms: self.refresh.outer_timeout_ms,
                };
                self.log_failure(&e, failures).await;
                RefreshOutcome::Failed
            }
        }
    }

    /// Recompute every fixed product from the current snapshot, upsert each
    /// row and push it to the sink. Rows fail independently: one bad upsert
    /// never aborts its siblings.
    async fn sync_catalog(&self) {
        let snapshot = self.cache.snapshot().await;
        let mut persisted = 0usize;

        for product in PRODUCT_CATALOG.iter() {
            let rate = derive(&snapshot, product, self.adjustments.get(&product.name));
            let row = CatalogRow::new(&self.location, rate.clone(), &snapshot);
            match self.store.upsert(&row).await {
                Ok(()) => persisted += 1,
                Err(e) => warn!(product = %product.name, error = %e, "catalog upsert failed"),
            }
            self.broadcaster.publish(rate);
        }

        debug!(
            persisted,
            total = PRODUCT_CATALOG.len(),
            source = %snapshot.source_name,
            "catalog sync pass complete"
        );
    }

    /// Persist and broadcast a single product row immediately; used after an
    /// admin adjustment so the change survives restart without waiting for
    /// the next successful refresh.
    pub async fn sync_product(&self, product: &ProductDefinition) -> DerivedRate {
        let snapshot = self.cache.snapshot().await;
        let rate = derive(&snapshot, product, self.adjustments.get(&product.name));
        let row = CatalogRow::new(&self.location, rate.clone(), &snapshot);
        if let Err(e) = self.store.upsert(&row).await {
            warn!(product = %product.name, error = %e, "catalog upsert failed");
        }
        self.broadcaster.publish(rate.clone());
        rate
    }

    /// Sampled failure logging: every Nth consecutive failure at warn, the
    /// rest at debug, to keep a flapping source from storming the log.
    async fn log_failure(&self, error: &Error, failures: Option<u32>) {
        let Some(failures) = failures else {
            debug!(error = %error, "superseded refresh attempt failed");
            return;
        };
        let age_ms = self
            .cache
            .success_age()
            .await
            .map(|age| age.as_millis() as u64);
        let stale = age_ms.is_none_or(|ms| ms > self.refresh.staleness_override_ms);

        let every = self.refresh.failure_log_every.max(1);
        if every == 1 || failures % every == 1 {
            warn!(
                error = %error,
                consecutive_failures = failures,
                success_age_ms = age_ms,
                stale,
                "refresh cycle failed, serving last-known-good"
            );
        } else {
            debug!(error = %error, consecutive_failures = failures, "refresh cycle failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalogStore;
    use crate::config::ResolutionMode;
    use crate::error::Result;
    use crate::feeds::resolver::tests::{handle, StubFeed};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn scheduler_with(
        feeds: Vec<crate::feeds::FeedHandle>,
        store: Arc<dyn CatalogStore>,
        refresh: RefreshConfig,
    ) -> Arc<Scheduler> {
        let cache = Arc::new(RateCache::new(&refresh));
        let resolver = Resolver::new(feeds, ResolutionMode::Fallback, Duration::from_secs(5));
        Scheduler::new(
            cache,
            resolver,
            store,
            RateBroadcaster::default(),
            Arc::new(AdjustmentBook::new()),
            refresh,
            "main".to_string(),
        )
    }

    #[tokio::test]
    async fn successful_cycle_persists_and_broadcasts_every_product() {
        let store = Arc::new(MemoryCatalogStore::new());
        let scheduler = scheduler_with(
            vec![handle(StubFeed::ok("mcx", dec!(7300)), 0, 0)],
            store.clone(),
            RefreshConfig::default(),
        );
        let mut rx = scheduler.broadcaster.subscribe();

        assert_eq!(scheduler.run_cycle(false).await, RefreshOutcome::Updated);

        let rows = store.all().await.unwrap();
        assert_eq!(rows.len(), PRODUCT_CATALOG.len());
        for _ in 0..PRODUCT_CATALOG.len() {
            let rate = rx.recv().await.unwrap();
            assert_eq!(rate.source_name, "mcx");
        }
    }

    #[tokio::test]
    async fn failed_cycle_preserves_the_readable_catalog() {
        let store = Arc::new(MemoryCatalogStore::new());
        let feed = StubFeed::failing("mcx");
        let scheduler = scheduler_with(
            vec![handle(feed, 0, 0)],
            store,
            RefreshConfig {
                min_interval_ms: 0,
                staleness_override_ms: 0,
                ..RefreshConfig::default()
            },
        );

        let before = scheduler.cache.snapshot().await;
        assert_eq!(scheduler.run_cycle(false).await, RefreshOutcome::Failed);
        let after = scheduler.cache.snapshot().await;

        assert_eq!(after.rate_per_gram, before.rate_per_gram);
        assert_eq!(after.source_name, before.source_name);
        assert_eq!(after.last_updated_at, before.last_updated_at);

        // A reader immediately after still derives the pre-refresh catalog.
        let row = derive(&after, &PRODUCT_CATALOG[0], Decimal::ZERO);
        assert_eq!(
            row.rate_per_gram,
            derive(&before, &PRODUCT_CATALOG[0], Decimal::ZERO).rate_per_gram
        );
    }

    #[tokio::test]
    async fn triggers_within_min_interval_hit_the_adapter_once() {
        let feed = StubFeed::ok("mcx", dec!(7300));
        let calls = feed.calls.clone();
        let scheduler = scheduler_with(
            vec![handle(feed, 0, 0)],
            Arc::new(MemoryCatalogStore::new()),
            RefreshConfig {
                min_interval_ms: 60_000,
                staleness_override_ms: 3_600_000,
                ..RefreshConfig::default()
            },
        );

        assert_eq!(scheduler.run_cycle(false).await, RefreshOutcome::Updated);
        for _ in 0..5 {
            assert_eq!(scheduler.run_cycle(false).await, RefreshOutcome::Skipped);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Force bypasses the throttle; same reading reports Unchanged.
        assert_eq!(scheduler.run_cycle(true).await, RefreshOutcome::Unchanged);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Store that rejects a single product, for per-row independence.
    struct FlakyStore {
        inner: MemoryCatalogStore,
        reject: String,
    }

    #[async_trait]
    impl CatalogStore for FlakyStore {
        async fn upsert(&self, row: &CatalogRow) -> Result<()> {
            if row.rate.product_name == self.reject {
                return Err(Error::PersistenceRowFailed {
                    product: row.rate.product_name.clone(),
                    detail: "scripted".to_string(),
                });
            }
            self.inner.upsert(row).await
        }

        async fn latest(&self) -> Result<Option<CatalogRow>> {
            self.inner.latest().await
        }

        async fn all(&self) -> Result<Vec<CatalogRow>> {
            self.inner.all().await
        }
    }

    #[tokio::test]
    async fn one_failed_upsert_does_not_abort_the_others() {
        let store = Arc::new(FlakyStore {
            inner: MemoryCatalogStore::new(),
            reject: PRODUCT_CATALOG[3].name.clone(),
        });
        let scheduler = scheduler_with(
            vec![handle(StubFeed::ok("mcx", dec!(7300)), 0, 0)],
            store.clone(),
            RefreshConfig::default(),
        );

        assert_eq!(scheduler.run_cycle(false).await, RefreshOutcome::Updated);
        assert_eq!(store.all().await.unwrap().len(), PRODUCT_CATALOG.len() - 1);
    }

    #[tokio::test]
    async fn restart_rehydrates_adjustments_and_reseeds_the_cache() {
        let store = Arc::new(MemoryCatalogStore::new());

        // First process life: a refresh lands and an adjustment is set.
        let first = scheduler_with(
            vec![handle(StubFeed::ok("mcx", dec!(7300)), 0, 0)],
            store.clone(),
            RefreshConfig::default(),
        );
        first.run_cycle(false).await;
        first.adjustments.set(&PRODUCT_CATALOG[2].name, dec!(-4.50));
        first.sync_product(&PRODUCT_CATALOG[2]).await;

        // Second process life: feeds down, store intact.
        let second = scheduler_with(
            vec![handle(StubFeed::failing("mcx"), 0, 0)],
            store,
            RefreshConfig::default(),
        );
        second.initialize_from_store().await;

        let snapshot = second.cache.snapshot().await;
        assert_eq!(snapshot.rate_per_gram, dec!(7300));
        assert_eq!(snapshot.source_name, "mcx");
        assert_eq!(second.adjustments.get(&PRODUCT_CATALOG[2].name), dec!(-4.50));
    }
}
