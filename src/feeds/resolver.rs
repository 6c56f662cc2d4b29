use futures::future::join_all;
use std::time::Duration;
use tracing::debug;

use crate::config::ResolutionMode;
use crate::error::{Error, Result};
use crate::feeds::FeedHandle;
use crate::types::rate::RawReading;

/// Races the configured adapters and commits the best usable reading.
pub struct Resolver {
    feeds: Vec<FeedHandle>,
    mode: ResolutionMode,
    feed_timeout: Duration,
}

impl Resolver {
    pub fn new(feeds: Vec<FeedHandle>, mode: ResolutionMode, feed_timeout: Duration) -> Self {
        Resolver {
            feeds,
            mode,
            feed_timeout,
        }
    }

    pub async fn resolve(&self) -> Result<RawReading> {
        match &self.mode {
            ResolutionMode::Single { source } => self.resolve_single(source).await,
            ResolutionMode::Fallback => self.resolve_fallback().await,
        }
    }

    /// Calls exactly the named adapter; its failure is the cycle's failure.
    async fn resolve_single(&self, source: &str) -> Result<RawReading> {
        let handle = self
            .feeds
            .iter()
            .find(|h| h.feed.name() == source)
            .ok_or_else(|| Error::UnknownSource(source.to_string()))?;
        self.fetch_bounded(handle).await
    }

    /// Calls all enabled adapters concurrently and waits for every one to
    /// settle, then picks the success with the lowest priority number.
    /// Configuration order breaks priority ties, so the winner is
    /// reproducible regardless of arrival order.
    async fn resolve_fallback(&self) -> Result<RawReading> {
        let attempts = self
            .feeds
            .iter()
            .filter(|h| h.enabled)
            .map(|h| async move { (h.priority, h.order, self.fetch_bounded(h).await) });

        let mut best: Option<(u32, usize, RawReading)> = None;
        for (priority, order, outcome) in join_all(attempts).await {
            match outcome {
                Ok(reading) => {
                    let better = match &best {
                        Some((bp, bo, _)) => (priority, order) < (*bp, *bo),
                        None => true,
                    };
                    if better {
                        best = Some((priority, order, reading));
                    }
                }
                Err(e) => debug!(error = %e, "rate source failed, trying alternatives"),
            }
        }

        best.map(|(_, _, reading)| reading)
            .ok_or(Error::AllSourcesFailed)
    }

    /// One adapter call under the resolver's own per-feed timeout, in case a
    /// misbehaving network stack blows past the adapter's internal bound.
    async fn fetch_bounded(&self, handle: &FeedHandle) -> Result<RawReading> {
        match tokio::time::timeout(self.feed_timeout, handle.feed.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(Error::FeedTimeout {
                feed: handle.feed.name().to_string(),
                timeout_ms: self.feed_timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::feeds::RateFeed;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted feed used across resolver and scheduler tests.
    pub(crate) struct StubFeed {
        pub name: String,
        pub rate: Option<Decimal>,
        pub calls: Arc<AtomicUsize>,
    }

    impl StubFeed {
        pub fn ok(name: &str, rate: Decimal) -> Self {
            StubFeed {
                name: name.to_string(),
                rate: Some(rate),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing(name: &str) -> Self {
            StubFeed {
                name: name.to_string(),
                rate: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl RateFeed for StubFeed {
        async fn fetch(&self) -> Result<RawReading> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.rate {
                Some(rate) => Ok(RawReading::from_per_gram(rate, None, &self.name, None)),
                None => Err(Error::FeedUnavailable {
                    feed: self.name.clone(),
                    detail: "scripted failure".to_string(),
                }),
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    pub(crate) fn handle(feed: StubFeed, priority: u32, order: usize) -> FeedHandle {
        FeedHandle {
            priority,
            order,
            enabled: true,
            feed: Arc::new(feed),
        }
    }

    fn resolver(feeds: Vec<FeedHandle>, mode: ResolutionMode) -> Resolver {
        Resolver::new(feeds, mode, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn fallback_adopts_lower_priority_success() {
        let feeds = vec![
            handle(StubFeed::failing("primary"), 0, 0),
            handle(StubFeed::ok("backup", dec!(7300)), 1, 1),
        ];
        let reading = resolver(feeds, ResolutionMode::Fallback)
            .resolve()
            .await
            .unwrap();
        assert_eq!(reading.source_name, "backup");
        assert_eq!(reading.rate_per_gram, dec!(7300));
    }

    #[tokio::test]
    async fn priority_order_beats_arrival_order() {
        let feeds = vec![
            handle(StubFeed::ok("secondary", dec!(7301)), 5, 0),
            handle(StubFeed::ok("primary", dec!(7300)), 1, 1),
        ];
        let reading = resolver(feeds, ResolutionMode::Fallback)
            .resolve()
            .await
            .unwrap();
        assert_eq!(reading.source_name, "primary");
    }

    #[tokio::test]
    async fn equal_priority_prefers_configuration_order() {
        let feeds = vec![
            handle(StubFeed::ok("first", dec!(7300)), 1, 0),
            handle(StubFeed::ok("second", dec!(7301)), 1, 1),
        ];
        let reading = resolver(feeds, ResolutionMode::Fallback)
            .resolve()
            .await
            .unwrap();
        assert_eq!(reading.source_name, "first");
    }

    #[tokio::test]
    async fn all_failed_is_typed_not_fabricated() {
        let feeds = vec![
            handle(StubFeed::failing("a"), 0, 0),
            handle(StubFeed::failing("b"), 1, 1),
        ];
        let err = resolver(feeds, ResolutionMode::Fallback)
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllSourcesFailed));
    }

    #[tokio::test]
    async fn disabled_feeds_are_never_called() {
        let stub = StubFeed::ok("disabled", dec!(7300));
        let calls = stub.calls.clone();
        let mut h = handle(stub, 0, 0);
        h.enabled = false;
        let feeds = vec![h, handle(StubFeed::ok("live", dec!(7301)), 1, 1)];

        let reading = resolver(feeds, ResolutionMode::Fallback)
            .resolve()
            .await
            .unwrap();
        assert_eq!(reading.source_name, "live");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_mode_calls_exactly_the_named_adapter() {
        let primary = StubFeed::ok("primary", dec!(7300));
        let primary_calls = primary.calls.clone();
        let backup = StubFeed::ok("backup", dec!(7400));
        let backup_calls = backup.calls.clone();
        let feeds = vec![handle(primary, 0, 0), handle(backup, 1, 1)];

        let reading = resolver(
            feeds,
            ResolutionMode::Single { source: "backup".to_string() },
        )
        .resolve()
        .await
        .unwrap();

        assert_eq!(reading.source_name, "backup");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backup_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_mode_unknown_source() {
        let feeds = vec![handle(StubFeed::ok("primary", dec!(7300)), 0, 0)];
        let err = resolver(
            feeds,
            ResolutionMode::Single { source: "ghost".to_string() },
        )
        .resolve()
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UnknownSource(_)));
    }
}
