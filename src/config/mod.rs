use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod loader;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Tabular,
    EventStream,
    Json,
}

/// One upstream feed entry. Static configuration; immutable at runtime.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub kind: FeedKind,
    /// Stable instrument identifier to locate within the feed.
    #[serde(default = "default_instrument")]
    pub instrument: String,
    /// Lower number = tried first.
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Exactly one named source is consulted.
    Single { source: String },
    /// All enabled sources race; lowest priority number among successes wins.
    Fallback,
}

impl Default for ResolutionMode {
    fn default() -> Self {
        ResolutionMode::Fallback
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Refresh attempts closer together than this are skipped.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Once the last success is older than this, the throttle is overridden.
    #[serde(default = "default_staleness_override_ms")]
    pub staleness_override_ms: u64,
    /// Hard per-feed fetch timeout.
    #[serde(default = "default_feed_timeout_ms")]
    pub feed_timeout_ms: u64,
    /// Outer bound on a whole resolver call.
    #[serde(default = "default_outer_timeout_ms")]
    pub outer_timeout_ms: u64,
    /// Period of the background refresh loop.
    #[serde(default = "default_loop_period_ms")]
    pub loop_period_ms: u64,
    /// Log only every Nth consecutive failure to avoid log storms.
    #[serde(default = "default_failure_log_every")]
    pub failure_log_every: u32,
}

impl RefreshConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn staleness_override(&self) -> Duration {
        Duration::from_millis(self.staleness_override_ms)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }

    pub fn outer_timeout(&self) -> Duration {
        Duration::from_millis(self.outer_timeout_ms)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            min_interval_ms: default_min_interval_ms(),
            staleness_override_ms: default_staleness_override_ms(),
            feed_timeout_ms: default_feed_timeout_ms(),
            outer_timeout_ms: default_outer_timeout_ms(),
            loop_period_ms: default_loop_period_ms(),
            failure_log_every: default_failure_log_every(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { bind: default_bind() }
    }
}

fn default_instrument() -> String {
    "GOLD".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_interval_ms() -> u64 {
    1_000
}

fn default_staleness_override_ms() -> u64 {
    2_000
}

fn default_feed_timeout_ms() -> u64 {
    5_000
}

fn default_outer_timeout_ms() -> u64 {
    8_000
}

fn default_loop_period_ms() -> u64 {
    1_000
}

fn default_failure_log_every() -> u32 {
    10
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
