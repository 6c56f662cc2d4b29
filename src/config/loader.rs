use crate::config::{RefreshConfig, ResolutionMode, ServerConfig, SourceConfig};
use crate::error::{Error, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub resolution: ResolutionMode,
    /// Catalog rows are keyed by (product name, location).
    #[serde(default = "default_location")]
    pub location: String,
    pub sources: Vec<SourceConfig>,
}

fn default_location() -> String {
    "main".to_string()
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("GOLDRATE").separator("__"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedKind;

    #[test]
    fn source_list_deserializes_with_defaults() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{
                "sources": [
                    {"name": "mcx", "url": "http://localhost/feed", "kind": "tabular"},
                    {"name": "ibja", "url": "http://localhost/sse", "kind": "event_stream",
                     "priority": 2, "enabled": false}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.resolution, ResolutionMode::Fallback);
        assert_eq!(cfg.location, "main");
        assert_eq!(cfg.refresh.min_interval_ms, 1_000);
        assert_eq!(cfg.sources[0].kind, FeedKind::Tabular);
        assert_eq!(cfg.sources[0].instrument, "GOLD");
        assert!(cfg.sources[0].enabled);
        assert!(!cfg.sources[1].enabled);
        assert_eq!(cfg.sources[1].priority, 2);
    }

    #[test]
    fn single_mode_deserializes() {
        let mode: ResolutionMode =
            serde_json::from_str(r#"{"mode": "single", "source": "mcx"}"#).unwrap();
        assert_eq!(
            mode,
            ResolutionMode::Single { source: "mcx".to_string() }
        );
    }
}
