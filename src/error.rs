use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Feed Errors (local to one source, never surfaced to readers)
    #[error("feed '{feed}' timed out after {timeout_ms}ms")]
    FeedTimeout {
        feed: String,
        timeout_ms: u64,
    },

    #[error("feed '{feed}' unreachable: {detail}")]
    FeedUnavailable {
        feed: String,
        detail: String,
    },

    #[error("feed '{feed}' returned a malformed payload: {detail}")]
    MalformedPayload {
        feed: String,
        detail: String,
    },

    #[error("instrument '{instrument}' not found in feed '{feed}'")]
    InstrumentNotFound {
        feed: String,
        instrument: String,
    },

    #[error("feed '{feed}' returned a non-positive rate: {value}")]
    InvalidRate {
        feed: String,
        value: String,
    },

    // Resolver Errors
    #[error("all rate sources failed")]
    AllSourcesFailed,

    #[error("unknown rate source: {0}")]
    UnknownSource(String),

    // Persistence Errors (side channel, never a read-path dependency)
    #[error("catalog store unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("catalog upsert failed for product '{product}': {detail}")]
    PersistenceRowFailed {
        product: String,
        detail: String,
    },

    // API Errors
    #[error("unknown product id: {0}")]
    UnknownProduct(String),

    // System Errors
    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
