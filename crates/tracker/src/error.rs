//! Error handling for the tracker and its ledger adapters

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors surfaced on tracked streams and by the tracker API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The ledger stayed unavailable through the whole retry budget
    #[error("Ledger unavailable after {attempts} attempts: {reason}")]
    AdapterUnavailable { attempts: u32, reason: String },

    /// The tracked property or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A ledger value did not decode into the requested type
    #[error("Decode error: {0}")]
    Decode(String),

    /// The ledger closed the live feed under the subscription
    #[error("Subscription cancelled: {0}")]
    SubscriptionCancelled(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors reported by an event log or property source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Transient failure; the call may be retried
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The live feed was shut down by the ledger
    #[error("Feed closed")]
    Closed,
}

impl From<AdapterError> for TrackerError {
    /// Conversion for one-shot reads; tracked streams count their own attempts.
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Unavailable(reason) => TrackerError::AdapterUnavailable { attempts: 1, reason },
            AdapterError::NotFound(what) => TrackerError::NotFound(what),
            AdapterError::Closed => TrackerError::SubscriptionCancelled("live feed closed".to_string()),
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for TrackerError {
    fn from(err: toml::de::Error) -> Self {
        TrackerError::Config(err.to_string())
    }
}
