use std::time::Duration;
use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while talking to the speaker or setting up the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// HTTP transport error (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Speaker answered with a non-2xx status
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Discovery transport failure
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// No speaker became available within the wait window
    #[error("No speaker discovered within {0:?}")]
    DiscoveryTimeout(Duration),

    /// Invalid or unexpected response from the speaker
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The connection manager has been shut down
    #[error("Connection manager closed")]
    Closed,
}

impl BridgeError {
    /// Whether the error came from waiting for an endpoint rather than from a
    /// request against one.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, BridgeError::DiscoveryTimeout(_) | BridgeError::Closed)
    }
}

impl From<mdns_sd::Error> for BridgeError {
    fn from(e: mdns_sd::Error) -> Self {
        BridgeError::Discovery(e.to_string())
    }
}
