//! Global error types for the KitLend client.
//!
//! All error categories across the client are unified into a single
//! `KitError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using KitError.
pub type KitResult<T> = Result<T, KitError>;

/// Unified error type covering all error categories in KitLend.
#[derive(Error, Debug)]
pub enum KitError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Realtime errors --
    /// WebSocket transport failure (handshake, socket I/O, closed channel).
    #[error("transport error: {0}")]
    Transport(String),

    /// STOMP protocol-level failure (malformed frame, broker ERROR frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation attempted without an active connection.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// A timed operation did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for KitError {
    fn from(e: serde_json::Error) -> Self {
        KitError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for KitError {
    fn from(e: toml::de::Error) -> Self {
        KitError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kit_error_display() {
        let err = KitError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");

        let err = KitError::NotConnected("send dropped".to_string());
        assert_eq!(err.to_string(), "not connected: send dropped");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: KitError = json_err.into();
        assert!(matches!(err, KitError::Serialization(_)));
    }
}
