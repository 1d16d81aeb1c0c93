//! FlockFS Error Types

use thiserror::Error;

/// Result type alias for FlockFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// FlockFS error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // Lease errors
    #[error("Lease denied: held by {0}")]
    LeaseDenied(String),

    #[error("Quorum not reached: {reached}/{required}")]
    QuorumNotReached { reached: usize, required: usize },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::QuorumNotReached { .. }
                | Error::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ConnectionTimeout("10.0.0.2:6000".into()).is_retryable());
        assert!(Error::QuorumNotReached { reached: 1, required: 2 }.is_retryable());
        assert!(!Error::LeaseDenied("10.0.0.2:6000".into()).is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let e = Error::ConnectionFailed {
            address: "10.0.0.2:6000".into(),
            reason: "refused".into(),
        };
        assert_eq!(e.to_string(), "Connection failed to 10.0.0.2:6000: refused");

        let e = Error::QuorumNotReached { reached: 1, required: 2 };
        assert_eq!(e.to_string(), "Quorum not reached: 1/2");
    }
}
