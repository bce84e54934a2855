//! Error types for logbridge

use std::path::PathBuf;

/// logbridge error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Aggregator unreachable: {0}")]
    AggregatorUnreachable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for logbridge
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn invalid_batch<S: Into<String>>(msg: S) -> Self {
        Error::InvalidBatch(msg.into())
    }

    pub fn http<S: Into<String>>(msg: S) -> Self {
        Error::Http(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidBatch("entries must be an array".to_string());
        assert_eq!(err.to_string(), "Invalid batch: entries must be an array");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
