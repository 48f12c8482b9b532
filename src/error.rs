// Error taxonomy for the arrival pipeline and configuration loading

use thiserror::Error;

/// Failure of a single poll. Neither kind ever terminates the poll loop; the
/// caller logs it and keeps serving the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// Upstream unreachable, timed out, or answered with a non-2xx status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
