use thiserror::Error;

/// Errors that can occur within a platform adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The adapter-specific configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
