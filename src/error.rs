//! Error handling for alarmhub

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request carried no usable content type
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Notification body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Required notification field absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Payload template rejected at configuration load
    #[error("Template error: {0}")]
    Template(String),

    /// Snapshot annotation failure
    #[error("Annotation error: {0}")]
    Annotation(String),

    /// External object/state store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Downstream relay failure
    #[error("Relay error: {0}")]
    Relay(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
