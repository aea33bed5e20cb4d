use std::error::Error;
use std::io;
use thiserror::Error;

type BoxError = Box<dyn Error + Send + Sync>;

/// Failures raised while buffering, decoding or parsing message content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content length exceeded the limit {max_length}")]
    MaxLengthExceeded { max_length: usize },

    #[error("content stream error: {source}")]
    Stream { source: BoxError },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("unsupported charset: {charset}")]
    UnsupportedCharset { charset: String },

    #[error("invalid content: {reason}")]
    InvalidContent { reason: String },

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid multipart content: {reason}")]
    Multipart { reason: String },
}

impl ContentError {
    pub fn max_length_exceeded(max_length: usize) -> Self {
        Self::MaxLengthExceeded { max_length }
    }

    pub fn stream<E: Into<BoxError>>(e: E) -> Self {
        Self::Stream { source: e.into() }
    }

    pub fn unsupported_charset<S: ToString>(charset: S) -> Self {
        Self::UnsupportedCharset { charset: charset.to_string() }
    }

    pub fn invalid_content<S: ToString>(str: S) -> Self {
        Self::InvalidContent { reason: str.to_string() }
    }

    pub fn multipart<S: ToString>(str: S) -> Self {
        Self::Multipart { reason: str.to_string() }
    }

    /// Whether the failure was caused by the caller's length cap rather than the content itself.
    pub fn is_max_length_exceeded(&self) -> bool {
        matches!(self, Self::MaxLengthExceeded { .. })
    }
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid port: {port:?}")]
    InvalidPort { port: String },
}

impl LocationError {
    pub fn invalid_url<S: ToString>(url: &str, reason: S) -> Self {
        Self::InvalidUrl { url: url.to_owned(), reason: reason.to_string() }
    }

    pub fn invalid_port(port: &str) -> Self {
        Self::InvalidPort { port: port.to_owned() }
    }
}
