use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Rate limit exceeded. Try again in {retry_after:.2} seconds")]
    RateLimitExceeded { retry_after: f64 },

    #[error("Rate limiter did not admit a request for '{key}' within {timeout:?}")]
    RateLimitTimeout { key: String, timeout: Duration },

    #[error("Gave up after {attempts} attempts, last status was {status}")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl ScanError {
    /// Short stable name used when counting errors by kind
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::HttpError(e) if e.is_timeout() => "Timeout",
            ScanError::HttpError(e) if e.is_connect() => "ConnectionError",
            ScanError::HttpError(_) => "RequestException",
            ScanError::InvalidUrl(_) => "InvalidUrl",
            ScanError::RateLimitExceeded { .. } => "RateLimitExceeded",
            ScanError::RateLimitTimeout { .. } => "RateLimitTimeout",
            ScanError::RetriesExhausted { .. } => "RetriesExhausted",
            ScanError::JoinError(_) => "JoinError",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
