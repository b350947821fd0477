//! Error taxonomy shared by the normalizer, fetcher, extractor and coordinator

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateError {
    /// Caller input is malformed. The message is safe to show to the caller.
    #[error("{0}")]
    InvalidParameter(String),

    #[error("failed to execute http request to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request deadline exceeded before fetching {url}")]
    DeadlineExceeded { url: String },

    #[error("upstream returned {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to parse html from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("no rate found for {code} on {date}")]
    NotFound { code: String, date: NaiveDate },

    #[error("operation canceled")]
    Canceled,

    #[error("day task failed: {0}")]
    Task(String),
}

impl RateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RateError::InvalidParameter(message.into())
    }

    /// Whether the failure was caused by the caller rather than the upstream source.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, RateError::InvalidParameter(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, RateError::Canceled)
    }
}
