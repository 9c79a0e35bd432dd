//! Error type for the analysis core.
//!
//! Transient source failures never leave the source adapter; they are listed
//! here so the adapter can classify responses before deciding to retry.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transient source error: {0}")]
    TransientSource(String),

    #[error("source error (status {status}): {message}")]
    Source { status: u16, message: String },

    #[error("source response parse error: {0}")]
    Parse(String),

    #[error("no records to bucket")]
    EmptyInput,

    #[error("no keyphrase candidates in text")]
    NoKeyphrase,

    #[error("id range resolution did not converge after {iterations} probes")]
    ResolutionTimeout { iterations: u32 },

    #[error("invalid window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
