//! Error types for the Scrapeless client.

use std::time::Duration;
use thiserror::Error;

/// Result type for Scrapeless client operations.
pub type Result<T> = std::result::Result<T, ScrapelessError>;

/// Scrapeless client errors.
#[derive(Debug, Error)]
pub enum ScrapelessError {
    /// Configuration error (missing API key, unusable settings)
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller misuse, e.g. an empty job id
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A job could not be started, or the start response carried no id
    #[error("{message}")]
    JobStart { status: u16, message: String },

    /// The job reported `completed` without a data payload
    #[error("job {job_id} completed but no data was returned")]
    JobDataMissing { job_id: String },

    /// The job reported `failed`, `cancelled`, or a status we don't know
    #[error("job {job_id} failed or was stopped. Status: {status}{}", upstream_suffix(.error))]
    JobFailed {
        job_id: String,
        status: String,
        error: Option<String>,
    },

    /// Polling gave up before the job reached a terminal status
    #[error("gave up polling job {job_id} after {attempts} status checks ({elapsed:?})")]
    PollTimeout {
        job_id: String,
        elapsed: Duration,
        attempts: u32,
    },

    /// Non-2xx response from the platform
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        trace_id: Option<String>,
    },

    /// Request could not be sent (connection failed, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Body could not be encoded or decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Remote-debugging command failed
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Local storage record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Local storage I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn upstream_suffix(error: &Option<String>) -> String {
    match error {
        Some(e) if !e.is_empty() => format!(". Error: {}", e),
        _ => String::new(),
    }
}

impl ScrapelessError {
    /// HTTP-like status code for this error.
    ///
    /// Caller misuse maps to 400, upstream failures keep the upstream code,
    /// and everything unexpected maps to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::JobStart { status, .. } | Self::Api { status, .. } => *status,
            Self::NotFound(_) => 404,
            Self::PollTimeout { .. } => 408,
            _ => 500,
        }
    }

    /// Upstream trace id, when the platform returned one.
    pub fn trace_id(&self) -> Option<&str> {
        match self {
            Self::Api { trace_id, .. } => trace_id.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ScrapelessError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
