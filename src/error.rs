//! Error types for each stage of a benchmark run
//!
//! Fatal problems (bad configuration, unusable input) surface as [`BenchError`]
//! before anything is sent. Everything that can go wrong with a single request
//! is a [`RequestError`] and stays confined to that request's slot.

use thiserror::Error;

/// Result type for fallible setup operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that abort a run before any request is dispatched.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Missing or invalid configuration (files, models, env vars)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input that an operation cannot work with
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem access failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors recorded against a single request. Never aborts the batch.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Connect or read deadline elapsed
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other transport failure while sending or reading the body
    #[error("transport error: {0}")]
    Transport(reqwest::Error),

    /// Body arrived but could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The request task panicked or was cancelled
    #[error("request task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Timeout(e.to_string())
        } else if e.is_connect() {
            RequestError::Connect(e.to_string())
        } else {
            RequestError::Transport(e)
        }
    }
}

/// A payload that was transported fine but is not a valid response.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

/// A statistic was requested over an empty (or zero-valued) sample set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient data for {statistic}")]
pub struct InsufficientData {
    pub statistic: &'static str,
}

impl InsufficientData {
    pub fn new(statistic: &'static str) -> Self {
        InsufficientData { statistic }
    }
}
