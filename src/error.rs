// src/error.rs
//! Error taxonomy for the digest pipeline.
//!
//! None of these are fatal to a run: transport failures mean "no data from this
//! attempt", parse failures mean "treat the field as absent", and configuration
//! failures mean "skip this strategy".

use thiserror::Error;

/// Network/timeout/non-2xx failure from any fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("reading body of {url} failed: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    pub fn from_reqwest(url: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = e.status() {
            Self::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if e.is_body() || e.is_decode() {
            Self::Body {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }

    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Body { .. } => false,
        }
    }
}

/// Malformed feed document or metadata payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed feed document: {0}")]
    Feed(String),

    #[error("unrecognised metadata shape: {0}")]
    Metadata(String),
}

/// Invalid configuration, or a strategy lacking what it needs to run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    MissingFile { path: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{strategy} strategy needs `{field}`")]
    MissingSetting {
        strategy: &'static str,
        field: &'static str,
    },
}
