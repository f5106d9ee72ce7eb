use std::path::PathBuf;

use thiserror::Error;

use crate::types::Phase;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("{operation} is not allowed while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },

    #[error("{operation} rejected: another request is still in flight")]
    Busy { operation: &'static str },

    #[error("Objective index {index} is out of range for {len} objectives")]
    ObjectiveOutOfRange { index: usize, len: usize },

    #[error("Malformed draft JSON: {0}")]
    MalformedDraft(#[source] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkflowError {
    /// Message meant for the person driving the workflow, if this error is one
    /// they should see. State errors and programming errors return `None`.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            WorkflowError::Validation(message) => Some(message),
            WorkflowError::Transport { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service responded with status {status}")]
    Status { status: u16, message: Option<String> },

    #[error("Service reported a failure")]
    Rejected { message: Option<String> },

    #[error("Invalid service response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ServiceError {
    /// Human-readable message supplied by the service in its error body.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ServiceError::Status { message, .. } | ServiceError::Rejected { message } => {
                message.as_deref()
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid service URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{var} must be a number of seconds, got {value:?}")]
    InvalidTimeout { var: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
