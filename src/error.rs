//! Request-level errors.
//!
//! Every failure a request can hit maps to one [`ErrorKind`] with a stable
//! HTTP-style status and a short public message. `Display` is the internal
//! diagnostic and may quote raw tokens from the request; only
//! [`ProxyError::public_message`] is meant to leave the process.
//!
//! | Kind | Status | Public message |
//! |---|---|---|
//! | `NotFound` | 404 | `Invalid URL` |
//! | `InvalidOption` | 400 | `Invalid option` |
//! | `EngineFailure` | 500 | `Error processing image` |
//! | `Cancelled` | 499 | `Request was cancelled` |

use crate::imaging::BackendError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidOption,
    EngineFailure,
    Cancelled,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::InvalidOption => 400,
            Self::EngineFailure => 500,
            Self::Cancelled => 499,
        }
    }

    pub fn public_message(self) -> &'static str {
        match self {
            Self::NotFound => "Invalid URL",
            Self::InvalidOption => "Invalid option",
            Self::EngineFailure => "Error processing image",
            Self::Cancelled => "Request was cancelled",
        }
    }
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid {option} arguments: {detail}")]
    InvalidOption { option: String, detail: String },
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error(transparent)]
    Engine(#[from] BackendError),
    #[error("Request was cancelled")]
    Cancelled,
    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ProxyError>,
    },
}

impl ProxyError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(detail.into())
    }

    pub fn invalid(option: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidOption { .. } | Self::UnknownOption(_) => ErrorKind::InvalidOption,
            Self::Engine(_) => ErrorKind::EngineFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Stage { source, .. } => source.kind(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    pub fn public_message(&self) -> &'static str {
        self.kind().public_message()
    }

    /// Name of the pipeline stage that failed, if any.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
