//! Classifier oracle: the external multimodal model behind every verdict.
//!
//! `ClassifierOracle` is the transport seam (sync, like every other model
//! client in the crate). `OracleAdapter` runs it off the async runtime with a
//! per-call timeout and normalizes the raw text through `parser`.

pub mod adapter;
pub mod ollama;
pub mod parser;

pub use adapter::*;
pub use ollama::*;
pub use parser::*;

use std::time::Duration;

use thiserror::Error;

/// One ordered piece of document content sent alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    Image { mime_type: String, data: Vec<u8> },
}

/// Blocking transport to a classification model.
pub trait ClassifierOracle: Send + Sync {
    /// Send a prompt plus content; return the model's raw text output.
    fn invoke(&self, prompt: &str, content: &[ContentBlock]) -> Result<String, OracleError>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Oracle rejected credentials (status {status})")]
    InvalidCredential { status: u16 },

    #[error("Oracle quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Oracle blocked the content: {0}")]
    ContentBlocked(String),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle is not reachable at {0}")]
    Connection(String),

    #[error("Oracle returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Oracle call failed: {0}")]
    Other(String),
}

/// Coarse failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleErrorKind {
    InvalidCredential,
    QuotaExceeded,
    ContentBlocked,
    Timeout,
    Other,
}

impl OracleError {
    /// Classify a non-success HTTP reply.
    pub fn from_status(status: u16, body: String) -> Self {
        let lower = body.to_lowercase();
        match status {
            401 | 403 => Self::InvalidCredential { status },
            429 => Self::QuotaExceeded(body),
            _ if lower.contains("api key") => Self::InvalidCredential { status },
            _ if lower.contains("quota") => Self::QuotaExceeded(body),
            _ if lower.contains("blocked") || lower.contains("safety") => {
                Self::ContentBlocked(body)
            }
            _ => Self::Http { status, body },
        }
    }

    pub fn kind(&self) -> OracleErrorKind {
        match self {
            Self::InvalidCredential { .. } => OracleErrorKind::InvalidCredential,
            Self::QuotaExceeded(_) => OracleErrorKind::QuotaExceeded,
            Self::ContentBlocked(_) => OracleErrorKind::ContentBlocked,
            Self::Timeout(_) => OracleErrorKind::Timeout,
            Self::Connection(_) | Self::Http { .. } | Self::MalformedResponse(_) | Self::Other(_) => {
                OracleErrorKind::Other
            }
        }
    }

    /// Reviewer-facing message recorded on the synthetic Error classification.
    pub fn user_message(&self) -> String {
        match self.kind() {
            OracleErrorKind::InvalidCredential => {
                "Invalid API key. Please check your oracle credentials".to_string()
            }
            OracleErrorKind::QuotaExceeded => {
                "API quota exceeded. Please check your usage limits".to_string()
            }
            OracleErrorKind::ContentBlocked => "Content was blocked by safety filters".to_string(),
            OracleErrorKind::Timeout | OracleErrorKind::Other => self.to_string(),
        }
    }
}
