//! Chat backend error types

use thiserror::Error;

/// Backend call failure with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ChatBackendError {
    pub kind: ChatBackendErrorKind,
    pub message: String,
}

impl ChatBackendError {
    pub fn new(kind: ChatBackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ChatBackendErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ChatBackendErrorKind::Timeout, message)
    }

    pub fn http(status: u16, body: &str) -> Self {
        Self::new(
            ChatBackendErrorKind::Http { status },
            format!("HTTP {status}: {body}"),
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ChatBackendErrorKind::Malformed, message)
    }
}

impl From<reqwest::Error> for ChatBackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_decode() {
            Self::malformed(error.to_string())
        } else {
            Self::network(error.to_string())
        }
    }
}

/// Error classification for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatBackendErrorKind {
    /// Connection refused, DNS, TLS
    Network,
    /// No answer within the configured timeout
    Timeout,
    /// Non-2xx status
    Http { status: u16 },
    /// Body is not a JSON object with a `response` field
    Malformed,
}

impl ChatBackendErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Http { .. } => "http",
            Self::Malformed => "malformed",
        }
    }
}
