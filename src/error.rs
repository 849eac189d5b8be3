//! Error types for the Connect Hub SDK

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// SDK error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed collection or document path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A record could not be decoded into the requested type
    #[error("Failed to decode record at {path}: {message}")]
    Decode { path: String, message: String },

    /// Remote store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Identity provider error (sign-out failed, provider gone)
    #[error("Identity error: {0}")]
    Identity(String),
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

/// Classification of a terminal error reported by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// The identity lacks rights to read the addressed record or query
    PermissionDenied,
    /// The store is temporarily unreachable
    Unavailable,
    /// The store failed internally
    Internal,
    /// Anything the store did not classify
    Other,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission-denied",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal error delivered through a store subscription's error callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StoreError {
    pub code: ErrorCode,
    pub message: String,
}

impl StoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn is_permission_denied(&self) -> bool {
        self.code == ErrorCode::PermissionDenied
    }

    /// Whether re-supplying the descriptor may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::Unavailable | ErrorCode::Internal)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode {
            path: String::new(),
            message: err.to_string(),
        }
    }
}
