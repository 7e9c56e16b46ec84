use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for lotwatch.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Request timed out.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The fetched document lacks the structure a rendered page should have.
    #[error("Page not ready: {0}")]
    PageNotReady(String),

    /// Selector schema could not be resolved or is invalid.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Snapshot persistence failed.
    #[error("Store error: {0}")]
    StoreError(String),

    /// The same listing identity appeared twice within one snapshot.
    #[error("Duplicate listing identity in snapshot: {0}")]
    DuplicateIdentity(String),

    /// An index page could not be fetched within the retry budget.
    #[error("Pagination failed at page {page} after {attempts} attempts: {reason}")]
    PaginationFailed {
        page: u32,
        attempts: u32,
        reason: String,
    },

    /// Pagination finished without discovering a single listing.
    #[error("No listings discovered on the index")]
    EmptyCatalog,

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::PageNotReady(_) => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::PaginationFailed { .. }
                | AppError::DuplicateIdentity(_)
                | AppError::EmptyCatalog
                | AppError::ConfigError(_)
        )
    }
}
