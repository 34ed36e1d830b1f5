//! Error types for etcd3-model
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::lease::LeaseId;

/// Result type alias using Error
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for model, store and lock operations
#[derive(Debug, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    // -------------------------------------------------------------------------
    // Instance Errors
    // -------------------------------------------------------------------------
    #[error("Invalid object id: {0:?}")]
    InvalidObjectId(String),

    #[error("Messages must not be empty")]
    InvalidMessage,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Codec error: {0}")]
    Codec(String),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Lease not found: {0}")]
    LeaseNotFound(LeaseId),

    #[error("Watch closed: store dropped")]
    WatchClosed,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err.to_string())
    }
}
