//! Core error types for coinroom-core.
//!
//! This module defines the error hierarchy using thiserror. Grant failures
//! are recovered inside the session (rollback + log) and only surface here
//! when a caller talks to the ledger directly.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for coinroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Ledger-related errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// OS keyring errors
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by a [`crate::ledger::Ledger`] implementation.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Ledger endpoint or credentials are missing
    #[error("Ledger not configured: {0}")]
    NotConfigured(String),

    /// Network-level failure before a response was received
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Request exceeded the configured timeout
    #[error("Ledger request timed out")]
    Timeout,

    /// The remote answered with a non-success status
    #[error("Ledger returned {status}: {body}")]
    Remote { status: u16, body: String },

    /// The remote answered but the body carried no balance
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),

    /// No balance row exists for the user
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// The ledger is deliberately unreachable (in-memory ledger outage)
    #[error("Ledger unavailable")]
    Unavailable,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine or create the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// User identifiers are opaque but never empty
    #[error("User id must not be empty")]
    EmptyUserId,

    /// Grants only ever increase the balance
    #[error("Grant amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LedgerError::Timeout
        } else {
            LedgerError::Transport(err.to_string())
        }
    }
}

impl From<keyring::Error> for CoreError {
    fn from(err: keyring::Error) -> Self {
        CoreError::Credentials(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
