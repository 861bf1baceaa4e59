//! Error types for the Spool pipeline.
//!
//! This module defines the error types used throughout the crate, following
//! the non-exhaustive enum pattern so that new failure classes can be added
//! without breaking callers.

use thiserror::Error;

/// The main error type for Spool operations.
///
/// Variants map onto the failure classes the pipeline distinguishes when
/// deciding whether a failed stage may be retried with the same inputs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpoolError {
    /// Input was rejected locally before any remote call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote service could not be reached (timeout, connect, network).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with a non-success status.
    #[error("{message}")]
    Service {
        /// Message returned by the service, surfaced verbatim.
        message: String,
    },

    /// The remote service rejected the inputs themselves.
    #[error("Rejected by service: {message}")]
    Rejected {
        /// Message returned by the service.
        message: String,
    },

    /// The service reply did not match the expected envelope.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// An asset location could not be turned into an absolute URL.
    #[error("Invalid asset location: {0}")]
    InvalidLocation(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpoolError {
    /// Creates a service error from a message.
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Creates a rejection error from a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns true if the same inputs may succeed on a later attempt.
    ///
    /// Validation failures, service-side rejections of the inputs and
    /// configuration problems require the user to change something first.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_) | Self::Rejected { .. } | Self::Config(_)
        )
    }
}

/// A specialized `Result` type for Spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
