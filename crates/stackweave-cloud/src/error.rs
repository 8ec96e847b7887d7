//! Cloud provider error types

use stackweave_core::{BuildError, ValidationError};
use thiserror::Error;

/// Cloud provider and provisioning errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Provisioning {node} failed: {message}")]
    Provisioning { node: String, message: String },

    #[error("Certificate {domain} in {region} was not issued within {timeout_secs}s")]
    CertificateValidationTimeout {
        domain: String,
        region: String,
        timeout_secs: u64,
    },

    #[error("Certificate {domain} in {region} failed validation: {reason}")]
    CertificateValidationFailed {
        domain: String,
        region: String,
        reason: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Run task failed: {0}")]
    Task(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the call may succeed if repeated
    ///
    /// Rate limiting and eventually-consistent reads are transient; everything
    /// else fails the node on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::Throttled(_) | CloudError::ResourceNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
