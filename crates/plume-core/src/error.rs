//! Unified error types for Plume

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Plume operations
#[derive(Error, Debug)]
pub enum PlumeError {
    // Session errors
    #[error("Browser session unavailable: {0}")]
    Session(String),

    // Authentication errors
    #[error("No login signal within bound for account '{0}'")]
    AuthenticationTimeout(String),

    // Element resolution errors
    #[error("No usable element for role {0}")]
    ElementNotFound(String),

    // Content injection errors
    #[error("Injected content failed verification: {0}")]
    InjectionVerification(String),

    // Media upload errors
    #[error("Media upload did not complete within bound: {0}")]
    UploadTimeout(String),

    #[error("Platform reported an upload error: {0}")]
    Upload(String),

    // Submit errors
    #[error("No publish outcome signal within bound: {0}")]
    SubmitTimeout(String),

    #[error("Platform rejected the post: {0}")]
    PlatformRejected(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using PlumeError
pub type Result<T> = std::result::Result<T, PlumeError>;

/// Outcome-level classification of a failed publish attempt.
///
/// Every [`PlumeError`] maps onto exactly one kind so the orchestration
/// layer can apply a uniform retry policy and report a stable value to
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SessionUnavailable,
    AuthenticationTimeout,
    ElementNotFound,
    InjectionVerificationFailed,
    UploadTimeout,
    UploadError,
    SubmitTimeout,
    PlatformRejected,
    Internal,
}

impl PlumeError {
    /// Classify this error for outcome reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlumeError::Session(_) => ErrorKind::SessionUnavailable,
            PlumeError::AuthenticationTimeout(_) => ErrorKind::AuthenticationTimeout,
            PlumeError::ElementNotFound(_) => ErrorKind::ElementNotFound,
            PlumeError::InjectionVerification(_) => ErrorKind::InjectionVerificationFailed,
            PlumeError::UploadTimeout(_) => ErrorKind::UploadTimeout,
            PlumeError::Upload(_) => ErrorKind::UploadError,
            PlumeError::SubmitTimeout(_) => ErrorKind::SubmitTimeout,
            PlumeError::PlatformRejected(_) => ErrorKind::PlatformRejected,
            PlumeError::Config(_) | PlumeError::Io(_) | PlumeError::Serialization(_) => {
                ErrorKind::Internal
            }
            PlumeError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether the orchestration retry loop should attempt again.
    ///
    /// Everything is retryable within the attempt budget; PlatformRejected
    /// is additionally capped by the engine since repeated explicit
    /// rejection points at the content, not at flakiness.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PlumeError::Config(_))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::SessionUnavailable => "session_unavailable",
            ErrorKind::AuthenticationTimeout => "authentication_timeout",
            ErrorKind::ElementNotFound => "element_not_found",
            ErrorKind::InjectionVerificationFailed => "injection_verification_failed",
            ErrorKind::UploadTimeout => "upload_timeout",
            ErrorKind::UploadError => "upload_error",
            ErrorKind::SubmitTimeout => "submit_timeout",
            ErrorKind::PlatformRejected => "platform_rejected",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            PlumeError::Session("gone".into()).kind(),
            ErrorKind::SessionUnavailable
        );
        assert_eq!(
            PlumeError::AuthenticationTimeout("default".into()).kind(),
            ErrorKind::AuthenticationTimeout
        );
        assert_eq!(
            PlumeError::ElementNotFound("SubmitControl".into()).kind(),
            ErrorKind::ElementNotFound
        );
        assert_eq!(
            PlumeError::PlatformRejected("duplicate".into()).kind(),
            ErrorKind::PlatformRejected
        );
    }

    #[test]
    fn test_retryability() {
        assert!(PlumeError::SubmitTimeout("30s".into()).is_retryable());
        assert!(PlumeError::UploadTimeout("90s".into()).is_retryable());
        assert!(!PlumeError::Config("bad toml".into()).is_retryable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UploadTimeout).unwrap();
        assert_eq!(json, "\"upload_timeout\"");
    }
}
