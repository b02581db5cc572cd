//! Error types and handling
//!
//! Application-level errors for the service layer. Configuration has its own
//! [`crate::config::ConfigError`] with explicit not-found/I-O/parse kinds;
//! everything else funnels into [`AppError`].

use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller-supplied input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External command returned a failure exit status
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// External command exceeded its time budget
    #[error("Command timed out: {0}")]
    Timeout(String),

    /// The WHM API reported an error in its metadata
    #[error("WHM API error: {0}")]
    WhmApi(String),

    /// Configuration load/save/backup error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::WhmApi(format!("JSON parsing error: {err}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::NotFound("domain example.com".to_string());
        assert_eq!(err.to_string(), "Not found: domain example.com");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: AppError = crate::config::ConfigError::NotFound {
            path: "/etc/ols-cpanel/missing.yaml".into(),
        }
        .into();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
