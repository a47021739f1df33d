// Error handling module
// Defines the error type returned by every client operation

use thiserror::Error;

/// Errors that can occur while talking to the Batch Apps service
#[derive(Error, Debug)]
pub enum BatchAppsError {
    /// Missing or invalid credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Stored token expired and can no longer be refreshed
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Incorrect or incomplete configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local user file does not exist
    #[error("File missing: {0}")]
    FileMissing(String),

    /// Invalid manipulation of a user file or collection
    #[error("File invalid: {0}")]
    FileInvalid(String),

    /// Downloading an output or file failed
    #[error("Download failed: {0}")]
    FileDownload(String),

    /// Uploading required files failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Service rejected the request as malformed (400)
    #[error("{0}")]
    BadRequest(String),

    /// Service rejected the credentials (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Call was valid but not applicable to the resource's state (403)
    #[error("{0}")]
    NotApplicable(String),

    /// Endpoint or resource does not exist (404)
    #[error("{0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("{message}")]
    Status { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller supplied invalid arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job stopped in a failed or cancelled state
    #[error("Job is no longer running. Status: {status}")]
    JobStopped { status: String },

    /// Polling exceeded the configured timeout
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Network level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BatchAppsError {
    /// HTTP status associated with the error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            BatchAppsError::BadRequest(_) => Some(400),
            BatchAppsError::Unauthorized(_) => Some(401),
            BatchAppsError::NotApplicable(_) => Some(403),
            BatchAppsError::NotFound(_) => Some(404),
            BatchAppsError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the service accepted the call but could not act on it
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, BatchAppsError::NotApplicable(_))
    }

    /// True when the user needs to log in again
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            BatchAppsError::Auth(_)
                | BatchAppsError::SessionExpired(_)
                | BatchAppsError::Unauthorized(_)
        )
    }
}

impl From<reqwest::Error> for BatchAppsError {
    fn from(err: reqwest::Error) -> Self {
        BatchAppsError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BatchAppsError {
    fn from(err: serde_json::Error) -> Self {
        BatchAppsError::InvalidResponse(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, BatchAppsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BatchAppsError::Auth("Invalid token.".to_string());
        assert_eq!(err.to_string(), "Authentication failed: Invalid token.");

        let err = BatchAppsError::Status {
            status: 409,
            message: "Call failed with status: 409".to_string(),
        };
        assert_eq!(err.to_string(), "Call failed with status: 409");

        let err = BatchAppsError::JobStopped {
            status: "Error".to_string(),
        };
        assert_eq!(err.to_string(), "Job is no longer running. Status: Error");
    }

    #[test]
    fn test_invalid_config_message() {
        let err = BatchAppsError::InvalidConfig("Config has no Authentication".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Config has no Authentication"
        );
    }

    #[test]
    fn test_internal_error_message() {
        let err = BatchAppsError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BatchAppsError::BadRequest("x".into()).status(), Some(400));
        assert_eq!(BatchAppsError::Unauthorized("x".into()).status(), Some(401));
        assert_eq!(BatchAppsError::NotApplicable("x".into()).status(), Some(403));
        assert_eq!(BatchAppsError::NotFound("x".into()).status(), Some(404));
        assert_eq!(
            BatchAppsError::Status {
                status: 503,
                message: "x".into()
            }
            .status(),
            Some(503)
        );
        assert_eq!(BatchAppsError::Timeout(10).status(), None);
    }

    #[test]
    fn test_not_applicable_and_login_checks() {
        assert!(BatchAppsError::NotApplicable("x".into()).is_not_applicable());
        assert!(!BatchAppsError::NotFound("x".into()).is_not_applicable());

        assert!(BatchAppsError::SessionExpired("x".into()).needs_login());
        assert!(BatchAppsError::Unauthorized("x".into()).needs_login());
        assert!(!BatchAppsError::Validation("x".into()).needs_login());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BatchAppsError = io.into();
        assert!(matches!(err, BatchAppsError::Io(_)));
    }
}
