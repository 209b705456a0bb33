use serde::Serialize;
use thiserror::Error;

/// Errors raised by the recorder, its capture backends and the exercise store.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),
    #[error("Storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad failure classes, used by hosts to pick how an error is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No device, or the user refused access. Blocks the action.
    CaptureAcquisition,
    /// Encoder could not produce the requested format.
    EncoderFormat,
    /// Missing or malformed user input. Nothing changed.
    Validation,
    /// Action not valid in the current session state.
    InvalidState,
    /// Persisting failed. Nothing was appended.
    Storage,
    /// A destructive action needs explicit confirmation.
    ConfirmationRequired,
    Internal,
}

impl RecorderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RecorderError::CaptureUnavailable(_) | RecorderError::PermissionDenied(_) => {
                ErrorCategory::CaptureAcquisition
            }
            RecorderError::UnsupportedFormat(_) | RecorderError::Encoding(_) => {
                ErrorCategory::EncoderFormat
            }
            RecorderError::Validation(_) => ErrorCategory::Validation,
            RecorderError::InvalidState { .. } => ErrorCategory::InvalidState,
            RecorderError::ConfirmationRequired(_) => ErrorCategory::ConfirmationRequired,
            RecorderError::QuotaExceeded { .. }
            | RecorderError::Storage(_)
            | RecorderError::Io(_)
            | RecorderError::Serialization(_) => ErrorCategory::Storage,
            RecorderError::Config(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code for frontends.
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::CaptureUnavailable(_) => "CAPTURE_UNAVAILABLE",
            RecorderError::PermissionDenied(_) => "PERMISSION_DENIED",
            RecorderError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            RecorderError::Encoding(_) => "ENCODING_ERROR",
            RecorderError::Validation(_) => "VALIDATION_ERROR",
            RecorderError::InvalidState { .. } => "INVALID_STATE",
            RecorderError::ConfirmationRequired(_) => "CONFIRMATION_REQUIRED",
            RecorderError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            RecorderError::Storage(_) => "STORAGE_ERROR",
            RecorderError::Config(_) => "CONFIG_ERROR",
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Message suitable for showing to the person operating the recorder.
    pub fn user_message(&self) -> String {
        match self {
            RecorderError::CaptureUnavailable(detail) => {
                format!("Could not access the camera or microphone: {}", detail)
            }
            RecorderError::PermissionDenied(_) => {
                "Camera or microphone access was denied. Please grant permission and try again."
                    .to_string()
            }
            RecorderError::QuotaExceeded { .. } => {
                "Not enough storage space to save this exercise. Delete some recordings and try again."
                    .to_string()
            }
            RecorderError::Validation(msg) | RecorderError::ConfirmationRequired(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        RecorderError::Validation(msg.into())
    }

    pub(crate) fn storage(msg: impl Into<String>) -> Self {
        RecorderError::Storage(msg.into())
    }

    pub(crate) fn encoding(msg: impl Into<String>) -> Self {
        RecorderError::Encoding(msg.into())
    }
}

/// Serializable error shape returned across the plugin boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&RecorderError> for ErrorResponse {
    fn from(err: &RecorderError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            category: err.category(),
            message: err.user_message(),
        }
    }
}

impl From<RecorderError> for ErrorResponse {
    fn from(err: RecorderError) -> Self {
        ErrorResponse::from(&err)
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_errors_share_category() {
        assert_eq!(
            RecorderError::CaptureUnavailable("no camera".into()).category(),
            ErrorCategory::CaptureAcquisition
        );
        assert_eq!(
            RecorderError::PermissionDenied("denied".into()).category(),
            ErrorCategory::CaptureAcquisition
        );
    }

    #[test]
    fn test_quota_message_is_friendly() {
        let err = RecorderError::QuotaExceeded {
            needed: 10,
            quota: 5,
        };
        assert_eq!(err.code(), "QUOTA_EXCEEDED");
        assert!(err.user_message().contains("Not enough storage"));
        assert!(err.to_string().contains("10 bytes"));
    }

    #[test]
    fn test_error_response_from_validation() {
        let response: ErrorResponse = RecorderError::validation("Please enter a name").into();
        assert_eq!(response.code, "VALIDATION_ERROR");
        assert_eq!(response.category, ErrorCategory::Validation);
        assert_eq!(response.message, "Please enter a name");
    }
}
