#[cfg(test)]
mod error_tests {
    use exercise_recorder::{ErrorCategory, ErrorResponse, RecorderError};
    use std::error::Error;

    #[test]
    fn test_every_variant_has_a_category_and_code() {
        let errors = vec![
            RecorderError::CaptureUnavailable("no camera".into()),
            RecorderError::PermissionDenied("denied".into()),
            RecorderError::UnsupportedFormat("video/webm".into()),
            RecorderError::Encoding("encoder crashed".into()),
            RecorderError::Validation("Please enter an exercise name".into()),
            RecorderError::InvalidState {
                action: "stop recording",
                state: "idle",
            },
            RecorderError::ConfirmationRequired("Discard this recording?".into()),
            RecorderError::QuotaExceeded {
                needed: 2048,
                quota: 1024,
            },
            RecorderError::Storage("disk gone".into()),
            RecorderError::Config("bad value".into()),
            RecorderError::Io(std::io::Error::new(std::io::ErrorKind::Other, "io")),
        ];
        for error in errors {
            assert!(!error.code().is_empty());
            assert!(!error.user_message().is_empty());
            let _ = error.category();
        }
    }

    #[test]
    fn test_invalid_state_display() {
        let error = RecorderError::InvalidState {
            action: "switch camera",
            state: "recording",
        };
        assert_eq!(error.to_string(), "Cannot switch camera while recording");
        assert_eq!(error.category(), ErrorCategory::InvalidState);
    }

    #[test]
    fn test_storage_failures_share_category() {
        let quota = RecorderError::QuotaExceeded {
            needed: 10,
            quota: 5,
        };
        let io: RecorderError = std::io::Error::new(std::io::ErrorKind::Other, "full").into();
        assert_eq!(quota.category(), ErrorCategory::Storage);
        assert_eq!(io.category(), ErrorCategory::Storage);
        assert!(io.source().is_some());
    }

    #[test]
    fn test_error_response_serializes_for_frontends() {
        let response = ErrorResponse::from(RecorderError::PermissionDenied("denied".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "PERMISSION_DENIED");
        assert_eq!(json["category"], "capture_acquisition");
        assert!(json["message"].as_str().unwrap().contains("denied"));
        assert_eq!(response.to_string(), format!("PERMISSION_DENIED: {}", response.message));
    }

    #[test]
    fn test_serde_errors_convert() {
        let parse_error = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let error: RecorderError = parse_error.into();
        assert_eq!(error.code(), "SERIALIZATION_ERROR");
    }
}
