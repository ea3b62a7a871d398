// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for formation-engine.

use std::fmt;

use formation_webhook::WebhookError;

/// Result type using FormationError
pub type Result<T> = std::result::Result<T, FormationError>;

/// Errors raised while managing formation assignments and their notifications.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FormationError {
    /// Formation assignment was not found.
    AssignmentNotFound {
        /// The assignment ID that was not found.
        assignment_id: String,
    },

    /// A domain object referenced by an assignment or formation does not exist.
    ObjectNotFound {
        /// Kind of the object (application, runtime, formation, ...).
        object_type: String,
        /// The object ID or name.
        object_id: String,
    },

    /// Assignment is in a state that does not allow the requested operation.
    InvalidAssignmentState {
        /// The assignment ID.
        assignment_id: String,
        /// The expected state.
        expected: String,
        /// The actual state.
        actual: String,
    },

    /// A notification request could not be built from the webhook templates.
    NotificationBuildFailed {
        /// The webhook ID.
        webhook_id: String,
        /// The reason for failure.
        reason: String,
    },

    /// A notification could not be delivered.
    NotificationFailed {
        /// The assignment the notification belonged to.
        assignment_id: String,
        /// The reason for failure.
        reason: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl FormationError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AssignmentNotFound { .. } => "ASSIGNMENT_NOT_FOUND",
            Self::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            Self::InvalidAssignmentState { .. } => "INVALID_ASSIGNMENT_STATE",
            Self::NotificationBuildFailed { .. } => "NOTIFICATION_BUILD_FAILED",
            Self::NotificationFailed { .. } => "NOTIFICATION_FAILED",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether the failed operation may succeed when repeated unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotificationFailed { retryable, .. } => *retryable,
            Self::DatabaseError { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn object_not_found(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            object_type: object_type.into(),
            object_id: id.into(),
        }
    }

    pub(crate) fn notification_failed(assignment_id: &str, err: &WebhookError) -> Self {
        Self::NotificationFailed {
            assignment_id: assignment_id.to_string(),
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl fmt::Display for FormationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssignmentNotFound { assignment_id } => {
                write!(f, "Formation assignment '{}' not found", assignment_id)
            }
            Self::ObjectNotFound {
                object_type,
                object_id,
            } => {
                write!(f, "{} '{}' not found", object_type, object_id)
            }
            Self::InvalidAssignmentState {
                assignment_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Formation assignment '{}' is in invalid state: expected '{}', got '{}'",
                    assignment_id, expected, actual
                )
            }
            Self::NotificationBuildFailed { webhook_id, reason } => {
                write!(
                    f,
                    "Failed to build notification for webhook '{}': {}",
                    webhook_id, reason
                )
            }
            Self::NotificationFailed {
                assignment_id,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Notification for formation assignment '{}' failed: {}",
                    assignment_id, reason
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for FormationError {}

impl From<sqlx::Error> for FormationError {
    fn from(err: sqlx::Error) -> Self {
        FormationError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FormationError {
    fn from(err: serde_json::Error) -> Self {
        FormationError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<WebhookError> for FormationError {
    fn from(err: WebhookError) -> Self {
        FormationError::NotificationFailed {
            assignment_id: String::new(),
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (
                FormationError::AssignmentNotFound {
                    assignment_id: "fa-1".to_string(),
                },
                "ASSIGNMENT_NOT_FOUND",
            ),
            (
                FormationError::object_not_found("Application", "app-1"),
                "OBJECT_NOT_FOUND",
            ),
            (
                FormationError::InvalidAssignmentState {
                    assignment_id: "fa-1".to_string(),
                    expected: "CREATING".to_string(),
                    actual: "READY".to_string(),
                },
                "INVALID_ASSIGNMENT_STATE",
            ),
            (
                FormationError::NotificationBuildFailed {
                    webhook_id: "wh-1".to_string(),
                    reason: "missing output template".to_string(),
                },
                "NOTIFICATION_BUILD_FAILED",
            ),
            (
                FormationError::NotificationFailed {
                    assignment_id: "fa-1".to_string(),
                    reason: "timeout".to_string(),
                    retryable: true,
                },
                "NOTIFICATION_FAILED",
            ),
            (
                FormationError::ValidationError {
                    field: "page_size".to_string(),
                    message: "out of range".to_string(),
                },
                "VALIDATION_ERROR",
            ),
            (
                FormationError::DatabaseError {
                    operation: "insert".to_string(),
                    details: "locked".to_string(),
                },
                "DATABASE_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(
                error.error_code(),
                expected_code,
                "Error {:?} should have code {}",
                error,
                expected_code
            );
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_error_display() {
        let err = FormationError::AssignmentNotFound {
            assignment_id: "fa-1".to_string(),
        };
        assert_eq!(err.to_string(), "Formation assignment 'fa-1' not found");

        let err = FormationError::object_not_found("Runtime", "rt-1");
        assert_eq!(err.to_string(), "Runtime 'rt-1' not found");

        let err = FormationError::InvalidAssignmentState {
            assignment_id: "fa-1".to_string(),
            expected: "CREATING".to_string(),
            actual: "READY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Formation assignment 'fa-1' is in invalid state: expected 'CREATING', got 'READY'"
        );
    }

    #[test]
    fn test_from_webhook_error_keeps_retryability() {
        let err: FormationError = WebhookError::MissingLocation.into();
        assert_eq!(err.error_code(), "NOTIFICATION_FAILED");
        assert!(!err.is_retryable());
        assert!(
            err.to_string()
                .contains("missing location url after executing async webhook")
        );

        let err = FormationError::notification_failed(
            "fa-2",
            &WebhookError::TokenRequest {
                token_url: "https://auth".to_string(),
                reason: "timeout".to_string(),
            },
        );
        assert!(err.is_retryable());
        assert!(err.to_string().contains("fa-2"));
    }
}
