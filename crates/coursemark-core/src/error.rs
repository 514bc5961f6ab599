//! Progress engine error types.
//!
//! Every variant is a recoverable per-request condition. None of them is fatal
//! to the process, and a rejected mutation never leaves a partially applied
//! record behind.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the progress engine and its stores.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Malformed or out-of-range answer, lesson, or grade. Caller's fault.
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    /// An attempt with this id was already recorded.
    #[error("attempt {attempt_id} was already recorded")]
    DuplicateAttempt { attempt_id: Uuid },

    /// The referenced lesson does not exist in the current course structure.
    #[error("lesson '{lesson_id}' no longer exists in course '{course_id}'")]
    StaleCourseStructure { course_id: String, lesson_id: String },

    /// No structure has been registered for this course.
    #[error("unknown course: {0}")]
    UnknownCourse(String),

    /// A course structure failed validation and was refused.
    #[error("invalid course structure '{course_id}': {message}")]
    InvalidCourse { course_id: String, message: String },

    /// The user has no progress record for this course.
    #[error("user '{user_id}' is not enrolled in course '{course_id}'")]
    NotEnrolled { user_id: String, course_id: String },

    /// The user already has a progress record for this course.
    #[error("user '{user_id}' is already enrolled in course '{course_id}'")]
    AlreadyEnrolled { user_id: String, course_id: String },

    /// Grading referenced a submission that is not in the record.
    #[error("submission not found: {0}")]
    SubmissionNotFound(Uuid),

    /// Rendering was requested for a record without an issued certificate.
    #[error("no certificate issued for user '{user_id}' in course '{course_id}'")]
    CertificateNotIssued { user_id: String, course_id: String },

    /// The external renderer failed. The issued certificate stays issued.
    #[error("certificate {certificate_id} rendering failed: {message}")]
    RenderFailed { certificate_id: Uuid, message: String },

    /// The stored record changed since it was loaded.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ProgressError {
    /// Returns `true` if the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ProgressError::InvalidSubmission(_)
                | ProgressError::StaleCourseStructure { .. }
                | ProgressError::UnknownCourse(_)
                | ProgressError::InvalidCourse { .. }
                | ProgressError::NotEnrolled { .. }
                | ProgressError::AlreadyEnrolled { .. }
                | ProgressError::SubmissionNotFound(_)
                | ProgressError::CertificateNotIssued { .. }
        )
    }

    /// Returns `true` if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProgressError::RenderFailed { .. }
                | ProgressError::VersionConflict { .. }
                | ProgressError::Storage(_)
        )
    }
}

/// Shorthand result type for engine operations.
pub type Result<T, E = ProgressError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let invalid = ProgressError::InvalidSubmission("bad option".into());
        assert!(invalid.is_client_error());
        assert!(!invalid.is_retryable());

        let stale = ProgressError::StaleCourseStructure {
            course_id: "rust-101".into(),
            lesson_id: "gone".into(),
        };
        assert!(stale.is_client_error());
        assert!(!stale.is_retryable());

        let conflict = ProgressError::VersionConflict {
            expected: 2,
            found: 3,
        };
        assert!(!conflict.is_client_error());
        assert!(conflict.is_retryable());
    }

    #[test]
    fn messages() {
        let err = ProgressError::NotEnrolled {
            user_id: "ada".into(),
            course_id: "rust-101".into(),
        };
        assert_eq!(
            err.to_string(),
            "user 'ada' is not enrolled in course 'rust-101'"
        );
    }
}
