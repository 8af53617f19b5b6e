//! Error taxonomy for the incident store and record manager

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by store and record manager operations
///
/// Every variant carries the offending id, index, value or path so the
/// presentation layer can explain the failure without re-deriving context.
#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("Case not found: {0}")]
    NotFound(String),

    #[error("Note {index} not found on case {case_id}")]
    NoteNotFound { case_id: String, index: usize },

    #[error("Incident ID '{0}' already exists")]
    DuplicateId(String),

    #[error("Invalid status '{0}' (expected one of: Open, In Progress, Resolved, Closed)")]
    InvalidStatus(String),

    #[error("Invalid severity '{0}' (expected one of: Low, Medium, High, Critical)")]
    InvalidSeverity(String),

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Storage unavailable at {path:?}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("Malformed data in {path:?}: {reason}")]
    MalformedData { path: PathBuf, reason: String },
}

/// Stable, machine-readable classification of an [`IncidentError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NoteNotFound,
    DuplicateId,
    InvalidStatus,
    InvalidSeverity,
    InvalidInput,
    StorageUnavailable,
    MalformedData,
}

impl ErrorKind {
    /// Returns the snake_case code used on the tool boundary
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoteNotFound => "note_not_found",
            ErrorKind::DuplicateId => "duplicate_id",
            ErrorKind::InvalidStatus => "invalid_status",
            ErrorKind::InvalidSeverity => "invalid_severity",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::MalformedData => "malformed_data",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl IncidentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IncidentError::NotFound(_) => ErrorKind::NotFound,
            IncidentError::NoteNotFound { .. } => ErrorKind::NoteNotFound,
            IncidentError::DuplicateId(_) => ErrorKind::DuplicateId,
            IncidentError::InvalidStatus(_) => ErrorKind::InvalidStatus,
            IncidentError::InvalidSeverity(_) => ErrorKind::InvalidSeverity,
            IncidentError::InvalidInput { .. } => ErrorKind::InvalidInput,
            IncidentError::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            IncidentError::MalformedData { .. } => ErrorKind::MalformedData,
        }
    }

    /// True when the store itself can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StorageUnavailable | ErrorKind::MalformedData
        )
    }

    pub(crate) fn storage<P: Into<PathBuf>>(path: P, reason: impl fmt::Display) -> Self {
        IncidentError::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed<P: Into<PathBuf>>(path: P, reason: impl fmt::Display) -> Self {
        IncidentError::MalformedData {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        IncidentError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IncidentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_errors_are_fatal() {
        assert!(IncidentError::storage("db.json", "denied").is_fatal());
        assert!(IncidentError::malformed("db.json", "bad json").is_fatal());
        assert!(!IncidentError::NotFound("INC-1".to_string()).is_fatal());
        assert!(!IncidentError::NoteNotFound {
            case_id: "INC-1".to_string(),
            index: 3
        }
        .is_fatal());
        assert!(!IncidentError::InvalidStatus("Pending".to_string()).is_fatal());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = IncidentError::NoteNotFound {
            case_id: "INC-7".to_string(),
            index: 4,
        };
        assert_eq!(err.to_string(), "Note 4 not found on case INC-7");
        assert_eq!(err.kind().code(), "note_not_found");

        let err = IncidentError::DuplicateId("INC-DUP".to_string());
        assert!(err.to_string().contains("INC-DUP"));
    }
}
