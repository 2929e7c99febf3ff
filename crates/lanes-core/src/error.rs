use std::fmt;

use crate::model::{ItemKey, Partition};

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    NotFound,
    InvalidTarget,
    ValidationFailed,
    ConcurrencyConflict,
    AccessDenied,
    LockContention,
    CorruptStore,
    StorageFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::NotFound => "E2001",
            Self::InvalidTarget => "E2002",
            Self::ValidationFailed => "E2003",
            Self::AccessDenied => "E2004",
            Self::ConcurrencyConflict => "E3001",
            Self::CorruptStore => "E3002",
            Self::LockContention => "E5002",
            Self::StorageFailure => "E5003",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::NotFound => "Item not found",
            Self::InvalidTarget => "Invalid move target",
            Self::ValidationFailed => "Validation failed",
            Self::AccessDenied => "Access denied",
            Self::ConcurrencyConflict => "Concurrent modification",
            Self::CorruptStore => "Corrupt store value",
            Self::LockContention => "Lock contention",
            Self::StorageFailure => "Storage failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `lanes init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .lanes/config.toml and retry."),
            Self::NotFound => None,
            Self::InvalidTarget => Some(
                "Stages move within their board, tasks between stages, subtasks between parent tasks.",
            ),
            Self::ValidationFailed => Some("Provide a non-empty title."),
            Self::AccessDenied => Some("Ask a board member or an admin to grant access."),
            Self::ConcurrencyConflict => Some("Reload the board and retry the move."),
            Self::CorruptStore => Some("Restore the database from a backup."),
            Self::LockContention => Some("Retry after the other `lanes` process releases its lock."),
            Self::StorageFailure => Some("Check disk space and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// What a lookup was searching for when it came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Item(ItemKey),
    Board(crate::model::BoardId),
    Label(crate::model::LabelId),
    Partition(Partition),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(key) => write!(f, "{key}"),
            Self::Board(id) => write!(f, "board:{id}"),
            Self::Label(id) => write!(f, "label:{id}"),
            Self::Partition(partition) => write!(f, "partition {partition}"),
        }
    }
}

/// Errors raised by the position engine, stores and services.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{missing} not found")]
    NotFound { missing: Missing },

    #[error("invalid target: {reason}")]
    InvalidTarget { reason: String },

    #[error("validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("{key} changed concurrently (expected revision {expected})")]
    ConcurrencyConflict { key: ItemKey, expected: i64 },

    #[error("user {user} may not access board {board}")]
    AccessDenied {
        user: crate::model::UserId,
        board: crate::model::BoardId,
    },

    #[error("lock timed out after {waited:?} at {path}")]
    LockTimeout {
        path: std::path::PathBuf,
        waited: std::time::Duration,
    },

    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn not_found(missing: Missing) -> Self {
        Self::NotFound { missing }
    }

    pub(crate) fn invalid_target(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidTarget { .. } => ErrorCode::InvalidTarget,
            Self::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            Self::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::LockTimeout { .. } => ErrorCode::LockContention,
            Self::Corrupt(_) => ErrorCode::CorruptStore,
            Self::Storage(_) | Self::Io(_) => ErrorCode::StorageFailure,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{Error, ErrorCode, Missing};
    use crate::model::{ItemKey, TaskId};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::NotFound,
            ErrorCode::InvalidTarget,
            ErrorCode::ValidationFailed,
            ErrorCode::ConcurrencyConflict,
            ErrorCode::AccessDenied,
            ErrorCode::LockContention,
            ErrorCode::CorruptStore,
            ErrorCode::StorageFailure,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::InvalidTarget.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn not_found_renders_item_key() {
        let err = Error::not_found(Missing::Item(ItemKey::Task(TaskId::new(7))));
        assert_eq!(err.to_string(), "task:7 not found");
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.hint().is_none());
    }
}
