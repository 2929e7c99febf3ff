//! Integer identifiers for every persisted entity.
//!
//! Ids are assigned by the store (SQLite `INTEGER PRIMARY KEY` or the
//! in-memory counter) and are always strictly positive.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::{fmt, num::ParseIntError, str::FromStr};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }

            /// Ids at or below zero never name a stored row.
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

id_type!(
    /// Identifier of a board.
    BoardId
);
id_type!(
    /// Identifier of a stage (board column).
    StageId
);
id_type!(
    /// Identifier of a task or subtask.
    TaskId
);
id_type!(
    /// Identifier of a board-scoped label.
    LabelId
);
id_type!(
    /// Identifier of a subtask group under a top-level task.
    SubtaskGroupId
);
id_type!(
    /// Identifier of a user, supplied by the caller as the acting identity.
    UserId
);

#[cfg(test)]
mod tests {
    use super::{StageId, TaskId, UserId};

    #[test]
    fn ids_serialize_as_bare_integers() {
        assert_eq!(serde_json::to_string(&TaskId::new(42)).unwrap(), "42");
        assert_eq!(
            serde_json::from_str::<StageId>("7").unwrap(),
            StageId::new(7)
        );
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(" 12 ".parse::<UserId>().unwrap(), UserId::new(12));
        assert!("twelve".parse::<UserId>().is_err());
    }

    #[test]
    fn non_positive_ids_are_invalid() {
        assert!(TaskId::new(1).is_valid());
        assert!(!TaskId::new(0).is_valid());
        assert!(!TaskId::new(-3).is_valid());
    }
}
