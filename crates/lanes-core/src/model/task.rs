use super::ids::{BoardId, StageId, SubtaskGroupId, TaskId, UserId};
use super::ordered::{ItemKey, OrderedItem, Partition};
use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Completion status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Closed,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "open" => Ok(Self::Open),
            "closed" | "done" => Ok(Self::Closed),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" | "urgent" => Ok(Self::High),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

/// A card on a board, or a subtask of one.
///
/// Exactly one of `stage_id` and `parent_id` is set: top-level tasks live
/// in a stage, subtasks live under their parent and carry no stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub board_id: BoardId,
    pub stage_id: Option<StageId>,
    pub parent_id: Option<TaskId>,
    pub group_id: Option<SubtaskGroupId>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub is_template: bool,
    pub position: Position,
    pub archived_at_us: Option<i64>,
    pub created_by: UserId,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    pub revision: i64,
}

impl Task {
    #[must_use]
    pub const fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }

    /// The lane this task is ordered in.
    ///
    /// Returns `None` only for a row violating the stage/parent invariant.
    #[must_use]
    pub fn partition(&self) -> Option<Partition> {
        match (self.parent_id, self.stage_id) {
            (Some(parent), _) => Some(Partition::Subtasks(parent)),
            (None, Some(stage)) => Some(Partition::Stage(stage)),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn ordered(&self) -> Option<OrderedItem> {
        Some(OrderedItem {
            key: ItemKey::Task(self.id),
            partition: self.partition()?,
            position: self.position,
            archived_at_us: self.archived_at_us,
            updated_at_us: self.updated_at_us,
            revision: self.revision,
        })
    }
}

/// Fields required to insert a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub board_id: BoardId,
    pub stage_id: Option<StageId>,
    pub parent_id: Option<TaskId>,
    pub group_id: Option<SubtaskGroupId>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub is_template: bool,
    pub position: Position,
    pub created_by: UserId,
    pub created_at_us: i64,
}

/// A named grouping of subtasks under one top-level task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskGroup {
    pub id: SubtaskGroupId,
    pub task_id: TaskId,
    pub title: String,
    pub position: i64,
    pub created_at_us: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubtaskGroup {
    pub task_id: TaskId,
    pub title: String,
    pub position: i64,
    pub created_at_us: i64,
}
