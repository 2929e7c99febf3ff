//! The shape shared by everything that sits in a rank-ordered lane.

use super::ids::{BoardId, StageId, TaskId};
use crate::position::Position;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// The parent grouping key of an ordered collection.
///
/// Positions are only comparable inside one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Partition {
    /// Stages of a board.
    Board(BoardId),
    /// Top-level tasks of a stage.
    Stage(StageId),
    /// Subtasks of a top-level task.
    Subtasks(TaskId),
}

impl Partition {
    /// Whether items of `key`'s kind can live in this partition.
    #[must_use]
    pub const fn accepts(self, key: ItemKey) -> bool {
        matches!(
            (self, key),
            (Self::Board(_), ItemKey::Stage(_))
                | (Self::Stage(_) | Self::Subtasks(_), ItemKey::Task(_))
        )
    }

    const fn raw_id(self) -> i64 {
        match self {
            Self::Board(id) => id.get(),
            Self::Stage(id) => id.get(),
            Self::Subtasks(id) => id.get(),
        }
    }

    /// Whether the grouping key could name a stored container.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.raw_id() > 0
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Board(id) => write!(f, "board:{id}"),
            Self::Stage(id) => write!(f, "stage:{id}"),
            Self::Subtasks(id) => write!(f, "subtasks:{id}"),
        }
    }
}

/// Error returned when a partition or item key cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseKeyError {}

fn split_key(s: &str, expected: &'static str) -> Result<(String, i64), ParseKeyError> {
    let fail = || ParseKeyError {
        expected,
        got: s.to_string(),
    };
    let (prefix, raw) = s.trim().split_once(':').ok_or_else(fail)?;
    let id = raw.trim().parse::<i64>().map_err(|_| fail())?;
    Ok((prefix.trim().to_ascii_lowercase(), id))
}

impl FromStr for Partition {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = split_key(s, "partition")?;
        match prefix.as_str() {
            "board" => Ok(Self::Board(BoardId::new(id))),
            "stage" => Ok(Self::Stage(StageId::new(id))),
            "subtasks" => Ok(Self::Subtasks(TaskId::new(id))),
            _ => Err(ParseKeyError {
                expected: "partition",
                got: s.to_string(),
            }),
        }
    }
}

impl Serialize for Partition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Partition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of an ordered item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKey {
    Stage(StageId),
    Task(TaskId),
}

impl ItemKey {
    #[must_use]
    pub const fn raw_id(self) -> i64 {
        match self {
            Self::Stage(id) => id.get(),
            Self::Task(id) => id.get(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(id) => write!(f, "stage:{id}"),
            Self::Task(id) => write!(f, "task:{id}"),
        }
    }
}

impl FromStr for ItemKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = split_key(s, "item key")?;
        match prefix.as_str() {
            "stage" => Ok(Self::Stage(StageId::new(id))),
            "task" => Ok(Self::Task(TaskId::new(id))),
            _ => Err(ParseKeyError {
                expected: "item key",
                got: s.to_string(),
            }),
        }
    }
}

impl Serialize for ItemKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ItemKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Position-bearing view of a stage or task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedItem {
    pub key: ItemKey,
    pub partition: Partition,
    pub position: Position,
    pub archived_at_us: Option<i64>,
    pub updated_at_us: i64,
    /// Bumped by every write; used for optimistic conflict detection.
    pub revision: i64,
}

impl OrderedItem {
    /// Sort key inside a partition: position, then id.
    #[must_use]
    pub const fn rank_key(&self) -> (Position, i64) {
        (self.position, self.key.raw_id())
    }
}

/// Sort items in place by (position, id).
pub fn sort_by_rank(items: &mut [OrderedItem]) {
    items.sort_by_key(OrderedItem::rank_key);
}

#[cfg(test)]
mod tests {
    use super::{ItemKey, Partition};
    use crate::model::{BoardId, StageId, TaskId};

    #[test]
    fn partition_text_roundtrips() {
        for partition in [
            Partition::Board(BoardId::new(1)),
            Partition::Stage(StageId::new(22)),
            Partition::Subtasks(TaskId::new(333)),
        ] {
            let rendered = partition.to_string();
            assert_eq!(rendered.parse::<Partition>().unwrap(), partition);
        }
    }

    #[test]
    fn partition_parse_rejects_unknown_prefix() {
        assert!("column:3".parse::<Partition>().is_err());
        assert!("stage".parse::<Partition>().is_err());
        assert!("stage:x".parse::<Partition>().is_err());
    }

    #[test]
    fn partition_accepts_matching_kinds_only() {
        let stage = ItemKey::Stage(StageId::new(1));
        let task = ItemKey::Task(TaskId::new(1));
        assert!(Partition::Board(BoardId::new(1)).accepts(stage));
        assert!(!Partition::Board(BoardId::new(1)).accepts(task));
        assert!(Partition::Stage(StageId::new(1)).accepts(task));
        assert!(Partition::Subtasks(TaskId::new(1)).accepts(task));
        assert!(!Partition::Stage(StageId::new(1)).accepts(stage));
    }

    #[test]
    fn item_key_serializes_as_text() {
        let key = ItemKey::Task(TaskId::new(9));
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"task:9\"");
        assert_eq!(
            serde_json::from_str::<ItemKey>("\"stage:4\"").unwrap(),
            ItemKey::Stage(StageId::new(4))
        );
    }

    #[test]
    fn negative_partition_is_invalid() {
        assert!(!Partition::Stage(StageId::new(-1)).is_valid());
        assert!(Partition::Stage(StageId::new(1)).is_valid());
    }
}
