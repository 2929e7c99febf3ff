use super::ids::{BoardId, LabelId, StageId, UserId};
use super::ordered::{ItemKey, OrderedItem, Partition};
use super::task::TaskStatus;
use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A board header. Boards are not position-bearing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub title: String,
    pub description: Option<String>,
    pub created_by: UserId,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBoard {
    pub title: String,
    pub description: Option<String>,
    pub created_by: UserId,
    pub created_at_us: i64,
}

/// Typed per-stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StageSettings {
    /// Status forced onto tasks entering the stage, if any.
    pub default_task_status: Option<TaskStatus>,
    /// Users assigned to every task entering the stage.
    pub default_assignees: BTreeSet<UserId>,
    pub is_template: bool,
    pub is_public: bool,
}

/// A column of a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub board_id: BoardId,
    pub title: String,
    pub position: Position,
    pub settings: StageSettings,
    pub archived_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    pub revision: i64,
}

impl Stage {
    #[must_use]
    pub const fn ordered(&self) -> OrderedItem {
        OrderedItem {
            key: ItemKey::Stage(self.id),
            partition: Partition::Board(self.board_id),
            position: self.position,
            archived_at_us: self.archived_at_us,
            updated_at_us: self.updated_at_us,
            revision: self.revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStage {
    pub board_id: BoardId,
    pub title: String,
    pub position: Position,
    pub settings: StageSettings,
    pub created_at_us: i64,
}

/// A board-scoped label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub board_id: BoardId,
    pub title: String,
    pub color: Option<String>,
    pub created_at_us: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLabel {
    pub board_id: BoardId,
    pub title: String,
    pub color: Option<String>,
    pub created_at_us: i64,
}

#[cfg(test)]
mod tests {
    use super::StageSettings;
    use crate::model::{TaskStatus, UserId};

    #[test]
    fn stage_settings_default_is_empty() {
        let settings = StageSettings::default();
        assert!(settings.default_task_status.is_none());
        assert!(settings.default_assignees.is_empty());
        assert!(!settings.is_template);
        assert!(!settings.is_public);
    }

    #[test]
    fn stage_settings_tolerate_missing_fields() {
        let settings: StageSettings =
            serde_json::from_str(r#"{"default_assignees":[3,1]}"#).unwrap();
        assert_eq!(
            settings.default_assignees.into_iter().collect::<Vec<_>>(),
            vec![UserId::new(1), UserId::new(3)]
        );
        assert!(settings.default_task_status.is_none());
    }

    #[test]
    fn stage_settings_json_roundtrip() {
        let settings = StageSettings {
            default_task_status: Some(TaskStatus::Closed),
            default_assignees: [UserId::new(5)].into_iter().collect(),
            is_template: true,
            is_public: false,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(
            serde_json::from_str::<StageSettings>(&json).unwrap(),
            settings
        );
    }
}
