//! Domain types: boards, stages, tasks, labels and their ordering keys.

pub mod board;
pub mod ids;
pub mod ordered;
pub mod task;

pub use board::{Board, Label, NewBoard, NewLabel, NewStage, Stage, StageSettings};
pub use ids::{BoardId, LabelId, StageId, SubtaskGroupId, TaskId, UserId};
pub use ordered::{ItemKey, OrderedItem, ParseKeyError, Partition, sort_by_rank};
pub use task::{
    NewSubtaskGroup, NewTask, ParseEnumError, Priority, SubtaskGroup, Task, TaskStatus,
};
