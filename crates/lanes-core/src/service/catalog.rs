//! Creation of boards, stages, tasks, subtasks and labels, and rank-ordered
//! read views.
//!
//! New ordered items are appended: they land one unit after the last active
//! sibling.

use super::{Outbox, apply_shift, require_title, resolve_partition_board};
use crate::engine::Engine;
use crate::error::{Error, Missing, Result};
use crate::events::Event;
use crate::model::{
    Board, BoardId, ItemKey, Label, LabelId, NewBoard, NewLabel, NewStage, NewSubtaskGroup,
    NewTask, Partition, Priority, Stage, StageId, StageSettings, SubtaskGroup, SubtaskGroupId,
    Task, TaskId, TaskStatus, UserId,
};
use crate::store::{Store, StoreTx};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// User-supplied content of a new task or subtask.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub is_template: bool,
}

impl TaskDraft {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub labels: Vec<LabelId>,
    pub assignees: BTreeSet<UserId>,
    pub subtasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    #[serde(flatten)]
    pub stage: Stage,
    pub tasks: Vec<TaskView>,
}

/// A board with its stages and tasks in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardView {
    #[serde(flatten)]
    pub board: Board,
    pub labels: Vec<Label>,
    pub stages: Vec<StageView>,
}

pub struct BoardService<'a, S: Store> {
    engine: &'a Engine<S>,
}

impl<'a, S: Store> BoardService<'a, S> {
    pub(crate) const fn new(engine: &'a Engine<S>) -> Self {
        Self { engine }
    }

    /// # Errors
    ///
    /// `ValidationFailed` for a blank title, `AccessDenied` unless the
    /// actor is an admin.
    pub fn create_board(
        &self,
        actor: UserId,
        title: &str,
        description: Option<&str>,
    ) -> Result<Board> {
        let title = require_title(title)?;
        if !self.engine.access().is_admin(actor) {
            return Err(Error::AccessDenied {
                user: actor,
                board: BoardId::new(0),
            });
        }

        let mut tx = self.engine.store().begin()?;
        let board = tx.insert_board(&NewBoard {
            title,
            description: description.map(str::to_string),
            created_by: actor,
            created_at_us: self.engine.clock().now(),
        })?;
        tx.commit()?;

        self.engine.publish(single(Event::BoardCreated {
            board: board.id,
            actor,
        }));
        info!(board = %board.id, "board created");
        Ok(board)
    }

    /// Boards the actor may access, by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn list_boards(&self, actor: UserId) -> Result<Vec<Board>> {
        let tx = self.engine.store().read()?;
        Ok(tx
            .boards()?
            .into_iter()
            .filter(|board| self.engine.ensure_access(actor, board.id).is_ok())
            .collect())
    }

    /// Append a stage to a board.
    ///
    /// # Errors
    ///
    /// `ValidationFailed`, `NotFound` for a missing board, `AccessDenied`.
    pub fn create_stage(
        &self,
        actor: UserId,
        board: BoardId,
        title: &str,
        settings: StageSettings,
    ) -> Result<Stage> {
        let title = require_title(title)?;
        let engine = self.engine;
        let partition = Partition::Board(board);

        let stage = engine.locks().with(partition, || {
            let mut tx = engine.store().begin()?;
            if tx.board(board)?.is_none() {
                return Err(Error::not_found(Missing::Board(board)));
            }
            engine.ensure_access(actor, board)?;
            let position = self.append_slot(&mut tx, partition)?;
            let stage = tx.insert_stage(&NewStage {
                board_id: board,
                title,
                position,
                settings,
                created_at_us: engine.clock().now(),
            })?;
            tx.commit()?;
            Ok(stage)
        })?;

        engine.publish(single(Event::StageCreated {
            stage: stage.id,
            board,
            actor,
        }));
        info!(stage = %stage.id, %board, position = %stage.position, "stage created");
        Ok(stage)
    }

    /// Append a top-level task to a stage.
    ///
    /// # Errors
    ///
    /// `ValidationFailed`, `NotFound` for a missing stage, `AccessDenied`.
    pub fn create_task(&self, actor: UserId, stage: StageId, draft: &TaskDraft) -> Result<Task> {
        let partition = Partition::Stage(stage);
        self.insert_task(actor, partition, draft, None)
    }

    /// Append a subtask under a top-level task.
    ///
    /// # Errors
    ///
    /// `ValidationFailed`, `NotFound` for a missing parent or group,
    /// `InvalidTarget` when the parent is itself a subtask or the group
    /// belongs to another task, `AccessDenied`.
    pub fn create_subtask(
        &self,
        actor: UserId,
        parent: TaskId,
        draft: &TaskDraft,
        group: Option<SubtaskGroupId>,
    ) -> Result<Task> {
        self.insert_task(actor, Partition::Subtasks(parent), draft, group)
    }

    fn insert_task(
        &self,
        actor: UserId,
        partition: Partition,
        draft: &TaskDraft,
        group: Option<SubtaskGroupId>,
    ) -> Result<Task> {
        let title = require_title(&draft.title)?;
        let engine = self.engine;

        let task = engine.locks().with(partition, || {
            let mut tx = engine.store().begin()?;
            let board = resolve_partition_board(&tx, partition)?;
            engine.ensure_access(actor, board)?;

            let (stage_id, parent_id) = match partition {
                Partition::Stage(stage) => (Some(stage), None),
                Partition::Subtasks(parent) => {
                    if tx.task(parent)?.is_some_and(|task| task.is_subtask()) {
                        return Err(Error::invalid_target(
                            "subtasks cannot be nested below another subtask",
                        ));
                    }
                    if let Some(group) = group
                        && !tx.subtask_groups(parent)?.iter().any(|g| g.id == group)
                    {
                        return Err(Error::invalid_target(format!(
                            "group {group} does not belong to task {parent}"
                        )));
                    }
                    (None, Some(parent))
                }
                Partition::Board(_) => {
                    return Err(Error::invalid_target("tasks cannot live in a board partition"));
                }
            };

            let position = self.append_slot(&mut tx, partition)?;
            let task = tx.insert_task(&NewTask {
                board_id: board,
                stage_id,
                parent_id,
                group_id: parent_id.and(group),
                title,
                description: draft.description.clone(),
                status: TaskStatus::Open,
                priority: draft.priority,
                is_template: draft.is_template,
                position,
                created_by: actor,
                created_at_us: engine.clock().now(),
            })?;
            tx.commit()?;
            Ok(task)
        })?;

        engine.publish(single(Event::TaskCreated {
            task: task.id,
            partition,
            actor,
        }));
        info!(task = %task.id, %partition, position = %task.position, "task created");
        Ok(task)
    }

    /// # Errors
    ///
    /// `ValidationFailed`, `NotFound`, `InvalidTarget` for a subtask,
    /// `AccessDenied`.
    pub fn create_subtask_group(
        &self,
        actor: UserId,
        task: TaskId,
        title: &str,
    ) -> Result<SubtaskGroup> {
        let title = require_title(title)?;
        let mut tx = self.engine.store().begin()?;
        let owner = tx
            .task(task)?
            .ok_or_else(|| Error::not_found(Missing::Item(ItemKey::Task(task))))?;
        self.engine.ensure_access(actor, owner.board_id)?;
        if owner.is_subtask() {
            return Err(Error::invalid_target("subtask groups belong to top-level tasks"));
        }
        let next = tx
            .subtask_groups(task)?
            .iter()
            .map(|group| group.position)
            .max()
            .unwrap_or(0)
            + 1;
        let group = tx.insert_subtask_group(&NewSubtaskGroup {
            task_id: task,
            title,
            position: next,
            created_at_us: self.engine.clock().now(),
        })?;
        tx.commit()?;
        Ok(group)
    }

    /// # Errors
    ///
    /// `ValidationFailed`, `NotFound` for a missing board, `AccessDenied`.
    pub fn create_label(
        &self,
        actor: UserId,
        board: BoardId,
        title: &str,
        color: Option<&str>,
    ) -> Result<Label> {
        let title = require_title(title)?;
        let mut tx = self.engine.store().begin()?;
        if tx.board(board)?.is_none() {
            return Err(Error::not_found(Missing::Board(board)));
        }
        self.engine.ensure_access(actor, board)?;
        let label = tx.insert_label(&NewLabel {
            board_id: board,
            title,
            color: color.map(str::to_string),
            created_at_us: self.engine.clock().now(),
        })?;
        tx.commit()?;

        self.engine.publish(single(Event::LabelCreated {
            label: label.id,
            board,
            actor,
        }));
        Ok(label)
    }

    /// Link a label to a task of the same board.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidTarget` across boards, `AccessDenied`.
    pub fn attach_label(&self, actor: UserId, task: TaskId, label: LabelId) -> Result<()> {
        let mut tx = self.engine.store().begin()?;
        let owner = tx
            .task(task)?
            .ok_or_else(|| Error::not_found(Missing::Item(ItemKey::Task(task))))?;
        let found = tx
            .label(label)?
            .ok_or_else(|| Error::not_found(Missing::Label(label)))?;
        self.engine.ensure_access(actor, owner.board_id)?;
        if found.board_id != owner.board_id {
            return Err(Error::invalid_target(format!(
                "label {label} belongs to board {}, task {task} to board {}",
                found.board_id, owner.board_id
            )));
        }
        tx.attach_label(task, label)?;
        tx.commit()
    }

    /// Full board in rank order.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing board, `AccessDenied`.
    pub fn board_view(
        &self,
        actor: UserId,
        board: BoardId,
        include_archived: bool,
    ) -> Result<BoardView> {
        let tx = self.engine.store().read()?;
        let header = tx
            .board(board)?
            .ok_or_else(|| Error::not_found(Missing::Board(board)))?;
        self.engine.ensure_access(actor, board)?;

        let mut stages = Vec::new();
        for stage in tx.stages(board, include_archived)? {
            let mut tasks = Vec::new();
            for task in tx.tasks(Partition::Stage(stage.id), include_archived)? {
                tasks.push(TaskView {
                    labels: tx.task_labels(task.id)?,
                    assignees: tx.assignees(task.id)?,
                    subtasks: tx.tasks(Partition::Subtasks(task.id), include_archived)?,
                    task,
                });
            }
            stages.push(StageView { stage, tasks });
        }

        Ok(BoardView {
            labels: tx.labels(board)?,
            board: header,
            stages,
        })
    }

    /// Position one unit past the last active sibling, renumbering first if
    /// the lane has run out of room.
    fn append_slot(
        &self,
        tx: &mut dyn StoreTx,
        partition: Partition,
    ) -> Result<crate::position::Position> {
        let mut siblings = tx.list_partition(partition, false)?;
        let allocation = self.engine.allocator().append(&siblings);
        apply_shift(tx, self.engine.clock(), &mut siblings, &allocation.shifted)?;
        Ok(allocation.position)
    }
}

fn single(event: Event) -> Outbox {
    let mut outbox = Outbox::new();
    outbox.event(event);
    outbox
}
