//! Deep copies of boards and tasks.
//!
//! A clone is built in one transaction. Ordered children are copied in rank
//! order and renumbered `1..N` in their new containers; archived children
//! are left behind. Recursion stops at subtasks.

use super::{Outbox, apply_shift, require_title};
use crate::engine::Engine;
use crate::error::{Error, Missing, Result};
use crate::events::Event;
use crate::model::{
    Board, BoardId, ItemKey, LabelId, NewBoard, NewLabel, NewStage, NewSubtaskGroup, NewTask,
    Partition, StageId, SubtaskGroupId, Task, TaskId, UserId,
};
use crate::position::Position;
use crate::store::{Store, StoreTx};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneBoardOptions {
    pub title: String,
    pub with_labels: bool,
    pub with_tasks: bool,
    /// With `with_tasks`, copy only tasks flagged as templates.
    pub with_templates_only: bool,
}

impl CloneBoardOptions {
    /// Stages only, under a new title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            with_labels: false,
            with_tasks: false,
            with_templates_only: false,
        }
    }
}

/// The new board plus old → new id maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardClone {
    pub board: Board,
    pub stages: BTreeMap<StageId, StageId>,
    pub labels: BTreeMap<LabelId, LabelId>,
    pub tasks: BTreeMap<TaskId, TaskId>,
    pub groups: BTreeMap<SubtaskGroupId, SubtaskGroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloneTaskOptions {
    /// Defaults to the source title.
    pub title: Option<String>,
    /// Defaults to the source task's stage.
    pub target_stage: Option<StageId>,
    pub with_subtasks: bool,
    pub with_labels: bool,
    pub with_assignees: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskClone {
    pub task: Task,
    pub subtasks: BTreeMap<TaskId, TaskId>,
    pub groups: BTreeMap<SubtaskGroupId, SubtaskGroupId>,
}

/// What to carry over when copying one task row.
#[derive(Clone, Copy)]
struct Carry<'m> {
    labels: Option<&'m BTreeMap<LabelId, LabelId>>,
    assignees: bool,
}

pub struct CloneExpander<'a, S: Store> {
    engine: &'a Engine<S>,
}

impl<'a, S: Store> CloneExpander<'a, S> {
    pub(crate) const fn new(engine: &'a Engine<S>) -> Self {
        Self { engine }
    }

    /// Copy a board with its active stages and, optionally, labels and
    /// tasks.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` for a blank title, `NotFound` for a missing
    /// source, `AccessDenied` unless the actor is an admin with access to
    /// the source, or a store failure (nothing is written).
    pub fn clone_board(
        &self,
        actor: UserId,
        source: BoardId,
        options: &CloneBoardOptions,
    ) -> Result<BoardClone> {
        let title = require_title(&options.title)?;
        let engine = self.engine;
        if !engine.access().is_admin(actor) {
            return Err(Error::AccessDenied {
                user: actor,
                board: source,
            });
        }

        let (clone, outbox) = engine.locks().with(Partition::Board(source), || {
            let mut tx = engine.store().begin()?;
            let original = tx
                .board(source)?
                .ok_or_else(|| Error::not_found(Missing::Board(source)))?;
            engine.ensure_access(actor, source)?;

            let now = engine.clock().now();
            let board = tx.insert_board(&NewBoard {
                title: title.clone(),
                description: original.description.clone(),
                created_by: actor,
                created_at_us: now,
            })?;

            let mut clone = BoardClone {
                board,
                stages: BTreeMap::new(),
                labels: BTreeMap::new(),
                tasks: BTreeMap::new(),
                groups: BTreeMap::new(),
            };

            if options.with_labels {
                for label in tx.labels(source)? {
                    let copy = tx.insert_label(&NewLabel {
                        board_id: clone.board.id,
                        title: label.title.clone(),
                        color: label.color.clone(),
                        created_at_us: now,
                    })?;
                    clone.labels.insert(label.id, copy.id);
                }
            }

            for (stage, n) in tx.stages(source, false)?.into_iter().zip(1_i64..) {
                let copy = tx.insert_stage(&NewStage {
                    board_id: clone.board.id,
                    title: stage.title.clone(),
                    position: Position::nth(n),
                    settings: stage.settings.clone(),
                    created_at_us: now,
                })?;
                clone.stages.insert(stage.id, copy.id);

                if !options.with_tasks {
                    continue;
                }
                let tasks: Vec<Task> = tx
                    .tasks(Partition::Stage(stage.id), false)?
                    .into_iter()
                    .filter(|task| !options.with_templates_only || task.is_template)
                    .collect();
                let carry = Carry {
                    labels: Some(&clone.labels),
                    assignees: true,
                };
                for (task, n) in tasks.iter().zip(1_i64..) {
                    let placed = NewTask {
                        board_id: clone.board.id,
                        stage_id: Some(copy.id),
                        parent_id: None,
                        group_id: None,
                        position: Position::nth(n),
                        created_by: actor,
                        created_at_us: now,
                        ..draft_from(task)
                    };
                    let (new_task, subtasks, groups) =
                        copy_task_tree(&mut tx, task, &placed, carry, true)?;
                    clone.tasks.insert(task.id, new_task.id);
                    clone.tasks.extend(subtasks);
                    clone.groups.extend(groups);
                }
            }

            let mut outbox = Outbox::new();
            outbox.event(Event::BoardCloned {
                source,
                board: clone.board.id,
                actor,
            });
            tx.commit()?;
            Ok::<_, Error>((clone, outbox))
        })?;

        engine.publish(outbox);
        info!(
            %source,
            board = %clone.board.id,
            stages = clone.stages.len(),
            tasks = clone.tasks.len(),
            "board cloned"
        );
        Ok(clone)
    }

    /// Copy one top-level task to the end of a stage.
    ///
    /// Labels are kept only when the target stage is on the source board.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing source or target stage, `InvalidTarget`
    /// when the source is a subtask, `ValidationFailed` for a blank title,
    /// `AccessDenied`, or a store failure.
    pub fn clone_task(
        &self,
        actor: UserId,
        source: TaskId,
        options: &CloneTaskOptions,
    ) -> Result<TaskClone> {
        let title = options.title.as_deref().map(require_title).transpose()?;
        let engine = self.engine;

        let peeked = {
            let tx = engine.store().read()?;
            tx.task(source)?
                .ok_or_else(|| Error::not_found(Missing::Item(ItemKey::Task(source))))?
        };
        let Some(source_stage) = peeked.stage_id else {
            return Err(Error::invalid_target("only top-level tasks can be cloned"));
        };
        let target_stage = options.target_stage.unwrap_or(source_stage);
        let target = Partition::Stage(target_stage);

        let (clone, outbox) = engine.locks().with(target, || {
            let mut tx = engine.store().begin()?;
            let original = tx
                .task(source)?
                .ok_or_else(|| Error::not_found(Missing::Item(ItemKey::Task(source))))?;
            let stage = tx
                .stage(target_stage)?
                .ok_or_else(|| Error::not_found(Missing::Partition(target)))?;
            engine.ensure_access(actor, original.board_id)?;
            if stage.board_id != original.board_id {
                engine.ensure_access(actor, stage.board_id)?;
            }

            let mut siblings = tx.list_partition(target, false)?;
            let allocation = engine.allocator().append(&siblings);
            apply_shift(&mut tx, engine.clock(), &mut siblings, &allocation.shifted)?;

            let identity: BTreeMap<LabelId, LabelId> = if options.with_labels
                && stage.board_id == original.board_id
            {
                tx.labels(original.board_id)?
                    .into_iter()
                    .map(|label| (label.id, label.id))
                    .collect()
            } else {
                BTreeMap::new()
            };
            let carry = Carry {
                labels: Some(&identity),
                assignees: options.with_assignees,
            };
            let placed = NewTask {
                board_id: stage.board_id,
                stage_id: Some(target_stage),
                parent_id: None,
                group_id: None,
                title: title.clone().unwrap_or_else(|| original.title.clone()),
                position: allocation.position,
                created_by: actor,
                created_at_us: engine.clock().now(),
                ..draft_from(&original)
            };
            let (task, subtasks, groups) =
                copy_task_tree(&mut tx, &original, &placed, carry, options.with_subtasks)?;

            let mut outbox = Outbox::new();
            outbox.event(Event::TaskCloned {
                source,
                task: task.id,
                actor,
            });
            tx.commit()?;
            Ok::<_, Error>((
                TaskClone {
                    task,
                    subtasks,
                    groups,
                },
                outbox,
            ))
        })?;

        engine.publish(outbox);
        info!(%source, task = %clone.task.id, stage = %target_stage, "task cloned");
        Ok(clone)
    }
}

/// Content fields of `task`; placement fields are overwritten by callers.
fn draft_from(task: &Task) -> NewTask {
    NewTask {
        board_id: task.board_id,
        stage_id: task.stage_id,
        parent_id: task.parent_id,
        group_id: task.group_id,
        title: task.title.clone(),
        description: task.description.clone(),
        status: task.status,
        priority: task.priority,
        is_template: task.is_template,
        position: task.position,
        created_by: task.created_by,
        created_at_us: task.created_at_us,
    }
}

/// Insert `placed` as the copy of `source`, then its groups and active
/// subtasks when `with_subtasks`.
fn copy_task_tree(
    tx: &mut dyn StoreTx,
    source: &Task,
    placed: &NewTask,
    carry: Carry<'_>,
    with_subtasks: bool,
) -> Result<(
    Task,
    BTreeMap<TaskId, TaskId>,
    BTreeMap<SubtaskGroupId, SubtaskGroupId>,
)> {
    let task = copy_row(tx, source.id, placed, carry)?;
    let mut subtasks = BTreeMap::new();
    let mut groups = BTreeMap::new();
    if !with_subtasks {
        return Ok((task, subtasks, groups));
    }

    for group in tx.subtask_groups(source.id)? {
        let copy = tx.insert_subtask_group(&NewSubtaskGroup {
            task_id: task.id,
            title: group.title.clone(),
            position: group.position,
            created_at_us: placed.created_at_us,
        })?;
        groups.insert(group.id, copy.id);
    }

    let children = tx.tasks(Partition::Subtasks(source.id), false)?;
    for (child, n) in children.iter().zip(1_i64..) {
        let placed_child = NewTask {
            board_id: task.board_id,
            stage_id: None,
            parent_id: Some(task.id),
            group_id: child.group_id.and_then(|g| groups.get(&g).copied()),
            position: Position::nth(n),
            created_by: placed.created_by,
            created_at_us: placed.created_at_us,
            ..draft_from(child)
        };
        let copy = copy_row(tx, child.id, &placed_child, carry)?;
        subtasks.insert(child.id, copy.id);
    }
    Ok((task, subtasks, groups))
}

fn copy_row(tx: &mut dyn StoreTx, source: TaskId, placed: &NewTask, carry: Carry<'_>) -> Result<Task> {
    let task = tx.insert_task(placed)?;
    if let Some(map) = carry.labels {
        for label in tx.task_labels(source)? {
            if let Some(mapped) = map.get(&label) {
                tx.attach_label(task.id, *mapped)?;
            }
        }
    }
    if carry.assignees {
        for user in tx.assignees(source)? {
            tx.assign(task.id, user)?;
        }
    }
    Ok(task)
}
