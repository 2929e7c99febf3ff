use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Store, StoreTx};
use crate::error::{Error, Missing, Result};
use crate::model::{
    Board, BoardId, ItemKey, Label, LabelId, NewBoard, NewLabel, NewStage, NewSubtaskGroup,
    NewTask, OrderedItem, Partition, Stage, StageId, SubtaskGroup, SubtaskGroupId, Task, TaskId,
    TaskStatus, UserId, sort_by_rank,
};

/// In-memory store. Not durable, but transactional: each transaction works
/// on a private copy that replaces the shared state on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<State>,
}

#[derive(Debug, Clone, Default)]
struct State {
    next_id: i64,
    boards: BTreeMap<BoardId, Board>,
    stages: BTreeMap<StageId, Stage>,
    tasks: BTreeMap<TaskId, Task>,
    labels: BTreeMap<LabelId, Label>,
    groups: BTreeMap<SubtaskGroupId, SubtaskGroup>,
    task_labels: BTreeSet<(TaskId, LabelId)>,
    assignees: BTreeSet<(TaskId, UserId)>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_task(&mut self, id: TaskId) {
        let children: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|task| task.parent_id == Some(id))
            .map(|task| task.id)
            .collect();
        for child in children {
            self.remove_task(child);
        }
        self.tasks.remove(&id);
        self.groups.retain(|_, group| group.task_id != id);
        self.task_labels.retain(|(task, _)| *task != id);
        self.assignees.retain(|(task, _)| *task != id);
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transaction over a [`MemoryStore`]; holds the store lock until dropped.
pub struct MemoryTx<'a> {
    guard: MutexGuard<'a, State>,
    work: State,
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self) -> Result<MemoryTx<'_>> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }
}

fn stamp_revision(stored: i64, item: &OrderedItem) -> Result<i64> {
    if stored == item.revision {
        Ok(stored + 1)
    } else {
        Err(Error::ConcurrencyConflict {
            key: item.key,
            expected: item.revision,
        })
    }
}

impl StoreTx for MemoryTx<'_> {
    fn find_item(&self, key: ItemKey) -> Result<Option<OrderedItem>> {
        Ok(match key {
            ItemKey::Stage(id) => self.work.stages.get(&id).map(Stage::ordered),
            ItemKey::Task(id) => self.work.tasks.get(&id).and_then(Task::ordered),
        })
    }

    fn list_partition(
        &self,
        partition: Partition,
        include_archived: bool,
    ) -> Result<Vec<OrderedItem>> {
        let mut items: Vec<OrderedItem> = match partition {
            Partition::Board(board) => self
                .work
                .stages
                .values()
                .filter(|stage| stage.board_id == board)
                .map(Stage::ordered)
                .collect(),
            Partition::Stage(_) | Partition::Subtasks(_) => self
                .work
                .tasks
                .values()
                .filter_map(Task::ordered)
                .filter(|item| item.partition == partition)
                .collect(),
        };
        if !include_archived {
            items.retain(|item| item.archived_at_us.is_none());
        }
        sort_by_rank(&mut items);
        Ok(items)
    }

    fn update_item(&mut self, item: &OrderedItem) -> Result<OrderedItem> {
        let missing = || Error::not_found(Missing::Item(item.key));
        let revision = match item.key {
            ItemKey::Stage(id) => {
                let Partition::Board(board_id) = item.partition else {
                    return Err(Error::invalid_target("stages live in board partitions"));
                };
                let stage = self.work.stages.get_mut(&id).ok_or_else(missing)?;
                let revision = stamp_revision(stage.revision, item)?;
                stage.board_id = board_id;
                stage.position = item.position;
                stage.archived_at_us = item.archived_at_us;
                stage.updated_at_us = item.updated_at_us;
                stage.revision = revision;
                revision
            }
            ItemKey::Task(id) => {
                let (stage_id, parent_id, board_id) = match item.partition {
                    Partition::Stage(stage) => {
                        let board = self
                            .work
                            .stages
                            .get(&stage)
                            .map(|s| s.board_id)
                            .ok_or_else(|| Error::not_found(Missing::Partition(item.partition)))?;
                        (Some(stage), None, board)
                    }
                    Partition::Subtasks(parent) => {
                        let board = self
                            .work
                            .tasks
                            .get(&parent)
                            .map(|t| t.board_id)
                            .ok_or_else(|| Error::not_found(Missing::Partition(item.partition)))?;
                        (None, Some(parent), board)
                    }
                    Partition::Board(_) => {
                        return Err(Error::invalid_target("tasks cannot live in a board partition"));
                    }
                };
                let task = self.work.tasks.get_mut(&id).ok_or_else(missing)?;
                let revision = stamp_revision(task.revision, item)?;
                if task.parent_id != parent_id {
                    task.group_id = None;
                }
                let board_changed = task.board_id != board_id;
                task.stage_id = stage_id;
                task.parent_id = parent_id;
                task.board_id = board_id;
                task.position = item.position;
                task.archived_at_us = item.archived_at_us;
                task.updated_at_us = item.updated_at_us;
                task.revision = revision;
                if board_changed {
                    for child in self.work.tasks.values_mut() {
                        if child.parent_id == Some(id) {
                            child.board_id = board_id;
                        }
                    }
                }
                revision
            }
        };
        Ok(OrderedItem {
            revision,
            ..item.clone()
        })
    }

    fn delete_item(&mut self, key: ItemKey) -> Result<()> {
        match key {
            ItemKey::Stage(id) => {
                if self.work.stages.remove(&id).is_none() {
                    return Err(Error::not_found(Missing::Item(key)));
                }
                let doomed: Vec<TaskId> = self
                    .work
                    .tasks
                    .values()
                    .filter(|task| task.stage_id == Some(id))
                    .map(|task| task.id)
                    .collect();
                for task in doomed {
                    self.work.remove_task(task);
                }
            }
            ItemKey::Task(id) => {
                if !self.work.tasks.contains_key(&id) {
                    return Err(Error::not_found(Missing::Item(key)));
                }
                self.work.remove_task(id);
            }
        }
        Ok(())
    }

    fn board(&self, id: BoardId) -> Result<Option<Board>> {
        Ok(self.work.boards.get(&id).cloned())
    }

    fn boards(&self) -> Result<Vec<Board>> {
        Ok(self.work.boards.values().cloned().collect())
    }

    fn insert_board(&mut self, new: &NewBoard) -> Result<Board> {
        let board = Board {
            id: BoardId::new(self.work.allocate_id()),
            title: new.title.clone(),
            description: new.description.clone(),
            created_by: new.created_by,
            created_at_us: new.created_at_us,
            updated_at_us: new.created_at_us,
        };
        self.work.boards.insert(board.id, board.clone());
        Ok(board)
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>> {
        Ok(self.work.stages.get(&id).cloned())
    }

    fn stages(&self, board: BoardId, include_archived: bool) -> Result<Vec<Stage>> {
        let mut stages: Vec<Stage> = self
            .work
            .stages
            .values()
            .filter(|stage| stage.board_id == board)
            .filter(|stage| include_archived || stage.archived_at_us.is_none())
            .cloned()
            .collect();
        stages.sort_by_key(|stage| (stage.position, stage.id));
        Ok(stages)
    }

    fn insert_stage(&mut self, new: &NewStage) -> Result<Stage> {
        if !self.work.boards.contains_key(&new.board_id) {
            return Err(Error::not_found(Missing::Board(new.board_id)));
        }
        let stage = Stage {
            id: StageId::new(self.work.allocate_id()),
            board_id: new.board_id,
            title: new.title.clone(),
            position: new.position,
            settings: new.settings.clone(),
            archived_at_us: None,
            created_at_us: new.created_at_us,
            updated_at_us: new.created_at_us,
            revision: 0,
        };
        self.work.stages.insert(stage.id, stage.clone());
        Ok(stage)
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.work.tasks.get(&id).cloned())
    }

    fn tasks(&self, partition: Partition, include_archived: bool) -> Result<Vec<Task>> {
        if matches!(partition, Partition::Board(_)) {
            return Ok(Vec::new());
        }
        let mut tasks: Vec<Task> = self
            .work
            .tasks
            .values()
            .filter(|task| task.partition() == Some(partition))
            .filter(|task| include_archived || task.archived_at_us.is_none())
            .cloned()
            .collect();
        tasks.sort_by_key(|task| (task.position, task.id));
        Ok(tasks)
    }

    fn insert_task(&mut self, new: &NewTask) -> Result<Task> {
        if !self.work.boards.contains_key(&new.board_id) {
            return Err(Error::not_found(Missing::Board(new.board_id)));
        }
        let task = Task {
            id: TaskId::new(self.work.allocate_id()),
            board_id: new.board_id,
            stage_id: new.stage_id,
            parent_id: new.parent_id,
            group_id: new.group_id,
            title: new.title.clone(),
            description: new.description.clone(),
            status: new.status,
            priority: new.priority,
            is_template: new.is_template,
            position: new.position,
            archived_at_us: None,
            created_by: new.created_by,
            created_at_us: new.created_at_us,
            updated_at_us: new.created_at_us,
            revision: 0,
        };
        if task.partition().is_none() || (task.stage_id.is_some() && task.parent_id.is_some()) {
            return Err(Error::validation(
                "a task needs exactly one of stage or parent",
            ));
        }
        self.work.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn set_task_status(&mut self, id: TaskId, status: TaskStatus) -> Result<()> {
        let task = self
            .work
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(Missing::Item(ItemKey::Task(id))))?;
        task.status = status;
        Ok(())
    }

    fn assignees(&self, task: TaskId) -> Result<BTreeSet<UserId>> {
        Ok(self
            .work
            .assignees
            .iter()
            .filter(|(t, _)| *t == task)
            .map(|(_, user)| *user)
            .collect())
    }

    fn assign(&mut self, task: TaskId, user: UserId) -> Result<bool> {
        if !self.work.tasks.contains_key(&task) {
            return Err(Error::not_found(Missing::Item(ItemKey::Task(task))));
        }
        Ok(self.work.assignees.insert((task, user)))
    }

    fn label(&self, id: LabelId) -> Result<Option<Label>> {
        Ok(self.work.labels.get(&id).cloned())
    }

    fn labels(&self, board: BoardId) -> Result<Vec<Label>> {
        Ok(self
            .work
            .labels
            .values()
            .filter(|label| label.board_id == board)
            .cloned()
            .collect())
    }

    fn insert_label(&mut self, new: &NewLabel) -> Result<Label> {
        if !self.work.boards.contains_key(&new.board_id) {
            return Err(Error::not_found(Missing::Board(new.board_id)));
        }
        let label = Label {
            id: LabelId::new(self.work.allocate_id()),
            board_id: new.board_id,
            title: new.title.clone(),
            color: new.color.clone(),
            created_at_us: new.created_at_us,
        };
        self.work.labels.insert(label.id, label.clone());
        Ok(label)
    }

    fn task_labels(&self, task: TaskId) -> Result<Vec<LabelId>> {
        Ok(self
            .work
            .task_labels
            .iter()
            .filter(|(t, _)| *t == task)
            .map(|(_, label)| *label)
            .collect())
    }

    fn attach_label(&mut self, task: TaskId, label: LabelId) -> Result<()> {
        if !self.work.tasks.contains_key(&task) {
            return Err(Error::not_found(Missing::Item(ItemKey::Task(task))));
        }
        if !self.work.labels.contains_key(&label) {
            return Err(Error::not_found(Missing::Label(label)));
        }
        self.work.task_labels.insert((task, label));
        Ok(())
    }

    fn clear_labels(&mut self, task: TaskId) -> Result<()> {
        self.work.task_labels.retain(|(t, _)| *t != task);
        Ok(())
    }

    fn subtask_groups(&self, task: TaskId) -> Result<Vec<SubtaskGroup>> {
        let mut groups: Vec<SubtaskGroup> = self
            .work
            .groups
            .values()
            .filter(|group| group.task_id == task)
            .cloned()
            .collect();
        groups.sort_by_key(|group| (group.position, group.id));
        Ok(groups)
    }

    fn insert_subtask_group(&mut self, new: &NewSubtaskGroup) -> Result<SubtaskGroup> {
        if !self.work.tasks.contains_key(&new.task_id) {
            return Err(Error::not_found(Missing::Item(ItemKey::Task(new.task_id))));
        }
        let group = SubtaskGroup {
            id: SubtaskGroupId::new(self.work.allocate_id()),
            task_id: new.task_id,
            title: new.title.clone(),
            position: new.position,
            created_at_us: new.created_at_us,
        };
        self.work.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn commit(self) -> Result<()> {
        let Self { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}
