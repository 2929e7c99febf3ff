//! Persistence collaborator: transactional CRUD over boards, stages, tasks
//! and their ordering columns.
//!
//! Every read and write happens inside a [`StoreTx`] obtained from
//! [`Store::begin`], or [`Store::read`] for pure lookups. Committing publishes all writes at once; dropping a
//! transaction without committing discards them. Services rely on this for
//! atomic renumbers and clones.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::model::{
    Board, BoardId, ItemKey, Label, LabelId, NewBoard, NewLabel, NewStage, NewSubtaskGroup,
    NewTask, OrderedItem, Partition, Stage, StageId, SubtaskGroup, Task, TaskId, TaskStatus,
    UserId,
};
use std::collections::BTreeSet;

/// A store that hands out transactions.
pub trait Store: Send + Sync {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    /// Start a write transaction.
    ///
    /// Implementations serialize writers here: the transaction holds the
    /// store's write lock until it is committed or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot start a transaction.
    fn begin(&self) -> Result<Self::Tx<'_>>;

    /// Start a transaction that only reads.
    ///
    /// Backends with a shared file may take a weaker lock here so lookups
    /// do not queue behind writers in other processes. Writes made through
    /// the returned transaction are not guaranteed to commit.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot start a transaction.
    fn read(&self) -> Result<Self::Tx<'_>> {
        self.begin()
    }
}

/// Operations available inside one transaction.
///
/// Listings of ordered items are sorted by (position, id).
pub trait StoreTx {
    // -- ordered items ------------------------------------------------------

    fn find_item(&self, key: ItemKey) -> Result<Option<OrderedItem>>;

    fn list_partition(
        &self,
        partition: Partition,
        include_archived: bool,
    ) -> Result<Vec<OrderedItem>>;

    /// Persist partition, position, archive marker and `updated_at_us`.
    ///
    /// Fails with `ConcurrencyConflict` unless the stored revision still
    /// equals `item.revision`; returns the item with its bumped revision.
    /// Moving a task into a stage of another board moves its subtasks to
    /// that board as well.
    fn update_item(&mut self, item: &OrderedItem) -> Result<OrderedItem>;

    /// Hard delete with cascade. Remaining siblings keep their positions.
    fn delete_item(&mut self, key: ItemKey) -> Result<()>;

    // -- boards ---------------------------------------------------------------

    fn board(&self, id: BoardId) -> Result<Option<Board>>;
    fn boards(&self) -> Result<Vec<Board>>;
    fn insert_board(&mut self, new: &NewBoard) -> Result<Board>;

    // -- stages ---------------------------------------------------------------

    fn stage(&self, id: StageId) -> Result<Option<Stage>>;
    fn stages(&self, board: BoardId, include_archived: bool) -> Result<Vec<Stage>>;
    fn insert_stage(&mut self, new: &NewStage) -> Result<Stage>;

    // -- tasks ----------------------------------------------------------------

    fn task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Tasks of a `Stage` or `Subtasks` partition in rank order.
    /// A `Board` partition holds no tasks and yields an empty list.
    fn tasks(&self, partition: Partition, include_archived: bool) -> Result<Vec<Task>>;
    fn insert_task(&mut self, new: &NewTask) -> Result<Task>;
    fn set_task_status(&mut self, id: TaskId, status: TaskStatus) -> Result<()>;

    fn assignees(&self, task: TaskId) -> Result<BTreeSet<UserId>>;
    /// Returns `true` when the user was not assigned before.
    fn assign(&mut self, task: TaskId, user: UserId) -> Result<bool>;

    // -- labels ---------------------------------------------------------------

    fn label(&self, id: LabelId) -> Result<Option<Label>>;
    fn labels(&self, board: BoardId) -> Result<Vec<Label>>;
    fn insert_label(&mut self, new: &NewLabel) -> Result<Label>;
    fn task_labels(&self, task: TaskId) -> Result<Vec<LabelId>>;
    fn attach_label(&mut self, task: TaskId, label: LabelId) -> Result<()>;
    fn clear_labels(&mut self, task: TaskId) -> Result<()>;

    // -- subtask groups -------------------------------------------------------

    fn subtask_groups(&self, task: TaskId) -> Result<Vec<SubtaskGroup>>;
    fn insert_subtask_group(&mut self, new: &NewSubtaskGroup) -> Result<SubtaskGroup>;

    /// Publish every write made through this transaction.
    fn commit(self) -> Result<()>
    where
        Self: Sized;
}

/// Board that owns the container named by `partition`, if it exists.
///
/// # Errors
///
/// Propagates store failures.
pub fn partition_board(tx: &dyn StoreTx, partition: Partition) -> Result<Option<BoardId>> {
    Ok(match partition {
        Partition::Board(id) => tx.board(id)?.map(|board| board.id),
        Partition::Stage(id) => tx.stage(id)?.map(|stage| stage.board_id),
        Partition::Subtasks(id) => tx.task(id)?.map(|task| task.board_id),
    })
}

/// Board that owns the item named by `key`, if it exists.
///
/// # Errors
///
/// Propagates store failures.
pub fn item_board(tx: &dyn StoreTx, key: ItemKey) -> Result<Option<BoardId>> {
    Ok(match key {
        ItemKey::Stage(id) => tx.stage(id)?.map(|stage| stage.board_id),
        ItemKey::Task(id) => tx.task(id)?.map(|task| task.board_id),
    })
}
