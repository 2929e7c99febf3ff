//! Operations over boards, stages and tasks.
//!
//! Every service borrows the [`Engine`](crate::engine::Engine) and runs each
//! operation as lock partitions → begin → read/compute/write → commit →
//! publish. Events and queued jobs are buffered in an [`Outbox`] and only
//! published once the transaction has committed.

pub mod catalog;
pub mod clone;
pub mod hooks;
pub mod reorder;

pub use catalog::{BoardService, BoardView, StageView, TaskDraft, TaskView};
pub use clone::{BoardClone, CloneBoardOptions, CloneExpander, CloneTaskOptions, TaskClone};
pub use hooks::{PartitionChange, PartitionChangeHook, StageDefaults};
pub use reorder::{MoveOutcome, ReorderService};

use crate::clock::MonotonicClock;
use crate::error::{Error, Missing, Result};
use crate::events::Event;
use crate::model::{BoardId, ItemKey, OrderedItem, Partition};
use crate::position::Position;
use crate::store::{StoreTx, partition_board};
use serde_json::Value;

/// Side effects produced inside a transaction, released after commit.
#[derive(Debug, Default)]
pub struct Outbox {
    pub events: Vec<Event>,
    pub jobs: Vec<(String, Value)>,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn job(&mut self, name: &str, payload: Value) {
        self.jobs.push((name.to_string(), payload));
    }
}

/// Board owning `partition`.
///
/// A missing board is an invalid target; a missing stage or parent task is
/// not found.
pub(crate) fn resolve_partition_board(tx: &dyn StoreTx, partition: Partition) -> Result<BoardId> {
    if !partition.is_valid() {
        return Err(Error::invalid_target(format!("{partition} is not a valid partition")));
    }
    partition_board(tx, partition)?.ok_or_else(|| match partition {
        Partition::Board(_) => Error::invalid_target(format!("{partition} does not exist")),
        Partition::Stage(_) | Partition::Subtasks(_) => {
            Error::not_found(Missing::Partition(partition))
        }
    })
}

/// Write renumbered siblings, keeping `siblings` in sync with the stored
/// revisions.
pub(crate) fn apply_shift(
    tx: &mut dyn StoreTx,
    clock: &MonotonicClock,
    siblings: &mut [OrderedItem],
    shifted: &[(ItemKey, Position)],
) -> Result<()> {
    for (key, position) in shifted {
        let Some(sibling) = siblings.iter_mut().find(|item| item.key == *key) else {
            continue;
        };
        let next = OrderedItem {
            position: *position,
            updated_at_us: clock.after(sibling.updated_at_us),
            ..sibling.clone()
        };
        *sibling = tx.update_item(&next)?;
    }
    Ok(())
}

/// Reject blank titles, returning the trimmed value.
pub(crate) fn require_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("title must not be blank"));
    }
    Ok(trimmed.to_string())
}
