//! Observers invoked when an item changes partition.

use super::Outbox;
use crate::error::Result;
use crate::events::NOTIFY_TASK_ASSIGNED;
use crate::model::{ItemKey, OrderedItem, Partition, UserId};
use crate::store::StoreTx;
use serde_json::json;
use tracing::debug;

/// One cross-partition move, as seen from inside its transaction.
#[derive(Debug, Clone, Copy)]
pub struct PartitionChange<'a> {
    pub actor: UserId,
    pub item: &'a OrderedItem,
    pub from: Partition,
    pub to: Partition,
}

/// Runs inside the move's transaction; an error rolls the move back.
pub trait PartitionChangeHook: Send + Sync {
    /// # Errors
    ///
    /// Any error aborts the surrounding move.
    fn on_partition_change(
        &self,
        tx: &mut dyn StoreTx,
        change: &PartitionChange<'_>,
        outbox: &mut Outbox,
    ) -> Result<()>;
}

/// Applies the destination stage's default assignees and default task
/// status to a top-level task entering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageDefaults;

impl PartitionChangeHook for StageDefaults {
    fn on_partition_change(
        &self,
        tx: &mut dyn StoreTx,
        change: &PartitionChange<'_>,
        outbox: &mut Outbox,
    ) -> Result<()> {
        let (ItemKey::Task(task), Partition::Stage(stage_id)) = (change.item.key, change.to) else {
            return Ok(());
        };
        let Some(stage) = tx.stage(stage_id)? else {
            return Ok(());
        };

        for user in &stage.settings.default_assignees {
            if tx.assign(task, *user)? {
                debug!(%task, %user, stage = %stage_id, "stage default assignee added");
                outbox.job(
                    NOTIFY_TASK_ASSIGNED,
                    json!({ "task": task, "user": user, "by": change.actor }),
                );
            }
        }
        if let Some(status) = stage.settings.default_task_status {
            tx.set_task_status(task, status)?;
        }
        Ok(())
    }
}
