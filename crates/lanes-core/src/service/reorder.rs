//! Moves, bulk reorders, archive/restore, reindex and hard delete.
//!
//! Every operation resolves the item's current partition with a short
//! read, takes the partition locks it will write under, then re-reads and
//! writes inside a single transaction. An item whose partition changed in
//! between fails with `ConcurrencyConflict` rather than being written
//! under the wrong lock.

use super::{Outbox, PartitionChange, apply_shift, resolve_partition_board};
use crate::engine::Engine;
use crate::error::{Error, Missing, Result};
use crate::events::{Event, NOTIFY_TASK_ARCHIVED, NOTIFY_TASK_STAGE_CHANGED};
use crate::model::{BoardId, ItemKey, OrderedItem, Partition, UserId, sort_by_rank};
use crate::position::{ArchiveGate, Position, PositionAllocator};
use crate::store::{Store, StoreTx};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

/// Result of [`ReorderService::move_item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    /// The moved item as stored after the move.
    pub item: OrderedItem,
    /// Partition the item was in before the move.
    pub from: Partition,
    /// True when the destination lane was renumbered to make room.
    pub renumbered: bool,
    /// Siblings whose position changed because of the renumber.
    pub shifted: Vec<(ItemKey, Position)>,
}

pub struct ReorderService<'a, S: Store> {
    engine: &'a Engine<S>,
}

impl<'a, S: Store> ReorderService<'a, S> {
    pub(crate) const fn new(engine: &'a Engine<S>) -> Self {
        Self { engine }
    }

    fn peek(&self, key: ItemKey) -> Result<OrderedItem> {
        let tx = self.engine.store().read()?;
        tx.find_item(key)?
            .ok_or_else(|| Error::not_found(Missing::Item(key)))
    }

    fn authorize(&self, tx: &dyn StoreTx, actor: UserId, partition: Partition) -> Result<BoardId> {
        let board = resolve_partition_board(tx, partition)?;
        self.engine.ensure_access(actor, board)?;
        Ok(board)
    }

    /// Active (or, with `include_archived`, all) items of a partition in
    /// rank order.
    ///
    /// # Errors
    ///
    /// `NotFound`/`InvalidTarget` for a missing partition, `AccessDenied`
    /// when the actor may not read the board.
    pub fn list(
        &self,
        actor: UserId,
        partition: Partition,
        include_archived: bool,
    ) -> Result<Vec<OrderedItem>> {
        let tx = self.engine.store().read()?;
        self.authorize(&tx, actor, partition)?;
        tx.list_partition(partition, include_archived)
    }

    /// Move `key` to 1-based rank `new_index` of `target`.
    ///
    /// `new_index` is clamped to `[1, N + 1]` where `N` counts the active
    /// siblings other than the item itself.
    ///
    /// # Errors
    ///
    /// - `NotFound` for a missing item, target stage or target parent
    /// - `InvalidTarget` for a kind mismatch, a missing target board, a
    ///   stage leaving its board, or an archived item
    /// - `AccessDenied` when the actor lacks access to either board
    /// - `ConcurrencyConflict` when the item changed concurrently
    pub fn move_item(
        &self,
        actor: UserId,
        key: ItemKey,
        target: Partition,
        new_index: usize,
    ) -> Result<MoveOutcome> {
        if !target.accepts(key) {
            return Err(Error::invalid_target(format!(
                "{key} cannot be placed in {target}"
            )));
        }
        let peeked = self.peek(key)?;
        let engine = self.engine;

        let (outcome, outbox) = engine.locks().with_all(&[peeked.partition, target], || {
            let mut tx = engine.store().begin()?;
            let mut outbox = Outbox::new();
            let outcome = self.move_in_tx(&mut tx, actor, &peeked, target, new_index, &mut outbox)?;
            tx.commit()?;
            Ok::<_, Error>((outcome, outbox))
        })?;

        engine.publish(outbox);
        info!(
            %key,
            from = %outcome.from,
            to = %target,
            position = %outcome.item.position,
            renumbered = outcome.renumbered,
            "item moved"
        );
        Ok(outcome)
    }

    fn move_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        actor: UserId,
        peeked: &OrderedItem,
        target: Partition,
        new_index: usize,
        outbox: &mut Outbox,
    ) -> Result<MoveOutcome> {
        let engine = self.engine;
        let clock = engine.clock();
        let item = current(tx, peeked)?;
        if !ArchiveGate::is_active(&item) {
            return Err(Error::invalid_target(format!(
                "{} is archived; restore it before moving",
                item.key
            )));
        }

        let source_board = self.authorize(tx, actor, item.partition)?;
        let target_board = resolve_partition_board(tx, target)?;
        if target_board != source_board {
            engine.ensure_access(actor, target_board)?;
        }
        check_kind(tx, &item, target, source_board, target_board)?;

        let mut siblings = tx.list_partition(target, false)?;
        let now = clock.after(item.updated_at_us);

        if item.partition == target {
            let current_rank = siblings.iter().position(|s| s.key == item.key).map(|i| i + 1);
            let wanted = new_index.clamp(1, siblings.len().max(1));
            if current_rank == Some(wanted) {
                debug!(key = %item.key, rank = wanted, "move to current rank");
                let touched = tx.update_item(&OrderedItem {
                    updated_at_us: now,
                    ..item.clone()
                })?;
                outbox.event(moved_event(actor, &touched, item.partition, false));
                return Ok(MoveOutcome {
                    item: touched,
                    from: item.partition,
                    renumbered: false,
                    shifted: Vec::new(),
                });
            }
        }

        let allocation = engine.allocator().allocate(&siblings, Some(item.key), new_index);
        apply_shift(tx, clock, &mut siblings, &allocation.shifted)?;
        let moved = tx.update_item(&OrderedItem {
            partition: target,
            position: allocation.position,
            updated_at_us: now,
            ..item.clone()
        })?;

        if let ItemKey::Task(task) = item.key
            && target_board != source_board
        {
            tx.clear_labels(task)?;
            for subtask in tx.tasks(Partition::Subtasks(task), true)? {
                tx.clear_labels(subtask.id)?;
            }
        }

        if item.partition != target {
            let change = PartitionChange {
                actor,
                item: &moved,
                from: item.partition,
                to: target,
            };
            for hook in engine.hooks() {
                hook.on_partition_change(tx, &change, outbox)?;
            }
            if let (ItemKey::Task(task), Partition::Stage(from), Partition::Stage(to)) =
                (item.key, item.partition, target)
            {
                outbox.job(
                    NOTIFY_TASK_STAGE_CHANGED,
                    json!({ "task": task, "from": from, "to": to, "by": actor }),
                );
            }
        }

        outbox.event(moved_event(actor, &moved, item.partition, allocation.renumbered));
        Ok(MoveOutcome {
            item: moved,
            from: item.partition,
            renumbered: allocation.renumbered,
            shifted: allocation.shifted,
        })
    }

    /// Place `order` at ranks `1..=len` of `partition`, one after another,
    /// in a single transaction.
    ///
    /// Keys that are not active members of the partition, and repeats, are
    /// ignored. Unlisted members keep their relative order after the listed
    /// ones. Returns the resulting active order.
    ///
    /// # Errors
    ///
    /// `NotFound`/`InvalidTarget` for a missing partition, `AccessDenied`,
    /// or a store failure (which rolls the whole reorder back).
    pub fn apply_full_order(
        &self,
        actor: UserId,
        partition: Partition,
        order: &[ItemKey],
    ) -> Result<Vec<OrderedItem>> {
        let engine = self.engine;
        let clock = engine.clock();

        let (items, outbox) = engine.locks().with(partition, || {
            let mut tx = engine.store().begin()?;
            self.authorize(&tx, actor, partition)?;
            let mut siblings = tx.list_partition(partition, false)?;

            let mut seen = HashSet::new();
            let listed: Vec<ItemKey> = order
                .iter()
                .copied()
                .filter(|key| siblings.iter().any(|s| s.key == *key))
                .filter(|key| seen.insert(*key))
                .collect();

            let mut changed = false;
            for (offset, key) in listed.iter().enumerate() {
                if siblings.get(offset).is_some_and(|s| s.key == *key) {
                    continue;
                }
                let allocation = engine.allocator().allocate(&siblings, Some(*key), offset + 1);
                apply_shift(&mut tx, clock, &mut siblings, &allocation.shifted)?;
                if let Some(slot) = siblings.iter_mut().find(|s| s.key == *key) {
                    let next = OrderedItem {
                        position: allocation.position,
                        updated_at_us: clock.after(slot.updated_at_us),
                        ..slot.clone()
                    };
                    *slot = tx.update_item(&next)?;
                }
                sort_by_rank(&mut siblings);
                changed = true;
            }

            let mut outbox = Outbox::new();
            if changed {
                outbox.event(Event::PartitionReordered {
                    partition,
                    order: siblings.iter().map(|s| s.key).collect(),
                    actor,
                });
            }
            tx.commit()?;
            Ok::<_, Error>((siblings, outbox))
        })?;

        engine.publish(outbox);
        info!(%partition, listed = order.len(), "partition reordered");
        Ok(items)
    }

    /// Park an item at position 0 and mark it archived.
    ///
    /// Archiving an archived item returns it unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied`, `ConcurrencyConflict` or a store failure.
    pub fn archive_item(&self, actor: UserId, key: ItemKey) -> Result<OrderedItem> {
        let peeked = self.peek(key)?;
        let engine = self.engine;

        let (item, outbox) = engine.locks().with(peeked.partition, || {
            let mut tx = engine.store().begin()?;
            let item = current(&tx, &peeked)?;
            self.authorize(&tx, actor, item.partition)?;
            let mut outbox = Outbox::new();
            if !ArchiveGate::is_active(&item) {
                return Ok::<_, Error>((item, outbox));
            }

            let now = engine.clock().after(item.updated_at_us);
            let archived = tx.update_item(&OrderedItem {
                position: ArchiveGate::position_for_archived(),
                archived_at_us: Some(now),
                updated_at_us: now,
                ..item
            })?;
            outbox.event(Event::ItemArchived {
                key,
                partition: archived.partition,
                actor,
            });
            if let ItemKey::Task(task) = key {
                outbox.job(NOTIFY_TASK_ARCHIVED, json!({ "task": task, "by": actor }));
            }
            tx.commit()?;
            Ok((archived, outbox))
        })?;

        engine.publish(outbox);
        info!(%key, "item archived");
        Ok(item)
    }

    /// Bring an archived item back at the end of its partition.
    ///
    /// Restoring an active item returns it unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied`, `ConcurrencyConflict` or a store failure.
    pub fn restore_item(&self, actor: UserId, key: ItemKey) -> Result<OrderedItem> {
        let peeked = self.peek(key)?;
        let engine = self.engine;
        let clock = engine.clock();

        let (item, outbox) = engine.locks().with(peeked.partition, || {
            let mut tx = engine.store().begin()?;
            let item = current(&tx, &peeked)?;
            self.authorize(&tx, actor, item.partition)?;
            let mut outbox = Outbox::new();
            if ArchiveGate::is_active(&item) {
                return Ok::<_, Error>((item, outbox));
            }

            let mut siblings = tx.list_partition(item.partition, false)?;
            let allocation = engine.allocator().append(&siblings);
            apply_shift(&mut tx, clock, &mut siblings, &allocation.shifted)?;
            let restored = tx.update_item(&OrderedItem {
                position: allocation.position,
                archived_at_us: None,
                updated_at_us: clock.after(item.updated_at_us),
                ..item
            })?;
            outbox.event(Event::ItemRestored {
                key,
                partition: restored.partition,
                position: restored.position,
                actor,
            });
            tx.commit()?;
            Ok((restored, outbox))
        })?;

        engine.publish(outbox);
        info!(%key, position = %item.position, "item restored");
        Ok(item)
    }

    /// Rewrite the active members of `partition` to `1..N`, keeping order.
    ///
    /// Returns how many items changed position.
    ///
    /// # Errors
    ///
    /// `NotFound`/`InvalidTarget` for a missing partition, `AccessDenied`,
    /// or a store failure.
    pub fn reindex(&self, actor: UserId, partition: Partition) -> Result<usize> {
        let engine = self.engine;
        let (changed, outbox) = engine.locks().with(partition, || {
            let mut tx = engine.store().begin()?;
            self.authorize(&tx, actor, partition)?;
            let mut siblings = tx.list_partition(partition, false)?;
            let shifted = PositionAllocator::renumber(&siblings);
            apply_shift(&mut tx, engine.clock(), &mut siblings, &shifted)?;

            let mut outbox = Outbox::new();
            outbox.event(Event::PartitionReindexed {
                partition,
                changed: shifted.len(),
                actor,
            });
            tx.commit()?;
            Ok::<_, Error>((shifted.len(), outbox))
        })?;

        engine.publish(outbox);
        info!(%partition, changed, "partition reindexed");
        Ok(changed)
    }

    /// Hard delete with cascade. Remaining siblings keep their positions.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied`, `ConcurrencyConflict` or a store failure.
    pub fn delete_item(&self, actor: UserId, key: ItemKey) -> Result<()> {
        let peeked = self.peek(key)?;
        let engine = self.engine;

        let outbox = engine.locks().with(peeked.partition, || {
            let mut tx = engine.store().begin()?;
            let item = current(&tx, &peeked)?;
            self.authorize(&tx, actor, item.partition)?;
            tx.delete_item(key)?;

            let mut outbox = Outbox::new();
            outbox.event(Event::ItemDeleted {
                key,
                partition: item.partition,
                actor,
            });
            tx.commit()?;
            Ok::<_, Error>(outbox)
        })?;

        engine.publish(outbox);
        info!(%key, "item deleted");
        Ok(())
    }
}

/// Re-read `peeked` inside the transaction, failing if it moved.
fn current(tx: &dyn StoreTx, peeked: &OrderedItem) -> Result<OrderedItem> {
    let item = tx
        .find_item(peeked.key)?
        .ok_or_else(|| Error::not_found(Missing::Item(peeked.key)))?;
    if item.partition != peeked.partition {
        return Err(Error::ConcurrencyConflict {
            key: peeked.key,
            expected: peeked.revision,
        });
    }
    Ok(item)
}

fn check_kind(
    tx: &dyn StoreTx,
    item: &OrderedItem,
    target: Partition,
    source_board: BoardId,
    target_board: BoardId,
) -> Result<()> {
    match (item.key, item.partition, target) {
        (ItemKey::Stage(_), _, Partition::Board(_)) => {
            if source_board == target_board {
                Ok(())
            } else {
                Err(Error::invalid_target("stages move only within their own board"))
            }
        }
        (ItemKey::Task(_), Partition::Stage(_), Partition::Stage(_)) => Ok(()),
        (ItemKey::Task(_), Partition::Subtasks(_), Partition::Subtasks(parent)) => {
            match tx.task(parent)? {
                Some(parent_task) if parent_task.is_subtask() => Err(Error::invalid_target(
                    "subtasks cannot be nested below another subtask",
                )),
                Some(_) => Ok(()),
                None => Err(Error::not_found(Missing::Partition(target))),
            }
        }
        (key, from, to) => Err(Error::invalid_target(format!(
            "{key} cannot move from {from} to {to}"
        ))),
    }
}

fn moved_event(actor: UserId, item: &OrderedItem, from: Partition, renumbered: bool) -> Event {
    Event::ItemMoved {
        key: item.key,
        from,
        to: item.partition,
        position: item.position,
        renumbered,
        actor,
    }
}
