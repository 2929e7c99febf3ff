//! Rank → position allocation with renumber-on-exhaustion.
//!
//! Given the siblings of a partition, [`PositionAllocator::allocate`] returns
//! the position that places an item at a 1-based rank:
//!
//! - rank 1 halves the first sibling's position
//! - past the end appends one whole unit after the last sibling
//! - anywhere else takes the midpoint of the two neighbours
//!
//! When the candidate would sit closer than [`PositionPolicy::min_gap`] to a
//! neighbour (or to the archived sentinel `0`), the lane is renumbered to
//! `1..N` and the allocation retried once. Only siblings whose value actually
//! changed are reported back, so callers write exactly those rows.

use super::{ArchiveGate, Position};
use crate::error::{Error, Result};
use crate::model::{ItemKey, OrderedItem};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tunables for position allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionPolicy {
    /// Smallest raw distance tolerated between neighbouring positions.
    #[serde(default = "default_min_gap")]
    pub min_gap: i64,
}

impl Default for PositionPolicy {
    fn default() -> Self {
        Self {
            min_gap: default_min_gap(),
        }
    }
}

impl PositionPolicy {
    /// Reject policies under which the post-renumber retry could collide.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] unless `1 <= min_gap <= UNIT / 2`.
    pub fn validated(self) -> Result<Self> {
        if self.min_gap < 1 || self.min_gap > Position::UNIT / 2 {
            return Err(Error::validation(format!(
                "positions.min_gap must be between 1 and {}, got {}",
                Position::UNIT / 2,
                self.min_gap
            )));
        }
        Ok(self)
    }
}

const fn default_min_gap() -> i64 {
    1
}

/// Result of placing one item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Allocation {
    pub position: Position,
    /// True when the lane had to be renumbered to make room.
    pub renumbered: bool,
    /// Siblings whose stored position must change, in rank order.
    pub shifted: Vec<(ItemKey, Position)>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: ItemKey,
    position: Position,
}

/// Active siblings in rank order, minus the item being placed.
fn lane(siblings: &[OrderedItem], excluded: Option<ItemKey>) -> Vec<Entry> {
    let mut entries: Vec<Entry> = ArchiveGate::active(siblings)
        .filter(|item| Some(item.key) != excluded)
        .map(|item| Entry {
            key: item.key,
            position: item.position,
        })
        .collect();
    entries.sort_by_key(|entry| (entry.position, entry.key.raw_id()));
    entries
}

const fn clamp_rank(new_index: usize, len: usize) -> usize {
    if new_index < 1 {
        1
    } else if new_index > len + 1 {
        len + 1
    } else {
        new_index
    }
}

/// Computes positions for inserts and moves inside one partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionAllocator {
    policy: PositionPolicy,
}

impl PositionAllocator {
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] for an unusable policy.
    pub fn new(policy: PositionPolicy) -> Result<Self> {
        Ok(Self {
            policy: policy.validated()?,
        })
    }

    #[must_use]
    pub const fn policy(&self) -> PositionPolicy {
        self.policy
    }

    /// Position that puts an item at 1-based rank `new_index` among
    /// `siblings`, ignoring `excluded` (the item being moved).
    #[must_use]
    pub fn allocate(
        &self,
        siblings: &[OrderedItem],
        excluded: Option<ItemKey>,
        new_index: usize,
    ) -> Allocation {
        let entries = lane(siblings, excluded);
        let rank = clamp_rank(new_index, entries.len());

        if let Some(position) = self.slot(&entries, rank) {
            debug!(rank, position = %position, "allocated without renumber");
            return Allocation {
                position,
                renumbered: false,
                shifted: Vec::new(),
            };
        }

        let renumbered = sequential(&entries);
        let position = self
            .slot(&renumbered, rank)
            .unwrap_or_else(|| fresh_slot(rank, renumbered.len()));
        let shifted = changed(&entries, &renumbered);
        debug!(
            rank,
            position = %position,
            shifted = shifted.len(),
            "resolution exhausted, lane renumbered"
        );

        Allocation {
            position,
            renumbered: true,
            shifted,
        }
    }

    /// Position for a new item at the end of the lane.
    #[must_use]
    pub fn append(&self, siblings: &[OrderedItem]) -> Allocation {
        self.allocate(siblings, None, usize::MAX)
    }

    /// Rewrite every active sibling to `1..N`, keeping rank order.
    ///
    /// Returns only the siblings whose value changes.
    #[must_use]
    pub fn renumber(siblings: &[OrderedItem]) -> Vec<(ItemKey, Position)> {
        let entries = lane(siblings, None);
        changed(&entries, &sequential(&entries))
    }

    fn slot(&self, entries: &[Entry], rank: usize) -> Option<Position> {
        let min_gap = self.policy.min_gap;
        let Some(first) = entries.first() else {
            return Some(Position::nth(1));
        };

        if rank == 1 {
            let candidate = first.position.halved();
            let clear_of_zero = Position::ZERO.gap_to(candidate) >= min_gap;
            let clear_of_first = candidate.gap_to(first.position) >= min_gap;
            return (clear_of_zero && clear_of_first).then_some(candidate);
        }

        if rank > entries.len() {
            return entries.last().and_then(|last| last.position.checked_next());
        }

        let lower = entries[rank - 2].position;
        let upper = entries[rank - 1].position;
        let candidate = Position::midpoint(lower, upper);
        (lower.gap_to(candidate) >= min_gap && candidate.gap_to(upper) >= min_gap)
            .then_some(candidate)
    }
}

fn sequential(entries: &[Entry]) -> Vec<Entry> {
    entries
        .iter()
        .zip(1_i64..)
        .map(|(entry, n)| Entry {
            key: entry.key,
            position: Position::nth(n),
        })
        .collect()
}

fn changed(before: &[Entry], after: &[Entry]) -> Vec<(ItemKey, Position)> {
    before
        .iter()
        .zip(after)
        .filter(|(old, new)| old.position != new.position)
        .map(|(_, new)| (new.key, new.position))
        .collect()
}

/// Slot in a lane already numbered `1..len`.
fn fresh_slot(rank: usize, len: usize) -> Position {
    let rank = i64::try_from(rank).unwrap_or(i64::MAX);
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    if rank > len {
        Position::nth(len.saturating_add(1))
    } else {
        Position::from_raw(Position::nth(rank - 1).raw() + Position::UNIT / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::{PositionAllocator, PositionPolicy};
    use crate::model::{ItemKey, OrderedItem, Partition, StageId, TaskId};
    use crate::position::Position;

    fn task(id: i64, raw: i64) -> OrderedItem {
        OrderedItem {
            key: ItemKey::Task(TaskId::new(id)),
            partition: Partition::Stage(StageId::new(1)),
            position: Position::from_raw(raw),
            archived_at_us: None,
            updated_at_us: 0,
            revision: 0,
        }
    }

    fn whole(id: i64, n: i64) -> OrderedItem {
        task(id, Position::nth(n).raw())
    }

    fn allocator() -> PositionAllocator {
        PositionAllocator::default()
    }

    #[test]
    fn empty_partition_starts_at_one() {
        let allocation = allocator().allocate(&[], None, 1);
        assert_eq!(allocation.position, Position::nth(1));
        assert!(!allocation.renumbered);
    }

    #[test]
    fn rank_one_halves_first_sibling() {
        let siblings = [whole(1, 1), whole(2, 2), whole(3, 3)];
        let allocation = allocator().allocate(&siblings, Some(siblings[2].key), 1);
        assert_eq!(allocation.position.to_string(), "0.5");
        assert!(allocation.shifted.is_empty());
    }

    #[test]
    fn past_end_appends_whole_unit() {
        let siblings = [whole(1, 1), whole(2, 4)];
        let allocation = allocator().allocate(&siblings, None, 99);
        assert_eq!(allocation.position, Position::nth(5));
    }

    #[test]
    fn middle_rank_averages_neighbours() {
        let siblings = [whole(1, 1), whole(2, 2), whole(3, 3)];
        let allocation = allocator().allocate(&siblings, None, 3);
        assert_eq!(allocation.position.to_string(), "2.5");
    }

    #[test]
    fn zero_rank_clamps_to_first() {
        let siblings = [whole(1, 2)];
        let allocation = allocator().allocate(&siblings, None, 0);
        assert_eq!(allocation.position, Position::nth(1));
    }

    #[test]
    fn excluded_item_does_not_collide_with_itself() {
        let siblings = [whole(1, 1), whole(2, 2)];
        let allocation = allocator().allocate(&siblings, Some(siblings[1].key), 2);
        assert_eq!(allocation.position, Position::nth(2));
    }

    #[test]
    fn archived_siblings_do_not_reserve_slots() {
        let mut archived = whole(2, 0);
        archived.archived_at_us = Some(5);
        let siblings = [whole(1, 1), archived, whole(3, 2)];
        let allocation = allocator().allocate(&siblings, None, 2);
        assert_eq!(allocation.position.to_string(), "1.5");
    }

    #[test]
    fn exhausted_head_renumbers_and_retries() {
        let siblings = [task(1, 1), task(2, 2), task(3, 3)];
        let allocation = allocator().allocate(&siblings, None, 1);
        assert!(allocation.renumbered);
        assert_eq!(allocation.position.to_string(), "0.5");
        assert_eq!(
            allocation.shifted,
            vec![
                (siblings[0].key, Position::nth(1)),
                (siblings[1].key, Position::nth(2)),
                (siblings[2].key, Position::nth(3)),
            ]
        );
    }

    #[test]
    fn colliding_midpoint_renumbers() {
        let siblings = [task(1, 10), task(2, 11), task(3, 50)];
        let allocation = allocator().allocate(&siblings, None, 2);
        assert!(allocation.renumbered);
        assert_eq!(allocation.position.to_string(), "1.5");
    }

    #[test]
    fn tied_positions_renumber_in_id_order() {
        let siblings = [whole(2, 1), whole(1, 1)];
        let allocation = allocator().allocate(&siblings, None, 2);
        assert!(allocation.renumbered);
        assert_eq!(allocation.shifted, vec![(siblings[0].key, Position::nth(2))]);
    }

    #[test]
    fn larger_min_gap_renumbers_earlier() {
        let strict = PositionAllocator::new(PositionPolicy { min_gap: 1000 }).unwrap();
        let siblings = [task(1, 1500)];
        let allocation = strict.allocate(&siblings, None, 1);
        assert!(allocation.renumbered);
        assert_eq!(allocation.position.to_string(), "0.5");
    }

    #[test]
    fn invalid_policy_is_rejected() {
        assert!(PositionAllocator::new(PositionPolicy { min_gap: 0 }).is_err());
        assert!(
            PositionAllocator::new(PositionPolicy {
                min_gap: Position::UNIT
            })
            .is_err()
        );
    }

    #[test]
    fn append_overflow_renumbers() {
        let siblings = [whole(1, 1), task(2, i64::MAX - 1)];
        let allocation = allocator().append(&siblings);
        assert!(allocation.renumbered);
        assert_eq!(allocation.position, Position::nth(3));
    }

    #[test]
    fn renumber_reports_only_changed_items() {
        let siblings = [whole(1, 1), whole(2, 5), whole(3, 9)];
        let changed = PositionAllocator::renumber(&siblings);
        assert_eq!(
            changed,
            vec![
                (siblings[1].key, Position::nth(2)),
                (siblings[2].key, Position::nth(3)),
            ]
        );
    }
}
