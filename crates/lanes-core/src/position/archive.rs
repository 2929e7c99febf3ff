//! Archive gate: the single predicate deciding who takes part in ordering.

use super::Position;
use crate::model::OrderedItem;

/// Stateless policy consulted before any item participates in rank math.
///
/// Archived items hold [`ArchiveGate::position_for_archived`] and never
/// reserve a slot in their partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveGate;

impl ArchiveGate {
    #[must_use]
    pub const fn is_active(item: &OrderedItem) -> bool {
        item.archived_at_us.is_none()
    }

    #[must_use]
    pub const fn position_for_archived() -> Position {
        Position::ZERO
    }

    /// Filter a listing down to the items that take part in ordering.
    pub fn active(items: &[OrderedItem]) -> impl Iterator<Item = &OrderedItem> {
        items.iter().filter(|item| Self::is_active(item))
    }
}

#[cfg(test)]
mod tests {
    use super::ArchiveGate;
    use crate::model::{ItemKey, OrderedItem, Partition, StageId, TaskId};
    use crate::position::Position;

    fn item(id: i64, archived: bool) -> OrderedItem {
        OrderedItem {
            key: ItemKey::Task(TaskId::new(id)),
            partition: Partition::Stage(StageId::new(1)),
            position: if archived {
                Position::ZERO
            } else {
                Position::nth(id)
            },
            archived_at_us: archived.then_some(100),
            updated_at_us: 1,
            revision: 0,
        }
    }

    #[test]
    fn archived_items_are_filtered() {
        let items = vec![item(1, false), item(2, true), item(3, false)];
        let active: Vec<_> = ArchiveGate::active(&items).map(|i| i.key).collect();
        assert_eq!(
            active,
            vec![ItemKey::Task(TaskId::new(1)), ItemKey::Task(TaskId::new(3))]
        );
    }

    #[test]
    fn sentinel_is_zero() {
        assert_eq!(ArchiveGate::position_for_archived(), Position::ZERO);
        assert!(!ArchiveGate::is_active(&item(4, true)));
    }
}
