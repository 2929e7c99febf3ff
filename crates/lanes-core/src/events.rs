//! Domain events and the notification queue seam.
//!
//! Services collect [`Event`]s while a transaction is open and hand them to
//! the [`Dispatcher`] only after commit, so sinks never observe rolled-back
//! work. Notifications are fire-and-forget jobs pushed to a [`JobQueue`].

use crate::model::{BoardId, ItemKey, LabelId, Partition, StageId, TaskId, UserId};
use crate::position::Position;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Queued when a top-level task lands in a different stage.
pub const NOTIFY_TASK_STAGE_CHANGED: &str = "notify.task_stage_changed";
/// Queued when a task is archived.
pub const NOTIFY_TASK_ARCHIVED: &str = "notify.task_archived";
/// Queued when stage defaults add an assignee.
pub const NOTIFY_TASK_ASSIGNED: &str = "notify.task_assigned";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "board.created")]
    BoardCreated { board: BoardId, actor: UserId },
    #[serde(rename = "stage.created")]
    StageCreated {
        stage: StageId,
        board: BoardId,
        actor: UserId,
    },
    #[serde(rename = "task.created")]
    TaskCreated {
        task: TaskId,
        partition: Partition,
        actor: UserId,
    },
    #[serde(rename = "label.created")]
    LabelCreated {
        label: LabelId,
        board: BoardId,
        actor: UserId,
    },
    #[serde(rename = "item.moved")]
    ItemMoved {
        key: ItemKey,
        from: Partition,
        to: Partition,
        position: Position,
        renumbered: bool,
        actor: UserId,
    },
    #[serde(rename = "partition.reordered")]
    PartitionReordered {
        partition: Partition,
        order: Vec<ItemKey>,
        actor: UserId,
    },
    #[serde(rename = "item.archived")]
    ItemArchived {
        key: ItemKey,
        partition: Partition,
        actor: UserId,
    },
    #[serde(rename = "item.restored")]
    ItemRestored {
        key: ItemKey,
        partition: Partition,
        position: Position,
        actor: UserId,
    },
    #[serde(rename = "item.deleted")]
    ItemDeleted {
        key: ItemKey,
        partition: Partition,
        actor: UserId,
    },
    #[serde(rename = "partition.reindexed")]
    PartitionReindexed {
        partition: Partition,
        changed: usize,
        actor: UserId,
    },
    #[serde(rename = "board.cloned")]
    BoardCloned {
        source: BoardId,
        board: BoardId,
        actor: UserId,
    },
    #[serde(rename = "task.cloned")]
    TaskCloned {
        source: TaskId,
        task: TaskId,
        actor: UserId,
    },
}

impl Event {
    /// Dotted event name, also used as the serialized `event` tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BoardCreated { .. } => "board.created",
            Self::StageCreated { .. } => "stage.created",
            Self::TaskCreated { .. } => "task.created",
            Self::LabelCreated { .. } => "label.created",
            Self::ItemMoved { .. } => "item.moved",
            Self::PartitionReordered { .. } => "partition.reordered",
            Self::ItemArchived { .. } => "item.archived",
            Self::ItemRestored { .. } => "item.restored",
            Self::ItemDeleted { .. } => "item.deleted",
            Self::PartitionReindexed { .. } => "partition.reindexed",
            Self::BoardCloned { .. } => "board.cloned",
            Self::TaskCloned { .. } => "task.cloned",
        }
    }
}

/// Receives committed events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

impl<F> EventSink for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn emit(&self, event: &Event) {
        self(event);
    }
}

/// Fans events out to every subscribed sink, in subscription order.
#[derive(Default)]
pub struct Dispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: impl EventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn dispatch(&self, events: &[Event]) {
        for event in events {
            for sink in &self.sinks {
                sink.emit(event);
            }
        }
    }
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(event = event.name(), %payload, "event");
    }
}

/// Keeps every event in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(Event::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Background job intake. Delivery, retries and transport are someone
/// else's problem.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, name: &str, payload: Value);
}

/// Drops every job.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullQueue;

impl JobQueue for NullQueue {
    fn enqueue(&self, _name: &str, _payload: Value) {}
}

/// Logs every job at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingQueue;

impl JobQueue for TracingQueue {
    fn enqueue(&self, name: &str, payload: Value) {
        info!(job = name, %payload, "job enqueued");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub name: String,
    pub payload: Value,
}

/// Keeps every job in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    jobs: Arc<Mutex<Vec<QueuedJob>>>,
}

impl RecordingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn jobs(&self) -> Vec<QueuedJob> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl JobQueue for RecordingQueue {
    fn enqueue(&self, name: &str, payload: Value) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(QueuedJob {
                name: name.to_string(),
                payload,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::{Dispatcher, Event, JobQueue, RecordingQueue, RecordingSink};
    use crate::model::{BoardId, ItemKey, Partition, StageId, TaskId, UserId};
    use crate::position::Position;
    use serde_json::json;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn moved() -> Event {
        Event::ItemMoved {
            key: ItemKey::Task(TaskId::new(3)),
            from: Partition::Stage(StageId::new(1)),
            to: Partition::Stage(StageId::new(2)),
            position: Position::nth(1),
            renumbered: false,
            actor: UserId::new(1),
        }
    }

    #[test]
    fn serialized_tag_matches_name() {
        let event = moved();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(value["key"], "task:3");
        assert_eq!(value["to"], "stage:2");
    }

    #[test]
    fn dispatcher_reaches_closures_and_recorders() {
        let recorder = RecordingSink::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let mut dispatcher = Dispatcher::new();
        dispatcher.subscribe(recorder.clone());
        dispatcher.subscribe(move |_: &Event| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&[
            Event::BoardCreated {
                board: BoardId::new(1),
                actor: UserId::new(1),
            },
            moved(),
        ]);

        assert_eq!(recorder.names(), vec!["board.created", "item.moved"]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn recording_queue_keeps_order() {
        let queue = RecordingQueue::new();
        queue.enqueue("a", json!({"n": 1}));
        queue.enqueue("b", json!({"n": 2}));
        let names: Vec<_> = queue.jobs().into_iter().map(|job| job.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
