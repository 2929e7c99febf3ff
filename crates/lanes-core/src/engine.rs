//! Wiring of store, allocator, locks, clock and collaborators.

use crate::access::{AccessPolicy, AllowAll, ensure_board_access};
use crate::clock::MonotonicClock;
use crate::error::Result;
use crate::events::{Dispatcher, EventSink, JobQueue, NullQueue};
use crate::lock::PartitionLocks;
use crate::model::{BoardId, UserId};
use crate::position::{PositionAllocator, PositionPolicy};
use crate::service::{
    BoardService, CloneExpander, Outbox, PartitionChangeHook, ReorderService, StageDefaults,
};
use crate::store::Store;

/// Shared state behind every service.
pub struct Engine<S: Store> {
    store: S,
    allocator: PositionAllocator,
    locks: PartitionLocks,
    clock: MonotonicClock,
    access: Box<dyn AccessPolicy>,
    dispatcher: Dispatcher,
    queue: Box<dyn JobQueue>,
    hooks: Vec<Box<dyn PartitionChangeHook>>,
}

impl<S: Store> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("allocator", &self.allocator)
            .field("dispatcher", &self.dispatcher)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl<S: Store> Engine<S> {
    /// Engine with default policy, no access rules and the stage defaults
    /// hook.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            allocator: PositionAllocator::default(),
            locks: PartitionLocks::new(),
            clock: MonotonicClock::new(),
            access: Box::new(AllowAll),
            dispatcher: Dispatcher::new(),
            queue: Box::new(NullQueue),
            hooks: vec![Box::new(StageDefaults)],
        }
    }

    #[must_use]
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder::new(store)
    }

    #[must_use]
    pub fn reorder(&self) -> ReorderService<'_, S> {
        ReorderService::new(self)
    }

    #[must_use]
    pub fn cloner(&self) -> CloneExpander<'_, S> {
        CloneExpander::new(self)
    }

    #[must_use]
    pub fn boards(&self) -> BoardService<'_, S> {
        BoardService::new(self)
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn allocator(&self) -> &PositionAllocator {
        &self.allocator
    }

    pub(crate) const fn locks(&self) -> &PartitionLocks {
        &self.locks
    }

    pub(crate) const fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    pub(crate) fn access(&self) -> &dyn AccessPolicy {
        self.access.as_ref()
    }

    pub(crate) fn ensure_access(&self, actor: UserId, board: BoardId) -> Result<()> {
        ensure_board_access(self.access.as_ref(), actor, board)
    }

    pub(crate) fn hooks(&self) -> impl Iterator<Item = &dyn PartitionChangeHook> {
        self.hooks.iter().map(AsRef::as_ref)
    }

    /// Release buffered events and jobs. Call only after commit.
    pub(crate) fn publish(&self, outbox: Outbox) {
        self.dispatcher.dispatch(&outbox.events);
        for (name, payload) in outbox.jobs {
            self.queue.enqueue(&name, payload);
        }
    }
}

/// Step-by-step [`Engine`] configuration.
pub struct EngineBuilder<S: Store> {
    store: S,
    policy: PositionPolicy,
    access: Box<dyn AccessPolicy>,
    dispatcher: Dispatcher,
    queue: Box<dyn JobQueue>,
    hooks: Vec<Box<dyn PartitionChangeHook>>,
    stage_defaults: bool,
}

impl<S: Store> EngineBuilder<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: PositionPolicy::default(),
            access: Box::new(AllowAll),
            dispatcher: Dispatcher::new(),
            queue: Box::new(NullQueue),
            hooks: Vec::new(),
            stage_defaults: true,
        }
    }

    #[must_use]
    pub const fn policy(mut self, policy: PositionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn access(mut self, access: impl AccessPolicy + 'static) -> Self {
        self.access = Box::new(access);
        self
    }

    #[must_use]
    pub fn boxed_access(mut self, access: Box<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn queue(mut self, queue: impl JobQueue + 'static) -> Self {
        self.queue = Box::new(queue);
        self
    }

    #[must_use]
    pub fn subscribe(mut self, sink: impl EventSink + 'static) -> Self {
        self.dispatcher.subscribe(sink);
        self
    }

    /// Register an extra hook; hooks run in registration order after the
    /// built-in stage defaults.
    #[must_use]
    pub fn hook(mut self, hook: impl PartitionChangeHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    #[must_use]
    pub const fn without_stage_defaults(mut self) -> Self {
        self.stage_defaults = false;
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`](crate::error::Error::ValidationFailed)
    /// for an unusable position policy.
    pub fn build(self) -> Result<Engine<S>> {
        let mut hooks: Vec<Box<dyn PartitionChangeHook>> = Vec::new();
        if self.stage_defaults {
            hooks.push(Box::new(StageDefaults));
        }
        hooks.extend(self.hooks);

        Ok(Engine {
            store: self.store,
            allocator: PositionAllocator::new(self.policy)?,
            locks: PartitionLocks::new(),
            clock: MonotonicClock::new(),
            access: self.access,
            dispatcher: self.dispatcher,
            queue: self.queue,
            hooks,
        })
    }
}
