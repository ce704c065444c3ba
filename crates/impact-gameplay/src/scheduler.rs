//! Cooperative delayed-work queue.
//!
//! Nothing runs asynchronously. Entries wait until the simulation clock
//! passes their due time and are then popped, in due order, by the owning
//! [`ImpactSystem`](crate::system::ImpactSystem) during `update`.

use impact_common::EntityId;
use tracing::debug;

use crate::pipeline::PipelineId;
use crate::pool::ContextHandle;

/// Identifier of a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleId(u64);

impl ScheduleId {
    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Work to perform when an entry comes due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledTask {
    /// Run a delayed action with its duplicated context.
    InvokeAction {
        /// Pooled duplicate owned by the entry
        context: ContextHandle,
    },
    /// Switch a named state back off.
    DisableState {
        /// Entity carrying the state
        entity: EntityId,
        /// State name
        state: String,
    },
}

/// A pending piece of work.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEntry {
    /// Entry identifier
    pub id: ScheduleId,
    /// Simulation time (seconds) at which the entry fires
    pub due: f64,
    /// Pipeline that scheduled the entry
    pub owner: PipelineId,
    /// Work to perform
    pub task: ScheduledTask,
}

/// Time-ordered queue of delayed work.
#[derive(Debug, Default)]
pub struct ImpactScheduler {
    now: f64,
    next_id: u64,
    entries: Vec<ScheduledEntry>,
}

impl ImpactScheduler {
    /// Creates an empty scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation time in seconds.
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.now
    }

    /// Queues `task` to run `delay` seconds from now.
    pub fn schedule(&mut self, delay: f32, owner: PipelineId, task: ScheduledTask) -> ScheduleId {
        let id = ScheduleId(self.next_id);
        self.next_id += 1;
        let due = self.now + f64::from(delay.max(0.0));

        // Entries with equal due time keep insertion order.
        let index = self.entries.partition_point(|entry| entry.due <= due);
        self.entries.insert(
            index,
            ScheduledEntry {
                id,
                due,
                owner,
                task,
            },
        );
        debug!("Scheduled {:?} for t={:.3}", id, due);
        id
    }

    /// Removes an entry before it fires, handing back its task.
    pub fn cancel(&mut self, id: ScheduleId) -> Option<ScheduledTask> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index).task)
    }

    /// Removes every entry scheduled by `owner`.
    pub fn cancel_owner(&mut self, owner: PipelineId) -> Vec<ScheduledEntry> {
        let (cancelled, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.owner == owner);
        self.entries = kept;
        cancelled
    }

    /// Moves the clock forward.
    pub fn advance(&mut self, dt: f32) {
        self.now += f64::from(dt.max(0.0));
    }

    /// Pops the earliest entry whose due time has been reached.
    pub fn pop_due(&mut self) -> Option<ScheduledEntry> {
        if self.entries.first()?.due <= self.now {
            Some(self.entries.remove(0))
        } else {
            None
        }
    }

    /// Number of entries waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries waiting for `owner`.
    #[must_use]
    pub fn pending_for(&self, owner: PipelineId) -> usize {
        self.entries.iter().filter(|entry| entry.owner == owner).count()
    }

    /// Whether an entry is still waiting.
    #[must_use]
    pub fn is_pending(&self, id: ScheduleId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }
}
