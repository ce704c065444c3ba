//! Action pipeline: effects executed for an impact.
//!
//! An [`ImpactActionGroup`] is an ordered list of [`ActionSlot`]s. Each slot
//! wraps one action variant and owns its multi-hit registry and its pending
//! delayed invocations, so destroying the group cancels exactly the work it
//! scheduled.

use std::fmt;

use impact_common::{PoolError, SourceId};
use tracing::{debug, error, warn};

use crate::context::ImpactOwner;
use crate::effects::ImpactEffects;
use crate::events::ImpactEventBus;
use crate::hit_tracking::HitRegistry;
use crate::modifiers::AttributeModifierPool;
use crate::pipeline::PipelineId;
use crate::pool::{ContextHandle, ContextPool};
use crate::scheduler::{ImpactScheduler, ScheduleId, ScheduledEntry, ScheduledTask};
use crate::world::ImpactWorld;

/// What the group does after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionFlow {
    /// Run the next action.
    #[default]
    Continue,
    /// Skip the remaining actions of this group.
    Interrupt,
}

/// Everything an action may touch while it runs.
pub struct ImpactEnv<'a> {
    /// Context pool holding the context being resolved.
    pub pool: &'a mut ContextPool,
    /// Delayed-work queue.
    pub scheduler: &'a mut ImpactScheduler,
    /// Running attribute modifiers.
    pub modifiers: &'a mut AttributeModifierPool,
    /// Scene and spatial queries.
    pub world: &'a dyn ImpactWorld,
    /// Effect sink.
    pub effects: &'a mut dyn ImpactEffects,
    /// Outgoing events.
    pub events: &'a ImpactEventBus,
    /// Pipeline being resolved.
    pub pipeline: PipelineId,
    /// Maximum results per spatial query.
    pub max_collisions: usize,
}

/// Borrow set used when tearing down actions.
#[derive(Debug)]
pub struct Teardown<'a> {
    /// Pool receiving released duplicates.
    pub pool: &'a mut ContextPool,
    /// Queue holding the pending entries.
    pub scheduler: &'a mut ImpactScheduler,
}

impl fmt::Debug for ImpactEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpactEnv")
            .field("pipeline", &self.pipeline)
            .field("now", &self.scheduler.now())
            .field("contexts_in_use", &self.pool.in_use())
            .finish_non_exhaustive()
    }
}

/// An effect executed for a qualifying impact.
pub trait ImpactAction: fmt::Debug {
    /// Stable type tag.
    fn kind(&self) -> &'static str;

    /// Binds the action to the pipeline owner.
    fn initialize(&mut self, _owner: &ImpactOwner) {}

    /// Executes the action. `force` is the caller's request to bypass
    /// multi-hit suppression and must reach nested groups unchanged.
    ///
    /// Configuration problems are logged and turn the call into a no-op.
    fn on_impact(&mut self, context: ContextHandle, force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow;

    /// Offers a due entry to nested groups. Returns `true` if it was consumed.
    fn fire_scheduled(&mut self, _entry: &ScheduledEntry, _env: &mut ImpactEnv<'_>) -> bool {
        false
    }

    /// Clears per-source state when `source` starts a new cast.
    fn reset(&mut self, _source: SourceId) {}

    /// Cancels nested pending work before the action is dropped.
    fn destroy(&mut self, _teardown: &mut Teardown<'_>) {}
}

/// An action with its runtime settings and bookkeeping.
#[derive(Debug)]
pub struct ActionSlot {
    /// Disabled actions are skipped.
    pub enabled: bool,
    /// Seconds between the impact and the action running (0 = immediately).
    pub delay: f32,
    /// Fire again for a target already hit by the same source.
    pub allow_multi_hits: bool,
    hits: HitRegistry,
    pending: Vec<(ScheduleId, ContextHandle, bool)>,
    invocations: u64,
    action: Box<dyn ImpactAction>,
}

impl ActionSlot {
    /// Wraps an enabled, immediate, single-hit action.
    #[must_use]
    pub fn new(action: Box<dyn ImpactAction>) -> Self {
        Self {
            enabled: true,
            delay: 0.0,
            allow_multi_hits: false,
            hits: HitRegistry::new(),
            pending: Vec::new(),
            invocations: 0,
            action,
        }
    }

    /// Sets the delay in seconds.
    #[must_use]
    pub fn with_delay(mut self, delay: f32) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    /// Sets the multi-hit policy.
    #[must_use]
    pub fn with_multi_hits(mut self, allow: bool) -> Self {
        self.allow_multi_hits = allow;
        self
    }

    /// Sets the enable flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The wrapped action.
    #[must_use]
    pub fn action(&self) -> &dyn ImpactAction {
        self.action.as_ref()
    }

    /// Times the action actually ran (immediately or delayed).
    #[must_use]
    pub const fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Delayed invocations waiting to fire.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Hit registry for inspection.
    #[must_use]
    pub const fn hits(&self) -> &HitRegistry {
        &self.hits
    }

    /// Applies multi-hit suppression, then runs or schedules the action.
    pub fn try_invoke(&mut self, context: ContextHandle, force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let (source, target) = match env.pool.get(context) {
            Ok(ctx) => (ctx.collision.source_id, ctx.collision.target_entity),
            Err(err) => {
                error!("Action '{}' given invalid context: {}", self.action.kind(), err);
                return ActionFlow::Continue;
            }
        };

        if let Some(target) = target {
            let first_hit = self.hits.record(source, target);
            if !first_hit && !self.allow_multi_hits && !force {
                debug!(
                    "Action '{}' already hit {} for {}",
                    self.action.kind(),
                    target,
                    source
                );
                return ActionFlow::Continue;
            }
        }

        if self.delay > 0.0 {
            match env.pool.duplicate(context) {
                Ok(copy) => {
                    let id = env.scheduler.schedule(
                        self.delay,
                        env.pipeline,
                        ScheduledTask::InvokeAction { context: copy },
                    );
                    self.pending.push((id, copy, force));
                    debug!("Action '{}' delayed by {}s", self.action.kind(), self.delay);
                }
                Err(err) => error!("Failed to duplicate context: {}", err),
            }
            return ActionFlow::Continue;
        }

        self.invocations += 1;
        self.action.on_impact(context, force, env)
    }

    /// Runs a due delayed invocation owned by this slot (or a nested group).
    pub fn fire_scheduled(&mut self, entry: &ScheduledEntry, env: &mut ImpactEnv<'_>) -> bool {
        let Some(index) = self.pending.iter().position(|(id, _, _)| *id == entry.id) else {
            return self.action.fire_scheduled(entry, env);
        };

        let (_, context, force) = self.pending.swap_remove(index);
        self.invocations += 1;
        self.action.on_impact(context, force, env);
        if let Err(err) = env.pool.release(context) {
            error!("Delayed context release failed: {}", err);
        }
        true
    }

    /// Clears suppression state for `source`.
    pub fn reset(&mut self, source: SourceId) {
        self.hits.reset(source);
        self.action.reset(source);
    }

    /// Cancels pending invocations and releases their contexts.
    pub fn destroy(&mut self, teardown: &mut Teardown<'_>) {
        for (id, context, _) in self.pending.drain(..) {
            if teardown.scheduler.cancel(id).is_none() {
                warn!("Pending {:?} was no longer scheduled", id);
            }
            if let Err(err) = teardown.pool.release(context) {
                error!("Cancelled context release failed: {}", err);
            }
        }
        self.hits.clear();
        self.action.destroy(teardown);
    }
}

/// Ordered list of actions run for an impact.
#[derive(Debug, Default)]
pub struct ImpactActionGroup {
    actions: Vec<ActionSlot>,
}

impl ImpactActionGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action slot.
    pub fn push(&mut self, slot: ActionSlot) {
        self.actions.push(slot);
    }

    /// Appends an action slot (builder form).
    #[must_use]
    pub fn with_slot(mut self, slot: ActionSlot) -> Self {
        self.push(slot);
        self
    }

    /// Appends an immediate single-hit action (builder form).
    #[must_use]
    pub fn with(self, action: impl ImpactAction + 'static) -> Self {
        self.with_slot(ActionSlot::new(Box::new(action)))
    }

    /// Binds every action to the pipeline owner.
    pub fn initialize(&mut self, owner: &ImpactOwner) {
        for slot in &mut self.actions {
            slot.action.initialize(owner);
        }
    }

    /// Runs the enabled actions in order.
    ///
    /// An invalid or uninitialized context is a caller bug: it is logged
    /// and nothing runs.
    pub fn on_impact(
        &mut self,
        context: ContextHandle,
        force: bool,
        env: &mut ImpactEnv<'_>,
    ) -> Result<ActionFlow, PoolError> {
        let initialized = env.pool.get(context).and_then(|ctx| {
            if ctx.collision.is_initialized() {
                Ok(())
            } else {
                Err(PoolError::Uninitialized)
            }
        });
        if let Err(err) = initialized {
            error!("Action group invoked with invalid context: {}", err);
            return Err(err);
        }

        for slot in self.actions.iter_mut().filter(|slot| slot.enabled) {
            if slot.try_invoke(context, force, env) == ActionFlow::Interrupt {
                debug!("Action '{}' interrupted the group", slot.action.kind());
                return Ok(ActionFlow::Interrupt);
            }
        }
        Ok(ActionFlow::Continue)
    }

    /// Offers a due entry to each slot until one consumes it.
    pub fn fire_scheduled(&mut self, entry: &ScheduledEntry, env: &mut ImpactEnv<'_>) -> bool {
        self.actions
            .iter_mut()
            .any(|slot| slot.fire_scheduled(entry, env))
    }

    /// Clears per-source state in every action.
    pub fn reset(&mut self, source: SourceId) {
        for slot in &mut self.actions {
            slot.reset(source);
        }
    }

    /// Cancels all pending work of every action.
    pub fn destroy(&mut self, teardown: &mut Teardown<'_>) {
        for slot in &mut self.actions {
            slot.destroy(teardown);
        }
    }

    /// Delayed invocations waiting across all actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.actions.iter().map(ActionSlot::pending_count).sum()
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the group holds no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Read access for inspection.
    #[must_use]
    pub fn slots(&self) -> &[ActionSlot] {
        &self.actions
    }

    /// Mutable access to a slot (enable/delay toggling).
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ActionSlot> {
        self.actions.get_mut(index)
    }
}
