//! Condition group plus success/failure action groups.

use impact_common::SourceId;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::actions::{ImpactActionGroup, ImpactEnv, Teardown};
use crate::conditions::ImpactActionConditionGroup;
use crate::context::ImpactOwner;
use crate::pool::ContextHandle;
use crate::scheduler::ScheduledEntry;

/// Identifier of a pipeline registered with an [`ImpactSystem`](crate::system::ImpactSystem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineId(u32);

impl PipelineId {
    /// Creates a pipeline ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Result of resolving one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactOutcome {
    /// Conditions passed; success actions ran.
    Passed,
    /// A condition vetoed; failure actions ran.
    Failed,
    /// The context was stale or uninitialized, or the pipeline unknown;
    /// nothing ran.
    Invalid,
}

impl ImpactOutcome {
    /// Whether the conditions passed.
    #[must_use]
    pub const fn passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// A full impact pipeline.
#[derive(Debug, Default)]
pub struct ImpactPipeline {
    conditions: ImpactActionConditionGroup,
    on_success: ImpactActionGroup,
    on_failure: ImpactActionGroup,
    owner: Option<ImpactOwner>,
}

impl ImpactPipeline {
    /// Creates a pipeline from its groups.
    #[must_use]
    pub fn new(
        conditions: ImpactActionConditionGroup,
        on_success: ImpactActionGroup,
        on_failure: ImpactActionGroup,
    ) -> Self {
        Self {
            conditions,
            on_success,
            on_failure,
            owner: None,
        }
    }

    /// A pipeline without conditions or failure actions.
    #[must_use]
    pub fn from_actions(on_success: ImpactActionGroup) -> Self {
        Self::new(ImpactActionConditionGroup::new(), on_success, ImpactActionGroup::new())
    }

    /// Binds every group to the owner.
    pub fn initialize(&mut self, owner: ImpactOwner) {
        self.conditions.initialize(&owner);
        self.on_success.initialize(&owner);
        self.on_failure.initialize(&owner);
        self.owner = Some(owner);
    }

    /// Owner the pipeline was initialized with.
    #[must_use]
    pub const fn owner(&self) -> Option<ImpactOwner> {
        self.owner
    }

    /// Evaluates the conditions and runs the matching action group.
    pub fn resolve(&mut self, context: ContextHandle, force: bool, env: &mut ImpactEnv<'_>) -> ImpactOutcome {
        let passed = match env.pool.get(context) {
            Ok(ctx) if !ctx.collision.is_initialized() => {
                error!("Pipeline {:?} resolved with an uninitialized context", env.pipeline);
                return ImpactOutcome::Invalid;
            }
            Ok(ctx) => self.conditions.can_impact(ctx, env.world),
            Err(err) => {
                error!("Pipeline {:?} resolved with invalid context: {}", env.pipeline, err);
                return ImpactOutcome::Invalid;
            }
        };

        let group = if passed {
            &mut self.on_success
        } else {
            &mut self.on_failure
        };
        match group.on_impact(context, force, env) {
            Ok(_) if passed => ImpactOutcome::Passed,
            Ok(_) => ImpactOutcome::Failed,
            Err(_) => ImpactOutcome::Invalid,
        }
    }

    /// Offers a due entry to the action groups.
    pub fn fire_scheduled(&mut self, entry: &ScheduledEntry, env: &mut ImpactEnv<'_>) -> bool {
        self.on_success.fire_scheduled(entry, env) || self.on_failure.fire_scheduled(entry, env)
    }

    /// Clears per-source suppression and chain state.
    pub fn reset(&mut self, source: SourceId) {
        self.on_success.reset(source);
        self.on_failure.reset(source);
    }

    /// Cancels all pending work.
    pub fn destroy(&mut self, teardown: &mut Teardown<'_>) {
        self.on_success.destroy(teardown);
        self.on_failure.destroy(teardown);
    }

    /// Condition group.
    #[must_use]
    pub const fn conditions(&self) -> &ImpactActionConditionGroup {
        &self.conditions
    }

    /// Mutable condition group.
    pub fn conditions_mut(&mut self) -> &mut ImpactActionConditionGroup {
        &mut self.conditions
    }

    /// Success actions.
    #[must_use]
    pub const fn on_success(&self) -> &ImpactActionGroup {
        &self.on_success
    }

    /// Mutable success actions.
    pub fn on_success_mut(&mut self) -> &mut ImpactActionGroup {
        &mut self.on_success
    }

    /// Failure actions.
    #[must_use]
    pub const fn on_failure(&self) -> &ImpactActionGroup {
        &self.on_failure
    }

    /// Mutable failure actions.
    pub fn on_failure_mut(&mut self) -> &mut ImpactActionGroup {
        &mut self.on_failure
    }

    /// Delayed invocations waiting in this pipeline.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.on_success.pending_count() + self.on_failure.pending_count()
    }
}
