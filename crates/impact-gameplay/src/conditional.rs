//! Nested sub-pipeline action.

use impact_common::SourceId;
use tracing::error;

use crate::actions::{ActionFlow, ImpactAction, ImpactActionGroup, ImpactEnv, Teardown};
use crate::conditions::ImpactActionConditionGroup;
use crate::context::ImpactOwner;
use crate::pool::ContextHandle;
use crate::scheduler::ScheduledEntry;

/// Runs nested conditions and dispatches to a pass or fail group.
///
/// The nested groups are owned by this action; initialize, reset and
/// destroy recurse into them.
#[derive(Debug, Default)]
pub struct ConditionalAction {
    conditions: ImpactActionConditionGroup,
    on_pass: ImpactActionGroup,
    on_fail: ImpactActionGroup,
    /// Clear the context's damage data before running the fail group.
    pub reset_damage_on_fail: bool,
}

impl ConditionalAction {
    /// Creates a conditional action from its parts.
    #[must_use]
    pub fn new(
        conditions: ImpactActionConditionGroup,
        on_pass: ImpactActionGroup,
        on_fail: ImpactActionGroup,
    ) -> Self {
        Self {
            conditions,
            on_pass,
            on_fail,
            reset_damage_on_fail: false,
        }
    }

    /// Sets the damage reset policy.
    #[must_use]
    pub fn with_reset_damage_on_fail(mut self, reset: bool) -> Self {
        self.reset_damage_on_fail = reset;
        self
    }

    /// Nested conditions.
    #[must_use]
    pub const fn conditions(&self) -> &ImpactActionConditionGroup {
        &self.conditions
    }

    /// Group run when the nested conditions pass.
    #[must_use]
    pub const fn on_pass(&self) -> &ImpactActionGroup {
        &self.on_pass
    }

    /// Group run when the nested conditions fail.
    #[must_use]
    pub const fn on_fail(&self) -> &ImpactActionGroup {
        &self.on_fail
    }
}

impl ImpactAction for ConditionalAction {
    fn kind(&self) -> &'static str {
        "conditional"
    }

    fn initialize(&mut self, owner: &ImpactOwner) {
        self.conditions.initialize(owner);
        self.on_pass.initialize(owner);
        self.on_fail.initialize(owner);
    }

    fn on_impact(&mut self, context: ContextHandle, force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let passed = match env.pool.get(context) {
            Ok(ctx) => self.conditions.can_impact(ctx, env.world),
            Err(err) => {
                error!("Conditional action lost its context: {}", err);
                return ActionFlow::Continue;
            }
        };

        let result = if passed {
            self.on_pass.on_impact(context, force, env)
        } else {
            if self.reset_damage_on_fail {
                if let Ok(ctx) = env.pool.get_mut(context) {
                    if let Some(damage) = ctx.damage_mut() {
                        damage.reset();
                    }
                }
            }
            self.on_fail.on_impact(context, force, env)
        };
        result.unwrap_or_default()
    }

    fn fire_scheduled(&mut self, entry: &ScheduledEntry, env: &mut ImpactEnv<'_>) -> bool {
        self.on_pass.fire_scheduled(entry, env) || self.on_fail.fire_scheduled(entry, env)
    }

    fn reset(&mut self, source: SourceId) {
        self.on_pass.reset(source);
        self.on_fail.reset(source);
    }

    fn destroy(&mut self, teardown: &mut Teardown<'_>) {
        self.on_pass.destroy(teardown);
        self.on_fail.destroy(teardown);
    }
}
