//! Impact subsystem instance.
//!
//! [`ImpactSystem`] owns every piece of mutable impact state: the context
//! pool, the delayed-work scheduler, the attribute modifiers, the event bus
//! and the registered pipelines. Nothing is global, so dropping or
//! destroying tears down deterministically.

use impact_common::{ImpactError, ImpactResult, PoolError, SourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::actions::{ImpactEnv, Teardown};
use crate::context::{ImpactCallbackContext, ImpactOwner};
use crate::effects::ImpactEffects;
use crate::events::ImpactEventBus;
use crate::modifiers::AttributeModifierPool;
use crate::pipeline::{ImpactOutcome, ImpactPipeline, PipelineId};
use crate::pool::{ContextHandle, ContextPool, PoolStats};
use crate::scheduler::{ImpactScheduler, ScheduledTask};
use crate::world::ImpactWorld;

/// Impact subsystem settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    /// Contexts created up front
    pub initial_pool_capacity: usize,
    /// Maximum results per spatial query
    pub max_collision_count: usize,
    /// Impact event bus capacity
    pub event_capacity: usize,
    /// Attribute modifiers created up front
    pub modifier_capacity: usize,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            initial_pool_capacity: 32,
            max_collision_count: 50,
            event_capacity: 256,
            modifier_capacity: 16,
        }
    }
}

impl ImpactConfig {
    /// Clamps values to sensible ranges.
    pub fn validate(&mut self) {
        self.initial_pool_capacity = self.initial_pool_capacity.clamp(1, 4096);
        self.max_collision_count = self.max_collision_count.clamp(1, 1024);
        self.event_capacity = self.event_capacity.clamp(16, 65536);
        self.modifier_capacity = self.modifier_capacity.min(4096);
    }
}

/// Builds an [`ImpactEnv`] from disjoint fields of the system.
macro_rules! impact_env {
    ($system:ident, $pipeline:expr, $world:expr, $effects:expr) => {
        ImpactEnv {
            pool: &mut $system.pool,
            scheduler: &mut $system.scheduler,
            modifiers: &mut $system.modifiers,
            world: $world,
            effects: &mut *$effects,
            events: &$system.events,
            pipeline: $pipeline,
            max_collisions: $system.config.max_collision_count,
        }
    };
}

/// Owner of all impact resolution state.
#[derive(Debug)]
pub struct ImpactSystem {
    config: ImpactConfig,
    pool: ContextPool,
    scheduler: ImpactScheduler,
    modifiers: AttributeModifierPool,
    events: ImpactEventBus,
    pipelines: Vec<Option<ImpactPipeline>>,
}

impl Default for ImpactSystem {
    fn default() -> Self {
        Self::new(ImpactConfig::default())
    }
}

impl ImpactSystem {
    /// Creates a system, pre-populating its pools.
    #[must_use]
    pub fn new(mut config: ImpactConfig) -> Self {
        config.validate();
        info!(
            "Impact system ready: {} contexts, {} max collisions",
            config.initial_pool_capacity, config.max_collision_count
        );
        Self {
            pool: ContextPool::with_capacity(config.initial_pool_capacity),
            scheduler: ImpactScheduler::new(),
            modifiers: AttributeModifierPool::with_capacity(config.modifier_capacity),
            events: ImpactEventBus::new(config.event_capacity),
            pipelines: Vec::new(),
            config,
        }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn config(&self) -> &ImpactConfig {
        &self.config
    }

    // === Pipelines ===

    /// Initializes `pipeline` with its owner and takes ownership of it.
    pub fn register_pipeline(&mut self, mut pipeline: ImpactPipeline, owner: ImpactOwner) -> PipelineId {
        pipeline.initialize(owner);
        let id = PipelineId::new(self.pipelines.len() as u32);
        self.pipelines.push(Some(pipeline));
        debug!("Registered pipeline {:?} for {}", id, owner.character);
        id
    }

    /// Destroys a pipeline, cancelling every delayed invocation it scheduled
    /// and releasing their contexts.
    pub fn destroy_pipeline(&mut self, id: PipelineId) -> ImpactResult<()> {
        let mut pipeline = self
            .pipelines
            .get_mut(id.raw() as usize)
            .and_then(Option::take)
            .ok_or(ImpactError::UnknownPipeline(id.raw()))?;

        let mut teardown = Teardown {
            pool: &mut self.pool,
            scheduler: &mut self.scheduler,
        };
        pipeline.destroy(&mut teardown);

        for entry in self.scheduler.cancel_owner(id) {
            if let ScheduledTask::InvokeAction { context } = entry.task {
                warn!("Untracked delayed invocation {:?} cancelled", entry.id);
                self.pool.release(context)?;
            }
        }
        info!("Destroyed pipeline {:?}", id);
        Ok(())
    }

    /// A registered pipeline.
    #[must_use]
    pub fn pipeline(&self, id: PipelineId) -> Option<&ImpactPipeline> {
        self.pipelines.get(id.raw() as usize)?.as_ref()
    }

    /// A registered pipeline, mutably (enable/delay toggling).
    pub fn pipeline_mut(&mut self, id: PipelineId) -> Option<&mut ImpactPipeline> {
        self.pipelines.get_mut(id.raw() as usize)?.as_mut()
    }

    /// Clears multi-hit and chain state for `source` in a pipeline.
    pub fn reset_source(&mut self, id: PipelineId, source: SourceId) {
        match self.pipeline_mut(id) {
            Some(pipeline) => pipeline.reset(source),
            None => warn!("Reset of {} on unknown pipeline {:?}", source, id),
        }
    }

    // === Contexts ===

    /// Takes a reset context from the pool.
    pub fn acquire_context(&mut self) -> ContextHandle {
        self.pool.acquire()
    }

    /// Borrows a live context.
    pub fn context(&self, handle: ContextHandle) -> Result<&ImpactCallbackContext, PoolError> {
        self.pool.get(handle)
    }

    /// Mutably borrows a live context.
    pub fn context_mut(&mut self, handle: ContextHandle) -> Result<&mut ImpactCallbackContext, PoolError> {
        self.pool.get_mut(handle)
    }

    /// Returns a context to the pool.
    pub fn release_context(&mut self, handle: ContextHandle) -> Result<(), PoolError> {
        self.pool.release(handle)
    }

    // === Resolution ===

    /// Runs a context through a pipeline.
    ///
    /// The caller keeps ownership of `context`; delayed actions work on
    /// their own duplicates, so it can be released right after.
    pub fn resolve(
        &mut self,
        id: PipelineId,
        context: ContextHandle,
        force: bool,
        world: &dyn ImpactWorld,
        effects: &mut dyn ImpactEffects,
    ) -> ImpactOutcome {
        let Some(pipeline) = self
            .pipelines
            .get_mut(id.raw() as usize)
            .and_then(Option::as_mut)
        else {
            error!("Resolve on unknown pipeline {:?}", id);
            return ImpactOutcome::Invalid;
        };

        if let Ok(ctx) = self.pool.get_mut(context) {
            if ctx.owner.is_none() {
                ctx.owner = pipeline.owner();
            }
        }

        let mut env = impact_env!(self, id, world, effects);
        pipeline.resolve(context, force, &mut env)
    }

    /// Advances the clock, fires due delayed work and ticks modifiers.
    pub fn update(&mut self, dt: f32, world: &dyn ImpactWorld, effects: &mut dyn ImpactEffects) {
        self.scheduler.advance(dt);

        while let Some(entry) = self.scheduler.pop_due() {
            match &entry.task {
                ScheduledTask::InvokeAction { context } => {
                    let context = *context;
                    let consumed = match self
                        .pipelines
                        .get_mut(entry.owner.raw() as usize)
                        .and_then(Option::as_mut)
                    {
                        Some(pipeline) => {
                            let mut env = impact_env!(self, entry.owner, world, effects);
                            pipeline.fire_scheduled(&entry, &mut env)
                        }
                        None => false,
                    };
                    if !consumed {
                        error!("Delayed invocation {:?} has no owner", entry.id);
                        if let Err(err) = self.pool.release(context) {
                            error!("Orphaned context release failed: {}", err);
                        }
                    }
                }
                ScheduledTask::DisableState { entity, state } => {
                    effects.set_state(*entity, state, false);
                }
            }
        }

        self.modifiers.update(self.scheduler.now(), effects);
    }

    // === Inspection ===

    /// Context pool counters.
    #[must_use]
    pub const fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Entries waiting in the scheduler.
    #[must_use]
    pub fn pending_schedules(&self) -> usize {
        self.scheduler.pending()
    }

    /// Current simulation time in seconds.
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.scheduler.now()
    }

    /// Event bus carrying ricochets, stops and named events.
    #[must_use]
    pub const fn events(&self) -> &ImpactEventBus {
        &self.events
    }

    /// Running attribute modifiers.
    #[must_use]
    pub const fn modifiers(&self) -> &AttributeModifierPool {
        &self.modifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionSlot, ImpactActionGroup};
    use crate::builtin_actions::{ApplyStateAction, HealAction, InvokeEventAction, SimpleDamageAction};
    use crate::conditional::ConditionalAction;
    use crate::conditions::{ImpactActionConditionGroup, ProjectileCondition};
    use crate::damage_data::ImpactDamageData;
    use crate::testing::{MockWorld, RecordedEffect, RecordingEffects};
    use glam::Vec3;
    use impact_common::{ColliderId, EntityId};

    struct Fixture {
        system: ImpactSystem,
        world: MockWorld,
        effects: RecordingEffects,
        attacker: EntityId,
        target: EntityId,
        collider: ColliderId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut world = MockWorld::new();
            let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
            let target = world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
            let collider = world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);
            Self {
                system: ImpactSystem::new(ImpactConfig {
                    initial_pool_capacity: 4,
                    ..ImpactConfig::default()
                }),
                world,
                effects: RecordingEffects::new(),
                attacker,
                target,
                collider,
            }
        }

        fn register(&mut self, actions: ImpactActionGroup) -> PipelineId {
            self.system
                .register_pipeline(ImpactPipeline::from_actions(actions), ImpactOwner::character(self.attacker))
        }

        fn hit(&mut self, source: u32, collider: ColliderId) -> ContextHandle {
            let handle = self.system.acquire_context();
            let info = self.world.collider_info(collider).cloned();
            if let (Ok(ctx), Some(info)) = (self.system.context_mut(handle), info) {
                ctx.collision
                    .initialize(SourceId::new(source), info.pose.position, Vec3::Z, 1.0);
                ctx.collision.set_target(&info, &self.world);
                ctx.collision.source_character = Some(self.attacker);
            }
            handle
        }

        fn resolve(&mut self, pipeline: PipelineId, context: ContextHandle, force: bool) -> ImpactOutcome {
            self.system
                .resolve(pipeline, context, force, &self.world, &mut self.effects)
        }

        fn damage_count(&self) -> usize {
            self.effects.count(|e| matches!(e, RecordedEffect::Damage { .. }))
        }
    }

    #[test]
    fn test_multi_hit_suppressed_without_force() {
        let mut fx = Fixture::new();
        let pipeline = fx.register(ImpactActionGroup::new().with(SimpleDamageAction::default()));

        let first = fx.hit(7, fx.collider);
        assert_eq!(fx.resolve(pipeline, first, false), ImpactOutcome::Passed);
        let second = fx.hit(7, fx.collider);
        fx.resolve(pipeline, second, false);
        assert_eq!(fx.damage_count(), 1);

        let forced = fx.hit(7, fx.collider);
        fx.resolve(pipeline, forced, true);
        assert_eq!(fx.damage_count(), 2);
    }

    #[test]
    fn test_force_reaches_conditional_branches() {
        let mut fx = Fixture::new();
        let nested = ConditionalAction::new(
            ImpactActionConditionGroup::new(),
            ImpactActionGroup::new().with(SimpleDamageAction::default()),
            ImpactActionGroup::new(),
        );
        let pipeline = fx.register(
            ImpactActionGroup::new()
                .with(nested)
                .with(SimpleDamageAction::default()),
        );

        let first = fx.hit(7, fx.collider);
        assert_eq!(fx.resolve(pipeline, first, true), ImpactOutcome::Passed);
        let second = fx.hit(7, fx.collider);
        assert_eq!(fx.resolve(pipeline, second, true), ImpactOutcome::Passed);
        assert_eq!(fx.damage_count(), 4);
    }

    #[test]
    fn test_uninitialized_context_is_rejected() {
        let mut fx = Fixture::new();
        let pipeline = fx.register(ImpactActionGroup::new().with(InvokeEventAction::default()));

        let context = fx.system.acquire_context();
        assert_eq!(fx.resolve(pipeline, context, false), ImpactOutcome::Invalid);
        assert_eq!(fx.system.events().pending_count(), 0);
        assert!(fx.system.release_context(context).is_ok());
    }

    #[test]
    fn test_reset_source_allows_new_cast() {
        let mut fx = Fixture::new();
        let pipeline = fx.register(ImpactActionGroup::new().with(SimpleDamageAction::default()));

        let a = fx.hit(7, fx.collider);
        fx.resolve(pipeline, a, false);
        fx.system.reset_source(pipeline, SourceId::new(7));
        let b = fx.hit(7, fx.collider);
        fx.resolve(pipeline, b, false);
        assert_eq!(fx.damage_count(), 2);
    }

    #[test]
    fn test_released_context_is_invalid() {
        let mut fx = Fixture::new();
        let pipeline = fx.register(ImpactActionGroup::new().with(SimpleDamageAction::default()));

        let handle = fx.hit(1, fx.collider);
        assert!(fx.system.release_context(handle).is_ok());
        assert_eq!(fx.resolve(pipeline, handle, false), ImpactOutcome::Invalid);
        assert!(fx.effects.records().is_empty());
        assert_eq!(
            fx.resolve(PipelineId::new(99), handle, false),
            ImpactOutcome::Invalid
        );
    }

    #[test]
    fn test_delayed_actions_see_duplicated_data() {
        let mut fx = Fixture::new();
        let pipeline = fx.register(
            ImpactActionGroup::new()
                .with_slot(ActionSlot::new(Box::new(SimpleDamageAction::default())).with_delay(0.1))
                .with_slot(ActionSlot::new(Box::new(SimpleDamageAction::default())).with_delay(0.2)),
        );

        let original = fx.hit(3, fx.collider);
        if let Ok(ctx) = fx.system.context_mut(original) {
            ctx.set_damage(&ImpactDamageData::with_amount(12.0));
        }
        fx.resolve(pipeline, original, false);
        assert_eq!(fx.system.pending_schedules(), 2);

        // The caller reuses its context for something else right away.
        if let Ok(ctx) = fx.system.context_mut(original) {
            ctx.collision.position = Vec3::splat(100.0);
            ctx.set_damage(&ImpactDamageData::with_amount(999.0));
        }
        assert!(fx.system.release_context(original).is_ok());

        fx.system.update(0.25, &fx.world, &mut fx.effects);
        let damages = fx.effects.damage_requests();
        assert_eq!(damages.len(), 2);
        for (_, request) in damages {
            assert_eq!(request.amount, 12.0);
            assert_ne!(request.position, Vec3::splat(100.0));
        }
        assert_eq!(fx.system.pool_stats().in_use, 0);
    }

    #[test]
    fn test_destroy_cancels_pending_and_releases() {
        let mut fx = Fixture::new();
        let pipeline = fx.register(
            ImpactActionGroup::new()
                .with_slot(ActionSlot::new(Box::new(SimpleDamageAction::default())).with_delay(0.5))
                .with_slot(ActionSlot::new(Box::new(SimpleDamageAction::default())).with_delay(0.5)),
        );

        let context = fx.hit(1, fx.collider);
        fx.resolve(pipeline, context, false);
        assert!(fx.system.release_context(context).is_ok());
        assert_eq!(fx.system.pool_stats().in_use, 2);

        assert!(fx.system.destroy_pipeline(pipeline).is_ok());
        fx.system.update(5.0, &fx.world, &mut fx.effects);

        assert_eq!(fx.damage_count(), 0);
        assert_eq!(fx.system.pending_schedules(), 0);
        assert_eq!(fx.system.pool_stats().in_use, 0);
        assert!(matches!(
            fx.system.destroy_pipeline(pipeline),
            Err(ImpactError::UnknownPipeline(_))
        ));
    }

    #[test]
    fn test_condition_failure_runs_failure_branch() {
        let mut fx = Fixture::new();
        let conditions = ImpactActionConditionGroup::new().with(ProjectileCondition {
            allow_projectile: true,
            allow_direct: false,
        });
        let pipeline = fx.system.register_pipeline(
            ImpactPipeline::new(
                conditions,
                ImpactActionGroup::new().with(SimpleDamageAction::default()),
                ImpactActionGroup::new().with(ApplyStateAction {
                    state: "parried".to_string(),
                    ..ApplyStateAction::default()
                }),
            ),
            ImpactOwner::character(fx.attacker),
        );

        let context = fx.hit(1, fx.collider);
        assert_eq!(fx.resolve(pipeline, context, false), ImpactOutcome::Failed);
        assert_eq!(fx.damage_count(), 0);
        assert_eq!(
            fx.effects.count(|e| matches!(e, RecordedEffect::State { active: true, .. })),
            1
        );
    }

    #[test]
    fn test_state_disabled_after_timer() {
        let mut fx = Fixture::new();
        let pipeline = fx.register(ImpactActionGroup::new().with(ApplyStateAction {
            state: "stunned".to_string(),
            disable_timer: 1.0,
            apply_to_source: false,
        }));

        let context = fx.hit(1, fx.collider);
        fx.resolve(pipeline, context, false);
        fx.system.update(0.5, &fx.world, &mut fx.effects);
        assert_eq!(fx.effects.count(|e| matches!(e, RecordedEffect::State { active: false, .. })), 0);

        fx.system.update(0.5, &fx.world, &mut fx.effects);
        let target = fx.target;
        assert_eq!(
            fx.effects.count(|e| matches!(
                e,
                RecordedEffect::State { entity, active: false, .. } if *entity == target
            )),
            1
        );
    }

    #[test]
    fn test_heal_interrupt_skips_remaining_actions() {
        let mut fx = Fixture::new();
        fx.world.set_capabilities(fx.target, Default::default());
        let pipeline = fx.register(
            ImpactActionGroup::new()
                .with(HealAction {
                    amount: 5.0,
                    interrupt_on_missing_target: true,
                })
                .with(ApplyStateAction {
                    state: "healed".to_string(),
                    ..ApplyStateAction::default()
                }),
        );
        let context = fx.hit(1, fx.collider);
        fx.resolve(pipeline, context, false);
        assert!(fx.effects.records().is_empty());
    }

    #[test]
    fn test_conditional_resets_damage_on_fail() {
        let mut fx = Fixture::new();
        let nested = ConditionalAction::new(
            ImpactActionConditionGroup::new().with(ProjectileCondition {
                allow_projectile: true,
                allow_direct: false,
            }),
            ImpactActionGroup::new(),
            ImpactActionGroup::new().with(SimpleDamageAction {
                amount: 3.0,
                ..SimpleDamageAction::default()
            }),
        )
        .with_reset_damage_on_fail(true);
        let pipeline = fx.register(ImpactActionGroup::new().with(nested));

        let context = fx.hit(1, fx.collider);
        if let Ok(ctx) = fx.system.context_mut(context) {
            ctx.set_damage(&ImpactDamageData::with_amount(50.0));
        }
        assert_eq!(fx.resolve(pipeline, context, false), ImpactOutcome::Passed);

        let damages = fx.effects.damage_requests();
        assert_eq!(damages.len(), 1);
        assert_eq!(damages[0].1.amount, 0.0);
    }

    #[test]
    fn test_config_validate_clamps() {
        let mut config = ImpactConfig {
            initial_pool_capacity: 0,
            max_collision_count: 100_000,
            event_capacity: 1,
            modifier_capacity: 8,
        };
        config.validate();
        assert_eq!(config.initial_pool_capacity, 1);
        assert_eq!(config.max_collision_count, 1024);
        assert_eq!(config.event_capacity, 16);
    }
}
