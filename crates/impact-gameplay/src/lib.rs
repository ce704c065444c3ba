//! # Impact Gameplay
//!
//! Impact resolution for melee and projectile hits.
//!
//! This crate provides:
//! - Pooled collision contexts with generation-checked handles
//! - Condition and action pipelines built from RON assets
//! - Built-in actions (damage, force, audio, particles, states, ricochets)
//! - Per-source multi-hit suppression
//! - Delayed actions and timed state resets on a simulation-clock scheduler
//! - Melee hit detection with swept hitboxes and shield redirection
//! - An event bus for ricochets, stopped attacks and named events
//!
//! The world is reached only through the [`SpatialQuery`] and
//! [`SceneQuery`] traits and side effects only through [`ImpactEffects`],
//! so any physics or scene backend can drive it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod actions;
pub mod attack;
pub mod builtin_actions;
pub mod collision_data;
pub mod conditional;
pub mod conditions;
pub mod context;
pub mod damage_data;
pub mod detector;
pub mod effects;
pub mod events;
pub mod hit_tracking;
pub mod hitbox;
pub mod modifiers;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod ricochet;
pub mod scheduler;
pub mod shield;
pub mod system;
pub mod testing;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::actions::*;
    pub use crate::attack::*;
    pub use crate::builtin_actions::*;
    pub use crate::collision_data::*;
    pub use crate::conditional::*;
    pub use crate::conditions::*;
    pub use crate::context::*;
    pub use crate::damage_data::*;
    pub use crate::detector::*;
    pub use crate::effects::*;
    pub use crate::events::*;
    pub use crate::hit_tracking::*;
    pub use crate::hitbox::*;
    pub use crate::modifiers::*;
    pub use crate::pipeline::*;
    pub use crate::pool::*;
    pub use crate::registry::*;
    pub use crate::ricochet::*;
    pub use crate::scheduler::*;
    pub use crate::shield::*;
    pub use crate::system::*;
    pub use crate::world::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use impact_common::{LayerMask, SourceId};
    use crate::testing::{MockWorld, RecordingEffects};

    #[test]
    fn test_asset_to_damage_end_to_end() {
        let Ok(asset) = PipelineAsset::from_ron(
            r#"(
                conditions: [(kind: "target_behavior")],
                on_success: [(kind: "simple_damage", params: (amount: 30.0))],
            )"#,
        ) else {
            panic!("pipeline asset should parse");
        };
        let registry = VariantRegistry::with_builtins();
        let mut system = ImpactSystem::default();

        let mut world = MockWorld::new();
        let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
        let target = world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        let body = world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);
        let mut effects = RecordingEffects::new();

        let Ok(built) = registry.build_pipeline(&asset) else {
            panic!("pipeline should build from builtins");
        };
        let pipeline = system.register_pipeline(built, ImpactOwner::character(attacker));
        let Some(body_info) = world.collider_info(body).cloned() else {
            panic!("body collider missing");
        };

        let context = system.acquire_context();
        if let Ok(ctx) = system.context_mut(context) {
            ctx.collision
                .initialize(SourceId::new(1), Vec3::new(0.0, 1.0, 1.5), Vec3::Z, 1.0);
            ctx.collision.set_target(&body_info, &world);
            ctx.collision.set_batch(LayerMask::layer(1), &[body]);
        }
        let outcome = system.resolve(pipeline, context, false, &world, &mut effects);
        assert!(system.release_context(context).is_ok());

        assert_eq!(outcome, ImpactOutcome::Passed);
        assert_eq!(effects.damaged_entities(), vec![target]);
        assert_eq!(system.pool_stats().in_use, 0);

        world.set_impact_veto(target, true);
        let context = system.acquire_context();
        if let Ok(ctx) = system.context_mut(context) {
            ctx.collision
                .initialize(SourceId::new(2), Vec3::new(0.0, 1.0, 1.5), Vec3::Z, 1.0);
            ctx.collision.set_target(&body_info, &world);
        }
        let outcome = system.resolve(pipeline, context, false, &world, &mut effects);
        assert!(system.release_context(context).is_ok());
        assert_eq!(outcome, ImpactOutcome::Failed);
        assert_eq!(effects.damage_requests().len(), 1);
    }
}
