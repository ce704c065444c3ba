//! Effect sink interface through which impact actions touch the world.
//!
//! Damage, force, audio, particles and state changes are owned by other
//! systems. Actions only issue requests through [`ImpactEffects`].

use glam::Vec3;
use impact_common::{
    AudioClipId, ColliderId, EntityId, ParticleInstanceId, ParticlePrefabId, RigidBodyId,
    SurfaceImpactId,
};

use crate::damage_data::ImpactDamageData;
use crate::world::{
    AttributeHostHandle, DamageTargetHandle, ForceReceiverHandle, HealthHandle, KnockbackHandle,
};

/// Damage request handed to a damage target.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageRequest {
    /// Final damage amount.
    pub amount: f32,
    /// World position of the hit.
    pub position: Vec3,
    /// Direction of the hit.
    pub direction: Vec3,
    /// Force magnitude to apply along `direction`.
    pub force: f32,
    /// Frames over which the force is spread.
    pub force_frames: u32,
    /// Explosion-style radius (0 for a point hit).
    pub radius: f32,
    /// Attacking entity.
    pub attacker: Option<EntityId>,
    /// Collider that was struck.
    pub collider: Option<ColliderId>,
}

impl DamageRequest {
    /// Builds a request from damage data and hit geometry.
    #[must_use]
    pub fn from_damage_data(
        data: &ImpactDamageData,
        amount: f32,
        position: Vec3,
        direction: Vec3,
    ) -> Self {
        Self {
            amount,
            position,
            direction,
            force: data.impact_force,
            force_frames: data.force_frames,
            radius: data.radius,
            attacker: None,
            collider: None,
        }
    }
}

/// Object that receives a force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceTarget {
    /// A simulated rigid body.
    RigidBody(RigidBodyId),
    /// An entity exposing a force-receiver capability.
    Receiver(ForceReceiverHandle),
}

/// Particle spawn request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSpawn {
    /// Prefab to instantiate.
    pub prefab: ParticlePrefabId,
    /// World position.
    pub position: Vec3,
    /// Facing direction.
    pub direction: Vec3,
    /// Entity the particle follows, if parented.
    pub parent: Option<EntityId>,
    /// Whether the particle loops until explicitly stopped.
    pub looping: bool,
}

/// Surface effect spawn request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceEffectSpawn {
    /// Surface impact set to use.
    pub surface: SurfaceImpactId,
    /// Collider whose surface was struck.
    pub collider: Option<ColliderId>,
    /// World position.
    pub position: Vec3,
    /// Surface normal.
    pub normal: Vec3,
    /// Strength of the impact.
    pub strength: f32,
}

/// Side effects available to impact actions.
///
/// Every method is a request. Implementations decide what to do with it.
pub trait ImpactEffects {
    /// Applies damage to a damage target.
    fn apply_damage(&mut self, target: DamageTargetHandle, request: &DamageRequest);

    /// Adds a force at a point.
    fn add_force(&mut self, target: ForceTarget, force: Vec3, point: Vec3, frames: u32);

    /// Adds a torque to a rigid body.
    fn add_torque(&mut self, body: RigidBodyId, torque: Vec3);

    /// Heals an entity. Returns `false` if nothing was healed.
    fn heal(&mut self, target: HealthHandle, amount: f32) -> bool;

    /// Adds `delta` to a named attribute. Returns `false` if the attribute does not exist.
    fn modify_attribute(&mut self, host: AttributeHostHandle, attribute: &str, delta: f32) -> bool;

    /// Plays a one-shot audio clip at a position.
    fn play_audio(&mut self, clip: AudioClipId, position: Vec3, volume: f32);

    /// Spawns a particle, returning its instance handle if the prefab is valid.
    fn spawn_particle(&mut self, spawn: &ParticleSpawn) -> Option<ParticleInstanceId>;

    /// Moves a live particle. Returns `false` if the instance is gone.
    fn move_particle(&mut self, instance: ParticleInstanceId, position: Vec3, direction: Vec3) -> bool;

    /// Spawns the effects of a surface impact.
    fn spawn_surface_effect(&mut self, spawn: &SurfaceEffectSpawn);

    /// Activates or deactivates a named state on an entity.
    fn set_state(&mut self, entity: EntityId, state: &str, active: bool);

    /// Starts a knockback reaction.
    fn knockback(&mut self, target: KnockbackHandle, direction: Vec3, strength: f32);

    /// Notifies that a shield absorbed part of a hit.
    fn shield_absorbed(&mut self, _wielder: EntityId, _absorbed: f32) {}
}
