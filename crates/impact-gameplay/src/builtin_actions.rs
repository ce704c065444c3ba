//! Built-in action variants.
//!
//! Each action reads the context through the pool handle and talks to the
//! world only through [`ImpactEffects`](crate::effects::ImpactEffects).
//! Parameters deserialize from RON with every field optional.

use ahash::AHashMap;
use glam::Vec3;
use impact_common::{AudioClipId, ParticleInstanceId, ParticlePrefabId, SourceId, SurfaceImpactId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::actions::{ActionFlow, ImpactAction, ImpactEnv};
use crate::context::{ImpactCallbackContext, ImpactOwner};
use crate::effects::{DamageRequest, ForceTarget, ParticleSpawn, SurfaceEffectSpawn};
use crate::events::ImpactEvent;
use crate::modifiers::ModifierSpec;
use crate::pool::ContextHandle;
use crate::scheduler::ScheduledTask;
use crate::world::{AttributeHostHandle, ImpactWorld};

/// Borrows the context or logs and bails out of the action.
macro_rules! context_or_return {
    ($env:expr, $handle:expr, $kind:expr) => {
        match $env.pool.get($handle) {
            Ok(ctx) => ctx,
            Err(err) => {
                error!("Action '{}' lost its context: {}", $kind, err);
                return ActionFlow::Continue;
            }
        }
    };
}

/// Attribute host of the attacking character.
fn source_attribute_host(ctx: &ImpactCallbackContext, world: &dyn ImpactWorld) -> Option<AttributeHostHandle> {
    let character = ctx
        .collision
        .source_character
        .or_else(|| ctx.owner.map(|owner| owner.character))?;
    world
        .entity(character)
        .and_then(|info| info.capabilities.attribute_host)
}

// ============================================================================
// Damage
// ============================================================================

/// Deals damage to the struck target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleDamageAction {
    /// Damage when the context carries no damage data
    pub amount: f32,
    /// Prefer the context's damage data over `amount`
    pub use_context_damage: bool,
    /// Multiply damage by the impact strength
    pub scale_by_strength: bool,
    /// Let a struck shield absorb part of the damage first
    pub route_through_shield: bool,
    /// Force applied along the hit direction
    pub impact_force: f32,
    /// Frames the force is spread over
    pub force_frames: u32,
    /// Push rigid bodies/force receivers when the target takes no damage
    pub forward_force: bool,
}

impl Default for SimpleDamageAction {
    fn default() -> Self {
        Self {
            amount: 10.0,
            use_context_damage: true,
            scale_by_strength: false,
            route_through_shield: true,
            impact_force: 0.0,
            force_frames: 1,
            forward_force: true,
        }
    }
}

impl ImpactAction for SimpleDamageAction {
    fn kind(&self) -> &'static str {
        "simple_damage"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = context_or_return!(env, context, self.kind());
        let collision = &ctx.collision;

        let (mut amount, force, frames, radius) = match ctx.damage().filter(|_| self.use_context_damage) {
            Some(data) => (data.amount, data.impact_force, data.force_frames, data.radius),
            None => (self.amount, self.impact_force, self.force_frames, 0.0),
        };
        if self.scale_by_strength {
            amount *= collision.strength;
        }

        if self.route_through_shield {
            let shield = collision
                .target_collider
                .and_then(|id| env.world.collider(id))
                .and_then(|info| info.shield);
            if let Some(shield) = shield {
                let absorbed = amount * shield.absorption_factor.clamp(0.0, 1.0);
                amount -= absorbed;
                env.effects.shield_absorbed(shield.wielder, absorbed);
                debug!("Shield of {} absorbed {:.1}", shield.wielder, absorbed);
            }
        }

        let direction = collision.direction.normalize_or_zero();
        if let Some(target) = collision.damage_target {
            let request = DamageRequest {
                amount,
                position: collision.position,
                direction,
                force,
                force_frames: frames.max(1),
                radius,
                attacker: collision
                    .damage_source
                    .map(|source| source.owner)
                    .or(collision.source_character),
                collider: collision.target_collider,
            };
            env.effects.apply_damage(target, &request);
            return ActionFlow::Continue;
        }

        if self.forward_force && force > 0.0 {
            let receiver = collision
                .target_rigid_body
                .map(ForceTarget::RigidBody)
                .or_else(|| collision.target_capabilities.force_receiver.map(ForceTarget::Receiver));
            if let Some(receiver) = receiver {
                env.effects
                    .add_force(receiver, direction * force, collision.position, frames.max(1));
            }
        }
        ActionFlow::Continue
    }
}

// ============================================================================
// Physics
// ============================================================================

/// Pushes the struck object along the hit direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddForceAction {
    /// Force magnitude
    pub amount: f32,
    /// Frames the force is spread over
    pub frames: u32,
    /// Multiply by the impact strength
    pub scale_by_strength: bool,
    /// Push rigid bodies
    pub rigid_bodies: bool,
    /// Push force receivers (characters)
    pub receivers: bool,
}

impl Default for AddForceAction {
    fn default() -> Self {
        Self {
            amount: 5.0,
            frames: 1,
            scale_by_strength: false,
            rigid_bodies: true,
            receivers: true,
        }
    }
}

impl ImpactAction for AddForceAction {
    fn kind(&self) -> &'static str {
        "add_force"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = context_or_return!(env, context, self.kind());
        let collision = &ctx.collision;

        let mut magnitude = self.amount;
        if self.scale_by_strength {
            magnitude *= collision.strength;
        }
        let force = collision.direction.normalize_or_zero() * magnitude;

        let target = match (collision.target_rigid_body, collision.target_capabilities.force_receiver) {
            (Some(body), _) if self.rigid_bodies => Some(ForceTarget::RigidBody(body)),
            (_, Some(receiver)) if self.receivers => Some(ForceTarget::Receiver(receiver)),
            _ => None,
        };
        match target {
            Some(target) => env
                .effects
                .add_force(target, force, collision.position, self.frames.max(1)),
            None => debug!("Nothing to push for {}", collision.source_id),
        }
        ActionFlow::Continue
    }
}

/// Spins the struck rigid body around its centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddTorqueAction {
    /// Torque magnitude
    pub amount: f32,
    /// Multiply by the impact strength
    pub scale_by_strength: bool,
    /// Axis used when the hit passes through the centre
    pub fallback_axis: Vec3,
}

impl Default for AddTorqueAction {
    fn default() -> Self {
        Self {
            amount: 1.0,
            scale_by_strength: false,
            fallback_axis: Vec3::Y,
        }
    }
}

impl ImpactAction for AddTorqueAction {
    fn kind(&self) -> &'static str {
        "add_torque"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = context_or_return!(env, context, self.kind());
        let collision = &ctx.collision;
        let Some(body) = collision.target_rigid_body else {
            return ActionFlow::Continue;
        };

        let mut magnitude = self.amount;
        if self.scale_by_strength {
            magnitude *= collision.strength;
        }

        let center = collision
            .target_collider
            .and_then(|id| env.world.collider(id))
            .map_or(collision.position, |info| info.pose.position);
        let lever = collision.position - center;
        let axis = lever
            .cross(collision.direction)
            .try_normalize()
            .unwrap_or_else(|| self.fallback_axis.normalize_or_zero());

        env.effects.add_torque(body, axis * magnitude);
        ActionFlow::Continue
    }
}

/// Triggers a knockback reaction on the struck character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnockbackAction {
    /// Knockback strength
    pub strength: f32,
    /// Multiply by the impact strength
    pub scale_by_strength: bool,
}

impl Default for KnockbackAction {
    fn default() -> Self {
        Self {
            strength: 1.0,
            scale_by_strength: false,
        }
    }
}

impl ImpactAction for KnockbackAction {
    fn kind(&self) -> &'static str {
        "knockback"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = context_or_return!(env, context, self.kind());
        let collision = &ctx.collision;
        let Some(target) = collision.target_capabilities.knockback else {
            return ActionFlow::Continue;
        };
        let strength = if self.scale_by_strength {
            self.strength * collision.strength
        } else {
            self.strength
        };
        env.effects
            .knockback(target, collision.direction.normalize_or_zero(), strength);
        ActionFlow::Continue
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Heals the struck target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealAction {
    /// Amount healed
    pub amount: f32,
    /// Stop the remaining actions when the target cannot be healed
    pub interrupt_on_missing_target: bool,
}

impl Default for HealAction {
    fn default() -> Self {
        Self {
            amount: 10.0,
            interrupt_on_missing_target: false,
        }
    }
}

impl ImpactAction for HealAction {
    fn kind(&self) -> &'static str {
        "heal"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = context_or_return!(env, context, self.kind());
        let healed = ctx
            .collision
            .target_capabilities
            .health
            .is_some_and(|target| env.effects.heal(target, self.amount));

        if !healed && self.interrupt_on_missing_target {
            debug!("Heal target missing, interrupting");
            return ActionFlow::Interrupt;
        }
        ActionFlow::Continue
    }
}

/// Changes a named attribute, optionally repeating over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeModifyAction {
    /// Attribute name
    pub attribute: String,
    /// Delta per application
    pub amount: f32,
    /// Seconds between applications
    pub interval: f32,
    /// Total applications (1 = instant change)
    pub applications: u32,
    /// Modify the attacker instead of the target
    pub apply_to_source: bool,
}

impl Default for AttributeModifyAction {
    fn default() -> Self {
        Self {
            attribute: String::new(),
            amount: 0.0,
            interval: 0.0,
            applications: 1,
            apply_to_source: false,
        }
    }
}

impl ImpactAction for AttributeModifyAction {
    fn kind(&self) -> &'static str {
        "attribute_modify"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        if self.attribute.is_empty() {
            error!("Action '{}' has no attribute name", self.kind());
            return ActionFlow::Continue;
        }
        let ctx = context_or_return!(env, context, self.kind());
        let host = if self.apply_to_source {
            source_attribute_host(ctx, env.world)
        } else {
            ctx.collision.target_capabilities.attribute_host
        };
        let Some(host) = host else {
            return ActionFlow::Continue;
        };

        let spec = ModifierSpec {
            host,
            attribute: &self.attribute,
            amount: self.amount,
            interval: self.interval,
            applications: self.applications.max(1),
        };
        env.modifiers.start(spec, env.scheduler.now(), env.effects);
        ActionFlow::Continue
    }
}

// ============================================================================
// Presentation
// ============================================================================

/// Plays an audio clip at the contact point, cycling through the clip list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayAudioAction {
    /// Clips played in order
    pub clips: Vec<AudioClipId>,
    /// Playback volume
    pub volume: f32,
    #[serde(skip)]
    next: usize,
}

impl Default for PlayAudioAction {
    fn default() -> Self {
        Self {
            clips: Vec::new(),
            volume: 1.0,
            next: 0,
        }
    }
}

impl PlayAudioAction {
    /// Creates an action cycling through `clips`.
    #[must_use]
    pub fn new(clips: Vec<AudioClipId>) -> Self {
        Self {
            clips,
            ..Self::default()
        }
    }
}

impl ImpactAction for PlayAudioAction {
    fn kind(&self) -> &'static str {
        "play_audio"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        if self.clips.is_empty() {
            error!("Action '{}' has no audio clips", self.kind());
            return ActionFlow::Continue;
        }
        let position = context_or_return!(env, context, self.kind()).collision.position;
        let clip = self.clips[self.next % self.clips.len()];
        self.next = (self.next + 1) % self.clips.len();
        env.effects.play_audio(clip, position, self.volume);
        ActionFlow::Continue
    }
}

/// Spawns a particle at the contact point.
///
/// Looping particles are spawned once per source and moved on later hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnParticleAction {
    /// Prefab to spawn
    pub prefab: Option<ParticlePrefabId>,
    /// The prefab loops until stopped
    pub looping: bool,
    /// Parent the particle to the struck entity
    pub parent_to_target: bool,
    /// Offset along the surface normal
    pub normal_offset: f32,
    #[serde(skip)]
    live: AHashMap<SourceId, ParticleInstanceId>,
}

impl SpawnParticleAction {
    /// Live looping instance for a source.
    #[must_use]
    pub fn live_instance(&self, source: SourceId) -> Option<ParticleInstanceId> {
        self.live.get(&source).copied()
    }
}

impl ImpactAction for SpawnParticleAction {
    fn kind(&self) -> &'static str {
        "spawn_particle"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let Some(prefab) = self.prefab else {
            error!("Action '{}' has no particle prefab", self.kind());
            return ActionFlow::Continue;
        };
        let collision = &context_or_return!(env, context, self.kind()).collision;
        let position = collision.position + collision.normal * self.normal_offset;
        let direction = if collision.normal == Vec3::ZERO {
            -collision.direction
        } else {
            collision.normal
        };

        if self.looping {
            if let Some(&instance) = self.live.get(&collision.source_id) {
                if env.effects.move_particle(instance, position, direction) {
                    return ActionFlow::Continue;
                }
                self.live.remove(&collision.source_id);
            }
        }

        let spawn = ParticleSpawn {
            prefab,
            position,
            direction,
            parent: collision.target_entity.filter(|_| self.parent_to_target),
            looping: self.looping,
        };
        match env.effects.spawn_particle(&spawn) {
            Some(instance) if self.looping => {
                self.live.insert(collision.source_id, instance);
            }
            Some(_) => {}
            None => error!("Particle prefab {:?} could not be spawned", prefab),
        }
        ActionFlow::Continue
    }

    fn reset(&mut self, source: SourceId) {
        self.live.remove(&source);
    }
}

/// Spawns the surface impact effects for the struck surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSurfaceEffectAction {
    /// Surface used when neither the hit nor the damage data names one
    pub fallback: Option<SurfaceImpactId>,
}

impl ImpactAction for SpawnSurfaceEffectAction {
    fn kind(&self) -> &'static str {
        "spawn_surface_effect"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = context_or_return!(env, context, self.kind());
        let collision = &ctx.collision;
        let surface = collision
            .surface_impact
            .or_else(|| ctx.damage().and_then(|data| data.surface_impact))
            .or(self.fallback);
        let Some(surface) = surface else {
            debug!("No surface impact for {}", collision.source_id);
            return ActionFlow::Continue;
        };

        let spawn = SurfaceEffectSpawn {
            surface,
            collider: collision.target_collider,
            position: collision.position,
            normal: collision.normal,
            strength: collision.strength,
        };
        env.effects.spawn_surface_effect(&spawn);
        ActionFlow::Continue
    }
}

// ============================================================================
// State and events
// ============================================================================

/// Activates a named state, optionally switching it off after a timer.
///
/// An empty `state` or zero `disable_timer` falls back to the context's
/// damage data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyStateAction {
    /// State name
    pub state: String,
    /// Seconds until the state is disabled (0 = stays on)
    pub disable_timer: f32,
    /// Apply to the attacker instead of the target
    pub apply_to_source: bool,
}

impl ImpactAction for ApplyStateAction {
    fn kind(&self) -> &'static str {
        "apply_state"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = context_or_return!(env, context, self.kind());
        let damage = ctx.damage();

        let state = if self.state.is_empty() {
            damage.and_then(|data| data.state_name.clone())
        } else {
            Some(self.state.clone())
        };
        let Some(state) = state else {
            error!("Action '{}' has no state name", self.kind());
            return ActionFlow::Continue;
        };
        let timer = if self.disable_timer > 0.0 {
            self.disable_timer
        } else {
            damage.map_or(0.0, |data| data.state_disable_timer)
        };

        let entity = if self.apply_to_source {
            ctx.collision
                .source_character
                .or_else(|| ctx.owner.map(|owner| owner.character))
        } else {
            ctx.collision
                .target_entity
                .map(|entity| env.world.root_of(entity))
        };
        let Some(entity) = entity else {
            return ActionFlow::Continue;
        };

        env.effects.set_state(entity, &state, true);
        if timer > 0.0 {
            env.scheduler
                .schedule(timer, env.pipeline, ScheduledTask::DisableState { entity, state });
        }
        ActionFlow::Continue
    }
}

/// Raises a named event on the impact event bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeEventAction {
    /// Event name
    pub name: String,
}

impl ImpactAction for InvokeEventAction {
    fn kind(&self) -> &'static str {
        "invoke_event"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let collision = &context_or_return!(env, context, self.kind()).collision;
        env.events.publish(ImpactEvent::Named {
            name: self.name.clone(),
            source_id: collision.source_id,
            target: collision.target_entity,
        });
        ActionFlow::Continue
    }

    fn initialize(&mut self, owner: &ImpactOwner) {
        if self.name.is_empty() {
            self.name = format!("impact:{}", owner.character);
        }
    }
}
