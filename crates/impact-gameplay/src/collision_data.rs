//! Per-hit collision record.

use glam::Vec3;
use impact_common::{ColliderId, EntityId, LayerMask, RigidBodyId, SourceId, SurfaceImpactId};
use tracing::error;

use crate::world::{Capabilities, ColliderInfo, DamageTargetHandle, SceneQuery};

/// Where the damage of an impact originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageSource {
    /// Character or object responsible for the hit.
    pub owner: EntityId,
    /// Item used for the hit (weapon), if any.
    pub item: Option<EntityId>,
    /// Projectile that carried the hit, if any.
    pub projectile: Option<EntityId>,
}

impl DamageSource {
    /// A direct hit by `owner` with `item`.
    #[must_use]
    pub const fn direct(owner: EntityId, item: Option<EntityId>) -> Self {
        Self {
            owner,
            item,
            projectile: None,
        }
    }

    /// A hit carried by a projectile.
    #[must_use]
    pub const fn projectile(owner: EntityId, item: Option<EntityId>, projectile: EntityId) -> Self {
        Self {
            owner,
            item,
            projectile: Some(projectile),
        }
    }
}

/// Describes one hit: origin, target, geometry and the batch it belongs to.
///
/// Records are pooled. A record must be [`initialize`](Self::initialize)d
/// before use and [`reset`](Self::reset) before it goes back to the pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpactCollisionData {
    initialized: bool,
    /// Cast/use identifier scoping multi-hit suppression.
    pub source_id: SourceId,
    /// World-space contact point.
    pub position: Vec3,
    /// Direction of the hit (into the target).
    pub direction: Vec3,
    /// Surface normal at the contact point.
    pub normal: Vec3,
    /// Magnitude of the hit.
    pub strength: f32,
    /// Struck entity.
    pub target_entity: Option<EntityId>,
    /// Rigid body of the struck collider.
    pub target_rigid_body: Option<RigidBodyId>,
    /// Struck collider.
    pub target_collider: Option<ColliderId>,
    /// Capabilities of the struck entity, resolved by [`set_target`](Self::set_target).
    pub target_capabilities: Capabilities,
    /// Entity that produced the hit (weapon or projectile).
    pub source_entity: Option<EntityId>,
    /// Sub-object that produced the hit (e.g. the hitbox's collider owner).
    pub source_component: Option<EntityId>,
    /// Character controller behind the hit.
    pub source_character: Option<EntityId>,
    /// Where damage is delivered.
    pub damage_target: Option<DamageTargetHandle>,
    /// Where damage comes from.
    pub damage_source: Option<DamageSource>,
    /// Layers the detector queried.
    pub detect_layers: LayerMask,
    /// Number of colliders found in the batch.
    pub hit_count: usize,
    /// Colliders found in the batch.
    pub hit_colliders: Vec<ColliderId>,
    /// Surface impact used for effects.
    pub surface_impact: Option<SurfaceImpactId>,
}

impl ImpactCollisionData {
    /// Creates an uninitialized record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hit geometry and marks the record as initialized.
    pub fn initialize(&mut self, source_id: SourceId, position: Vec3, direction: Vec3, strength: f32) {
        self.initialized = true;
        self.source_id = source_id;
        self.position = position;
        self.direction = direction;
        self.strength = strength;
    }

    /// Whether [`initialize`](Self::initialize) has been called since the last reset.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Points the record at a struck collider and resolves the target's
    /// capabilities from the scene.
    ///
    /// Body-part colliders usually belong to a child entity; capabilities
    /// missing on the owner are looked up on the hierarchy root.
    pub fn set_target(&mut self, collider: &ColliderInfo, scene: &(impl SceneQuery + ?Sized)) {
        self.target_collider = Some(collider.id);
        self.target_rigid_body = collider.rigid_body;
        self.target_entity = Some(collider.owner);

        let Some(owner) = scene.entity(collider.owner) else {
            error!("Collider {:?} has unknown owner {}", collider.id, collider.owner);
            self.target_capabilities = Capabilities::default();
            self.damage_target = None;
            return;
        };

        let mut capabilities = owner.capabilities;
        if !owner.is_root() {
            if let Some(root) = scene.entity(owner.root) {
                let inherited = root.capabilities;
                capabilities.damage_target = capabilities.damage_target.or(inherited.damage_target);
                capabilities.force_receiver = capabilities.force_receiver.or(inherited.force_receiver);
                capabilities.attribute_host = capabilities.attribute_host.or(inherited.attribute_host);
                capabilities.health = capabilities.health.or(inherited.health);
                capabilities.knockback = capabilities.knockback.or(inherited.knockback);
            }
        }
        self.target_capabilities = capabilities;
        self.damage_target = capabilities.damage_target;
    }

    /// Records the batch this hit was part of.
    pub fn set_batch(&mut self, detect_layers: LayerMask, colliders: &[ColliderId]) {
        self.detect_layers = detect_layers;
        self.hit_count = colliders.len();
        self.hit_colliders.clear();
        self.hit_colliders.extend_from_slice(colliders);
    }

    /// Deep-copies `other` into `self`, reusing allocations.
    pub fn copy_from(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Clears every field and marks the record uninitialized.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.source_id = SourceId::default();
        self.position = Vec3::ZERO;
        self.direction = Vec3::ZERO;
        self.normal = Vec3::ZERO;
        self.strength = 0.0;
        self.target_entity = None;
        self.target_rigid_body = None;
        self.target_collider = None;
        self.target_capabilities = Capabilities::default();
        self.source_entity = None;
        self.source_component = None;
        self.source_character = None;
        self.damage_target = None;
        self.damage_source = None;
        self.detect_layers = LayerMask::NONE;
        self.hit_count = 0;
        self.hit_colliders.clear();
        self.surface_impact = None;
    }
}
