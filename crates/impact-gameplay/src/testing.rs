//! Deterministic world and effect doubles.
//!
//! [`MockWorld`] approximates every volume by its bounding sphere, which is
//! enough to exercise detection, contact resolution and shield overrides
//! without a physics backend. [`RecordingEffects`] records every effect
//! request in order.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use glam::Vec3;
use impact_common::{
    AudioClipId, CategoryId, ColliderId, EntityId, ItemDefinitionId, ObjectIdentifier,
    ParticleInstanceId, Pose, RigidBodyId,
};

use crate::collision_data::ImpactCollisionData;
use crate::effects::{DamageRequest, ForceTarget, ImpactEffects, ParticleSpawn, SurfaceEffectSpawn};
use crate::world::{
    AttributeHostHandle, Capabilities, ColliderInfo, CollisionShape, DamageTargetHandle,
    DefenseInfo, EntityInfo, HealthHandle, ItemInfo, KnockbackHandle, Penetration, SceneQuery,
    ShapeHitData, ShieldCollider, SpatialQuery, SpatialQueryFilter,
};

/// In-memory scene with sphere-approximated spatial queries.
#[derive(Debug, Default, Clone)]
pub struct MockWorld {
    entities: BTreeMap<EntityId, EntityInfo>,
    colliders: BTreeMap<ColliderId, ColliderInfo>,
    paths: AHashMap<(EntityId, String), ColliderId>,
    vetoes: AHashSet<EntityId>,
    concave: AHashSet<ColliderId>,
    next_collider: u32,
}

impl MockWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_collider: 1,
            ..Self::default()
        }
    }

    /// Spawns a character with every capability and empty defense.
    pub fn spawn_character(&mut self, position: Vec3, forward: Vec3) -> EntityId {
        let id = EntityId::new();
        let mut info = EntityInfo::new(id, Pose::facing(position, forward));
        info.capabilities = Capabilities::all(id);
        info.defense = Some(DefenseInfo::default());
        self.entities.insert(id, info);
        id
    }

    /// Spawns a root entity without capabilities (walls, props).
    pub fn spawn_prop(&mut self, position: Vec3) -> EntityId {
        let id = EntityId::new();
        self.entities
            .insert(id, EntityInfo::new(id, Pose::from_position(position)));
        id
    }

    /// Spawns a child entity below `parent`.
    pub fn spawn_child(&mut self, parent: EntityId, position: Vec3) -> EntityId {
        let id = EntityId::new();
        let mut info = EntityInfo::new(id, Pose::from_position(position));
        info.root = self.root_of(parent);
        if let Some(parent_info) = self.entities.get_mut(&parent) {
            parent_info.children.push(id);
        }
        self.entities.insert(id, info);
        id
    }

    /// Spawns an item held by `owner`.
    pub fn spawn_item(&mut self, owner: EntityId, definition: ItemDefinitionId, categories: &[CategoryId]) -> EntityId {
        let position = self.entity(owner).map_or(Vec3::ZERO, |info| info.pose.position);
        let id = self.spawn_child(owner, position);
        if let Some(info) = self.entities.get_mut(&id) {
            info.item = Some(ItemInfo {
                definition,
                categories: categories.to_vec(),
            });
        }
        id
    }

    /// Spawns a projectile entity.
    pub fn spawn_projectile(&mut self, position: Vec3) -> EntityId {
        let id = self.spawn_prop(position);
        if let Some(info) = self.entities.get_mut(&id) {
            info.projectile = true;
        }
        id
    }

    /// Adds a collider with an explicit shape and pose.
    pub fn add_collider(&mut self, owner: EntityId, layer: u8, shape: CollisionShape, pose: Pose) -> ColliderId {
        let id = ColliderId::new(self.next_collider.max(1));
        self.next_collider = id.raw() + 1;
        self.colliders
            .insert(id, ColliderInfo::new(id, owner, layer, shape, pose));
        id
    }

    /// Adds a sphere collider.
    pub fn add_sphere_collider(&mut self, owner: EntityId, layer: u8, position: Vec3, radius: f32) -> ColliderId {
        self.add_collider(
            owner,
            layer,
            CollisionShape::Sphere { radius },
            Pose::from_position(position),
        )
    }

    /// Adds a solid, capability-less wall sphere.
    pub fn add_wall(&mut self, layer: u8, position: Vec3, radius: f32) -> ColliderId {
        let owner = self.spawn_prop(position);
        let id = self.add_sphere_collider(owner, layer, position, radius);
        if let Some(info) = self.colliders.get_mut(&id) {
            info.solid = true;
        }
        id
    }

    /// Gives `character` a shield collider.
    pub fn equip_shield(
        &mut self,
        character: EntityId,
        position: Vec3,
        radius: f32,
        shield: ShieldCollider,
        requires_aim: bool,
    ) -> ColliderId {
        let item = self.spawn_child(character, position);
        let layer = self
            .colliders
            .values()
            .find(|info| info.owner == character)
            .map_or(0, |info| info.layer);
        let collider = self.add_sphere_collider(item, layer, position, radius);
        if let Some(info) = self.colliders.get_mut(&collider) {
            info.shield = Some(shield);
        }
        if let Some(info) = self.entities.get_mut(&character) {
            info.defense = Some(DefenseInfo {
                shield_collider: Some(collider),
                requires_aim,
                aiming: false,
            });
        }
        collider
    }

    /// Sets whether a character is aiming.
    pub fn set_aiming(&mut self, character: EntityId, aiming: bool) {
        if let Some(defense) = self
            .entities
            .get_mut(&character)
            .and_then(|info| info.defense.as_mut())
        {
            defense.aiming = aiming;
        }
    }

    /// Registers a scene path for a collider.
    pub fn name_collider(&mut self, owner: EntityId, path: &str, collider: ColliderId) {
        self.paths.insert((owner, path.to_string()), collider);
    }

    /// Makes `entity` refuse (or accept again) every impact.
    pub fn set_impact_veto(&mut self, entity: EntityId, veto: bool) {
        if veto {
            self.vetoes.insert(entity);
        } else {
            self.vetoes.remove(&entity);
        }
    }

    /// Adds a scene identifier to an entity.
    pub fn add_identifier(&mut self, entity: EntityId, identifier: ObjectIdentifier) {
        if let Some(info) = self.entities.get_mut(&entity) {
            info.identifiers.push(identifier);
        }
    }

    /// Replaces an entity's capabilities.
    pub fn set_capabilities(&mut self, entity: EntityId, capabilities: Capabilities) {
        if let Some(info) = self.entities.get_mut(&entity) {
            info.capabilities = capabilities;
        }
    }

    /// Marks a collider as concave (no penetration data).
    pub fn set_concave(&mut self, collider: ColliderId, concave: bool) {
        if concave {
            self.concave.insert(collider);
        } else {
            self.concave.remove(&collider);
        }
    }

    /// Moves a collider.
    pub fn set_collider_pose(&mut self, collider: ColliderId, pose: Pose) {
        if let Some(info) = self.colliders.get_mut(&collider) {
            info.pose = pose;
        }
    }

    /// Moves an entity (its colliders are not moved).
    pub fn set_entity_pose(&mut self, entity: EntityId, pose: Pose) {
        if let Some(info) = self.entities.get_mut(&entity) {
            info.pose = pose;
        }
    }

    /// Collider data.
    #[must_use]
    pub fn collider_info(&self, collider: ColliderId) -> Option<&ColliderInfo> {
        self.colliders.get(&collider)
    }

    /// Mutable collider data.
    pub fn collider_info_mut(&mut self, collider: ColliderId) -> Option<&mut ColliderInfo> {
        self.colliders.get_mut(&collider)
    }

    fn passes(&self, info: &ColliderInfo, filter: &SpatialQueryFilter) -> bool {
        filter.mask.contains_layer(info.layer)
            && filter
                .excluded_root
                .map_or(true, |root| self.root_of(info.owner) != root)
    }

    /// First time of impact of a sphere of `radius` moving from `origin`
    /// along unit `direction` against `info`'s bounding sphere.
    fn sphere_cast(info: &ColliderInfo, radius: f32, origin: Vec3, direction: Vec3, max: f32) -> Option<ShapeHitData> {
        let target_radius = info.shape.bounding_radius();
        let combined = radius + target_radius;
        let offset = origin - info.pose.position;
        let b = offset.dot(direction);
        let c = offset.length_squared() - combined * combined;
        if c > 0.0 && b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let distance = (-b - discriminant.sqrt()).max(0.0);
        if distance > max {
            return None;
        }
        let center = origin + direction * distance;
        let normal = (center - info.pose.position)
            .try_normalize()
            .unwrap_or(-direction);
        Some(ShapeHitData {
            collider: info.id,
            point: info.pose.position + normal * target_radius,
            normal,
            distance,
        })
    }
}

impl SpatialQuery for MockWorld {
    fn shape_intersections_callback(
        &self,
        shape: &CollisionShape,
        pose: &Pose,
        filter: &SpatialQueryFilter,
        callback: &mut dyn FnMut(ColliderId) -> bool,
    ) {
        let radius = shape.bounding_radius();
        for info in self.colliders.values() {
            if !self.passes(info, filter) {
                continue;
            }
            let reach = radius + info.shape.bounding_radius();
            if info.pose.position.distance(pose.position) <= reach && !callback(info.id) {
                return;
            }
        }
    }

    fn compute_penetration(&self, shape: &CollisionShape, pose: &Pose, other: ColliderId) -> Option<Penetration> {
        if self.concave.contains(&other) {
            return None;
        }
        let info = self.colliders.get(&other)?;
        let offset = pose.position - info.pose.position;
        let depth = shape.bounding_radius() + info.shape.bounding_radius() - offset.length();
        if depth <= 0.0 {
            return None;
        }
        Some(Penetration {
            direction: offset.try_normalize().unwrap_or(Vec3::Y),
            distance: depth,
        })
    }

    fn cast_shape(
        &self,
        shape: &CollisionShape,
        pose: &Pose,
        direction: Vec3,
        max_distance: f32,
        filter: &SpatialQueryFilter,
    ) -> Option<ShapeHitData> {
        let direction = direction.try_normalize()?;
        self.colliders
            .values()
            .filter(|info| self.passes(info, filter))
            .filter_map(|info| {
                Self::sphere_cast(info, shape.bounding_radius(), pose.position, direction, max_distance)
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn cast_shape_against(
        &self,
        collider: ColliderId,
        shape: &CollisionShape,
        pose: &Pose,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<ShapeHitData> {
        let direction = direction.try_normalize()?;
        let info = self.colliders.get(&collider)?;
        Self::sphere_cast(info, shape.bounding_radius(), pose.position, direction, max_distance)
    }

    fn closest_point(&self, collider: ColliderId, point: Vec3) -> Option<Vec3> {
        let info = self.colliders.get(&collider)?;
        let radius = info.shape.bounding_radius();
        let offset = point - info.pose.position;
        if offset.length() <= radius {
            return Some(point);
        }
        Some(info.pose.position + offset.normalize_or_zero() * radius)
    }
}

impl SceneQuery for MockWorld {
    fn collider(&self, id: ColliderId) -> Option<&ColliderInfo> {
        self.colliders.get(&id)
    }

    fn entity(&self, id: EntityId) -> Option<&EntityInfo> {
        self.entities.get(&id)
    }

    fn find_collider(&self, owner: EntityId, path: &str) -> Option<ColliderId> {
        self.paths.get(&(owner, path.to_string())).copied()
    }

    fn can_receive_impact(&self, entity: EntityId, _data: &ImpactCollisionData) -> Option<bool> {
        self.vetoes.contains(&entity).then_some(false)
    }
}

// ============================================================================
// Recording effects
// ============================================================================

/// One recorded effect request.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEffect {
    /// Damage applied
    Damage {
        /// Damaged entity
        target: EntityId,
        /// Request details
        request: DamageRequest,
    },
    /// Force added
    Force {
        /// Pushed object
        target: ForceTarget,
        /// Force vector
        force: Vec3,
    },
    /// Torque added
    Torque {
        /// Rigid body
        body: RigidBodyId,
        /// Torque vector
        torque: Vec3,
    },
    /// Heal applied
    Heal {
        /// Healed entity
        target: EntityId,
        /// Amount
        amount: f32,
    },
    /// Attribute changed
    Attribute {
        /// Host entity
        entity: EntityId,
        /// Attribute name
        attribute: String,
        /// Delta
        delta: f32,
    },
    /// Audio played
    Audio {
        /// Clip
        clip: AudioClipId,
        /// Position
        position: Vec3,
    },
    /// Particle spawned
    ParticleSpawned {
        /// New instance
        instance: ParticleInstanceId,
        /// Spawn request
        spawn: ParticleSpawn,
    },
    /// Particle moved
    ParticleMoved {
        /// Moved instance
        instance: ParticleInstanceId,
        /// New position
        position: Vec3,
    },
    /// Surface effect spawned
    SurfaceEffect(SurfaceEffectSpawn),
    /// State toggled
    State {
        /// Entity
        entity: EntityId,
        /// State name
        state: String,
        /// New activity
        active: bool,
    },
    /// Knockback started
    Knockback {
        /// Knocked back entity
        target: EntityId,
        /// Strength
        strength: f32,
    },
    /// Shield absorbed damage
    ShieldAbsorbed {
        /// Shield wielder
        wielder: EntityId,
        /// Absorbed amount
        amount: f32,
    },
}

/// Effect sink that records every request.
#[derive(Debug, Default, Clone)]
pub struct RecordingEffects {
    records: Vec<RecordedEffect>,
    rejected_attributes: AHashSet<String>,
    live_particles: AHashSet<ParticleInstanceId>,
    next_particle: u64,
}

impl RecordingEffects {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in order.
    #[must_use]
    pub fn records(&self) -> &[RecordedEffect] {
        &self.records
    }

    /// Counts records matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RecordedEffect) -> bool) -> usize {
        self.records.iter().filter(|record| predicate(record)).count()
    }

    /// Damage requests with their targets.
    #[must_use]
    pub fn damage_requests(&self) -> Vec<(EntityId, DamageRequest)> {
        self.records
            .iter()
            .filter_map(|record| match record {
                RecordedEffect::Damage { target, request } => Some((*target, request.clone())),
                _ => None,
            })
            .collect()
    }

    /// Entities that took damage, in order.
    #[must_use]
    pub fn damaged_entities(&self) -> Vec<EntityId> {
        self.damage_requests().into_iter().map(|(target, _)| target).collect()
    }

    /// Makes `modify_attribute` fail for `attribute`.
    pub fn reject_attribute(&mut self, attribute: &str) {
        self.rejected_attributes.insert(attribute.to_string());
    }

    /// Destroys a live particle instance.
    pub fn kill_particle(&mut self, instance: ParticleInstanceId) {
        self.live_particles.remove(&instance);
    }

    /// Forgets all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl ImpactEffects for RecordingEffects {
    fn apply_damage(&mut self, target: DamageTargetHandle, request: &DamageRequest) {
        self.records.push(RecordedEffect::Damage {
            target: target.entity(),
            request: request.clone(),
        });
    }

    fn add_force(&mut self, target: ForceTarget, force: Vec3, _point: Vec3, _frames: u32) {
        self.records.push(RecordedEffect::Force { target, force });
    }

    fn add_torque(&mut self, body: RigidBodyId, torque: Vec3) {
        self.records.push(RecordedEffect::Torque { body, torque });
    }

    fn heal(&mut self, target: HealthHandle, amount: f32) -> bool {
        self.records.push(RecordedEffect::Heal {
            target: target.entity(),
            amount,
        });
        true
    }

    fn modify_attribute(&mut self, host: AttributeHostHandle, attribute: &str, delta: f32) -> bool {
        if self.rejected_attributes.contains(attribute) {
            return false;
        }
        self.records.push(RecordedEffect::Attribute {
            entity: host.entity(),
            attribute: attribute.to_string(),
            delta,
        });
        true
    }

    fn play_audio(&mut self, clip: AudioClipId, position: Vec3, _volume: f32) {
        self.records.push(RecordedEffect::Audio { clip, position });
    }

    fn spawn_particle(&mut self, spawn: &ParticleSpawn) -> Option<ParticleInstanceId> {
        self.next_particle += 1;
        let instance = ParticleInstanceId::new(self.next_particle);
        self.live_particles.insert(instance);
        self.records.push(RecordedEffect::ParticleSpawned {
            instance,
            spawn: *spawn,
        });
        Some(instance)
    }

    fn move_particle(&mut self, instance: ParticleInstanceId, position: Vec3, _direction: Vec3) -> bool {
        if !self.live_particles.contains(&instance) {
            return false;
        }
        self.records
            .push(RecordedEffect::ParticleMoved { instance, position });
        true
    }

    fn spawn_surface_effect(&mut self, spawn: &SurfaceEffectSpawn) {
        self.records.push(RecordedEffect::SurfaceEffect(*spawn));
    }

    fn set_state(&mut self, entity: EntityId, state: &str, active: bool) {
        self.records.push(RecordedEffect::State {
            entity,
            state: state.to_string(),
            active,
        });
    }

    fn knockback(&mut self, target: KnockbackHandle, _direction: Vec3, strength: f32) {
        self.records.push(RecordedEffect::Knockback {
            target: target.entity(),
            strength,
        });
    }

    fn shield_absorbed(&mut self, wielder: EntityId, absorbed: f32) {
        self.records.push(RecordedEffect::ShieldAbsorbed {
            wielder,
            amount: absorbed,
        });
    }
}
