//! Scene and spatial-query interfaces consumed by impact resolution.
//!
//! The engine never implements broad/narrow-phase collision itself. Hit
//! detection goes through [`SpatialQuery`], and everything it needs to know
//! about the struck objects (owning entity, character hierarchy, equipped
//! shield, capabilities) goes through [`SceneQuery`].

use glam::Vec3;
use impact_common::{
    CategoryId, ColliderId, EntityId, ItemDefinitionId, LayerMask, ObjectIdentifier, Pose,
    RigidBodyId,
};
use serde::{Deserialize, Serialize};

use crate::collision_data::ImpactCollisionData;

/// Shape of a collision volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionShape {
    /// Sphere centred on the pose.
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Oriented box centred on the pose.
    Box {
        /// Half extents along local X/Y/Z
        half_extents: Vec3,
    },
    /// Capsule along local Y centred on the pose.
    Capsule {
        /// Radius of the caps
        radius: f32,
        /// Half height of the cylindrical part
        half_height: f32,
    },
}

impl CollisionShape {
    /// Radius of a sphere enclosing the shape.
    #[must_use]
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Self::Sphere { radius } => radius,
            Self::Box { half_extents } => half_extents.length(),
            Self::Capsule {
                radius,
                half_height,
            } => radius + half_height,
        }
    }
}

impl Default for CollisionShape {
    fn default() -> Self {
        Self::Sphere { radius: 0.5 }
    }
}

/// Determines which colliders a spatial query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpatialQueryFilter {
    /// Layers that are included.
    pub mask: LayerMask,
    /// Colliders whose owner belongs to this root entity are ignored.
    pub excluded_root: Option<EntityId>,
}

impl SpatialQueryFilter {
    /// Creates a filter for the given layers.
    #[must_use]
    pub const fn from_mask(mask: LayerMask) -> Self {
        Self {
            mask,
            excluded_root: None,
        }
    }

    /// Ignores every collider belonging to `root`'s hierarchy.
    #[must_use]
    pub const fn excluding(mut self, root: EntityId) -> Self {
        self.excluded_root = Some(root);
        self
    }
}

/// Result of a shape cast or ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeHitData {
    /// Collider that was hit.
    pub collider: ColliderId,
    /// World-space contact point on the hit collider.
    pub point: Vec3,
    /// Surface normal at the contact point.
    pub normal: Vec3,
    /// Distance travelled before the hit.
    pub distance: f32,
}

/// Minimum translation separating two overlapping volumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Direction the query shape must move to separate (unit length).
    pub direction: Vec3,
    /// Distance along `direction` needed to separate.
    pub distance: f32,
}

/// Spatial query backend.
///
/// All methods are pure queries against the current scene state.
pub trait SpatialQuery {
    /// Calls `callback` for each collider intersecting `shape` at `pose`.
    /// Stops early when the callback returns `false`.
    fn shape_intersections_callback(
        &self,
        shape: &CollisionShape,
        pose: &Pose,
        filter: &SpatialQueryFilter,
        callback: &mut dyn FnMut(ColliderId) -> bool,
    );

    /// Computes how far `shape` at `pose` penetrates `other`.
    ///
    /// Returns `None` when the volumes do not overlap or the backend cannot
    /// compute penetration for that collider (e.g. concave meshes).
    fn compute_penetration(
        &self,
        shape: &CollisionShape,
        pose: &Pose,
        other: ColliderId,
    ) -> Option<Penetration>;

    /// Sweeps `shape` from `pose` along `direction` and returns the first hit.
    fn cast_shape(
        &self,
        shape: &CollisionShape,
        pose: &Pose,
        direction: Vec3,
        max_distance: f32,
        filter: &SpatialQueryFilter,
    ) -> Option<ShapeHitData>;

    /// Sweeps `shape` from `pose` along `direction` against a single collider.
    fn cast_shape_against(
        &self,
        collider: ColliderId,
        shape: &CollisionShape,
        pose: &Pose,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<ShapeHitData>;

    /// Closest point on `collider`'s surface to `point`.
    fn closest_point(&self, collider: ColliderId, point: Vec3) -> Option<Vec3>;
}

/// Declares a capability handle wrapping the entity that exposes it.
macro_rules! capability_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(EntityId);

        impl $name {
            /// Wraps an entity that exposes this capability.
            #[must_use]
            pub const fn new(entity: EntityId) -> Self {
                Self(entity)
            }

            /// The entity that exposes the capability.
            #[must_use]
            pub const fn entity(self) -> EntityId {
                self.0
            }
        }
    };
}

capability_handle! {
    /// Entity that can take damage.
    DamageTargetHandle
}

capability_handle! {
    /// Entity that accepts forces without a rigid body (e.g. character motor).
    ForceReceiverHandle
}

capability_handle! {
    /// Entity with an attribute store (health, stamina, ...).
    AttributeHostHandle
}

capability_handle! {
    /// Entity that can be healed.
    HealthHandle
}

capability_handle! {
    /// Character able to start a knockback reaction.
    KnockbackHandle
}

/// Capabilities an entity exposes, resolved once at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Takes damage.
    pub damage_target: Option<DamageTargetHandle>,
    /// Receives forces.
    pub force_receiver: Option<ForceReceiverHandle>,
    /// Has modifiable attributes.
    pub attribute_host: Option<AttributeHostHandle>,
    /// Can be healed.
    pub health: Option<HealthHandle>,
    /// Can be knocked back.
    pub knockback: Option<KnockbackHandle>,
}

impl Capabilities {
    /// Every capability, all pointing at `entity`.
    #[must_use]
    pub const fn all(entity: EntityId) -> Self {
        Self {
            damage_target: Some(DamageTargetHandle::new(entity)),
            force_receiver: Some(ForceReceiverHandle::new(entity)),
            attribute_host: Some(AttributeHostHandle::new(entity)),
            health: Some(HealthHandle::new(entity)),
            knockback: Some(KnockbackHandle::new(entity)),
        }
    }
}

/// Item that can be the source of an impact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInfo {
    /// Definition the item was created from.
    pub definition: ItemDefinitionId,
    /// Categories the definition belongs to.
    pub categories: Vec<CategoryId>,
}

impl ItemInfo {
    /// Checks category membership.
    #[must_use]
    pub fn in_category(&self, category: CategoryId) -> bool {
        self.categories.contains(&category)
    }
}

/// Defensive equipment state of a character.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DefenseInfo {
    /// Collision volume of the equipped shield-capable item.
    pub shield_collider: Option<ColliderId>,
    /// The shield only intercepts while the character aims.
    pub requires_aim: bool,
    /// Whether the character is currently aiming.
    pub aiming: bool,
}

/// Marks a collider as belonging to a shield.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShieldCollider {
    /// Character holding the shield.
    pub wielder: EntityId,
    /// Fraction of incoming damage the shield absorbs (0-1).
    pub absorption_factor: f32,
    /// A hit on this shield stops the attacker's swing.
    pub blocks_attack: bool,
}

/// Scene data for a collision volume.
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderInfo {
    /// Collider handle.
    pub id: ColliderId,
    /// Entity the collider is attached to.
    pub owner: EntityId,
    /// Collision layer index.
    pub layer: u8,
    /// Volume shape.
    pub shape: CollisionShape,
    /// Current world pose.
    pub pose: Pose,
    /// Rigid body simulating this collider, if any.
    pub rigid_body: Option<RigidBodyId>,
    /// Visual proxy only rendered for a first-person camera.
    pub first_person_proxy: bool,
    /// Static/solid world geometry (walls, rocks).
    pub solid: bool,
    /// Shield data when the collider belongs to a shield.
    pub shield: Option<ShieldCollider>,
    /// Local offset used as aim point by ricochets.
    pub pivot_offset: Option<Vec3>,
}

impl ColliderInfo {
    /// Creates a collider description with default flags.
    #[must_use]
    pub fn new(id: ColliderId, owner: EntityId, layer: u8, shape: CollisionShape, pose: Pose) -> Self {
        Self {
            id,
            owner,
            layer,
            shape,
            pose,
            rigid_body: None,
            first_person_proxy: false,
            solid: false,
            shield: None,
            pivot_offset: None,
        }
    }

    /// World-space point ricochets aim at.
    #[must_use]
    pub fn pivot_point(&self) -> Vec3 {
        match self.pivot_offset {
            Some(offset) => self.pose.transform_point(offset),
            None => self.pose.position,
        }
    }
}

/// Scene data for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    /// Entity handle.
    pub id: EntityId,
    /// Root of the hierarchy (the character for body parts and held items).
    pub root: EntityId,
    /// Current world pose.
    pub pose: Pose,
    /// Direct children.
    pub children: Vec<EntityId>,
    /// Scene identifiers attached to the entity.
    pub identifiers: Vec<ObjectIdentifier>,
    /// Resolved capabilities.
    pub capabilities: Capabilities,
    /// Defensive equipment (characters only).
    pub defense: Option<DefenseInfo>,
    /// The entity is a projectile.
    pub projectile: bool,
    /// Item data when the entity is an item.
    pub item: Option<ItemInfo>,
}

impl EntityInfo {
    /// Creates a root entity without capabilities.
    #[must_use]
    pub fn new(id: EntityId, pose: Pose) -> Self {
        Self {
            id,
            root: id,
            pose,
            children: Vec::new(),
            identifiers: Vec::new(),
            capabilities: Capabilities::default(),
            defense: None,
            projectile: false,
            item: None,
        }
    }

    /// Whether this entity is the root of its hierarchy.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.root == self.id
    }
}

/// Read access to scene objects.
pub trait SceneQuery {
    /// Looks up a collider.
    fn collider(&self, id: ColliderId) -> Option<&ColliderInfo>;

    /// Looks up an entity.
    fn entity(&self, id: EntityId) -> Option<&EntityInfo>;

    /// Resolves a collider by a scene-graph path below `owner`.
    fn find_collider(&self, owner: EntityId, path: &str) -> Option<ColliderId>;

    /// Asks the struck entity whether it accepts this impact.
    ///
    /// `None` means the entity does not implement the check.
    fn can_receive_impact(&self, _entity: EntityId, _data: &ImpactCollisionData) -> Option<bool> {
        None
    }

    /// Root of `entity`'s hierarchy (the entity itself when unknown).
    fn root_of(&self, entity: EntityId) -> EntityId {
        self.entity(entity).map_or(entity, |info| info.root)
    }
}

/// Everything impact resolution reads from the world.
pub trait ImpactWorld: SpatialQuery + SceneQuery {}

impl<T: SpatialQuery + SceneQuery> ImpactWorld for T {}

/// Collects intersecting colliders into `out`, up to `capacity` results.
///
/// Returns `true` when the buffer filled up (hits may have been missed).
pub fn collect_intersections<W: SpatialQuery + ?Sized>(
    world: &W,
    shape: &CollisionShape,
    pose: &Pose,
    filter: &SpatialQueryFilter,
    capacity: usize,
    out: &mut Vec<ColliderId>,
) -> bool {
    let mut saturated = false;
    world.shape_intersections_callback(shape, pose, filter, &mut |collider| {
        if out.contains(&collider) {
            return true;
        }
        if out.len() >= capacity {
            saturated = true;
            return false;
        }
        out.push(collider);
        true
    });
    saturated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_radius() {
        assert_eq!(CollisionShape::Sphere { radius: 2.0 }.bounding_radius(), 2.0);
        let capsule = CollisionShape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        assert_eq!(capsule.bounding_radius(), 1.5);
        let cube = CollisionShape::Box {
            half_extents: Vec3::new(3.0, 4.0, 0.0),
        };
        assert!((cube.bounding_radius() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_filter_builder() {
        let root = EntityId::from_raw(9);
        let filter = SpatialQueryFilter::from_mask(LayerMask::layer(2)).excluding(root);
        assert_eq!(filter.excluded_root, Some(root));
        assert!(filter.mask.contains_layer(2));
    }

    #[test]
    fn test_pivot_point_uses_offset() {
        let mut info = ColliderInfo::new(
            ColliderId::new(1),
            EntityId::from_raw(1),
            0,
            CollisionShape::default(),
            Pose::from_position(Vec3::new(1.0, 0.0, 0.0)),
        );
        assert_eq!(info.pivot_point(), Vec3::new(1.0, 0.0, 0.0));
        info.pivot_offset = Some(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(info.pivot_point(), Vec3::new(1.0, 1.0, 0.0));
    }
}
