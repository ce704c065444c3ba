//! Melee hitboxes: named weapon volumes with activation rules.

use impact_common::{ColliderId, ConfigError, EntityId, Pose, SurfaceImpactId};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::world::SceneQuery;

/// Distance below which a hitbox counts as stationary.
const MOVEMENT_EPSILON: f32 = 1e-4;

/// Authored hitbox settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitboxConfig {
    /// Display name
    pub name: String,
    /// Collider used directly when set
    pub collider: Option<ColliderId>,
    /// Scene path resolved below the weapon when `collider` is unset
    pub collider_path: Option<String>,
    /// Distance the hitbox must travel in the attacker's local space since
    /// the swing started before it can hit
    pub min_local_offset: f32,
    /// Only hit while the hitbox moved since the previous check
    pub require_movement: bool,
    /// Stop after the first hit of a swing
    pub single_hit: bool,
    /// Surface impact override
    pub surface_impact: Option<SurfaceImpactId>,
    /// Multiplier applied to the impact strength
    pub damage_multiplier: f32,
}

impl Default for HitboxConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            collider: None,
            collider_path: None,
            min_local_offset: 0.0,
            require_movement: false,
            single_hit: false,
            surface_impact: None,
            damage_multiplier: 1.0,
        }
    }
}

impl HitboxConfig {
    /// A hitbox bound to a collider.
    #[must_use]
    pub fn for_collider(name: impl Into<String>, collider: ColliderId) -> Self {
        Self {
            name: name.into(),
            collider: Some(collider),
            ..Self::default()
        }
    }

    /// A hitbox resolved from a scene path.
    #[must_use]
    pub fn for_path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collider_path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Runtime state of a hitbox.
#[derive(Debug, Clone, PartialEq)]
pub struct MeleeHitbox {
    config: HitboxConfig,
    resolved: Option<ColliderId>,
    swing_origin: Option<glam::Vec3>,
    previous_pose: Option<Pose>,
    exhausted: bool,
}

impl MeleeHitbox {
    /// Creates an unresolved hitbox.
    #[must_use]
    pub fn new(config: HitboxConfig) -> Self {
        Self {
            config,
            resolved: None,
            swing_origin: None,
            previous_pose: None,
            exhausted: false,
        }
    }

    /// Authored settings.
    #[must_use]
    pub const fn config(&self) -> &HitboxConfig {
        &self.config
    }

    /// Collider found by the last [`resolve`](Self::resolve).
    #[must_use]
    pub const fn collider(&self) -> Option<ColliderId> {
        self.resolved
    }

    /// Pose at the previous check of this swing.
    #[must_use]
    pub const fn previous_pose(&self) -> Option<Pose> {
        self.previous_pose
    }

    /// Whether a single-hit hitbox already hit this swing.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Finds the collider, preferring the direct reference and falling back
    /// to the scene path below `owner` (the weapon may have been re-equipped).
    pub fn resolve(&mut self, owner: EntityId, scene: &(impl SceneQuery + ?Sized)) -> Result<ColliderId, ConfigError> {
        let direct = self
            .config
            .collider
            .filter(|&collider| scene.collider(collider).is_some());
        let found = direct.or_else(|| {
            self.config
                .collider_path
                .as_deref()
                .and_then(|path| scene.find_collider(owner, path))
        });

        self.resolved = found;
        found.ok_or_else(|| {
            error!("Hitbox '{}' has no resolvable collider", self.config.name);
            ConfigError::MissingCollider(self.config.name.clone())
        })
    }

    /// Starts a swing: re-resolves the collider and records the start pose.
    pub fn begin_swing(&mut self, owner: EntityId, attacker: &Pose, scene: &(impl SceneQuery + ?Sized)) {
        self.exhausted = false;
        self.previous_pose = None;
        self.swing_origin = None;

        if let Ok(collider) = self.resolve(owner, scene) {
            if let Some(info) = scene.collider(collider) {
                self.previous_pose = Some(info.pose);
                self.swing_origin = Some(attacker.inverse_transform_point(info.pose.position));
            }
        }
    }

    /// Whether the hitbox may hit at `current` this tick.
    #[must_use]
    pub fn can_activate(&self, current: &Pose, attacker: &Pose) -> bool {
        if self.exhausted {
            return false;
        }
        if self.config.min_local_offset > 0.0 {
            let local = attacker.inverse_transform_point(current.position);
            let travelled = self
                .swing_origin
                .map_or(0.0, |origin| origin.distance(local));
            if travelled < self.config.min_local_offset {
                return false;
            }
        }
        if self.config.require_movement {
            let moved = self
                .previous_pose
                .map_or(true, |previous| {
                    previous.position.distance(current.position) > MOVEMENT_EPSILON
                        || previous.rotation.angle_between(current.rotation) > MOVEMENT_EPSILON
                });
            if !moved {
                return false;
            }
        }
        true
    }

    /// Records the pose checked this tick.
    pub fn note_checked(&mut self, current: Pose) {
        self.previous_pose = Some(current);
    }

    /// Records a hit.
    pub fn mark_hit(&mut self) {
        if self.config.single_hit {
            self.exhausted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWorld;
    use glam::Vec3;

    #[test]
    fn test_resolve_falls_back_to_path() {
        let mut world = MockWorld::new();
        let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
        let blade = world.add_sphere_collider(attacker, 3, Vec3::Z, 0.2);
        world.name_collider(attacker, "blade", blade);

        let mut direct = MeleeHitbox::new(HitboxConfig::for_collider("tip", blade));
        assert_eq!(direct.resolve(attacker, &world), Ok(blade));

        let mut by_path = MeleeHitbox::new(HitboxConfig {
            collider: Some(ColliderId::new(999)),
            ..HitboxConfig::for_path("tip", "blade")
        });
        assert_eq!(by_path.resolve(attacker, &world), Ok(blade));

        let mut missing = MeleeHitbox::new(HitboxConfig::for_path("tip", "hilt"));
        assert_eq!(
            missing.resolve(attacker, &world),
            Err(ConfigError::MissingCollider("tip".to_string()))
        );
    }

    #[test]
    fn test_single_hit_exhausts_until_next_swing() {
        let mut world = MockWorld::new();
        let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
        let blade = world.add_sphere_collider(attacker, 3, Vec3::Z, 0.2);
        let mut hitbox = MeleeHitbox::new(HitboxConfig {
            single_hit: true,
            ..HitboxConfig::for_collider("tip", blade)
        });

        hitbox.begin_swing(attacker, &Pose::IDENTITY, &world);
        let pose = Pose::from_position(Vec3::Z);
        assert!(hitbox.can_activate(&pose, &Pose::IDENTITY));
        hitbox.mark_hit();
        assert!(!hitbox.can_activate(&pose, &Pose::IDENTITY));

        hitbox.begin_swing(attacker, &Pose::IDENTITY, &world);
        assert!(hitbox.can_activate(&pose, &Pose::IDENTITY));
    }

    #[test]
    fn test_activation_rules() {
        let mut world = MockWorld::new();
        let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
        let blade = world.add_sphere_collider(attacker, 3, Vec3::Z, 0.2);
        let mut hitbox = MeleeHitbox::new(HitboxConfig {
            min_local_offset: 0.5,
            require_movement: true,
            ..HitboxConfig::for_collider("tip", blade)
        });
        hitbox.begin_swing(attacker, &Pose::IDENTITY, &world);

        let near = Pose::from_position(Vec3::new(0.2, 0.0, 1.0));
        assert!(!hitbox.can_activate(&near, &Pose::IDENTITY));

        let far = Pose::from_position(Vec3::new(1.0, 0.0, 1.0));
        assert!(hitbox.can_activate(&far, &Pose::IDENTITY));

        hitbox.note_checked(far);
        assert!(!hitbox.can_activate(&far, &Pose::IDENTITY));
    }
}
