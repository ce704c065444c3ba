//! Redirects body hits to a defender's shield.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::world::{ColliderInfo, ImpactWorld};

/// Decides whether a struck body collider should be replaced by the
/// defender's shield collider.
///
/// The defender must face the attacker (forward directions' dot product
/// below `sensitivity`), carry a shield collider, and be aiming if the
/// shield requires it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColliderOverrideResolver {
    /// Forward dot product threshold (-1 = exactly facing each other)
    pub sensitivity: f32,
}

impl Default for ColliderOverrideResolver {
    fn default() -> Self {
        Self { sensitivity: -0.5 }
    }
}

impl ColliderOverrideResolver {
    /// Creates a resolver with a threshold.
    #[must_use]
    pub const fn new(sensitivity: f32) -> Self {
        Self { sensitivity }
    }

    /// Returns the shield collider that intercepts the hit, if any.
    #[must_use]
    pub fn resolve<'w>(
        &self,
        attacker_forward: Vec3,
        struck: &ColliderInfo,
        world: &'w dyn ImpactWorld,
    ) -> Option<&'w ColliderInfo> {
        let defender = world.entity(world.root_of(struck.owner))?;
        let defense = defender.defense?;
        let shield = defense.shield_collider?;
        if shield == struck.id {
            return None;
        }
        if defense.requires_aim && !defense.aiming {
            return None;
        }

        let facing = attacker_forward
            .normalize_or_zero()
            .dot(defender.pose.forward().normalize_or_zero());
        if facing >= self.sensitivity {
            return None;
        }

        debug!(
            "Hit on {:?} redirected to shield {:?} (dot {:.2})",
            struck.id, shield, facing
        );
        world.collider(shield)
    }
}
