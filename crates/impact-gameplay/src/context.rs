//! Callback context handed to conditions and actions.

use impact_common::EntityId;

use crate::collision_data::ImpactCollisionData;
use crate::damage_data::ImpactDamageData;
use crate::pool::Poolable;

/// Character and item that own a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpactOwner {
    /// Character using the pipeline.
    pub character: EntityId,
    /// Item the pipeline belongs to, if any.
    pub item: Option<EntityId>,
}

impl ImpactOwner {
    /// Creates an owner without an item.
    #[must_use]
    pub const fn character(character: EntityId) -> Self {
        Self {
            character,
            item: None,
        }
    }

    /// Sets the owning item.
    #[must_use]
    pub const fn with_item(mut self, item: EntityId) -> Self {
        self.item = Some(item);
        self
    }
}

/// One hit's worth of data flowing through conditions and actions.
///
/// Wraps exactly one collision record and optional damage data. Contexts
/// live in a [`Pool`](crate::pool::Pool) and are addressed by handle.
#[derive(Debug, Clone, Default)]
pub struct ImpactCallbackContext {
    /// Hit description.
    pub collision: ImpactCollisionData,
    damage: ImpactDamageData,
    has_damage: bool,
    /// Owner of the pipeline resolving this context.
    pub owner: Option<ImpactOwner>,
}

impl ImpactCallbackContext {
    /// Damage data, if any was attached.
    #[must_use]
    pub fn damage(&self) -> Option<&ImpactDamageData> {
        self.has_damage.then_some(&self.damage)
    }

    /// Mutable damage data, if any was attached.
    pub fn damage_mut(&mut self) -> Option<&mut ImpactDamageData> {
        if self.has_damage {
            Some(&mut self.damage)
        } else {
            None
        }
    }

    /// Attaches damage data (copied into the pooled slot).
    pub fn set_damage(&mut self, damage: &ImpactDamageData) {
        self.damage.copy_from(damage);
        self.has_damage = true;
    }

    /// Detaches and resets the damage data.
    pub fn clear_damage(&mut self) {
        self.damage.reset();
        self.has_damage = false;
    }
}

impl Poolable for ImpactCallbackContext {
    fn reset(&mut self) {
        self.collision.reset();
        self.clear_damage();
        self.owner = None;
    }

    fn copy_from(&mut self, other: &Self) {
        self.collision.copy_from(&other.collision);
        self.damage.copy_from(&other.damage);
        self.has_damage = other.has_damage;
        self.owner = other.owner;
    }
}
