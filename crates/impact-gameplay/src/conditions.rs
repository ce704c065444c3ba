//! Condition pipeline: predicates that can veto an impact.
//!
//! A group passes when every enabled condition passes. Disabled conditions
//! never veto, so an empty or fully disabled group passes.

use std::fmt;

use ahash::AHashSet;
use impact_common::{CategoryId, EntityId, ItemDefinitionId, ObjectIdentifier};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{ImpactCallbackContext, ImpactOwner};
use crate::world::ImpactWorld;

/// A predicate deciding whether an impact proceeds.
pub trait ImpactCondition: fmt::Debug {
    /// Stable type tag.
    fn kind(&self) -> &'static str;

    /// Binds the condition to the pipeline owner.
    fn initialize(&mut self, _owner: &ImpactOwner) {}

    /// Returns `false` to veto the impact.
    fn can_impact(&self, context: &ImpactCallbackContext, world: &dyn ImpactWorld) -> bool;
}

/// A condition plus its enable flag.
#[derive(Debug)]
pub struct ConditionSlot {
    /// Disabled conditions always pass.
    pub enabled: bool,
    condition: Box<dyn ImpactCondition>,
}

impl ConditionSlot {
    /// Wraps an enabled condition.
    #[must_use]
    pub fn new(condition: Box<dyn ImpactCondition>) -> Self {
        Self {
            enabled: true,
            condition,
        }
    }

    /// Sets the enable flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The wrapped condition.
    #[must_use]
    pub fn condition(&self) -> &dyn ImpactCondition {
        self.condition.as_ref()
    }
}

/// Ordered conjunction of conditions.
#[derive(Debug, Default)]
pub struct ImpactActionConditionGroup {
    conditions: Vec<ConditionSlot>,
}

impl ImpactActionConditionGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a condition.
    pub fn push(&mut self, slot: ConditionSlot) {
        self.conditions.push(slot);
    }

    /// Appends a condition (builder form).
    #[must_use]
    pub fn with(mut self, condition: impl ImpactCondition + 'static) -> Self {
        self.push(ConditionSlot::new(Box::new(condition)));
        self
    }

    /// Binds every condition to the pipeline owner.
    pub fn initialize(&mut self, owner: &ImpactOwner) {
        for slot in &mut self.conditions {
            slot.condition.initialize(owner);
        }
    }

    /// Evaluates the conditions in order, stopping at the first veto.
    #[must_use]
    pub fn can_impact(&self, context: &ImpactCallbackContext, world: &dyn ImpactWorld) -> bool {
        self.conditions
            .iter()
            .filter(|slot| slot.enabled)
            .all(|slot| {
                let passed = slot.condition.can_impact(context, world);
                if !passed {
                    debug!(
                        "Condition '{}' vetoed impact from {}",
                        slot.condition.kind(),
                        context.collision.source_id
                    );
                }
                passed
            })
    }

    /// Number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Whether the group holds no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Read access for inspection.
    #[must_use]
    pub fn slots(&self) -> &[ConditionSlot] {
        &self.conditions
    }

    /// Mutable access to a condition slot (enable toggling).
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ConditionSlot> {
        self.conditions.get_mut(index)
    }
}

// ============================================================================
// Built-in conditions
// ============================================================================

/// Lets the struck entity decide whether it accepts the impact.
///
/// Entities without that capability accept every impact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetBehaviorCondition {}

impl ImpactCondition for TargetBehaviorCondition {
    fn kind(&self) -> &'static str {
        "target_behavior"
    }

    fn can_impact(&self, context: &ImpactCallbackContext, world: &dyn ImpactWorld) -> bool {
        let Some(target) = context.collision.target_entity else {
            return true;
        };
        world
            .can_receive_impact(target, &context.collision)
            .unwrap_or(true)
    }
}

/// Passes when the struck entity, or one of its children within
/// `search_depth` levels, carries one of the identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierCondition {
    /// Accepted identifiers
    pub identifiers: Vec<ObjectIdentifier>,
    /// Levels of children to search (0 = the struck entity only)
    pub search_depth: u32,
}

impl IdentifierCondition {
    fn carries(&self, world: &dyn ImpactWorld, entity: EntityId) -> bool {
        world.entity(entity).is_some_and(|info| {
            info.identifiers
                .iter()
                .any(|identifier| self.identifiers.contains(identifier))
        })
    }
}

impl ImpactCondition for IdentifierCondition {
    fn kind(&self) -> &'static str {
        "identifier"
    }

    fn can_impact(&self, context: &ImpactCallbackContext, world: &dyn ImpactWorld) -> bool {
        let Some(target) = context.collision.target_entity else {
            return false;
        };

        let mut visited = AHashSet::new();
        let mut frontier = vec![target];
        for depth in 0..=self.search_depth {
            let mut next = Vec::new();
            for entity in frontier {
                if !visited.insert(entity) {
                    continue;
                }
                if self.carries(world, entity) {
                    return true;
                }
                if depth < self.search_depth {
                    if let Some(info) = world.entity(entity) {
                        next.extend_from_slice(&info.children);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        false
    }
}

/// Passes based on the item that caused the impact.
///
/// Matching means the item is in one of `categories` or is one of
/// `definitions`. `invert` flips the result. Impacts without an item are
/// decided by `allow_no_weapon` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceItemCondition {
    /// Accepted item categories
    pub categories: Vec<CategoryId>,
    /// Accepted item definitions
    pub definitions: Vec<ItemDefinitionId>,
    /// Pass when the item does NOT match
    pub invert: bool,
    /// Result for impacts without an item
    pub allow_no_weapon: bool,
}

impl Default for SourceItemCondition {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            definitions: Vec::new(),
            invert: false,
            allow_no_weapon: true,
        }
    }
}

impl ImpactCondition for SourceItemCondition {
    fn kind(&self) -> &'static str {
        "source_item"
    }

    fn can_impact(&self, context: &ImpactCallbackContext, world: &dyn ImpactWorld) -> bool {
        let item = context
            .collision
            .damage_source
            .and_then(|source| source.item)
            .or_else(|| context.owner.and_then(|owner| owner.item))
            .and_then(|entity| world.entity(entity))
            .and_then(|info| info.item.as_ref());

        let Some(item) = item else {
            return self.allow_no_weapon;
        };

        let matches = self.definitions.contains(&item.definition)
            || self.categories.iter().any(|&category| item.in_category(category));
        matches != self.invert
    }
}

/// Distinguishes projectile hits from direct hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileCondition {
    /// Pass hits delivered by a projectile
    pub allow_projectile: bool,
    /// Pass direct hits
    pub allow_direct: bool,
}

impl Default for ProjectileCondition {
    fn default() -> Self {
        Self {
            allow_projectile: true,
            allow_direct: true,
        }
    }
}

impl ImpactCondition for ProjectileCondition {
    fn kind(&self) -> &'static str {
        "projectile"
    }

    fn can_impact(&self, context: &ImpactCallbackContext, world: &dyn ImpactWorld) -> bool {
        let collision = &context.collision;
        let from_projectile = collision
            .damage_source
            .is_some_and(|source| source.projectile.is_some())
            || collision
                .source_entity
                .and_then(|entity| world.entity(entity))
                .is_some_and(|info| info.projectile);

        if from_projectile {
            self.allow_projectile
        } else {
            self.allow_direct
        }
    }
}
