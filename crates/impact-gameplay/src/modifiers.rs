//! Pooled attribute modifiers that keep applying over time.

use impact_common::EntityId;
use tracing::{debug, warn};

use crate::effects::ImpactEffects;
use crate::pool::{Handle, Pool, Poolable};
use crate::world::AttributeHostHandle;

/// A running attribute change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeModifier {
    /// Attribute host being modified.
    pub host: Option<AttributeHostHandle>,
    /// Attribute name.
    pub attribute: String,
    /// Delta applied per application.
    pub amount: f32,
    /// Seconds between applications.
    pub interval: f32,
    /// Applications still to perform.
    pub remaining: u32,
    /// Simulation time of the next application.
    pub next_due: f64,
}

impl Poolable for AttributeModifier {
    fn reset(&mut self) {
        self.host = None;
        self.attribute.clear();
        self.amount = 0.0;
        self.interval = 0.0;
        self.remaining = 0;
        self.next_due = 0.0;
    }

    fn copy_from(&mut self, other: &Self) {
        self.clone_from(other);
    }
}

/// Handle to an active modifier.
pub type ModifierHandle = Handle<AttributeModifier>;

/// Parameters of a new modifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifierSpec<'a> {
    /// Attribute host to modify.
    pub host: AttributeHostHandle,
    /// Attribute name.
    pub attribute: &'a str,
    /// Delta per application.
    pub amount: f32,
    /// Seconds between applications.
    pub interval: f32,
    /// Total number of applications (including the immediate one).
    pub applications: u32,
}

/// Active modifiers, ticked by the impact system.
///
/// A modifier returns itself to the pool after its last application or when
/// its attribute disappears.
#[derive(Debug, Default)]
pub struct AttributeModifierPool {
    pool: Pool<AttributeModifier>,
    active: Vec<ModifierHandle>,
}

impl AttributeModifierPool {
    /// Creates a pool with pre-built slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: Pool::with_capacity(capacity),
            active: Vec::with_capacity(capacity),
        }
    }

    /// Applies the first delta now and keeps the modifier running if more
    /// applications remain.
    ///
    /// Returns `false` if the host has no such attribute.
    pub fn start(&mut self, spec: ModifierSpec<'_>, now: f64, effects: &mut dyn ImpactEffects) -> bool {
        if !effects.modify_attribute(spec.host, spec.attribute, spec.amount) {
            warn!(
                "Entity {} has no attribute '{}'",
                spec.host.entity(),
                spec.attribute
            );
            return false;
        }

        let remaining = spec.applications.saturating_sub(1);
        if remaining == 0 || spec.interval <= 0.0 {
            return true;
        }

        let handle = self.pool.acquire();
        if let Ok(modifier) = self.pool.get_mut(handle) {
            modifier.host = Some(spec.host);
            modifier.attribute.push_str(spec.attribute);
            modifier.amount = spec.amount;
            modifier.interval = spec.interval;
            modifier.remaining = remaining;
            modifier.next_due = now + f64::from(spec.interval);
        }
        self.active.push(handle);
        true
    }

    /// Applies every due delta and releases finished modifiers.
    pub fn update(&mut self, now: f64, effects: &mut dyn ImpactEffects) {
        let mut index = 0;
        while index < self.active.len() {
            let handle = self.active[index];
            let finished = match self.pool.get_mut(handle) {
                Ok(modifier) => Self::tick(modifier, now, effects),
                Err(_) => true,
            };
            if finished {
                self.active.swap_remove(index);
                if let Err(err) = self.pool.release(handle) {
                    warn!("Modifier release failed: {}", err);
                }
            } else {
                index += 1;
            }
        }
    }

    fn tick(modifier: &mut AttributeModifier, now: f64, effects: &mut dyn ImpactEffects) -> bool {
        let Some(host) = modifier.host else {
            return true;
        };
        while modifier.remaining > 0 && modifier.next_due <= now {
            if !effects.modify_attribute(host, &modifier.attribute, modifier.amount) {
                debug!("Attribute '{}' vanished, stopping modifier", modifier.attribute);
                return true;
            }
            modifier.remaining -= 1;
            modifier.next_due += f64::from(modifier.interval);
        }
        modifier.remaining == 0
    }

    /// Stops every modifier targeting `entity`.
    pub fn cancel_entity(&mut self, entity: EntityId) {
        let pool = &mut self.pool;
        self.active.retain(|&handle| {
            let targets = pool
                .get(handle)
                .ok()
                .and_then(|m| m.host)
                .is_some_and(|host| host.entity() == entity);
            if targets {
                let _ = pool.release(handle);
            }
            !targets
        });
    }

    /// Number of running modifiers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of pooled modifiers currently handed out.
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.pool.in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordedEffect, RecordingEffects};

    fn spec(host: AttributeHostHandle, applications: u32) -> ModifierSpec<'static> {
        ModifierSpec {
            host,
            attribute: "stamina",
            amount: -5.0,
            interval: 0.5,
            applications,
        }
    }

    #[test]
    fn test_single_application_is_not_pooled() {
        let mut pool = AttributeModifierPool::with_capacity(2);
        let mut effects = RecordingEffects::new();
        let host = AttributeHostHandle::new(EntityId::from_raw(3));

        assert!(pool.start(spec(host, 1), 0.0, &mut effects));
        assert_eq!(pool.active_count(), 0);
        assert_eq!(effects.count(|e| matches!(e, RecordedEffect::Attribute { .. })), 1);
    }

    #[test]
    fn test_repeats_then_returns_to_pool() {
        let mut pool = AttributeModifierPool::with_capacity(2);
        let mut effects = RecordingEffects::new();
        let host = AttributeHostHandle::new(EntityId::from_raw(3));

        assert!(pool.start(spec(host, 3), 0.0, &mut effects));
        assert_eq!(pool.in_use(), 1);

        pool.update(0.4, &mut effects);
        assert_eq!(effects.count(|e| matches!(e, RecordedEffect::Attribute { .. })), 1);

        pool.update(1.0, &mut effects);
        assert_eq!(effects.count(|e| matches!(e, RecordedEffect::Attribute { .. })), 3);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_missing_attribute_fails() {
        let mut pool = AttributeModifierPool::with_capacity(1);
        let mut effects = RecordingEffects::new();
        effects.reject_attribute("stamina");
        let host = AttributeHostHandle::new(EntityId::from_raw(3));
        assert!(!pool.start(spec(host, 3), 0.0, &mut effects));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_cancel_entity() {
        let mut pool = AttributeModifierPool::with_capacity(2);
        let mut effects = RecordingEffects::new();
        let host = AttributeHostHandle::new(EntityId::from_raw(3));
        pool.start(spec(host, 4), 0.0, &mut effects);
        pool.cancel_entity(EntityId::from_raw(3));
        assert_eq!(pool.in_use(), 0);
    }
}
