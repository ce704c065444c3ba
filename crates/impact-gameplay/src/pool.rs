//! Generation-checked object pool.
//!
//! Slots are created once and recycled. A [`Handle`] carries the slot's
//! generation at acquire time; releasing bumps the generation, so any handle
//! kept past release (use-after-release, double release) is rejected with
//! [`PoolError::StaleHandle`] instead of silently aliasing the next user.

use std::fmt;
use std::marker::PhantomData;

use impact_common::PoolError;
use tracing::debug;

use crate::context::ImpactCallbackContext;

/// Type that can live in a [`Pool`].
pub trait Poolable: Default {
    /// Restores the value to its freshly constructed state.
    fn reset(&mut self);

    /// Deep-copies `other` into `self`.
    fn copy_from(&mut self, other: &Self);
}

/// Generation-checked reference to a pooled value.
pub struct Handle<T> {
    slot: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(slot: u32, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index inside the pool.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Generation the handle was issued with.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.slot, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    in_use: bool,
}

/// Pool usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots allocated so far.
    pub capacity: usize,
    /// Slots currently handed out.
    pub in_use: usize,
    /// Highest simultaneous `in_use` seen.
    pub peak_in_use: usize,
    /// Slots allocated after warm-up because the pool ran dry.
    pub grown: usize,
}

/// Recycling store of `T` values addressed by [`Handle`].
#[derive(Debug)]
pub struct Pool<T: Poolable> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    stats: PoolStats,
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T: Poolable> Pool<T> {
    /// Creates a pool with `capacity` pre-built slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            value: T::default(),
            generation: 0,
            in_use: false,
        });
        // Reverse so the lowest slot is handed out first.
        let free = (0..capacity as u32).rev().collect();
        Self {
            slots,
            free,
            stats: PoolStats {
                capacity,
                ..PoolStats::default()
            },
        }
    }

    /// Takes a reset value out of the pool.
    pub fn acquire(&mut self) -> Handle<T> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    value: T::default(),
                    generation: 0,
                    in_use: false,
                });
                self.stats.capacity += 1;
                self.stats.grown += 1;
                debug!("Pool grew to {} slots", self.stats.capacity);
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.in_use = true;
        self.stats.in_use += 1;
        self.stats.peak_in_use = self.stats.peak_in_use.max(self.stats.in_use);
        Handle::new(index, slot.generation)
    }

    /// Resets the value and returns it to the pool.
    ///
    /// The handle (and every copy of it) becomes stale.
    pub fn release(&mut self, handle: Handle<T>) -> Result<(), PoolError> {
        let slot = self.slot_mut(handle)?;
        slot.value.reset();
        slot.generation = slot.generation.wrapping_add(1);
        slot.in_use = false;
        self.free.push(handle.slot);
        self.stats.in_use -= 1;
        Ok(())
    }

    /// Takes a new value out of the pool holding a deep copy of `source`.
    pub fn duplicate(&mut self, source: Handle<T>) -> Result<Handle<T>, PoolError> {
        self.slot(source)?;
        let copy = self.acquire();

        let (src, dst) = (source.slot as usize, copy.slot as usize);
        if src < dst {
            let (head, tail) = self.slots.split_at_mut(dst);
            tail[0].value.copy_from(&head[src].value);
        } else {
            let (head, tail) = self.slots.split_at_mut(src);
            head[dst].value.copy_from(&tail[0].value);
        }
        Ok(copy)
    }

    /// Borrows a live value.
    pub fn get(&self, handle: Handle<T>) -> Result<&T, PoolError> {
        self.slot(handle).map(|slot| &slot.value)
    }

    /// Mutably borrows a live value.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, PoolError> {
        self.slot_mut(handle).map(|slot| &mut slot.value)
    }

    /// Whether `handle` still refers to a live value.
    #[must_use]
    pub fn is_live(&self, handle: Handle<T>) -> bool {
        self.slot(handle).is_ok()
    }

    /// Number of values currently handed out.
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.stats.in_use
    }

    /// Number of slots allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Usage counters.
    #[must_use]
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    fn slot(&self, handle: Handle<T>) -> Result<&Slot<T>, PoolError> {
        let slot = self
            .slots
            .get(handle.slot as usize)
            .ok_or(PoolError::OutOfRange(handle.slot))?;
        if slot.in_use && slot.generation == handle.generation {
            Ok(slot)
        } else {
            Err(PoolError::StaleHandle {
                slot: handle.slot,
                generation: handle.generation,
            })
        }
    }

    fn slot_mut(&mut self, handle: Handle<T>) -> Result<&mut Slot<T>, PoolError> {
        let slot = self
            .slots
            .get_mut(handle.slot as usize)
            .ok_or(PoolError::OutOfRange(handle.slot))?;
        if slot.in_use && slot.generation == handle.generation {
            Ok(slot)
        } else {
            Err(PoolError::StaleHandle {
                slot: handle.slot,
                generation: handle.generation,
            })
        }
    }
}

/// Pool of callback contexts.
pub type ContextPool = Pool<ImpactCallbackContext>;

/// Handle to a pooled callback context.
pub type ContextHandle = Handle<ImpactCallbackContext>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage_data::ImpactDamageData;
    use glam::Vec3;
    use impact_common::{EntityId, SourceId};

    #[test]
    fn test_acquire_release_acquire_is_reset() {
        let mut pool = ContextPool::with_capacity(1);

        let first = pool.acquire();
        if let Ok(ctx) = pool.get_mut(first) {
            ctx.collision
                .initialize(SourceId::new(7), Vec3::ONE, Vec3::Z, 5.0);
            ctx.collision.target_entity = Some(EntityId::from_raw(3));
            ctx.set_damage(&ImpactDamageData::with_amount(40.0));
        }
        assert!(pool.release(first).is_ok());

        let second = pool.acquire();
        assert_eq!(second.slot(), first.slot());
        let ctx = pool.get(second);
        assert!(ctx.is_ok());
        if let Ok(ctx) = ctx {
            assert!(!ctx.collision.is_initialized());
            assert_eq!(ctx.collision.source_id, SourceId::default());
            assert!(ctx.collision.target_entity.is_none());
            assert!(ctx.damage().is_none());
        }
    }

    #[test]
    fn test_double_release_is_rejected() {
        let mut pool = ContextPool::with_capacity(2);
        let handle = pool.acquire();
        assert!(pool.release(handle).is_ok());
        assert_eq!(
            pool.release(handle),
            Err(PoolError::StaleHandle {
                slot: handle.slot(),
                generation: handle.generation(),
            })
        );
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_stale_handle_cannot_read_new_owner() {
        let mut pool = ContextPool::with_capacity(1);
        let old = pool.acquire();
        assert!(pool.release(old).is_ok());
        let new = pool.acquire();

        assert!(pool.get(old).is_err());
        assert!(pool.get_mut(old).is_err());
        assert!(pool.is_live(new));
        assert!(!pool.is_live(old));
    }

    #[test]
    fn test_out_of_range_handle() {
        let mut other = ContextPool::with_capacity(4);
        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(other.acquire());
        }
        let pool = ContextPool::with_capacity(1);
        assert_eq!(pool.get(handles[3]).err(), Some(PoolError::OutOfRange(3)));
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut pool = ContextPool::with_capacity(2);
        let original = pool.acquire();
        if let Ok(ctx) = pool.get_mut(original) {
            ctx.collision.strength = 2.0;
            ctx.collision.hit_colliders.push(impact_common::ColliderId::new(1));
        }

        let copy = pool.duplicate(original);
        assert!(copy.is_ok());
        let Ok(copy) = copy else { return };

        if let Ok(ctx) = pool.get_mut(original) {
            ctx.collision.strength = 9.0;
            ctx.collision.hit_colliders.clear();
        }
        let dup = pool.get(copy).map(|c| (c.collision.strength, c.collision.hit_count));
        assert_eq!(dup, Ok((2.0, 0)));
        assert_eq!(
            pool.get(copy).map(|c| c.collision.hit_colliders.len()),
            Ok(1)
        );
    }

    #[test]
    fn test_grows_and_tracks_stats() {
        let mut pool = ContextPool::with_capacity(1);
        let a = pool.acquire();
        let b = pool.acquire();
        let stats = pool.stats();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.grown, 1);
        assert_eq!(stats.peak_in_use, 2);

        assert!(pool.release(a).is_ok());
        assert!(pool.release(b).is_ok());
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.stats().peak_in_use, 2);
    }
}
