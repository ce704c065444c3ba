//! ID types for entities, colliders and authored resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for entity IDs.
static ENTITY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an entity (character, item, prop) in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new unique entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(ENTITY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an entity ID from a raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) entity ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Declares a plain `u32` identifier newtype.
macro_rules! raw_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw value.
            #[must_use]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Returns the raw ID value.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

raw_id! {
    /// Identifier of a collision volume registered with the spatial backend.
    ColliderId
}

raw_id! {
    /// Identifier of a simulated rigid body.
    RigidBodyId
}

raw_id! {
    /// Identifier of an item definition (e.g. "iron sword").
    ItemDefinitionId
}

raw_id! {
    /// Identifier of an item category (e.g. "blades").
    CategoryId
}

raw_id! {
    /// Identifier of an authored surface impact (sound/decal/particle set).
    SurfaceImpactId
}

raw_id! {
    /// Scene-level tag attached to an entity for identifier checks.
    ObjectIdentifier
}

raw_id! {
    /// Identifier of an authored audio clip.
    AudioClipId
}

raw_id! {
    /// Identifier of an authored particle prefab.
    ParticlePrefabId
}

/// Identifier of the originating cast/use of an impact (one swing, one shot).
///
/// Scopes multi-hit suppression and ricochet chain counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(u32);

impl SourceId {
    /// Creates a source ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Handle to a live particle instance owned by the particle backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticleInstanceId(u64);

impl ParticleInstanceId {
    /// Creates a particle instance ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}
