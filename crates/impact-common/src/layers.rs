//! Collision layer bitmasks.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, Not};

/// Bitmask of collision layers (32 layers, one bit each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Mask matching no layer.
    pub const NONE: Self = Self(0);

    /// Mask matching every layer.
    pub const ALL: Self = Self(u32::MAX);

    /// Creates a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Creates a mask containing a single layer index (0-31).
    ///
    /// Out of range indices produce an empty mask.
    #[must_use]
    pub const fn layer(index: u8) -> Self {
        if index < 32 {
            Self(1 << index)
        } else {
            Self::NONE
        }
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Checks whether the given layer index is part of this mask.
    #[must_use]
    pub const fn contains_layer(self, index: u8) -> bool {
        index < 32 && self.0 & (1 << index) != 0
    }

    /// Checks whether any bit is shared with another mask.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns this mask without the given layer index.
    #[must_use]
    pub const fn without_layer(self, index: u8) -> Self {
        if index < 32 {
            Self(self.0 & !(1 << index))
        } else {
            self
        }
    }

    /// Checks if no layer is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for LayerMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for LayerMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}
