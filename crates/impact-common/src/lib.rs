//! # Impact Common
//!
//! Common types shared by the impact resolution crates:
//! - ID types (EntityId, ColliderId, SourceId, ...)
//! - Collision layer masks
//! - World poses
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod layers;
pub mod pose;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::layers::*;
    pub use crate::pose::*;
}

pub use prelude::*;
