//! Error types shared across the impact crates.

use thiserror::Error;

/// Top-level error type for impact resolution.
#[derive(Debug, Error)]
pub enum ImpactError {
    /// Pooled object misuse (stale handle, double release)
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Authored configuration could not be turned into runtime objects
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scheduler misuse
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Pipeline does not exist (never registered or already destroyed)
    #[error("Unknown pipeline {0}")]
    UnknownPipeline(u32),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pooled object errors.
///
/// These indicate caller bugs: use-after-release, double release and use
/// before initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The handle's generation no longer matches its slot
    #[error("stale handle: slot {slot} generation {generation} was released")]
    StaleHandle {
        /// Slot index
        slot: u32,
        /// Generation carried by the handle
        generation: u32,
    },

    /// The handle points past the pool's slots
    #[error("handle slot {0} out of range")]
    OutOfRange(u32),

    /// The pooled value was acquired but never initialized
    #[error("pooled value used before initialization")]
    Uninitialized,
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No factory registered for a variant tag
    #[error("unknown {family} variant '{kind}'")]
    UnknownVariant {
        /// Variant family ("action" or "condition")
        family: &'static str,
        /// The unrecognized tag
        kind: String,
    },

    /// Variant parameters failed to deserialize
    #[error("invalid parameters for '{kind}': {reason}")]
    InvalidParams {
        /// Variant tag
        kind: String,
        /// Deserializer message
        reason: String,
    },

    /// A hitbox has neither a collider nor a resolvable scene path
    #[error("hitbox '{0}' has no resolvable collider")]
    MissingCollider(String),

    /// Asset text could not be parsed
    #[error("failed to parse asset: {0}")]
    Parse(String),

    /// A value is outside its allowed range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// Why it is invalid
        reason: String,
    },
}

/// Result type alias for impact operations.
pub type ImpactResult<T> = Result<T, ImpactError>;
