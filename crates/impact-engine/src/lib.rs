//! # Impact Engine
//!
//! Driver for the impact resolution engine.
//!
//! This crate ties the impact subsystem to a runnable simulation:
//! - Configuration loaded from `impact.toml`
//! - Fixed-step simulation timing
//! - A scripted melee duel exercising detection, pipelines and scheduling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod demo;
pub mod timing;
