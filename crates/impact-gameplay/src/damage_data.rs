//! Damage parameters carried alongside a hit.

use impact_common::{LayerMask, SurfaceImpactId};
use serde::{Deserialize, Serialize};

/// Damage and reaction parameters for an impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactDamageData {
    /// Damage amount
    pub amount: f32,
    /// Force applied to the target
    pub impact_force: f32,
    /// Frames the force is spread over
    pub force_frames: u32,
    /// Area radius (0 = single target)
    pub radius: f32,
    /// Layers affected by area damage
    pub layer_mask: LayerMask,
    /// Named state applied to the target
    pub state_name: Option<String>,
    /// Seconds until the applied state is disabled again (0 = never)
    pub state_disable_timer: f32,
    /// Surface impact override
    pub surface_impact: Option<SurfaceImpactId>,
}

impl Default for ImpactDamageData {
    fn default() -> Self {
        Self {
            amount: 0.0,
            impact_force: 0.0,
            force_frames: 1,
            radius: 0.0,
            layer_mask: LayerMask::ALL,
            state_name: None,
            state_disable_timer: 0.0,
            surface_impact: None,
        }
    }
}

impl ImpactDamageData {
    /// Creates damage data with an amount and defaults elsewhere.
    #[must_use]
    pub fn with_amount(amount: f32) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }

    /// Sets the impact force.
    #[must_use]
    pub fn with_force(mut self, force: f32, frames: u32) -> Self {
        self.impact_force = force;
        self.force_frames = frames.max(1);
        self
    }

    /// Sets the state applied on impact.
    #[must_use]
    pub fn with_state(mut self, name: impl Into<String>, disable_timer: f32) -> Self {
        self.state_name = Some(name.into());
        self.state_disable_timer = disable_timer.max(0.0);
        self
    }

    /// Deep-copies `other` into `self`, reusing the string allocation.
    pub fn copy_from(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Restores defaults.
    pub fn reset(&mut self) {
        self.amount = 0.0;
        self.impact_force = 0.0;
        self.force_frames = 1;
        self.radius = 0.0;
        self.layer_mask = LayerMask::ALL;
        self.state_name = None;
        self.state_disable_timer = 0.0;
        self.surface_impact = None;
    }
}
