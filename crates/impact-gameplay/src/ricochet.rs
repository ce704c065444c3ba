//! Ricochet chaining.
//!
//! A qualifying hit runs a sphere query around the contact point and emits
//! one [`ImpactEvent::Ricochet`] per new candidate. Listeners decide what to
//! do with them; nothing recurses here. Chains are bounded per source and
//! the bound is cleared by the same per-source reset that clears multi-hit
//! suppression.

use ahash::AHashMap;
use impact_common::{LayerMask, Pose, SourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::actions::{ActionFlow, ImpactAction, ImpactEnv};
use crate::events::{ImpactEvent, RicochetData};
use crate::pool::ContextHandle;
use crate::world::{collect_intersections, CollisionShape, SpatialQueryFilter};

/// Emits ricochet candidates around a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RicochetAction {
    /// Maximum ricochets per source (`None` = unbounded)
    pub max_chain_count: Option<u32>,
    /// Query radius around the contact point
    pub radius: f32,
    /// Layers queried in addition to the hit's detect layers
    pub layers: LayerMask,
    #[serde(skip)]
    chain_counts: AHashMap<SourceId, u32>,
}

impl Default for RicochetAction {
    fn default() -> Self {
        Self {
            max_chain_count: Some(1),
            radius: 5.0,
            layers: LayerMask::NONE,
            chain_counts: AHashMap::new(),
        }
    }
}

impl RicochetAction {
    /// Creates a ricochet with a chain bound and radius.
    #[must_use]
    pub fn new(max_chain_count: Option<u32>, radius: f32) -> Self {
        Self {
            max_chain_count,
            radius,
            ..Self::default()
        }
    }

    /// Ricochets emitted so far for `source`.
    #[must_use]
    pub fn chain_count(&self, source: SourceId) -> u32 {
        self.chain_counts.get(&source).copied().unwrap_or(0)
    }
}

impl ImpactAction for RicochetAction {
    fn kind(&self) -> &'static str {
        "ricochet"
    }

    fn on_impact(&mut self, context: ContextHandle, _force: bool, env: &mut ImpactEnv<'_>) -> ActionFlow {
        let ctx = match env.pool.get(context) {
            Ok(ctx) => ctx,
            Err(err) => {
                error!("Ricochet lost its context: {}", err);
                return ActionFlow::Continue;
            }
        };
        let collision = &ctx.collision;

        let count = self.chain_counts.entry(collision.source_id).or_insert(0);
        if self.max_chain_count.is_some_and(|max| *count >= max) {
            debug!("Ricochet chain exhausted for {}", collision.source_id);
            return ActionFlow::Continue;
        }
        *count += 1;
        let chain_index = *count;

        let mut filter = SpatialQueryFilter::from_mask(collision.detect_layers | self.layers);
        if let Some(attacker) = collision
            .source_character
            .or_else(|| ctx.owner.map(|owner| owner.character))
        {
            filter = filter.excluding(env.world.root_of(attacker));
        }

        let mut candidates = Vec::new();
        let saturated = collect_intersections(
            env.world,
            &CollisionShape::Sphere {
                radius: self.radius,
            },
            &Pose::from_position(collision.position),
            &filter,
            env.max_collisions,
            &mut candidates,
        );
        if saturated {
            warn!(
                "Ricochet query hit capacity ({}), candidates may be missing",
                env.max_collisions
            );
        }

        for candidate in candidates {
            if Some(candidate) == collision.target_collider
                || collision.hit_colliders.contains(&candidate)
            {
                continue;
            }
            let Some(info) = env.world.collider(candidate) else {
                continue;
            };
            let direction = (info.pivot_point() - collision.position).normalize_or_zero();
            debug!("Ricochet {} -> {:?}", collision.source_id, candidate);
            env.events.publish(ImpactEvent::Ricochet(RicochetData {
                source: collision.clone(),
                collider: candidate,
                direction,
                chain_index,
            }));
        }
        ActionFlow::Continue
    }

    fn reset(&mut self, source: SourceId) {
        self.chain_counts.remove(&source);
    }
}
