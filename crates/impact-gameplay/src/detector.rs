//! Melee collision detection.
//!
//! Each tick of an active swing the detector sweeps the weapon's hitboxes
//! (or a sphere in front of the attacker) through the world, resolves a
//! contact point and normal for every struck collider, fills a pooled
//! [`ImpactCallbackContext`](crate::context::ImpactCallbackContext) and runs
//! it through the weapon's pipeline.
//!
//! Fast swings can tunnel through thin targets between two ticks. With
//! `lerp_density > 0` the hitbox is also queried at poses interpolated
//! between the previous and the current tick; the final step is the current
//! pose itself, so interpolation only ever adds hits.

use glam::Vec3;
use impact_common::{ColliderId, EntityId, LayerMask, Pose, SourceId, SurfaceImpactId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::collision_data::DamageSource;
use crate::damage_data::ImpactDamageData;
use crate::effects::ImpactEffects;
use crate::events::StopReason;
use crate::hitbox::MeleeHitbox;
use crate::pipeline::{ImpactOutcome, PipelineId};
use crate::shield::ColliderOverrideResolver;
use crate::system::ImpactSystem;
use crate::world::{collect_intersections, CollisionShape, ImpactWorld, SpatialQueryFilter};

/// Extra distance used when sweeping back out of an overlap.
const SWEEP_MARGIN: f32 = 0.05;

// ============================================================================
// Configuration
// ============================================================================

/// How a weapon finds what it hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectionStrategy {
    /// Overlap queries at every hitbox collider.
    Hitboxes {
        /// Extra interpolated queries between the previous and current pose
        lerp_density: u32,
    },
    /// A single sphere relative to the attacker.
    Sphere {
        /// Center in the attacker's local space
        offset: Vec3,
        /// Sphere radius
        radius: f32,
    },
}

impl Default for DetectionStrategy {
    fn default() -> Self {
        Self::Hitboxes { lerp_density: 0 }
    }
}

/// Detector tuning shared by every hitbox of a weapon.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Detection strategy
    pub strategy: DetectionStrategy,
    /// Layers that can be hit
    pub impact_layers: LayerMask,
    /// Base force of a hit
    pub trigger_force: f32,
    /// Multiplier on the base force
    pub strength_multiplier: f32,
    /// Surface used when a hitbox has none
    pub default_surface: Option<SurfaceImpactId>,
    /// Stop the swing on solid non-character geometry
    pub stop_on_solid: bool,
    /// How far behind the attacker concave fallback sweeps start
    pub depth_offset: f32,
    /// First source ID; hitbox `i` uses `base + i`
    pub source_id_base: u32,
    /// Maximum colliders gathered per query
    pub max_collisions: usize,
    /// Damage copied into every context
    pub damage: Option<ImpactDamageData>,
    /// Shield redirection
    pub override_resolver: ColliderOverrideResolver,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            strategy: DetectionStrategy::default(),
            impact_layers: LayerMask::ALL,
            trigger_force: 1.0,
            strength_multiplier: 1.0,
            default_surface: None,
            stop_on_solid: true,
            depth_offset: 0.5,
            source_id_base: 0,
            max_collisions: 50,
            damage: None,
            override_resolver: ColliderOverrideResolver::default(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// What happened to one struck collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitVerdict {
    /// The pipeline ran.
    Resolved(ImpactOutcome),
    /// The collider was ignored.
    Skipped,
    /// The pipeline ran and the swing must stop.
    StopAttack(StopReason),
}

/// Summary of one detection tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    /// Contexts resolved through the pipeline
    pub resolved: usize,
    /// Candidates ignored
    pub skipped: usize,
    /// Struck colliders in resolution order
    pub hits: Vec<ColliderId>,
    /// Stop request, with the collider that caused it
    pub stopped: Option<(StopReason, ColliderId)>,
    /// A query filled its buffer
    pub saturated: bool,
}

/// The attacker side of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingState {
    /// Attacking character
    pub attacker: EntityId,
    /// Weapon entity
    pub item: Option<EntityId>,
    /// Attacker pose this tick
    pub attacker_pose: Pose,
    /// Pipeline hits are resolved through
    pub pipeline: PipelineId,
}

/// Contact on a struck collider.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Contact {
    point: Vec3,
    normal: Vec3,
}

/// Query volume a candidate was found with.
#[derive(Debug, Clone, Copy)]
struct HitVolume {
    source_id: SourceId,
    hitbox: Option<usize>,
    shape: CollisionShape,
    pose: Pose,
    multiplier: f32,
    surface: Option<SurfaceImpactId>,
}

// ============================================================================
// Detector
// ============================================================================

/// Finds melee hits and resolves them.
#[derive(Debug, Default)]
pub struct MeleeCollisionDetector {
    hitboxes: Vec<MeleeHitbox>,
    settings: DetectorSettings,
    candidates: Vec<ColliderId>,
    found_at: Vec<Pose>,
    /// Colliders resolved during the current tick. Hits repeated across
    /// ticks are left to multi-hit suppression.
    tick_hits: Vec<ColliderId>,
}

impl MeleeCollisionDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(hitboxes: Vec<MeleeHitbox>, settings: DetectorSettings) -> Self {
        Self {
            hitboxes,
            settings,
            candidates: Vec::new(),
            found_at: Vec::new(),
            tick_hits: Vec::new(),
        }
    }

    /// Detector tuning.
    #[must_use]
    pub const fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Mutable detector tuning.
    pub fn settings_mut(&mut self) -> &mut DetectorSettings {
        &mut self.settings
    }

    /// Hitboxes in source ID order.
    #[must_use]
    pub fn hitboxes(&self) -> &[MeleeHitbox] {
        &self.hitboxes
    }

    /// Source IDs this detector stamps on its hits.
    #[must_use]
    pub fn source_ids(&self) -> Vec<SourceId> {
        let count = match self.settings.strategy {
            DetectionStrategy::Hitboxes { .. } => self.hitboxes.len().max(1),
            DetectionStrategy::Sphere { .. } => 1,
        };
        (0..count)
            .map(|index| SourceId::new(self.settings.source_id_base + index as u32))
            .collect()
    }

    /// Prepares every hitbox for a new swing.
    pub fn begin_swing(&mut self, weapon: EntityId, attacker_pose: &Pose, world: &dyn ImpactWorld) {
        for hitbox in &mut self.hitboxes {
            hitbox.begin_swing(weapon, attacker_pose, world);
        }
        self.tick_hits.clear();
    }

    /// Runs one detection tick.
    pub fn detect(
        &mut self,
        swing: &SwingState,
        system: &mut ImpactSystem,
        world: &dyn ImpactWorld,
        effects: &mut dyn ImpactEffects,
    ) -> DetectionReport {
        let mut report = DetectionReport::default();
        self.tick_hits.clear();

        match self.settings.strategy {
            DetectionStrategy::Sphere { offset, radius } => {
                let volume = HitVolume {
                    source_id: SourceId::new(self.settings.source_id_base),
                    hitbox: None,
                    shape: CollisionShape::Sphere { radius },
                    pose: Pose::new(
                        swing.attacker_pose.transform_point(offset),
                        swing.attacker_pose.rotation,
                    ),
                    multiplier: 1.0,
                    surface: None,
                };
                self.run_volume(&volume, None, swing, system, world, effects, &mut report);
            }
            DetectionStrategy::Hitboxes { lerp_density } => {
                for index in 0..self.hitboxes.len() {
                    if report.stopped.is_some() {
                        break;
                    }
                    self.run_hitbox(index, lerp_density, swing, system, world, effects, &mut report);
                }
            }
        }

        report
    }

    #[allow(clippy::too_many_arguments)]
    fn run_hitbox(
        &mut self,
        index: usize,
        lerp_density: u32,
        swing: &SwingState,
        system: &mut ImpactSystem,
        world: &dyn ImpactWorld,
        effects: &mut dyn ImpactEffects,
        report: &mut DetectionReport,
    ) {
        let hitbox = &self.hitboxes[index];
        let Some(info) = hitbox.collider().and_then(|collider| world.collider(collider)) else {
            return;
        };
        let volume = HitVolume {
            source_id: SourceId::new(self.settings.source_id_base + index as u32),
            hitbox: Some(index),
            shape: info.shape,
            pose: info.pose,
            multiplier: hitbox.config().damage_multiplier,
            surface: hitbox.config().surface_impact,
        };

        if hitbox.can_activate(&volume.pose, &swing.attacker_pose) {
            let previous = hitbox.previous_pose().filter(|_| lerp_density > 0);
            let sweep = previous.map(|from| (from, lerp_density));
            self.run_volume(&volume, sweep, swing, system, world, effects, report);
        }
        self.hitboxes[index].note_checked(volume.pose);
    }

    /// Gathers candidates for `volume` and resolves each of them.
    #[allow(clippy::too_many_arguments)]
    fn run_volume(
        &mut self,
        volume: &HitVolume,
        sweep: Option<(Pose, u32)>,
        swing: &SwingState,
        system: &mut ImpactSystem,
        world: &dyn ImpactWorld,
        effects: &mut dyn ImpactEffects,
        report: &mut DetectionReport,
    ) {
        let mut candidates = std::mem::take(&mut self.candidates);
        let mut found_at = std::mem::take(&mut self.found_at);
        candidates.clear();
        found_at.clear();
        report.saturated |= self.gather(volume, sweep, swing, world, &mut candidates, &mut found_at);

        for (&candidate, &pose) in candidates.iter().zip(&found_at) {
            // Contacts are resolved where the candidate overlapped
            let found = HitVolume { pose, ..*volume };
            let verdict = self.resolve_candidate(&found, candidate, &candidates, swing, system, world, effects);
            match verdict {
                HitVerdict::Skipped => report.skipped += 1,
                HitVerdict::Resolved(_) => {
                    report.resolved += 1;
                    report.hits.push(candidate);
                }
                HitVerdict::StopAttack(reason) => {
                    report.resolved += 1;
                    report.hits.push(candidate);
                    report.stopped = Some((reason, candidate));
                    break;
                }
            }
        }

        self.candidates = candidates;
        self.found_at = found_at;
    }

    /// Collects colliders overlapping the volume, including interpolated
    /// poses, with the first pose each one was found at.
    fn gather(
        &self,
        volume: &HitVolume,
        sweep: Option<(Pose, u32)>,
        swing: &SwingState,
        world: &dyn ImpactWorld,
        out: &mut Vec<ColliderId>,
        found_at: &mut Vec<Pose>,
    ) -> bool {
        let filter = SpatialQueryFilter::from_mask(self.settings.impact_layers)
            .excluding(world.root_of(swing.attacker));
        let capacity = self.settings.max_collisions;

        let saturated = match sweep {
            Some((from, density)) => {
                let mut saturated = false;
                for step in 1..=density {
                    let t = step as f32 / density as f32;
                    let pose = from.lerp(&volume.pose, t);
                    saturated |= collect_intersections(world, &volume.shape, &pose, &filter, capacity, out);
                    found_at.resize(out.len(), pose);
                }
                saturated
            }
            None => {
                let saturated = collect_intersections(world, &volume.shape, &volume.pose, &filter, capacity, out);
                found_at.resize(out.len(), volume.pose);
                saturated
            }
        };

        if saturated {
            warn!(
                "Melee query for {} hit the {} collider limit; some hits were dropped",
                volume.source_id, capacity
            );
        }
        saturated
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_candidate(
        &mut self,
        volume: &HitVolume,
        candidate: ColliderId,
        batch: &[ColliderId],
        swing: &SwingState,
        system: &mut ImpactSystem,
        world: &dyn ImpactWorld,
        effects: &mut dyn ImpactEffects,
    ) -> HitVerdict {
        if self.tick_hits.contains(&candidate) {
            return HitVerdict::Skipped;
        }
        let Some(struck) = world.collider(candidate) else {
            return HitVerdict::Skipped;
        };
        if struck.first_person_proxy || world.root_of(struck.owner) == world.root_of(swing.attacker) {
            return HitVerdict::Skipped;
        }
        let Some(contact) = self.resolve_contact(volume, candidate, &swing.attacker_pose, world) else {
            debug!("No contact found on {:?}", candidate);
            return HitVerdict::Skipped;
        };
        self.tick_hits.push(candidate);

        let shield = self
            .settings
            .override_resolver
            .resolve(swing.attacker_pose.forward(), struck, world);
        let target = shield.unwrap_or(struck);

        let strength = self.settings.trigger_force * self.settings.strength_multiplier * volume.multiplier;
        let context = system.acquire_context();
        match system.context_mut(context) {
            Ok(ctx) => {
                let collision = &mut ctx.collision;
                collision.initialize(volume.source_id, contact.point, -contact.normal, strength);
                collision.normal = contact.normal;
                collision.set_target(target, world);
                collision.source_entity = Some(swing.item.unwrap_or(swing.attacker));
                collision.source_component = swing.item;
                collision.source_character = Some(swing.attacker);
                collision.damage_source = Some(DamageSource::direct(swing.attacker, swing.item));
                collision.set_batch(self.settings.impact_layers, batch);
                collision.surface_impact = volume.surface.or(self.settings.default_surface);
                if let Some(damage) = &self.settings.damage {
                    ctx.set_damage(damage);
                }
            }
            Err(err) => {
                error!("Fresh context unavailable: {}", err);
                return HitVerdict::Skipped;
            }
        }

        let outcome = system.resolve(swing.pipeline, context, false, world, effects);
        if let Err(err) = system.release_context(context) {
            error!("Context release after resolve failed: {}", err);
        }
        if let Some(index) = volume.hitbox {
            self.hitboxes[index].mark_hit();
        }

        if target.shield.is_some_and(|s| s.blocks_attack) {
            return HitVerdict::StopAttack(StopReason::ShieldBlock);
        }
        if self.settings.stop_on_solid && target.solid && !Self::is_character(target.owner, world) {
            return HitVerdict::StopAttack(StopReason::SolidObject);
        }
        HitVerdict::Resolved(outcome)
    }

    /// Contact point and outward normal on `candidate`.
    ///
    /// Overlaps are resolved by backing out along the penetration direction
    /// and sweeping back in. Colliders without penetration support (concave
    /// meshes) are swept forward from behind the attacker.
    fn resolve_contact(
        &self,
        volume: &HitVolume,
        candidate: ColliderId,
        attacker_pose: &Pose,
        world: &dyn ImpactWorld,
    ) -> Option<Contact> {
        if let Some(penetration) = world.compute_penetration(&volume.shape, &volume.pose, candidate) {
            let back_off = penetration.distance + SWEEP_MARGIN;
            let start = volume.pose.translated(penetration.direction * back_off);
            if let Some(hit) = world.cast_shape_against(
                candidate,
                &volume.shape,
                &start,
                -penetration.direction,
                back_off + SWEEP_MARGIN,
            ) {
                return Some(Contact {
                    point: hit.point,
                    normal: hit.normal,
                });
            }
            return world
                .closest_point(candidate, volume.pose.position)
                .map(|point| Contact {
                    point,
                    normal: penetration.direction,
                });
        }

        let origin = attacker_pose.position - attacker_pose.forward() * self.settings.depth_offset;
        let towards = volume.pose.position - origin;
        let distance = towards.length() + volume.shape.bounding_radius() + SWEEP_MARGIN;
        let start = Pose::new(origin, volume.pose.rotation);
        world
            .cast_shape_against(candidate, &volume.shape, &start, towards, distance)
            .map(|hit| Contact {
                point: hit.point,
                normal: hit.normal,
            })
    }

    fn is_character(entity: EntityId, world: &dyn ImpactWorld) -> bool {
        world
            .entity(world.root_of(entity))
            .is_some_and(|info| info.capabilities.damage_target.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionSlot, ImpactActionGroup};
    use crate::builtin_actions::SimpleDamageAction;
    use crate::context::ImpactOwner;
    use crate::events::ImpactEvent;
    use crate::hitbox::HitboxConfig;
    use crate::pipeline::ImpactPipeline;
    use crate::ricochet::RicochetAction;
    use crate::system::ImpactConfig;
    use crate::testing::{MockWorld, RecordedEffect, RecordingEffects};
    use crate::world::ShieldCollider;
    use proptest::prelude::*;

    struct Scene {
        world: MockWorld,
        effects: RecordingEffects,
        system: ImpactSystem,
        attacker: EntityId,
        weapon: EntityId,
        blade: ColliderId,
        pipeline: PipelineId,
    }

    impl Scene {
        fn new(actions: ImpactActionGroup) -> Self {
            let mut world = MockWorld::new();
            let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
            world.add_sphere_collider(attacker, 1, Vec3::new(0.0, 1.0, 0.0), 0.4);
            let weapon = world.spawn_child(attacker, Vec3::new(0.0, 1.0, 0.5));
            let blade = world.add_sphere_collider(weapon, 3, Vec3::new(0.0, 1.0, 0.8), 0.3);
            world.name_collider(weapon, "blade", blade);

            let mut system = ImpactSystem::new(ImpactConfig::default());
            let owner = ImpactOwner::character(attacker).with_item(weapon);
            let pipeline = system.register_pipeline(ImpactPipeline::from_actions(actions), owner);
            Self {
                world,
                effects: RecordingEffects::new(),
                system,
                attacker,
                weapon,
                blade,
                pipeline,
            }
        }

        fn swing(&self) -> SwingState {
            SwingState {
                attacker: self.attacker,
                item: Some(self.weapon),
                attacker_pose: Pose::facing(Vec3::ZERO, Vec3::Z),
                pipeline: self.pipeline,
            }
        }

        fn detector(&self, strategy: DetectionStrategy) -> MeleeCollisionDetector {
            MeleeCollisionDetector::new(
                vec![MeleeHitbox::new(HitboxConfig::for_path("blade", "blade"))],
                DetectorSettings {
                    strategy,
                    impact_layers: LayerMask::layer(1) | LayerMask::layer(2),
                    source_id_base: 7,
                    ..DetectorSettings::default()
                },
            )
        }

        fn move_blade(&mut self, position: Vec3) {
            self.world.set_collider_pose(self.blade, Pose::from_position(position));
        }

        fn tick(&mut self, detector: &mut MeleeCollisionDetector) -> DetectionReport {
            let swing = self.swing();
            detector.detect(&swing, &mut self.system, &self.world, &mut self.effects)
        }
    }

    fn damage_group() -> ImpactActionGroup {
        ImpactActionGroup::new().with(SimpleDamageAction::default())
    }

    #[test]
    fn test_two_targets_hit_once_per_swing() {
        let mut scene = Scene::new(damage_group());
        let x = scene.world.spawn_character(Vec3::new(-0.4, 0.0, 2.0), -Vec3::Z);
        let x_body = scene.world.add_sphere_collider(x, 1, Vec3::new(-0.4, 1.0, 2.0), 0.5);
        let y = scene.world.spawn_character(Vec3::new(0.4, 0.0, 2.0), -Vec3::Z);
        let y_body = scene.world.add_sphere_collider(y, 1, Vec3::new(0.4, 1.0, 2.0), 0.5);

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        assert_eq!(detector.source_ids(), vec![SourceId::new(7)]);

        scene.move_blade(Vec3::new(0.0, 1.0, 1.9));
        let first = scene.tick(&mut detector);
        assert_eq!(first.resolved, 2);
        assert!(first.hits.contains(&x_body) && first.hits.contains(&y_body));
        let mut damaged = scene.effects.damaged_entities();
        damaged.sort();
        let mut expected = vec![x, y];
        expected.sort();
        assert_eq!(damaged, expected);

        scene.move_blade(Vec3::new(0.05, 1.0, 1.95));
        let second = scene.tick(&mut detector);
        assert_eq!(second.resolved, 2);
        assert_eq!(scene.effects.damage_requests().len(), 2);
        assert_eq!(scene.system.pool_stats().in_use, 0);
    }

    #[test]
    fn test_contact_geometry() {
        let mut scene = Scene::new(damage_group());
        let target = scene.world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        scene.world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(0.0, 1.0, 1.4));
        scene.tick(&mut detector);

        let requests = scene.effects.damage_requests();
        assert_eq!(requests.len(), 1);
        let (_, request) = &requests[0];
        assert!(request.position.distance(Vec3::new(0.0, 1.0, 1.5)) < 1e-3);
        assert!(request.direction.distance(Vec3::Z) < 1e-3);
    }

    #[test]
    fn test_attacker_hierarchy_is_ignored() {
        let mut scene = Scene::new(damage_group());
        scene.world.add_sphere_collider(scene.attacker, 1, Vec3::new(0.0, 1.0, 0.8), 0.5);

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        let report = scene.tick(&mut detector);
        assert_eq!(report.resolved, 0);
        assert!(scene.effects.records().is_empty());
    }

    #[test]
    fn test_first_person_proxy_is_ignored() {
        let mut scene = Scene::new(damage_group());
        let target = scene.world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        let proxy = scene.world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);
        if let Some(info) = scene.world.collider_info_mut(proxy) {
            info.first_person_proxy = true;
        }

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(0.0, 1.0, 1.4));
        let report = scene.tick(&mut detector);
        assert_eq!(report.resolved, 0);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_shield_redirects_and_blocks() {
        let mut scene = Scene::new(damage_group());
        let defender = scene.world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        scene.world.add_sphere_collider(defender, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);
        let shield = scene.world.equip_shield(
            defender,
            Vec3::new(0.0, 1.0, 1.95),
            0.2,
            ShieldCollider {
                wielder: defender,
                absorption_factor: 0.0,
                blocks_attack: true,
            },
            false,
        );

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(0.0, 1.0, 1.4));
        let report = scene.tick(&mut detector);

        assert_eq!(report.stopped.map(|(reason, _)| reason), Some(StopReason::ShieldBlock));
        let shield_hits = scene.effects.count(|effect| {
            matches!(effect, RecordedEffect::ShieldAbsorbed { wielder, .. } if *wielder == defender)
        });
        assert_eq!(shield_hits, 1);
        assert!(scene.world.collider_info(shield).is_some());
    }

    #[test]
    fn test_direct_shield_hit_blocks() {
        let mut scene = Scene::new(damage_group());
        let defender = scene.world.spawn_character(Vec3::new(0.0, 0.0, 2.5), -Vec3::Z);
        scene.world.add_sphere_collider(defender, 1, Vec3::new(0.0, 1.0, 2.5), 0.5);
        let shield = scene.world.equip_shield(
            defender,
            Vec3::new(0.0, 1.0, 1.3),
            0.2,
            ShieldCollider {
                wielder: defender,
                absorption_factor: 0.5,
                blocks_attack: true,
            },
            false,
        );

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(0.0, 1.0, 0.9));
        let report = scene.tick(&mut detector);

        assert_eq!(report.stopped, Some((StopReason::ShieldBlock, shield)));
        assert_eq!(report.resolved, 1);
        assert_eq!(scene.effects.damaged_entities(), vec![defender]);
    }

    #[test]
    fn test_solid_wall_stops_swing() {
        let mut scene = Scene::new(ImpactActionGroup::new());
        let wall = scene.world.add_wall(2, Vec3::new(0.0, 1.0, 2.0), 0.5);

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(0.0, 1.0, 1.4));
        let report = scene.tick(&mut detector);
        assert_eq!(report.stopped, Some((StopReason::SolidObject, wall)));

        detector.settings_mut().stop_on_solid = false;
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        let report = scene.tick(&mut detector);
        assert!(report.stopped.is_none());
        assert_eq!(report.resolved, 1);
    }

    #[test]
    fn test_concave_fallback_sweeps_forward() {
        let mut scene = Scene::new(damage_group());
        let target = scene.world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        let body = scene.world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);
        scene.world.set_concave(body, true);

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(0.0, 1.0, 1.4));
        let report = scene.tick(&mut detector);
        assert_eq!(report.resolved, 1);
        assert_eq!(scene.effects.damaged_entities(), vec![target]);
    }

    #[test]
    fn test_sphere_strategy_uses_attacker_offset() {
        let mut scene = Scene::new(damage_group());
        let target = scene.world.spawn_character(Vec3::new(0.0, 0.0, 1.5), -Vec3::Z);
        scene.world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 1.5), 0.5);

        let mut detector = scene.detector(DetectionStrategy::Sphere {
            offset: Vec3::new(0.0, 1.0, 1.0),
            radius: 0.4,
        });
        let report = scene.tick(&mut detector);
        assert_eq!(report.resolved, 1);
        assert_eq!(scene.effects.damaged_entities(), vec![target]);
    }

    #[test]
    fn test_lerp_catches_tunneling_target() {
        let mut scene = Scene::new(damage_group());
        let target = scene.world.spawn_character(Vec3::new(2.0, 0.0, 1.0), -Vec3::Z);
        scene.world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 1.0), 0.1);

        let mut plain = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        let mut swept = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 8 });
        let swing = scene.swing();

        scene.move_blade(Vec3::new(-1.5, 1.0, 1.0));
        plain.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        swept.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(1.5, 1.0, 1.0));

        assert_eq!(scene.tick(&mut plain).resolved, 0);
        assert_eq!(scene.tick(&mut swept).resolved, 1);
    }

    #[test]
    fn test_ricochet_chains_once_per_source() {
        let mut ricochet = RicochetAction::new(Some(1), 5.0);
        ricochet.layers = LayerMask::layer(1);
        let mut scene = Scene::new(ImpactActionGroup::new().with_slot(ActionSlot::new(Box::new(ricochet)).with_multi_hits(true)));
        let target = scene.world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        scene.world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);
        let bystander = scene.world.spawn_character(Vec3::new(3.0, 0.0, 2.0), -Vec3::Z);
        let far_body = scene.world.add_sphere_collider(bystander, 1, Vec3::new(3.0, 1.0, 2.0), 0.5);

        let mut detector = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
        detector.settings_mut().source_id_base = 3;
        let swing = scene.swing();
        detector.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
        scene.move_blade(Vec3::new(0.0, 1.0, 1.4));
        scene.tick(&mut detector);
        scene.tick(&mut detector);

        let ricochets: Vec<_> = scene
            .system
            .events()
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                ImpactEvent::Ricochet(data) => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(ricochets.len(), 1);
        assert_eq!(ricochets[0].collider, far_body);
        assert_eq!(ricochets[0].source.source_id, SourceId::new(3));
    }

    proptest! {
        #[test]
        fn test_interpolation_only_adds_hits(
            targets in prop::collection::vec((-3.0f32..3.0, -3.0f32..3.0, 0.05f32..0.6), 1..8),
            from in (-2.0f32..2.0, -2.0f32..2.0),
            to in (-2.0f32..2.0, -2.0f32..2.0),
            density in 1u32..6,
        ) {
            let mut scene = Scene::new(ImpactActionGroup::new());
            for &(x, z, radius) in &targets {
                let entity = scene.world.spawn_prop(Vec3::new(x, 0.0, z));
                scene.world.add_sphere_collider(entity, 2, Vec3::new(x, 1.0, z), radius);
            }

            let swing = scene.swing();
            let mut plain = scene.detector(DetectionStrategy::Hitboxes { lerp_density: 0 });
            let mut swept = scene.detector(DetectionStrategy::Hitboxes { lerp_density: density });
            plain.settings_mut().stop_on_solid = false;
            swept.settings_mut().stop_on_solid = false;

            scene.move_blade(Vec3::new(from.0, 1.0, from.1));
            plain.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
            swept.begin_swing(scene.weapon, &swing.attacker_pose, &scene.world);
            scene.move_blade(Vec3::new(to.0, 1.0, to.1));

            let plain_hits = scene.tick(&mut plain).hits;
            let swept_hits = scene.tick(&mut swept).hits;
            for hit in plain_hits {
                prop_assert!(swept_hits.contains(&hit));
            }
        }
    }
}
