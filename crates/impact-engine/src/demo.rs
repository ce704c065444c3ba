//! Scripted melee duel.
//!
//! An attacker swings a weapon across two targets standing in front of it,
//! with a bystander behind them for ricochets and a wall at the end of the
//! arc. The scene runs on the in-memory world backend and every effect
//! request is logged and tallied.

use std::f32::consts::PI;
use std::fs;
use std::path::PathBuf;

use glam::Vec3;
use impact_common::{AudioClipId, ColliderId, ConfigError, EntityId, ParticleInstanceId, Pose, RigidBodyId};
use impact_gameplay::testing::MockWorld;
use impact_gameplay::{
    AttackPhase, AttributeHostHandle, DamageRequest, DamageTargetHandle, ForceTarget, HealthHandle, ImpactEffects,
    ImpactEvent, ImpactSystem, KnockbackHandle, MeleeAttackModule, MeleeWeaponConfig, ParticleSpawn,
    SceneQuery, SurfaceEffectSpawn, VariantRegistry,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::timing::{FixedStep, TickProfiler};

/// Weapon used when no asset path is configured.
const LONGSWORD: &str = include_str!("../assets/longsword.ron");

/// Frame delta fed to the fixed-step accumulator.
const FRAME_DT: f32 = 1.0 / 30.0;

/// Blade distance from the attacker's shoulder.
const BLADE_REACH: f32 = 1.3;

/// Half-angle of the swing arc in degrees.
const ARC_HALF_ANGLE: f32 = 80.0;

/// Pause between swings in seconds.
const SWING_REST: f32 = 0.3;

/// Errors that can abort a duel.
#[derive(Debug, Error)]
pub enum DemoError {
    /// The weapon asset is invalid
    #[error("weapon asset: {0}")]
    Weapon(#[from] ConfigError),

    /// The weapon asset could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Asset path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Counters collected over a duel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuelSummary {
    /// Weapon name
    pub weapon: String,
    /// Fixed ticks simulated
    pub ticks: u64,
    /// Simulated seconds
    pub simulated_seconds: f64,
    /// Swings that reached the damage window
    pub swings: u32,
    /// Contexts resolved through the pipeline
    pub hits_resolved: usize,
    /// Damage requests
    pub damage_events: usize,
    /// Sum of requested damage
    pub total_damage: f32,
    /// Surface effects spawned
    pub surface_effects: usize,
    /// Audio clips played
    pub audio_cues: usize,
    /// State activations and deactivations
    pub state_changes: usize,
    /// Ricochet events
    pub ricochets: usize,
    /// Swings stopped early
    pub attacks_stopped: usize,
    /// Named events
    pub named_events: usize,
    /// Contexts allocated by the pool
    pub pool_capacity: usize,
    /// Highest number of contexts in use at once
    pub pool_peak: usize,
    /// Contexts still in use when the duel ended
    pub pool_in_use: usize,
    /// Scheduled entries left when the duel ended
    pub pending_at_end: usize,
    /// Average wall-clock cost of a tick
    pub average_tick_ms: f32,
}

/// Effect sink that logs and counts requests.
#[derive(Debug, Default)]
struct DuelEffects {
    damage_events: usize,
    total_damage: f32,
    surface_effects: usize,
    audio_cues: usize,
    state_changes: usize,
    next_particle: u64,
}

impl ImpactEffects for DuelEffects {
    fn apply_damage(&mut self, target: DamageTargetHandle, request: &DamageRequest) {
        info!("{} takes {:.1} damage", target.entity(), request.amount);
        self.damage_events += 1;
        self.total_damage += request.amount;
    }

    fn add_force(&mut self, target: ForceTarget, force: Vec3, _point: Vec3, frames: u32) {
        debug!("Force {:?} on {:?} over {} frames", force, target, frames);
    }

    fn add_torque(&mut self, body: RigidBodyId, torque: Vec3) {
        debug!("Torque {:?} on {:?}", torque, body);
    }

    fn heal(&mut self, target: HealthHandle, amount: f32) -> bool {
        debug!("{} heals {:.1}", target.entity(), amount);
        true
    }

    fn modify_attribute(&mut self, host: AttributeHostHandle, attribute: &str, delta: f32) -> bool {
        debug!("{} {} {:+.1}", host.entity(), attribute, delta);
        true
    }

    fn play_audio(&mut self, clip: AudioClipId, position: Vec3, volume: f32) {
        debug!("Audio {:?} at {:?} ({:.2})", clip, position, volume);
        self.audio_cues += 1;
    }

    fn spawn_particle(&mut self, spawn: &ParticleSpawn) -> Option<ParticleInstanceId> {
        self.next_particle += 1;
        debug!("Particle {:?} at {:?}", spawn.prefab, spawn.position);
        Some(ParticleInstanceId::new(self.next_particle))
    }

    fn move_particle(&mut self, _instance: ParticleInstanceId, _position: Vec3, _direction: Vec3) -> bool {
        true
    }

    fn spawn_surface_effect(&mut self, spawn: &SurfaceEffectSpawn) {
        debug!("Surface {:?} at {:?}", spawn.surface, spawn.position);
        self.surface_effects += 1;
    }

    fn set_state(&mut self, entity: EntityId, state: &str, active: bool) {
        info!("{} {} '{}'", entity, if active { "enters" } else { "leaves" }, state);
        self.state_changes += 1;
    }

    fn knockback(&mut self, target: KnockbackHandle, direction: Vec3, strength: f32) {
        debug!("Knockback {} along {:?} ({:.1})", target.entity(), direction, strength);
    }

    fn shield_absorbed(&mut self, wielder: EntityId, absorbed: f32) {
        info!("Shield of {} absorbs {:.1}", wielder, absorbed);
    }
}

/// Scene handles the script moves around.
struct Arena {
    world: MockWorld,
    attacker: EntityId,
    sword: EntityId,
    blade: ColliderId,
    pommel: ColliderId,
}

impl Arena {
    fn build() -> Self {
        let mut world = MockWorld::new();
        let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
        world.add_sphere_collider(attacker, 1, Vec3::new(0.0, 1.0, 0.0), 0.4);

        let sword = world.spawn_child(attacker, Vec3::new(0.0, 1.0, 0.5));
        let blade = world.add_sphere_collider(sword, 3, Vec3::new(0.0, 1.0, BLADE_REACH), 0.25);
        let pommel = world.add_sphere_collider(sword, 3, Vec3::new(0.0, 1.0, 0.5), 0.1);
        world.name_collider(sword, "blade", blade);
        world.name_collider(sword, "pommel", pommel);

        for angle in [-35.0_f32, 35.0] {
            let position = arc_point(angle, 1.6);
            let target = world.spawn_character(Vec3::new(position.x, 0.0, position.z), -Vec3::Z);
            world.add_sphere_collider(target, 1, position, 0.4);
        }
        let bystander = world.spawn_character(Vec3::new(0.0, 0.0, 4.0), -Vec3::Z);
        world.add_sphere_collider(bystander, 1, Vec3::new(0.0, 1.0, 4.0), 0.4);
        world.add_wall(2, arc_point(80.0, 1.5), 0.3);

        Self {
            world,
            attacker,
            sword,
            blade,
            pommel,
        }
    }

    /// Places the sword along the arc.
    fn pose_sword(&mut self, angle: f32) {
        let attacker = self
            .world
            .entity(self.attacker)
            .map_or(Pose::IDENTITY, |info| info.pose);
        let blade = attacker.transform_point(arc_point(angle, BLADE_REACH));
        let pommel = attacker.transform_point(arc_point(angle, 0.5));
        self.world.set_collider_pose(self.blade, Pose::from_position(blade));
        self.world.set_collider_pose(self.pommel, Pose::from_position(pommel));
    }
}

/// Point at shoulder height on the arc, `angle` degrees right of forward.
fn arc_point(angle: f32, radius: f32) -> Vec3 {
    let radians = angle * PI / 180.0;
    Vec3::new(radius * radians.sin(), 1.0, radius * radians.cos())
}

/// Loads the configured weapon or the bundled longsword.
pub fn load_weapon(config: &EngineConfig) -> Result<MeleeWeaponConfig, DemoError> {
    match &config.weapon_asset {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| DemoError::Io {
                path: path.clone(),
                source,
            })?;
            info!("Loaded weapon asset {}", path.display());
            Ok(MeleeWeaponConfig::from_ron(&text)?)
        }
        None => Ok(MeleeWeaponConfig::from_ron(LONGSWORD)?),
    }
}

/// Runs the scripted duel.
pub fn run_duel(config: &EngineConfig) -> Result<DuelSummary, DemoError> {
    let weapon = load_weapon(config)?;
    let registry = VariantRegistry::with_builtins();
    let mut system = ImpactSystem::new(config.impact.clone());
    let mut arena = Arena::build();
    let mut module =
        MeleeAttackModule::from_config(&weapon, &registry, &mut system, arena.attacker, Some(arena.sword))?;
    let mut effects = DuelEffects::default();

    let mut step = FixedStep::new(config.tick_rate);
    let mut profiler = TickProfiler::default();
    let mut summary = DuelSummary {
        weapon: weapon.name.clone(),
        ..DuelSummary::default()
    };

    let dt = step.fixed_dt();
    let mut swings_started = 0;
    let mut swing_time = 0.0_f32;
    let mut rest = 0.0_f32;

    while step.elapsed() < f64::from(config.duration) {
        for _ in 0..step.accumulate(FRAME_DT) {
            profiler.begin();

            if !module.phase().in_progress() {
                rest -= dt;
                if rest <= 0.0 && swings_started < config.swings && module.attack_start() {
                    swings_started += 1;
                    swing_time = 0.0;
                    info!("Swing {} begins", swings_started);
                }
            }

            if module.phase().in_progress() {
                swing_time += dt;
                let progress = ((swing_time - weapon.timing.windup) / weapon.timing.active).clamp(0.0, 1.0);
                arena.pose_sword(-ARC_HALF_ANGLE + 2.0 * ARC_HALF_ANGLE * progress);
            }

            if let Some(report) = module.tick(dt, &mut system, &arena.world, &mut effects) {
                summary.hits_resolved += report.resolved;
            }
            if module.phase().is_finished() && rest <= 0.0 {
                rest = SWING_REST;
                if module.phase() == AttackPhase::Cancelled {
                    info!("Swing {} cut short", swings_started);
                }
            }

            system.update(dt, &arena.world, &mut effects);
            for event in system.events().drain() {
                match event {
                    ImpactEvent::Ricochet(data) => {
                        debug!("Ricochet #{} towards {:?}", data.chain_index, data.collider);
                        summary.ricochets += 1;
                    }
                    ImpactEvent::AttackStopped { .. } => summary.attacks_stopped += 1,
                    ImpactEvent::Named { name, .. } => {
                        info!("Event '{}'", name);
                        summary.named_events += 1;
                    }
                }
            }

            profiler.end();
        }
    }

    let stats = system.pool_stats();
    summary.ticks = step.ticks();
    summary.simulated_seconds = step.elapsed();
    summary.swings = module.swing_count();
    summary.damage_events = effects.damage_events;
    summary.total_damage = effects.total_damage;
    summary.surface_effects = effects.surface_effects;
    summary.audio_cues = effects.audio_cues;
    summary.state_changes = effects.state_changes;
    summary.pool_capacity = stats.capacity;
    summary.pool_peak = stats.peak_in_use;
    summary.pool_in_use = stats.in_use;
    summary.pending_at_end = system.pending_schedules();
    summary.average_tick_ms = profiler.average_ms();

    if let Err(err) = module.destroy(&mut system) {
        debug!("Weapon teardown: {}", err);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_duel() -> EngineConfig {
        EngineConfig {
            duration: 3.0,
            swings: 2,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_bundled_weapon_parses() {
        let Ok(weapon) = load_weapon(&EngineConfig::default()) else {
            panic!("bundled weapon should load");
        };
        assert_eq!(weapon.name, "longsword");
        assert_eq!(weapon.hitboxes.len(), 2);
        assert_eq!(weapon.pipeline.on_success.len(), 5);
    }

    #[test]
    fn test_duel_hits_both_targets_each_swing() {
        let Ok(summary) = run_duel(&short_duel()) else {
            panic!("duel should run");
        };

        assert_eq!(summary.swings, 2);
        assert_eq!(summary.damage_events, 4);
        assert!((summary.total_damage - 240.0).abs() < 1e-3);
        assert_eq!(summary.attacks_stopped, 2);
        assert_eq!(summary.ricochets, 6);
        // Both targets and the wall, per swing
        assert_eq!(summary.audio_cues, 6);
        assert_eq!(summary.state_changes, 12);
        assert_eq!(summary.pool_in_use, 0);
        assert_eq!(summary.pending_at_end, 0);
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let Ok(summary) = run_duel(&short_duel()) else {
            panic!("duel should run");
        };
        let Ok(json) = serde_json::to_string(&summary) else {
            panic!("summary should serialize");
        };
        assert!(json.contains("\"weapon\":\"longsword\""));
        assert!(json.contains("total_damage"));
    }

    #[test]
    fn test_missing_weapon_asset() {
        let config = EngineConfig {
            weapon_asset: Some(PathBuf::from("/nonexistent/sword.ron")),
            ..EngineConfig::default()
        };
        assert!(matches!(run_duel(&config), Err(DemoError::Io { .. })));
    }

    #[test]
    fn test_arc_point() {
        assert!(arc_point(0.0, 2.0).distance(Vec3::new(0.0, 1.0, 2.0)) < 1e-5);
        assert!(arc_point(90.0, 1.0).distance(Vec3::new(1.0, 1.0, 0.0)) < 1e-5);
    }
}
