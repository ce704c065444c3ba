//! Melee attack driver.
//!
//! This module provides:
//! - Attack phases (windup, active, recovery) driven by item events or by timing
//! - Weapon assets describing hitboxes, detection and the impact pipeline
//! - Per-swing source resets and early stops on solid geometry or shields

use impact_common::{ConfigError, EntityId, ImpactResult, LayerMask, Pose, SurfaceImpactId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ImpactOwner;
use crate::damage_data::ImpactDamageData;
use crate::detector::{DetectionReport, DetectionStrategy, DetectorSettings, MeleeCollisionDetector, SwingState};
use crate::effects::ImpactEffects;
use crate::events::{ImpactEvent, StopReason};
use crate::hitbox::{HitboxConfig, MeleeHitbox};
use crate::pipeline::PipelineId;
use crate::registry::{PipelineAsset, VariantRegistry};
use crate::shield::ColliderOverrideResolver;
use crate::system::ImpactSystem;
use crate::world::ImpactWorld;

// ============================================================================
// Attack Phases
// ============================================================================

/// Phase of a melee attack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackPhase {
    /// No attack in progress.
    #[default]
    Idle,
    /// Preparing to strike.
    Windup,
    /// Active damage window.
    Active,
    /// Recovering after the damage window.
    Recovery,
    /// Attack complete.
    Complete,
    /// Attack was cancelled or stopped.
    Cancelled,
}

impl AttackPhase {
    /// Check if attack can deal damage.
    #[must_use]
    pub fn can_damage(&self) -> bool {
        *self == Self::Active
    }

    /// Check if attack is finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }

    /// Check if an attack is underway.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        matches!(self, Self::Windup | Self::Active | Self::Recovery)
    }
}

/// Timing used when phases are driven by [`MeleeAttackModule::tick`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackTiming {
    /// Duration of windup phase (seconds).
    pub windup: f32,
    /// Duration of active phase (seconds).
    pub active: f32,
    /// Duration of recovery phase (seconds).
    pub recovery: f32,
}

impl Default for AttackTiming {
    fn default() -> Self {
        Self {
            windup: 0.15,
            active: 0.1,
            recovery: 0.2,
        }
    }
}

impl AttackTiming {
    /// Create new attack timing.
    #[must_use]
    pub fn new(windup: f32, active: f32, recovery: f32) -> Self {
        Self {
            windup: windup.max(0.0),
            active: active.max(0.01),
            recovery: recovery.max(0.0),
        }
    }

    /// Get total attack duration.
    #[must_use]
    pub fn total_duration(&self) -> f32 {
        self.windup + self.active + self.recovery
    }
}

// ============================================================================
// Weapon Assets
// ============================================================================

/// Authored melee weapon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeleeWeaponConfig {
    /// Display name
    pub name: String,
    /// Hitboxes in source ID order
    pub hitboxes: Vec<HitboxConfig>,
    /// Detection strategy
    pub strategy: DetectionStrategy,
    /// Layers the weapon can hit
    pub impact_layers: LayerMask,
    /// Base force of a hit
    pub trigger_force: f32,
    /// Multiplier on the base force
    pub strength_multiplier: f32,
    /// Surface used when a hitbox has none
    pub default_surface: Option<SurfaceImpactId>,
    /// Facing threshold for shield redirection
    pub shield_sensitivity: f32,
    /// Stop the swing on solid non-character geometry
    pub stop_on_solid: bool,
    /// How far behind the attacker concave fallback sweeps start
    pub depth_offset: f32,
    /// First source ID used by the hitboxes
    pub source_id_base: u32,
    /// Damage carried by every hit
    pub damage: Option<ImpactDamageData>,
    /// Phase timing
    pub timing: AttackTiming,
    /// Impact pipeline
    pub pipeline: PipelineAsset,
}

impl Default for MeleeWeaponConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            hitboxes: Vec::new(),
            strategy: DetectionStrategy::default(),
            impact_layers: LayerMask::ALL,
            trigger_force: 1.0,
            strength_multiplier: 1.0,
            default_surface: None,
            shield_sensitivity: ColliderOverrideResolver::default().sensitivity,
            stop_on_solid: true,
            depth_offset: 0.5,
            source_id_base: 0,
            damage: None,
            timing: AttackTiming::default(),
            pipeline: PipelineAsset::default(),
        }
    }
}

impl MeleeWeaponConfig {
    /// Parses a weapon from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the detector cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let DetectionStrategy::Sphere { radius, .. } = self.strategy {
            if radius <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "strategy.radius",
                    reason: format!("must be positive, got {radius}"),
                });
            }
        }
        if matches!(self.strategy, DetectionStrategy::Hitboxes { .. }) && self.hitboxes.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "hitboxes",
                reason: "hitbox detection needs at least one hitbox".to_string(),
            });
        }
        if self.trigger_force < 0.0 || self.strength_multiplier < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "trigger_force",
                reason: "forces cannot be negative".to_string(),
            });
        }
        Ok(())
    }

    /// Detector tuning for this weapon.
    #[must_use]
    pub fn detector_settings(&self, max_collisions: usize) -> DetectorSettings {
        DetectorSettings {
            strategy: self.strategy,
            impact_layers: self.impact_layers,
            trigger_force: self.trigger_force,
            strength_multiplier: self.strength_multiplier,
            default_surface: self.default_surface,
            stop_on_solid: self.stop_on_solid,
            depth_offset: self.depth_offset,
            source_id_base: self.source_id_base,
            max_collisions,
            damage: self.damage.clone(),
            override_resolver: ColliderOverrideResolver::new(self.shield_sensitivity),
        }
    }
}

// ============================================================================
// Attack Module
// ============================================================================

/// Drives one character's melee weapon through its swings.
#[derive(Debug)]
pub struct MeleeAttackModule {
    attacker: EntityId,
    item: Option<EntityId>,
    pipeline: PipelineId,
    detector: MeleeCollisionDetector,
    timing: AttackTiming,
    phase: AttackPhase,
    phase_time: f32,
    swings: u32,
    stop: Option<StopReason>,
}

impl MeleeAttackModule {
    /// Creates a module resolving hits through an existing pipeline.
    #[must_use]
    pub fn new(
        config: &MeleeWeaponConfig,
        attacker: EntityId,
        item: Option<EntityId>,
        pipeline: PipelineId,
        max_collisions: usize,
    ) -> Self {
        let hitboxes = config.hitboxes.iter().cloned().map(MeleeHitbox::new).collect();
        Self {
            attacker,
            item,
            pipeline,
            detector: MeleeCollisionDetector::new(hitboxes, config.detector_settings(max_collisions)),
            timing: config.timing.clone(),
            phase: AttackPhase::Idle,
            phase_time: 0.0,
            swings: 0,
            stop: None,
        }
    }

    /// Builds the weapon's pipeline, registers it and creates the module.
    pub fn from_config(
        config: &MeleeWeaponConfig,
        registry: &VariantRegistry,
        system: &mut ImpactSystem,
        attacker: EntityId,
        item: Option<EntityId>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let pipeline = registry.build_pipeline(&config.pipeline)?;
        let owner = match item {
            Some(item) => ImpactOwner::character(attacker).with_item(item),
            None => ImpactOwner::character(attacker),
        };
        let id = system.register_pipeline(pipeline, owner);
        info!(
            "Melee weapon '{}' ready for {} ({} hitboxes)",
            config.name,
            attacker,
            config.hitboxes.len()
        );
        Ok(Self::new(config, attacker, item, id, system.config().max_collision_count))
    }

    /// Tears down the weapon's pipeline.
    pub fn destroy(self, system: &mut ImpactSystem) -> ImpactResult<()> {
        system.destroy_pipeline(self.pipeline)
    }

    // === Item events ===

    /// Begins a swing (windup).
    pub fn attack_start(&mut self) -> bool {
        if self.phase.in_progress() {
            warn!("Attack start for {} ignored: {:?} in progress", self.attacker, self.phase);
            return false;
        }
        self.phase = AttackPhase::Windup;
        self.phase_time = 0.0;
        self.stop = None;
        true
    }

    /// Opens the damage window and clears hit suppression for every source.
    pub fn active_attack_start(&mut self, system: &mut ImpactSystem, world: &dyn ImpactWorld) -> bool {
        if self.phase != AttackPhase::Windup {
            debug!("Active attack start ignored in {:?}", self.phase);
            return false;
        }

        let pose = self.attacker_pose(world);
        self.detector
            .begin_swing(self.item.unwrap_or(self.attacker), &pose, world);
        for source in self.detector.source_ids() {
            system.reset_source(self.pipeline, source);
        }
        self.phase = AttackPhase::Active;
        self.phase_time = 0.0;
        self.swings += 1;
        true
    }

    /// Runs detection for one tick of the damage window.
    pub fn use_item_update(
        &mut self,
        system: &mut ImpactSystem,
        world: &dyn ImpactWorld,
        effects: &mut dyn ImpactEffects,
    ) -> DetectionReport {
        if !self.phase.can_damage() {
            return DetectionReport::default();
        }

        let swing = SwingState {
            attacker: self.attacker,
            item: self.item,
            attacker_pose: self.attacker_pose(world),
            pipeline: self.pipeline,
        };
        let report = self.detector.detect(&swing, system, world, effects);

        if let Some((reason, collider)) = report.stopped {
            info!("Attack by {} stopped by {:?} ({:?})", self.attacker, collider, reason);
            system.events().publish(ImpactEvent::AttackStopped {
                attacker: self.attacker,
                reason,
                collider,
            });
            self.stop = Some(reason);
            self.phase = AttackPhase::Cancelled;
        }
        report
    }

    /// Closes the damage window.
    pub fn active_attack_end(&mut self) -> bool {
        if self.phase != AttackPhase::Active {
            return false;
        }
        self.phase = AttackPhase::Recovery;
        self.phase_time = 0.0;
        true
    }

    /// Finishes the swing.
    pub fn attack_complete(&mut self) -> bool {
        if !self.phase.in_progress() {
            return false;
        }
        self.phase = AttackPhase::Complete;
        true
    }

    /// Aborts the swing.
    pub fn attack_canceled(&mut self) -> bool {
        if !self.phase.in_progress() {
            return false;
        }
        debug!("Attack by {} cancelled in {:?}", self.attacker, self.phase);
        self.phase = AttackPhase::Cancelled;
        true
    }

    /// Advances phases by `dt` using the weapon's timing, detecting hits
    /// while the damage window is open.
    pub fn tick(
        &mut self,
        dt: f32,
        system: &mut ImpactSystem,
        world: &dyn ImpactWorld,
        effects: &mut dyn ImpactEffects,
    ) -> Option<DetectionReport> {
        if !self.phase.in_progress() {
            return None;
        }

        self.phase_time += dt;
        match self.phase {
            AttackPhase::Windup => {
                if self.phase_time >= self.timing.windup {
                    let carry = self.phase_time - self.timing.windup;
                    self.active_attack_start(system, world);
                    self.phase_time = carry;
                }
                None
            }
            AttackPhase::Active => {
                let elapsed = self.phase_time;
                let report = self.use_item_update(system, world, effects);
                if self.phase == AttackPhase::Active && elapsed >= self.timing.active {
                    self.active_attack_end();
                    self.phase_time = elapsed - self.timing.active;
                }
                Some(report)
            }
            AttackPhase::Recovery => {
                if self.phase_time >= self.timing.recovery {
                    self.attack_complete();
                }
                None
            }
            _ => None,
        }
    }

    // === Inspection ===

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> AttackPhase {
        self.phase
    }

    /// Pipeline hits resolve through.
    #[must_use]
    pub const fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// Attacking character.
    #[must_use]
    pub const fn attacker(&self) -> EntityId {
        self.attacker
    }

    /// Equipped weapon entity.
    #[must_use]
    pub const fn item(&self) -> Option<EntityId> {
        self.item
    }

    /// Collision detector.
    #[must_use]
    pub const fn detector(&self) -> &MeleeCollisionDetector {
        &self.detector
    }

    /// Swings that reached the damage window.
    #[must_use]
    pub const fn swing_count(&self) -> u32 {
        self.swings
    }

    /// Why the last swing stopped early, if it did.
    #[must_use]
    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    fn attacker_pose(&self, world: &dyn ImpactWorld) -> Pose {
        world
            .entity(self.attacker)
            .map_or(Pose::IDENTITY, |info| info.pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockWorld, RecordingEffects};
    use glam::Vec3;

    const LONGSWORD: &str = r#"(
        name: "longsword",
        hitboxes: [
            (name: "blade", collider_path: Some("blade")),
            (name: "pommel", collider_path: Some("pommel"), damage_multiplier: 0.5),
        ],
        strategy: Hitboxes(lerp_density: 2),
        impact_layers: 6,
        trigger_force: 2.0,
        source_id_base: 10,
        timing: (windup: 0.1, active: 0.2, recovery: 0.1),
        pipeline: (
            on_success: [(kind: "simple_damage", params: (amount: 12.0))],
        ),
    )"#;

    struct Duel {
        world: MockWorld,
        effects: RecordingEffects,
        system: ImpactSystem,
        module: MeleeAttackModule,
        blade: impact_common::ColliderId,
        target: EntityId,
    }

    fn duel() -> Duel {
        let mut world = MockWorld::new();
        let attacker = world.spawn_character(Vec3::ZERO, Vec3::Z);
        let sword = world.spawn_child(attacker, Vec3::new(0.3, 1.0, 0.5));
        let blade = world.add_sphere_collider(sword, 3, Vec3::new(0.3, 1.0, 0.8), 0.2);
        let pommel = world.add_sphere_collider(sword, 3, Vec3::new(0.3, 1.0, 0.2), 0.1);
        world.name_collider(sword, "blade", blade);
        world.name_collider(sword, "pommel", pommel);
        let target = world.spawn_character(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        world.add_sphere_collider(target, 1, Vec3::new(0.0, 1.0, 2.0), 0.5);
        world.add_wall(2, Vec3::new(3.0, 1.0, 0.0), 0.5);

        let Ok(config) = MeleeWeaponConfig::from_ron(LONGSWORD) else {
            panic!("longsword asset should parse");
        };
        let mut system = ImpactSystem::default();
        let registry = VariantRegistry::with_builtins();
        let module = match MeleeAttackModule::from_config(&config, &registry, &mut system, attacker, Some(sword)) {
            Ok(module) => module,
            Err(err) => panic!("attack module failed to build: {err}"),
        };
        Duel {
            world,
            effects: RecordingEffects::new(),
            system,
            module,
            blade,
            target,
        }
    }

    #[test]
    fn test_weapon_asset_parses() {
        let Ok(config) = MeleeWeaponConfig::from_ron(LONGSWORD) else {
            panic!("longsword asset should parse");
        };
        assert_eq!(config.hitboxes.len(), 2);
        assert_eq!(config.hitboxes[1].damage_multiplier, 0.5);
        assert_eq!(config.strategy, DetectionStrategy::Hitboxes { lerp_density: 2 });
        assert_eq!(config.impact_layers, LayerMask::from_bits(6));
        assert_eq!(config.pipeline.on_success.len(), 1);
    }

    #[test]
    fn test_invalid_weapon_rejected() {
        let err = MeleeWeaponConfig::from_ron("(strategy: Sphere(offset: (0.0, 1.0, 1.0), radius: 0.0))");
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));
        let err = MeleeWeaponConfig::from_ron("(name: \"bare\")");
        assert!(matches!(err, Err(ConfigError::InvalidValue { field: "hitboxes", .. })));
        assert!(matches!(MeleeWeaponConfig::from_ron("(name: "), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_phases_follow_item_events() {
        let mut d = duel();
        assert_eq!(d.module.phase(), AttackPhase::Idle);
        assert!(!d.module.active_attack_start(&mut d.system, &d.world));

        assert!(d.module.attack_start());
        assert!(!d.module.attack_start());
        let report = d.module.use_item_update(&mut d.system, &d.world, &mut d.effects);
        assert_eq!(report, DetectionReport::default());

        assert!(d.module.active_attack_start(&mut d.system, &d.world));
        assert_eq!(d.module.phase(), AttackPhase::Active);
        assert!(d.module.active_attack_end());
        assert!(d.module.attack_complete());
        assert_eq!(d.module.phase(), AttackPhase::Complete);
        assert!(!d.module.attack_canceled());
        assert_eq!(d.module.swing_count(), 1);
    }

    #[test]
    fn test_new_swing_resets_hit_suppression() {
        let mut d = duel();
        d.world.set_collider_pose(d.blade, Pose::from_position(Vec3::new(0.0, 1.0, 1.4)));

        for _ in 0..2 {
            d.module.attack_start();
            d.module.active_attack_start(&mut d.system, &d.world);
            d.module.use_item_update(&mut d.system, &d.world, &mut d.effects);
            d.module.use_item_update(&mut d.system, &d.world, &mut d.effects);
            d.module.attack_complete();
        }

        assert_eq!(d.effects.damaged_entities(), vec![d.target, d.target]);
        let (_, first) = &d.effects.damage_requests()[0];
        assert_eq!(first.amount, 12.0);
    }

    #[test]
    fn test_solid_hit_cancels_and_publishes() {
        let mut d = duel();
        d.world.set_collider_pose(d.blade, Pose::from_position(Vec3::new(2.6, 1.0, 0.0)));

        d.module.attack_start();
        d.module.active_attack_start(&mut d.system, &d.world);
        let report = d.module.use_item_update(&mut d.system, &d.world, &mut d.effects);

        assert!(report.stopped.is_some());
        assert_eq!(d.module.phase(), AttackPhase::Cancelled);
        assert_eq!(d.module.stop_reason(), Some(StopReason::SolidObject));
        let stops = d
            .system
            .events()
            .drain()
            .into_iter()
            .filter(|event| matches!(event, ImpactEvent::AttackStopped { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_tick_runs_timed_swing() {
        let mut d = duel();
        d.world.set_collider_pose(d.blade, Pose::from_position(Vec3::new(0.0, 1.0, 1.4)));
        d.module.attack_start();

        let mut reports = 0;
        for _ in 0..40 {
            if d.module
                .tick(0.02, &mut d.system, &d.world, &mut d.effects)
                .is_some()
            {
                reports += 1;
            }
        }

        assert_eq!(d.module.phase(), AttackPhase::Complete);
        assert!(reports >= 9);
        assert_eq!(d.effects.damaged_entities(), vec![d.target]);
    }

    #[test]
    fn test_destroy_releases_pipeline() {
        let mut d = duel();
        let id = d.module.pipeline();
        assert!(d.module.destroy(&mut d.system).is_ok());
        assert!(d.system.pipeline(id).is_none());
    }
}
