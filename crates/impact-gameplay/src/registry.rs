//! Variant registries and pipeline assets.
//!
//! Actions and conditions are open sets: each variant registers a factory
//! under a stable tag, and authored assets refer to variants by tag only.
//!
//! ```ron
//! (
//!     conditions: [(kind: "projectile", params: (allow_projectile: false))],
//!     on_success: [
//!         (kind: "simple_damage", params: (amount: 25.0)),
//!         (kind: "play_audio", delay: 0.1, params: (clips: [3])),
//!     ],
//!     on_failure: [],
//! )
//! ```

use ahash::AHashMap;
use impact_common::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::actions::{ActionSlot, ImpactAction, ImpactActionGroup};
use crate::builtin_actions::{
    AddForceAction, AddTorqueAction, ApplyStateAction, AttributeModifyAction, HealAction,
    InvokeEventAction, KnockbackAction, PlayAudioAction, SimpleDamageAction,
    SpawnParticleAction, SpawnSurfaceEffectAction,
};
use crate::conditional::ConditionalAction;
use crate::conditions::{
    ConditionSlot, IdentifierCondition, ImpactActionConditionGroup, ImpactCondition,
    ProjectileCondition, SourceItemCondition, TargetBehaviorCondition,
};
use crate::pipeline::ImpactPipeline;
use crate::ricochet::RicochetAction;

const fn default_true() -> bool {
    true
}

/// Authored action entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Variant tag
    pub kind: String,
    /// Enable flag
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delay in seconds
    #[serde(default)]
    pub delay: f32,
    /// Multi-hit policy
    #[serde(default)]
    pub allow_multi_hits: bool,
    /// Variant parameters (unit = defaults)
    #[serde(default = "unit_value")]
    pub params: ron::Value,
}

impl ActionSpec {
    /// An enabled entry with default parameters.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            enabled: true,
            delay: 0.0,
            allow_multi_hits: false,
            params: ron::Value::Unit,
        }
    }
}

/// Authored condition entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Variant tag
    pub kind: String,
    /// Enable flag
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Variant parameters (unit = defaults)
    #[serde(default = "unit_value")]
    pub params: ron::Value,
}

fn unit_value() -> ron::Value {
    ron::Value::Unit
}

/// Authored pipeline: conditions plus success and failure actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineAsset {
    /// Conditions evaluated in order
    pub conditions: Vec<ConditionSpec>,
    /// Actions run when the conditions pass
    pub on_success: Vec<ActionSpec>,
    /// Actions run when a condition vetoes
    pub on_failure: Vec<ActionSpec>,
}

impl PipelineAsset {
    /// Parses an asset from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

/// Parameters of the nested conditional action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalParams {
    /// Nested conditions
    pub conditions: Vec<ConditionSpec>,
    /// Actions run when the nested conditions pass
    pub on_pass: Vec<ActionSpec>,
    /// Actions run when they fail
    pub on_fail: Vec<ActionSpec>,
    /// Clear damage data before running `on_fail`
    pub reset_damage_on_fail: bool,
}

/// Decodes variant parameters, using `T::default()` for a unit value.
pub fn decode_params<T: DeserializeOwned + Default>(kind: &str, params: &ron::Value) -> Result<T, ConfigError> {
    if *params == ron::Value::Unit {
        return Ok(T::default());
    }
    params
        .clone()
        .into_rust()
        .map_err(|err| ConfigError::InvalidParams {
            kind: kind.to_string(),
            reason: err.to_string(),
        })
}

/// Builds an action from its parameters.
pub type ActionFactory =
    Box<dyn Fn(&ron::Value, &VariantRegistry) -> Result<Box<dyn ImpactAction>, ConfigError>>;

/// Builds a condition from its parameters.
pub type ConditionFactory = Box<dyn Fn(&ron::Value) -> Result<Box<dyn ImpactCondition>, ConfigError>>;

/// Factories keyed by action tag.
#[derive(Default)]
pub struct ActionRegistry {
    factories: AHashMap<String, ActionFactory>,
}

impl ActionRegistry {
    /// Registers a factory for `tag`, replacing any previous one.
    pub fn register_with(&mut self, tag: impl Into<String>, factory: ActionFactory) {
        let tag = tag.into();
        if self.factories.insert(tag.clone(), factory).is_some() {
            debug!("Replaced action factory '{}'", tag);
        }
    }

    /// Registers a variant whose parameters are the variant itself.
    pub fn register<T>(&mut self, tag: impl Into<String>)
    where
        T: ImpactAction + DeserializeOwned + Default + 'static,
    {
        let tag = tag.into();
        let kind = tag.clone();
        self.register_with(
            tag,
            Box::new(move |params: &ron::Value, _: &VariantRegistry| {
                decode_params::<T>(&kind, params).map(|action| Box::new(action) as Box<dyn ImpactAction>)
            }),
        );
    }

    /// Whether a tag is registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry").field("tags", &self.tags()).finish()
    }
}

/// Factories keyed by condition tag.
#[derive(Default)]
pub struct ConditionRegistry {
    factories: AHashMap<String, ConditionFactory>,
}

impl ConditionRegistry {
    /// Registers a factory for `tag`, replacing any previous one.
    pub fn register_with(&mut self, tag: impl Into<String>, factory: ConditionFactory) {
        let tag = tag.into();
        if self.factories.insert(tag.clone(), factory).is_some() {
            debug!("Replaced condition factory '{}'", tag);
        }
    }

    /// Registers a variant whose parameters are the variant itself.
    pub fn register<T>(&mut self, tag: impl Into<String>)
    where
        T: ImpactCondition + DeserializeOwned + Default + 'static,
    {
        let tag = tag.into();
        let kind = tag.clone();
        self.register_with(
            tag,
            Box::new(move |params: &ron::Value| {
                decode_params::<T>(&kind, params)
                    .map(|condition| Box::new(condition) as Box<dyn ImpactCondition>)
            }),
        );
    }

    /// Whether a tag is registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl std::fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionRegistry").field("tags", &self.tags()).finish()
    }
}

/// Action and condition registries together.
#[derive(Debug, Default)]
pub struct VariantRegistry {
    /// Action factories
    pub actions: ActionRegistry,
    /// Condition factories
    pub conditions: ConditionRegistry,
}

impl VariantRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in variant.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.conditions.register::<TargetBehaviorCondition>("target_behavior");
        registry.conditions.register::<IdentifierCondition>("identifier");
        registry.conditions.register::<SourceItemCondition>("source_item");
        registry.conditions.register::<ProjectileCondition>("projectile");

        registry.actions.register::<SimpleDamageAction>("simple_damage");
        registry.actions.register::<AddForceAction>("add_force");
        registry.actions.register::<AddTorqueAction>("add_torque");
        registry.actions.register::<HealAction>("heal");
        registry.actions.register::<AttributeModifyAction>("attribute_modify");
        registry.actions.register::<PlayAudioAction>("play_audio");
        registry.actions.register::<SpawnParticleAction>("spawn_particle");
        registry.actions.register::<SpawnSurfaceEffectAction>("spawn_surface_effect");
        registry.actions.register::<ApplyStateAction>("apply_state");
        registry.actions.register::<KnockbackAction>("knockback");
        registry.actions.register::<InvokeEventAction>("invoke_event");
        registry.actions.register::<RicochetAction>("ricochet");
        registry.actions.register_with(
            "conditional",
            Box::new(|params: &ron::Value, registry: &VariantRegistry| {
                let params: ConditionalParams = decode_params("conditional", params)?;
                let action = ConditionalAction::new(
                    registry.build_conditions(&params.conditions)?,
                    registry.build_actions(&params.on_pass)?,
                    registry.build_actions(&params.on_fail)?,
                )
                .with_reset_damage_on_fail(params.reset_damage_on_fail);
                Ok(Box::new(action) as Box<dyn ImpactAction>)
            }),
        );

        registry
    }

    /// Instantiates one action slot.
    pub fn build_action(&self, spec: &ActionSpec) -> Result<ActionSlot, ConfigError> {
        let factory = self.actions.factories.get(&spec.kind).ok_or_else(|| {
            error!("Unknown action variant '{}'", spec.kind);
            ConfigError::UnknownVariant {
                family: "action",
                kind: spec.kind.clone(),
            }
        })?;
        let action = factory(&spec.params, self)?;
        Ok(ActionSlot::new(action)
            .with_enabled(spec.enabled)
            .with_delay(spec.delay)
            .with_multi_hits(spec.allow_multi_hits))
    }

    /// Instantiates one condition slot.
    pub fn build_condition(&self, spec: &ConditionSpec) -> Result<ConditionSlot, ConfigError> {
        let factory = self.conditions.factories.get(&spec.kind).ok_or_else(|| {
            error!("Unknown condition variant '{}'", spec.kind);
            ConfigError::UnknownVariant {
                family: "condition",
                kind: spec.kind.clone(),
            }
        })?;
        Ok(ConditionSlot::new(factory(&spec.params)?).with_enabled(spec.enabled))
    }

    /// Instantiates an action group.
    pub fn build_actions(&self, specs: &[ActionSpec]) -> Result<ImpactActionGroup, ConfigError> {
        let mut group = ImpactActionGroup::new();
        for spec in specs {
            group.push(self.build_action(spec)?);
        }
        Ok(group)
    }

    /// Instantiates a condition group.
    pub fn build_conditions(&self, specs: &[ConditionSpec]) -> Result<ImpactActionConditionGroup, ConfigError> {
        let mut group = ImpactActionConditionGroup::new();
        for spec in specs {
            group.push(self.build_condition(spec)?);
        }
        Ok(group)
    }

    /// Instantiates a whole pipeline.
    pub fn build_pipeline(&self, asset: &PipelineAsset) -> Result<ImpactPipeline, ConfigError> {
        Ok(ImpactPipeline::new(
            self.build_conditions(&asset.conditions)?,
            self.build_actions(&asset.on_success)?,
            self.build_actions(&asset.on_failure)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = r#"(
        conditions: [
            (kind: "target_behavior"),
            (kind: "projectile", enabled: false, params: (allow_projectile: false)),
        ],
        on_success: [
            (kind: "simple_damage", params: (amount: 25.0, scale_by_strength: true)),
            (kind: "play_audio", delay: 0.25, allow_multi_hits: true, params: (clips: [3, 4])),
            (kind: "ricochet", params: (max_chain_count: Some(2), radius: 3.0, layers: 4)),
            (kind: "conditional", params: (
                conditions: [(kind: "identifier", params: (identifiers: [7], search_depth: 1))],
                on_pass: [(kind: "heal", params: (amount: 5.0))],
                on_fail: [(kind: "knockback")],
                reset_damage_on_fail: true,
            )),
        ],
        on_failure: [(kind: "invoke_event", params: (name: "deflected"))],
    )"#;

    #[test]
    fn test_builds_pipeline_from_ron() {
        let asset = PipelineAsset::from_ron(ASSET);
        assert!(asset.is_ok(), "{asset:?}");
        let Ok(asset) = asset else { return };

        let registry = VariantRegistry::with_builtins();
        let pipeline = registry.build_pipeline(&asset);
        assert!(pipeline.is_ok(), "{pipeline:?}");
        let Ok(pipeline) = pipeline else { return };

        assert_eq!(pipeline.conditions().len(), 2);
        assert!(!pipeline.conditions().slots()[1].enabled);
        assert_eq!(pipeline.on_success().len(), 4);
        let audio = &pipeline.on_success().slots()[1];
        assert_eq!(audio.delay, 0.25);
        assert!(audio.allow_multi_hits);
        assert_eq!(audio.action().kind(), "play_audio");
        assert_eq!(pipeline.on_failure().slots()[0].action().kind(), "invoke_event");
    }

    #[test]
    fn test_unknown_variant_is_config_error() {
        let registry = VariantRegistry::with_builtins();
        let err = registry.build_action(&ActionSpec::new("teleport")).err();
        assert_eq!(
            err,
            Some(ConfigError::UnknownVariant {
                family: "action",
                kind: "teleport".to_string(),
            })
        );
    }

    #[test]
    fn test_bad_params_are_reported() {
        let registry = VariantRegistry::with_builtins();
        let mut spec = ActionSpec::new("simple_damage");
        spec.params = ron::Value::String("lots".to_string());
        assert!(matches!(
            registry.build_action(&spec),
            Err(ConfigError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_custom_variant_registration() {
        let mut registry = VariantRegistry::new();
        assert!(!registry.actions.contains("heal"));
        registry.actions.register::<HealAction>("heal");
        assert!(registry.build_action(&ActionSpec::new("heal")).is_ok());
        assert_eq!(registry.actions.tags(), vec!["heal"]);
    }
}
