//! Multi-hit suppression bookkeeping.

use ahash::{AHashMap, AHashSet};
use impact_common::{EntityId, SourceId};

/// Targets already hit, per source.
///
/// Each action slot owns one registry. Entries are created lazily on the
/// first hit for a source and dropped by [`reset`](Self::reset) when that
/// source starts a new cast.
#[derive(Debug, Default, Clone)]
pub struct HitRegistry {
    hits: AHashMap<SourceId, AHashSet<EntityId>>,
}

impl HitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `target` for `source`. Returns `true` if it was not hit before.
    pub fn record(&mut self, source: SourceId, target: EntityId) -> bool {
        self.hits.entry(source).or_default().insert(target)
    }

    /// Whether `target` was already recorded for `source`.
    #[must_use]
    pub fn contains(&self, source: SourceId, target: EntityId) -> bool {
        self.hits
            .get(&source)
            .is_some_and(|targets| targets.contains(&target))
    }

    /// Forgets every target recorded for `source`.
    pub fn reset(&mut self, source: SourceId) {
        self.hits.remove(&source);
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.hits.clear();
    }

    /// Number of targets recorded for `source`.
    #[must_use]
    pub fn hit_count(&self, source: SourceId) -> usize {
        self.hits.get(&source).map_or(0, |targets| targets.len())
    }
}
