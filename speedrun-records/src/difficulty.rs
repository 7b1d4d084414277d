//! Difficulty policies: what bonus items a player gets when a run starts.
//!
//! The nine built-in variants combine two axes, a flight item (elytra) and
//! a boost item (firework rockets), each of which is absent, granted once,
//! or granted in an unlimited form.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use speedrun_goals::{ItemStack, ResourceId, Text};

use crate::stamp;
use crate::types::RecordId;

/// Namespace of the built-in difficulties.
pub const DIFFICULTY_NAMESPACE: &str = "speedabc";

/// Identifier of the "nothing granted" difficulty.
pub fn empty_difficulty_id() -> ResourceId {
    ResourceId::new(DIFFICULTY_NAMESPACE, "empty")
}

/// How generously one axis is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantLevel {
    /// Nothing given
    Absent,
    /// One ordinary grant
    Ordinary,
    /// Unbreakable or non-shrinking grant
    Unlimited,
}

impl GrantLevel {
    /// All levels, weakest first.
    pub const ALL: [GrantLevel; 3] = [GrantLevel::Absent, GrantLevel::Ordinary, GrantLevel::Unlimited];
}

/// Facts about the run a difficulty is applied to.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantContext {
    /// Record being started, if any
    pub record: Option<RecordId>,
    /// Bind granted items to the record
    pub items_only_available_when_running: bool,
}

/// A difficulty policy.
pub trait Difficulty: Send + Sync + fmt::Debug {
    /// Identifier.
    fn id(&self) -> &ResourceId;

    /// Display name.
    fn display(&self) -> Text {
        Text::translatable(self.id().translation_key("speedabc.difficulty"))
    }

    /// Stacks to give a player holding `holdings` at run start.
    fn grants(&self, holdings: &[ItemStack], ctx: &GrantContext) -> Vec<ItemStack>;
}

/// One grant axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Flight,
    Boost,
}

impl Axis {
    fn item(&self) -> ResourceId {
        match self {
            Axis::Flight => ResourceId::minecraft("elytra"),
            Axis::Boost => ResourceId::minecraft("firework_rocket"),
        }
    }

    fn make_stack(&self) -> ItemStack {
        match self {
            Axis::Flight => ItemStack::of(self.item()).with_damage(0, 432),
            Axis::Boost => ItemStack::new(self.item(), 64),
        }
    }

    fn is_infinite(&self, stack: &ItemStack) -> bool {
        match self {
            Axis::Flight => stamp::is_unbreakable(stack),
            Axis::Boost => stamp::is_no_shrinking(stack),
        }
    }

    fn mark_infinite(&self, stack: &mut ItemStack) {
        match self {
            Axis::Flight => stamp::mark_unbreakable(stack),
            Axis::Boost => stamp::mark_no_shrinking(stack),
        }
    }

    fn satisfied_by(&self, stack: &ItemStack, level: GrantLevel, ctx: &GrantContext) -> bool {
        stack.item == self.item()
            && (!ctx.items_only_available_when_running || stamp::stamps_record(stack, ctx.record))
            && stamp::bypasses_item_check(stack)
            && (level == GrantLevel::Ordinary || self.is_infinite(stack))
    }

    fn grant(&self, level: GrantLevel, holdings: &[ItemStack], ctx: &GrantContext) -> Option<ItemStack> {
        if level == GrantLevel::Absent || holdings.iter().any(|s| self.satisfied_by(s, level, ctx)) {
            return None;
        }
        let mut stack = self.make_stack();
        stamp::mark_bypassing(&mut stack);
        if level == GrantLevel::Unlimited {
            self.mark_infinite(&mut stack);
        }
        if ctx.items_only_available_when_running {
            if let Some(record) = ctx.record {
                stamp::put_record_stamp(&mut stack, record);
            }
        }
        Some(stack)
    }
}

/// One of the nine built-in difficulties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDifficulty {
    id: ResourceId,
    flight: GrantLevel,
    boost: GrantLevel,
}

impl BuiltinDifficulty {
    /// Create the variant for a pair of levels.
    pub fn new(flight: GrantLevel, boost: GrantLevel) -> Self {
        let flight_part = match flight {
            GrantLevel::Absent => None,
            GrantLevel::Ordinary => Some("elytra"),
            GrantLevel::Unlimited => Some("inf_elytra"),
        };
        let boost_part = match boost {
            GrantLevel::Absent => None,
            GrantLevel::Ordinary => Some("firework"),
            GrantLevel::Unlimited => Some("inf_firework"),
        };
        let path = match (flight_part, boost_part) {
            (None, None) => "empty".to_string(),
            (Some(f), None) => f.to_string(),
            (None, Some(b)) => b.to_string(),
            (Some(f), Some(b)) => format!("{f}_{b}"),
        };
        Self {
            id: ResourceId::new(DIFFICULTY_NAMESPACE, &path),
            flight,
            boost,
        }
    }

    /// All nine variants.
    pub fn all() -> Vec<Self> {
        GrantLevel::ALL
            .iter()
            .flat_map(|flight| GrantLevel::ALL.iter().map(move |boost| Self::new(*flight, *boost)))
            .collect()
    }

    /// Flight axis level.
    pub fn flight(&self) -> GrantLevel {
        self.flight
    }

    /// Boost axis level.
    pub fn boost(&self) -> GrantLevel {
        self.boost
    }
}

impl Difficulty for BuiltinDifficulty {
    fn id(&self) -> &ResourceId {
        &self.id
    }

    fn grants(&self, holdings: &[ItemStack], ctx: &GrantContext) -> Vec<ItemStack> {
        let granted: Vec<ItemStack> = [(Axis::Flight, self.flight), (Axis::Boost, self.boost)]
            .iter()
            .filter_map(|(axis, level)| axis.grant(*level, holdings, ctx))
            .collect();
        debug!(difficulty = %self.id, granted = granted.len(), "Difficulty grants computed");
        granted
    }
}

/// Process-wide difficulty registry.
///
/// Populated at startup, then frozen by [`DifficultyRegistry::finalize`].
#[derive(Debug)]
pub struct DifficultyRegistry {
    entries: DashMap<ResourceId, Arc<dyn Difficulty>>,
    fallback: Arc<dyn Difficulty>,
    finalized: AtomicBool,
}

impl DifficultyRegistry {
    /// Create a registry holding the built-in variants.
    pub fn new() -> Self {
        let entries: DashMap<ResourceId, Arc<dyn Difficulty>> = DashMap::new();
        for difficulty in BuiltinDifficulty::all() {
            entries.insert(difficulty.id().clone(), Arc::new(difficulty));
        }
        Self {
            entries,
            fallback: Arc::new(BuiltinDifficulty::new(GrantLevel::Absent, GrantLevel::Absent)),
            finalized: AtomicBool::new(false),
        }
    }

    /// Register an extra difficulty. Ignored once finalized.
    pub fn register(&self, difficulty: Arc<dyn Difficulty>) -> bool {
        if self.finalized.load(Ordering::Acquire) {
            warn!(difficulty = %difficulty.id(), "Difficulty registered after finalize; ignored");
            return false;
        }
        info!(difficulty = %difficulty.id(), "Difficulty registered");
        self.entries.insert(difficulty.id().clone(), difficulty);
        true
    }

    /// Freeze the registry.
    pub fn finalize(&self) {
        self.finalized.store(true, Ordering::Release);
    }

    /// Whether the registry is frozen.
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Look up a difficulty, falling back to the empty one.
    pub fn get(&self, id: &ResourceId) -> Arc<dyn Difficulty> {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    /// Normalise an identifier: unknown ids become the empty difficulty.
    pub fn resolve_id(&self, id: &ResourceId) -> ResourceId {
        if self.contains(id) {
            id.clone()
        } else {
            self.fallback.id().clone()
        }
    }

    /// All registered identifiers, sorted.
    pub fn ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for DifficultyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(path: &str) -> ResourceId {
        ResourceId::new(DIFFICULTY_NAMESPACE, path)
    }

    #[test]
    fn test_builtin_ids() {
        let ids: Vec<String> = BuiltinDifficulty::all()
            .iter()
            .map(|d| d.id().path().to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "empty",
                "firework",
                "inf_firework",
                "elytra",
                "elytra_firework",
                "elytra_inf_firework",
                "inf_elytra",
                "inf_elytra_firework",
                "inf_elytra_inf_firework",
            ]
        );
    }

    #[test]
    fn test_empty_grants_nothing() {
        let d = BuiltinDifficulty::new(GrantLevel::Absent, GrantLevel::Absent);
        assert!(d.grants(&[], &GrantContext::default()).is_empty());
    }

    #[test]
    fn test_unlimited_grants_are_marked() {
        let d = BuiltinDifficulty::new(GrantLevel::Unlimited, GrantLevel::Unlimited);
        let granted = d.grants(&[], &GrantContext::default());
        assert_eq!(granted.len(), 2);

        let elytra = &granted[0];
        assert_eq!(elytra.item, ResourceId::minecraft("elytra"));
        assert!(stamp::bypasses_item_check(elytra));
        assert!(stamp::is_unbreakable(elytra));

        let rockets = &granted[1];
        assert_eq!(rockets.count, 64);
        assert!(stamp::is_no_shrinking(rockets));
        assert!(stamp::record_stamp(rockets).is_none());
    }

    #[test]
    fn test_existing_holdings_satisfy_axis() {
        let d = BuiltinDifficulty::new(GrantLevel::Ordinary, GrantLevel::Unlimited);
        let ctx = GrantContext::default();
        let first = d.grants(&[], &ctx);
        assert!(d.grants(&first, &ctx).is_empty());

        let mut plain_rockets = ItemStack::new(ResourceId::minecraft("firework_rocket"), 64);
        stamp::mark_bypassing(&mut plain_rockets);
        let again = d.grants(&[first[0].clone(), plain_rockets], &ctx);
        assert_eq!(again.len(), 1);
        assert!(stamp::is_no_shrinking(&again[0]));
    }

    #[test]
    fn test_items_bound_to_record() {
        let record = Uuid::new_v4();
        let d = BuiltinDifficulty::new(GrantLevel::Ordinary, GrantLevel::Absent);
        let ctx = GrantContext {
            record: Some(record),
            items_only_available_when_running: true,
        };
        let granted = d.grants(&[], &ctx);
        assert_eq!(stamp::record_stamp(&granted[0]), Some(record));

        let other_run = GrantContext {
            record: Some(Uuid::new_v4()),
            ..ctx
        };
        assert_eq!(d.grants(&granted, &other_run).len(), 1);
        assert!(d.grants(&granted, &ctx).is_empty());
    }

    #[test]
    fn test_registry_fallback_and_finalize() {
        let registry = DifficultyRegistry::new();
        assert_eq!(registry.ids().len(), 9);
        assert_eq!(registry.get(&id("nonsense")).id(), &id("empty"));
        assert_eq!(registry.resolve_id(&id("elytra")), id("elytra"));

        let custom = Arc::new(BuiltinDifficulty {
            id: id("custom"),
            flight: GrantLevel::Ordinary,
            boost: GrantLevel::Ordinary,
        });
        assert!(registry.register(custom.clone()));
        registry.finalize();

        let late = Arc::new(BuiltinDifficulty {
            id: id("late"),
            ..(*custom).clone()
        });
        assert!(!registry.register(late));
        assert!(registry.contains(&id("custom")));
        assert!(!registry.contains(&id("late")));
    }
}
