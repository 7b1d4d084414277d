//! Goal compiler.
//!
//! Turns a declarative goal definition into a flat, ordered list of
//! [`Predicate`]s. Entries may be:
//!
//! - `"ns:item"`: one predicate for that item
//! - `"#ns:tag"`: one predicate per current tag member
//! - `{ "advancement": id }`: one advancement predicate
//! - `{ "items": [...], "item_predicate"?: {...} }`: one merged predicate
//! - `{ "tag": id, "all"?: bool, "item_predicate"?: {...} }`: per-member
//!   predicates when `all` (the default), otherwise one merged predicate
//! - `{ "item_predicate": {...} }`: one predicate on constraints alone
//!
//! Any object entry may also carry an `icon` override with a `replace` mode.
//! Compilation is all-or-nothing: the first bad entry fails the goal.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::icon::{advancement_icon, annotate, anything_marker, IconState};
use crate::predicate::{ItemMatcher, Predicate};
use crate::registry::ItemRegistry;
use crate::types::{GoalError, ItemStack, ResourceId, Result, Text};

/// A goal as written by a data pack author.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalDefinition {
    /// Icon shown in goal lists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<ItemStack>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Text>,
    /// Requirement entries, in order
    pub items: Vec<Value>,
}

impl GoalDefinition {
    /// Parse a definition from JSON.
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A goal ready to be raced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGoal {
    /// Goal identifier
    pub id: ResourceId,
    /// Icon shown in goal lists
    pub icon: ItemStack,
    /// Display name
    pub display: Text,
    /// Ordered predicates
    pub predicates: Arc<[Predicate]>,
    /// SHA-256 of the serialized predicate list
    pub fingerprint: String,
}

impl CompiledGoal {
    /// Number of predicates.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether the goal has no predicates.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Compute the fingerprint of a predicate list.
pub fn fingerprint(predicates: &[Predicate]) -> Result<String> {
    let bytes = serde_json::to_vec(predicates)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Compiles goal definitions against an item registry.
pub struct GoalCompiler<'a> {
    registry: &'a dyn ItemRegistry,
}

impl<'a> GoalCompiler<'a> {
    /// Create a compiler.
    pub fn new(registry: &'a dyn ItemRegistry) -> Self {
        Self { registry }
    }

    /// Compile a whole goal.
    pub fn compile(&self, id: ResourceId, definition: &GoalDefinition) -> Result<CompiledGoal> {
        let mut predicates = Vec::new();
        for entry in &definition.items {
            predicates.extend(self.compile_entry(entry)?);
        }

        let icon = definition
            .icon
            .clone()
            .or_else(|| predicates.first().map(|p| p.icon().clone()))
            .unwrap_or_else(anything_marker);
        let display = definition
            .display
            .clone()
            .unwrap_or_else(|| Text::translatable(id.translation_key("speedabc.goal")));
        let fingerprint = fingerprint(&predicates)?;

        debug!(goal = %id, predicates = predicates.len(), fingerprint = %fingerprint, "Compiled goal");

        Ok(CompiledGoal {
            id,
            icon,
            display,
            predicates: predicates.into(),
            fingerprint,
        })
    }

    /// Compile one entry into zero or more predicates.
    pub fn compile_entry(&self, entry: &Value) -> Result<Vec<Predicate>> {
        match entry {
            Value::String(raw) => match raw.strip_prefix('#') {
                Some(tag) => self.every_in_tag(&ResourceId::parse(tag)?),
                None => {
                    let item = self.known_item(raw)?;
                    Ok(vec![single_item(item)])
                }
            },
            Value::Object(obj) => match obj.get("icon") {
                Some(raw_icon) => {
                    let state = IconState::parse(obj.get("replace"))?;
                    let icon: ItemStack = serde_json::from_value(raw_icon.clone())?;
                    let predicates = self.compile_object(obj)?;
                    Ok(predicates
                        .into_iter()
                        .map(|p| with_icon(p, |generated| state.apply(&icon, generated)))
                        .collect())
                }
                None => self.compile_object(obj),
            },
            other => Err(GoalError::InvalidEntry(format!(
                "expected string or object, got {other}"
            ))),
        }
    }

    fn compile_object(&self, obj: &Map<String, Value>) -> Result<Vec<Predicate>> {
        if let Some(raw) = obj.get("advancement") {
            let id = raw
                .as_str()
                .ok_or_else(|| GoalError::InvalidEntry("advancement must be a string".into()))?;
            return Ok(vec![Predicate::advancement(
                ResourceId::parse(id)?,
                advancement_icon(),
            )]);
        }

        if obj.contains_key("items") && obj.contains_key("tag") {
            return Err(GoalError::ConflictingKeys(
                "item & tag cannot exist at the same time".into(),
            ));
        }

        let mut matcher: ItemMatcher = match obj.get("item_predicate") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => ItemMatcher::default(),
        };
        let extra = matcher.has_extra_requirements();

        if let Some(raw) = obj.get("items") {
            let items = self.known_items(raw)?;
            matcher.tag = None;
            matcher.items = items;
            let merged = obj.contains_key("item_predicate");
            return self.items_entry(matcher, extra, merged);
        }

        if let Some(raw) = obj.get("tag") {
            let tag = raw
                .as_str()
                .ok_or_else(|| GoalError::InvalidEntry("tag must be a string".into()))
                .and_then(ResourceId::parse)?;
            let all = match obj.get("all") {
                None => true,
                Some(v) => v
                    .as_bool()
                    .ok_or_else(|| GoalError::InvalidEntry("all must be a boolean".into()))?,
            };
            return self.tag_entry(tag, all, matcher, extra);
        }

        if !matcher.items.is_empty() {
            for item in &matcher.items {
                self.ensure_item(item)?;
            }
            let extra = extra || matcher.items.len() > 1;
            return self.items_entry(matcher, extra, true);
        }

        if extra || matcher.tag.is_some() {
            let mut icon = anything_marker();
            annotate(&mut icon, &matcher, self.registry)?;
            return Ok(vec![Predicate::item(matcher, icon)]);
        }

        warn!("Goal entry has no items, tag or constraints; it contributes no predicate");
        Ok(Vec::new())
    }

    /// `merged` is set when an `item_predicate` accompanies the items; the
    /// icon is then the first item even without extra constraints.
    fn items_entry(&self, matcher: ItemMatcher, extra: bool, merged: bool) -> Result<Vec<Predicate>> {
        match matcher.items.as_slice() {
            [] => Err(GoalError::InvalidEntry("items must not be empty".into())),
            [only] if !extra => Ok(vec![single_item(only.clone())]),
            [first, ..] => {
                let mut icon = if extra || merged {
                    ItemStack::of(first.clone())
                } else {
                    anything_marker()
                };
                annotate(&mut icon, &matcher, self.registry)?;
                Ok(vec![Predicate::item(matcher, icon)])
            }
        }
    }

    fn tag_entry(
        &self,
        tag: ResourceId,
        all: bool,
        matcher: ItemMatcher,
        extra: bool,
    ) -> Result<Vec<Predicate>> {
        if all && !extra {
            return self.every_in_tag(&tag);
        }
        if all {
            let members = self.members(&tag)?;
            let mut predicates = Vec::with_capacity(members.len());
            for member in members {
                let per_item = ItemMatcher {
                    items: vec![member.clone()],
                    tag: None,
                    ..matcher.clone()
                };
                let mut icon = ItemStack::of(member);
                annotate(&mut icon, &per_item, self.registry)?;
                predicates.push(Predicate::item(per_item, icon));
            }
            return Ok(predicates);
        }

        self.members(&tag)?;
        let matcher = ItemMatcher {
            items: Vec::new(),
            tag: Some(tag),
            ..matcher
        };
        let mut icon = anything_marker();
        annotate(&mut icon, &matcher, self.registry)?;
        Ok(vec![Predicate::item(matcher, icon)])
    }

    fn every_in_tag(&self, tag: &ResourceId) -> Result<Vec<Predicate>> {
        let members = self.members(tag)?;
        if members.is_empty() {
            warn!(tag = %tag, "Tag has no members; it contributes no predicate");
        }
        Ok(members.into_iter().map(single_item).collect())
    }

    fn members(&self, tag: &ResourceId) -> Result<Vec<ResourceId>> {
        self.registry
            .tag_members(tag)
            .ok_or_else(|| GoalError::UnknownTag(tag.to_string()))
    }

    fn known_items(&self, raw: &Value) -> Result<Vec<ResourceId>> {
        let list = raw
            .as_array()
            .ok_or_else(|| GoalError::InvalidEntry("items must be an array".into()))?;
        list.iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| GoalError::InvalidEntry(format!("item must be a string, got {v}")))
                    .and_then(|s| self.known_item(s))
            })
            .collect()
    }

    fn known_item(&self, raw: &str) -> Result<ResourceId> {
        let id = ResourceId::parse(raw)?;
        self.ensure_item(&id)?;
        Ok(id)
    }

    fn ensure_item(&self, id: &ResourceId) -> Result<()> {
        if self.registry.contains_item(id) {
            Ok(())
        } else {
            Err(GoalError::UnknownItem(id.to_string()))
        }
    }
}

fn single_item(item: ResourceId) -> Predicate {
    Predicate::item(ItemMatcher::of_items(vec![item.clone()]), ItemStack::of(item))
}

fn with_icon(predicate: Predicate, make: impl Fn(&ItemStack) -> ItemStack) -> Predicate {
    match predicate {
        Predicate::Item {
            item_predicate,
            icon,
        } => Predicate::Item {
            icon: make(&icon),
            item_predicate,
        },
        Predicate::Advancement {
            advancement_id,
            icon,
        } => Predicate::Advancement {
            icon: make(&icon),
            advancement_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icon::ANYTHING_NAME_KEY;
    use crate::predicate::Evidence;
    use crate::registry::StaticRegistry;
    use serde_json::json;

    fn registry() -> StaticRegistry {
        StaticRegistry::new()
            .with_items(["stone", "dirt", "diamond_sword", "enchanted_book", "apple", "grass_block"])
            .with_enchantments(["sharpness"])
            .with_tag("logs", ["oak_log", "birch_log", "spruce_log"])
    }

    fn compile(entries: Value) -> Result<Vec<Predicate>> {
        let registry = registry();
        let compiler = GoalCompiler::new(&registry);
        let definition = GoalDefinition {
            items: entries.as_array().cloned().unwrap_or_default(),
            ..Default::default()
        };
        compiler
            .compile(ResourceId::parse("speedabc:test").unwrap(), &definition)
            .map(|g| g.predicates.to_vec())
    }

    #[test]
    fn test_bare_item_and_tag_wildcard() {
        let predicates = compile(json!(["stone", "#logs"])).unwrap();
        assert_eq!(predicates.len(), 4);
        assert_eq!(predicates[0].icon().item, ResourceId::minecraft("stone"));
        assert_eq!(predicates[2].icon().item, ResourceId::minecraft("birch_log"));
    }

    #[test]
    fn test_unknown_item_fails_goal() {
        let err = compile(json!(["stone", "netherite_ingot"])).unwrap_err();
        assert!(matches!(err, GoalError::UnknownItem(ref id) if id == "minecraft:netherite_ingot"));
    }

    #[test]
    fn test_items_and_tag_conflict() {
        let err = compile(json!([{"items": ["stone"], "tag": "logs"}])).unwrap_err();
        assert!(matches!(err, GoalError::ConflictingKeys(_)));
    }

    #[test]
    fn test_grouped_items_merge_into_one_predicate() {
        let predicates = compile(json!([{"items": ["stone", "dirt"]}])).unwrap();
        assert_eq!(predicates.len(), 1);
        assert_eq!(predicates[0].icon().custom_name, Some(Text::translatable(ANYTHING_NAME_KEY)));

        let registry = registry();
        let dirt = Evidence::item(ItemStack::of(ResourceId::minecraft("dirt")), &registry);
        assert!(predicates[0].test(&dirt));
    }

    #[test]
    fn test_grouped_items_with_empty_item_predicate_use_first_item() {
        let predicates = compile(json!([{"items": ["stone", "dirt"], "item_predicate": {}}])).unwrap();
        assert_eq!(predicates.len(), 1);
        let icon = predicates[0].icon();
        assert_eq!(icon.item, ResourceId::minecraft("stone"));
        assert_eq!(icon.custom_name, None);

        let registry = registry();
        let dirt = Evidence::item(ItemStack::of(ResourceId::minecraft("dirt")), &registry);
        assert!(predicates[0].test(&dirt));
    }

    #[test]
    fn test_single_item_with_constraints_uses_item_icon() {
        let predicates = compile(json!([{
            "items": ["diamond_sword"],
            "item_predicate": {"enchantments": [{"enchantment": "sharpness", "levels": 5}]}
        }]))
        .unwrap();
        assert_eq!(predicates.len(), 1);
        let icon = predicates[0].icon();
        assert_eq!(icon.item, ResourceId::minecraft("diamond_sword"));
        assert_eq!(icon.enchantments.get(&ResourceId::minecraft("sharpness")), Some(&5));
    }

    #[test]
    fn test_tag_all_with_constraints_expands_per_member() {
        let predicates = compile(json!([{"tag": "logs", "item_predicate": {"count": {"min": 8}}}])).unwrap();
        assert_eq!(predicates.len(), 3);
        for p in &predicates {
            assert!(!p.icon().lore.is_empty());
        }
    }

    #[test]
    fn test_tag_any_is_one_predicate() {
        let predicates = compile(json!([{"tag": "logs", "all": false}])).unwrap();
        assert_eq!(predicates.len(), 1);

        let registry = registry();
        let spruce = Evidence::item(ItemStack::of(ResourceId::minecraft("spruce_log")), &registry);
        assert!(predicates[0].test(&spruce));
    }

    #[test]
    fn test_advancement_entry() {
        let predicates = compile(json!([{"advancement": "story/mine_diamond"}])).unwrap();
        assert_eq!(predicates.len(), 1);
        assert!(predicates[0].test(&Evidence::advancement(ResourceId::minecraft("story/mine_diamond"))));
        assert_eq!(predicates[0].icon().item, ResourceId::minecraft("grass_block"));
    }

    #[test]
    fn test_icon_override() {
        let predicates = compile(json!([{
            "icon": {"item": "apple"},
            "replace": "icon",
            "advancement": "story/root"
        }]))
        .unwrap();
        assert_eq!(predicates[0].icon().item, ResourceId::minecraft("apple"));

        let err = compile(json!([{"icon": {"item": "apple"}, "replace": "nope", "advancement": "a"}])).unwrap_err();
        assert!(matches!(err, GoalError::InvalidIconState(_)));
    }

    #[test]
    fn test_empty_entry_contributes_nothing() {
        assert!(compile(json!([{}])).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_entry_shape() {
        assert!(matches!(compile(json!([42])).unwrap_err(), GoalError::InvalidEntry(_)));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = compile(json!(["stone", "dirt"])).unwrap();
        let b = compile(json!(["stone", "dirt"])).unwrap();
        let c = compile(json!(["dirt", "stone"])).unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&c).unwrap());
        assert_eq!(fingerprint(&a).unwrap().len(), 64);
    }
}
