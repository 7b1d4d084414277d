//! Atomic goal predicates and the evidence they are tested against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::range::IntRange;
use crate::registry::ItemRegistry;
use crate::types::{ItemStack, Metadata, ResourceId, POTION_KEY};

/// Something that just happened to a player and may satisfy a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// The player obtained an item stack
    Item {
        /// The stack as obtained
        stack: ItemStack,
        /// Tags the stack's item belongs to
        tags: Vec<ResourceId>,
    },
    /// The player was granted an advancement
    Advancement(ResourceId),
}

impl Evidence {
    /// Item evidence, resolving tag membership through the registry.
    pub fn item(stack: ItemStack, registry: &dyn ItemRegistry) -> Self {
        let tags = registry.tags_of(&stack.item);
        Self::Item { stack, tags }
    }

    /// Advancement evidence.
    pub fn advancement(id: ResourceId) -> Self {
        Self::Advancement(id)
    }
}

/// Constraint on one enchantment entry of a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnchantmentMatcher {
    /// Specific enchantment, or any when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enchantment: Option<ResourceId>,
    /// Accepted levels
    #[serde(default, skip_serializing_if = "IntRange::is_dummy")]
    pub levels: IntRange,
}

impl EnchantmentMatcher {
    /// Test against a stack's enchantment map.
    pub fn test(&self, applied: &BTreeMap<ResourceId, u32>) -> bool {
        match &self.enchantment {
            Some(id) => match applied.get(id) {
                Some(level) => self.levels.contains(i64::from(*level)),
                None => false,
            },
            None if self.levels.is_dummy() => true,
            None => applied
                .values()
                .any(|level| self.levels.contains(i64::from(*level))),
        }
    }
}

/// Declarative item constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMatcher {
    /// Acceptable items; empty means any item
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ResourceId>,
    /// Required tag membership
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<ResourceId>,
    /// Stack size
    #[serde(default, skip_serializing_if = "IntRange::is_dummy")]
    pub count: IntRange,
    /// Remaining durability
    #[serde(default, skip_serializing_if = "IntRange::is_dummy")]
    pub durability: IntRange,
    /// Applied enchantments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enchantments: Vec<EnchantmentMatcher>,
    /// Stored (book) enchantments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stored_enchantments: Vec<EnchantmentMatcher>,
    /// Metadata entries that must be present
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub nbt: Metadata,
    /// Required potion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potion: Option<ResourceId>,
}

impl ItemMatcher {
    /// Matcher accepting exactly the given items.
    pub fn of_items(items: Vec<ResourceId>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// Matcher accepting any member of a tag.
    pub fn of_tag(tag: ResourceId) -> Self {
        Self {
            tag: Some(tag),
            ..Default::default()
        }
    }

    /// Whether the matcher constrains anything beyond item identity.
    pub fn has_extra_requirements(&self) -> bool {
        !self.count.is_dummy()
            || !self.durability.is_dummy()
            || !self.enchantments.is_empty()
            || !self.stored_enchantments.is_empty()
            || !self.nbt.is_empty()
            || self.potion.is_some()
    }

    /// Test a stack whose item belongs to `tags`.
    pub fn test(&self, stack: &ItemStack, tags: &[ResourceId]) -> bool {
        if !self.items.is_empty() && !self.items.contains(&stack.item) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !tags.contains(tag) {
                return false;
            }
        }
        if !self.count.contains(i64::from(stack.count)) {
            return false;
        }
        if !self.durability.is_dummy() {
            match stack.durability() {
                Some(d) if self.durability.contains(i64::from(d)) => {}
                _ => return false,
            }
        }
        if !self.enchantments.iter().all(|e| e.test(&stack.enchantments)) {
            return false;
        }
        if !self
            .stored_enchantments
            .iter()
            .all(|e| e.test(&stack.stored_enchantments))
        {
            return false;
        }
        if !stack.metadata.contains_all(&self.nbt) {
            return false;
        }
        match &self.potion {
            Some(potion) => stack.metadata.string(POTION_KEY) == Some(potion.as_str()),
            None => true,
        }
    }
}

/// One atomic requirement of a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "predicate_type", rename_all = "snake_case")]
pub enum Predicate {
    /// Satisfied by obtaining a matching item
    Item {
        /// The constraint
        item_predicate: ItemMatcher,
        /// Display icon
        icon: ItemStack,
    },
    /// Satisfied by being granted an advancement
    Advancement {
        /// Advancement identifier
        advancement_id: ResourceId,
        /// Display icon
        icon: ItemStack,
    },
}

impl Predicate {
    /// Item predicate.
    pub fn item(matcher: ItemMatcher, icon: ItemStack) -> Self {
        Self::Item {
            item_predicate: matcher,
            icon,
        }
    }

    /// Advancement predicate.
    pub fn advancement(id: ResourceId, icon: ItemStack) -> Self {
        Self::Advancement {
            advancement_id: id,
            icon,
        }
    }

    /// Test evidence against this predicate.
    pub fn test(&self, evidence: &Evidence) -> bool {
        match (self, evidence) {
            (Self::Item { item_predicate, .. }, Evidence::Item { stack, tags }) => {
                item_predicate.test(stack, tags)
            }
            (Self::Advancement { advancement_id, .. }, Evidence::Advancement(granted)) => {
                advancement_id == granted
            }
            _ => false,
        }
    }

    /// Display icon.
    pub fn icon(&self) -> &ItemStack {
        match self {
            Self::Item { icon, .. } | Self::Advancement { icon, .. } => icon,
        }
    }

    /// Type tag as persisted.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Item { .. } => "item",
            Self::Advancement { .. } => "advancement",
        }
    }
}
