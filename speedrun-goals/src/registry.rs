//! Item registry lookups used while compiling and matching goals.
//!
//! The host game owns the real registries; this trait is the narrow view
//! the compiler needs. [`StaticRegistry`] is an in-memory implementation
//! for tools and tests.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::ResourceId;

/// Read-only view of the host's item, enchantment and tag registries.
pub trait ItemRegistry: Send + Sync {
    /// Whether the item exists.
    fn contains_item(&self, id: &ResourceId) -> bool;

    /// Whether the enchantment exists.
    fn contains_enchantment(&self, id: &ResourceId) -> bool;

    /// Current members of an item tag, or `None` if the tag is unknown.
    fn tag_members(&self, tag: &ResourceId) -> Option<Vec<ResourceId>>;

    /// Tags the item currently belongs to.
    fn tags_of(&self, item: &ResourceId) -> Vec<ResourceId>;
}

/// In-memory registry.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    items: BTreeSet<ResourceId>,
    enchantments: BTreeSet<ResourceId>,
    tags: BTreeMap<ResourceId, Vec<ResourceId>>,
}

impl StaticRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register items by path in the default namespace.
    pub fn with_items<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.items
            .extend(paths.into_iter().map(ResourceId::minecraft));
        self
    }

    /// Register enchantments by path in the default namespace.
    pub fn with_enchantments<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.enchantments
            .extend(paths.into_iter().map(ResourceId::minecraft));
        self
    }

    /// Register a tag and its members (all in the default namespace).
    ///
    /// Members are registered as items too.
    pub fn with_tag<'a>(mut self, tag: &str, members: impl IntoIterator<Item = &'a str>) -> Self {
        let members: Vec<ResourceId> = members.into_iter().map(ResourceId::minecraft).collect();
        self.items.extend(members.iter().cloned());
        self.tags.insert(ResourceId::minecraft(tag), members);
        self
    }
}

impl ItemRegistry for StaticRegistry {
    fn contains_item(&self, id: &ResourceId) -> bool {
        self.items.contains(id)
    }

    fn contains_enchantment(&self, id: &ResourceId) -> bool {
        self.enchantments.contains(id)
    }

    fn tag_members(&self, tag: &ResourceId) -> Option<Vec<ResourceId>> {
        self.tags.get(tag).cloned()
    }

    fn tags_of(&self, item: &ResourceId) -> Vec<ResourceId> {
        self.tags
            .iter()
            .filter(|(_, members)| members.contains(item))
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_registry_tags() {
        let registry = StaticRegistry::new()
            .with_items(["stone"])
            .with_tag("logs", ["oak_log", "birch_log"]);

        assert!(registry.contains_item(&ResourceId::minecraft("stone")));
        assert!(registry.contains_item(&ResourceId::minecraft("oak_log")));
        assert_eq!(
            registry.tags_of(&ResourceId::minecraft("birch_log")),
            vec![ResourceId::minecraft("logs")]
        );
        assert!(registry.tag_members(&ResourceId::minecraft("wool")).is_none());
    }
}
