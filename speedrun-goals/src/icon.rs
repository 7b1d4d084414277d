//! Icon synthesis: marker icons, constraint lore and icon overrides.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::predicate::{EnchantmentMatcher, ItemMatcher};
use crate::registry::ItemRegistry;
use crate::types::{GoalError, ItemStack, ResourceId, Result, Text, POTION_KEY};

/// Custom-name key of the generic "anything" marker icon.
pub const ANYTHING_NAME_KEY: &str = "speedabc.icon.anything";

/// Generic icon used when no single item can represent a predicate.
pub fn anything_marker() -> ItemStack {
    ItemStack::of(ResourceId::minecraft("apple")).with_name(Text::translatable(ANYTHING_NAME_KEY))
}

/// Default icon of advancement predicates.
pub fn advancement_icon() -> ItemStack {
    ItemStack::of(ResourceId::minecraft("grass_block"))
}

/// How an explicit icon override combines with the generated icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IconState {
    /// Use the override verbatim
    UseIcon,
    /// Merge, override decorations win
    #[default]
    IconFirst,
    /// Merge, generated decorations win
    GenFirst,
}

impl IconState {
    /// Parse the `replace` key of an entry. Absent means [`IconState::IconFirst`].
    pub fn parse(raw: Option<&Value>) -> Result<Self> {
        match raw {
            None => Ok(Self::default()),
            Some(Value::String(s)) => match s.as_str() {
                "icon" => Ok(Self::UseIcon),
                "covers_gen" => Ok(Self::IconFirst),
                "covers_icon" => Ok(Self::GenFirst),
                other => Err(GoalError::InvalidIconState(other.to_string())),
            },
            Some(other) => Err(GoalError::InvalidIconState(other.to_string())),
        }
    }

    /// Produce the final icon.
    pub fn apply(&self, icon: &ItemStack, generated: &ItemStack) -> ItemStack {
        let mut result = icon.clone();
        match self {
            Self::UseIcon => {}
            Self::IconFirst => result.merge_decorations_from(generated, false),
            Self::GenFirst => result.merge_decorations_from(generated, true),
        }
        result
    }
}

/// How a set of enchantment constraints can be shown on an icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnchantmentDisplay {
    /// Every entry is exact; stamp the map onto the icon
    Exact(BTreeMap<ResourceId, u32>),
    /// Some entry is open-ended; describe in lore only
    LoreOnly(Vec<Text>),
    /// No effective constraint
    Nothing,
}

/// Compile enchantment constraints into their display form.
pub fn compile_enchantments(
    entries: &[EnchantmentMatcher],
    registry: &dyn ItemRegistry,
) -> Result<EnchantmentDisplay> {
    let mut texts = Vec::new();
    let mut exact: Option<BTreeMap<ResourceId, u32>> = Some(BTreeMap::new());

    for entry in entries {
        if let Some(id) = &entry.enchantment {
            if !registry.contains_enchantment(id) {
                return Err(GoalError::UnknownEnchantment(id.to_string()));
            }
        }
        match (&entry.enchantment, entry.levels.describe(true)) {
            (None, None) => continue,
            (Some(id), None) => {
                texts.push(Text::translatable(id.translation_key("enchantment")));
                exact = None;
            }
            (None, Some(levels)) => {
                texts.push(Text::translatable_with(
                    "speedabc.extra_req.enchantment.any",
                    vec![levels],
                ));
                exact = None;
            }
            (Some(id), Some(levels)) => {
                texts.push(Text::translatable_with(
                    "speedabc.extra_req.enchantment.leveled",
                    vec![Text::translatable(id.translation_key("enchantment")), levels],
                ));
                match (entry.levels.exact(), exact.as_mut()) {
                    (Some(level), Some(map)) if level > 0 => {
                        map.insert(id.clone(), level as u32);
                    }
                    _ => exact = None,
                }
            }
        }
    }

    Ok(match exact {
        Some(map) if !map.is_empty() => EnchantmentDisplay::Exact(map),
        _ if !texts.is_empty() => EnchantmentDisplay::LoreOnly(texts),
        _ => EnchantmentDisplay::Nothing,
    })
}

/// Annotate an icon with lore describing the matcher's extra constraints.
pub fn annotate(icon: &mut ItemStack, matcher: &ItemMatcher, registry: &dyn ItemRegistry) -> Result<()> {
    if let Some(count) = matcher.count.describe(false) {
        icon.lore
            .push(Text::translatable_with("speedabc.extra_req.count", vec![count]));
    }
    if let Some(durability) = matcher.durability.describe(false) {
        icon.lore.push(Text::translatable_with(
            "speedabc.extra_req.durability",
            vec![durability],
        ));
    }
    if !matcher.nbt.is_empty() {
        icon.lore.push(Text::translatable("speedabc.extra_req.nbt"));
    }
    if let Some(potion) = &matcher.potion {
        icon.metadata.set_string(POTION_KEY, potion.as_str());
    }

    let (entries, stored) = if matcher.stored_enchantments.is_empty() {
        (&matcher.enchantments, false)
    } else {
        (&matcher.stored_enchantments, true)
    };
    match compile_enchantments(entries, registry)? {
        EnchantmentDisplay::Exact(map) if stored => icon.stored_enchantments = map,
        EnchantmentDisplay::Exact(map) => icon.enchantments = map,
        EnchantmentDisplay::LoreOnly(texts) => {
            icon.lore
                .push(Text::translatable("speedabc.extra_req.enchantments"));
            icon.lore.extend(texts);
        }
        EnchantmentDisplay::Nothing => {}
    }

    if let Some(tag) = &matcher.tag {
        icon.lore.push(Text::translatable_with(
            "speedabc.extra_req.tag",
            vec![Text::literal(format!("#{tag}"))],
        ));
    } else if matcher.items.len() > 1 {
        let names = matcher
            .items
            .iter()
            .map(|item| Text::translatable(item.translation_key("item")))
            .collect();
        icon.lore
            .push(Text::translatable_with("speedabc.extra_req.items", names));
    }
    Ok(())
}
