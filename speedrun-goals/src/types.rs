//! Core value types shared by goals, predicates and records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Namespace assumed when an identifier omits one.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// Metadata key holding a potion identifier.
pub const POTION_KEY: &str = "Potion";

// ============================================================================
// Errors
// ============================================================================

/// Error types for goal compilation and loading.
#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    /// Identifier could not be parsed
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Item is not known to the registry
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// Enchantment is not known to the registry
    #[error("Unknown enchantment: {0}")]
    UnknownEnchantment(String),

    /// Tag is not known to the registry
    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    /// Two keys that exclude each other were both present
    #[error("Conflicting keys: {0}")]
    ConflictingKeys(String),

    /// Entry has the wrong shape
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Unrecognised icon replacement mode
    #[error("Invalid icon state: {0}")]
    InvalidIconState(String),

    /// Range bounds are malformed
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GoalError>;

// ============================================================================
// Identifiers
// ============================================================================

/// A namespaced identifier such as `minecraft:stone`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Create an identifier from a namespace and a path.
    pub fn new(namespace: &str, path: &str) -> Self {
        Self(format!("{namespace}:{path}"))
    }

    /// Shorthand for an identifier in the default namespace.
    pub fn minecraft(path: &str) -> Self {
        Self::new(DEFAULT_NAMESPACE, path)
    }

    /// Parse an identifier, filling in the default namespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let (namespace, path) = match raw.split_once(':') {
            Some((ns, path)) => (ns, path),
            None => (DEFAULT_NAMESPACE, raw),
        };
        let valid_ns = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_-.".contains(c));
        let valid_path = !path.is_empty()
            && path
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_-./".contains(c));
        if !valid_ns || !valid_path {
            return Err(GoalError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self::new(namespace, path))
    }

    /// The namespace part.
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or(DEFAULT_NAMESPACE)
    }

    /// The path part.
    pub fn path(&self) -> &str {
        self.0.split_once(':').map(|(_, p)| p).unwrap_or(&self.0)
    }

    /// The full `namespace:path` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Translation key for this identifier, e.g. `item.minecraft.stone`.
    pub fn translation_key(&self, kind: &str) -> String {
        format!("{kind}.{}.{}", self.namespace(), self.path().replace('/', "."))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = GoalError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

// ============================================================================
// Text
// ============================================================================

/// A message fragment, either literal or resolved from a translation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Text {
    /// Translation key with positional arguments
    Translatable {
        translate: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        with: Vec<Text>,
    },
    /// Plain text
    Literal(String),
}

impl Text {
    /// Create a translatable text without arguments.
    pub fn translatable(key: impl Into<String>) -> Self {
        Self::Translatable {
            translate: key.into(),
            with: Vec::new(),
        }
    }

    /// Create a translatable text with arguments.
    pub fn translatable_with(key: impl Into<String>, with: Vec<Text>) -> Self {
        Self::Translatable {
            translate: key.into(),
            with,
        }
    }

    /// Create a literal text.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Translation key, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Translatable { translate, .. } => Some(translate),
            Self::Literal(_) => None,
        }
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(s),
            Self::Translatable { translate, with } if with.is_empty() => f.write_str(translate),
            Self::Translatable { translate, with } => {
                write!(f, "{translate}(")?;
                for (i, arg) in with.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// Metadata bag
// ============================================================================

/// String-keyed bag of values attached to an item stack.
///
/// Markers such as "bypasses item check" or "bound to record X" are stored
/// here; callers go through the typed accessors rather than raw keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, serde_json::Value>);

impl Metadata {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Raw value insert.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    /// Whether a boolean flag is set.
    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Set a boolean flag.
    pub fn set_flag(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), serde_json::Value::Bool(true));
    }

    /// String value, if present.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Set a string value.
    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Whether every entry of `required` is present here with an equal value.
    pub fn contains_all(&self, required: &Metadata) -> bool {
        required
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).is_some_and(|own| own == v))
    }

    /// Copy entries from `other`. With `overwrite` unset, existing keys win.
    pub fn merge_from(&mut self, other: &Metadata, overwrite: bool) {
        for (k, v) in &other.0 {
            if overwrite || !self.0.contains_key(k) {
                self.0.insert(k.clone(), v.clone());
            }
        }
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

// ============================================================================
// Item stacks
// ============================================================================

fn default_count() -> u32 {
    1
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// An item-like value: what a player holds, and what icons are made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item identifier
    pub item: ResourceId,
    /// Stack size
    #[serde(rename = "Count", default = "default_count")]
    pub count: u32,
    /// Damage taken
    #[serde(default, skip_serializing_if = "is_zero")]
    pub damage: u32,
    /// Maximum damage; zero for items without durability
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_damage: u32,
    /// Applied enchantments and their levels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enchantments: BTreeMap<ResourceId, u32>,
    /// Enchantments stored in a book
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stored_enchantments: BTreeMap<ResourceId, u32>,
    /// Display name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<Text>,
    /// Lore lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lore: Vec<Text>,
    /// Attached metadata bag
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ItemStack {
    /// Create a stack of `count` items.
    pub fn new(item: ResourceId, count: u32) -> Self {
        Self {
            item,
            count,
            damage: 0,
            max_damage: 0,
            enchantments: BTreeMap::new(),
            stored_enchantments: BTreeMap::new(),
            custom_name: None,
            lore: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Create a single item.
    pub fn of(item: ResourceId) -> Self {
        Self::new(item, 1)
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: Text) -> Self {
        self.custom_name = Some(name);
        self
    }

    /// Set damage values.
    pub fn with_damage(mut self, damage: u32, max_damage: u32) -> Self {
        self.damage = damage;
        self.max_damage = max_damage;
        self
    }

    /// Add an enchantment.
    pub fn with_enchantment(mut self, id: ResourceId, level: u32) -> Self {
        self.enchantments.insert(id, level);
        self
    }

    /// Remaining durability, if the item is damageable.
    pub fn durability(&self) -> Option<u32> {
        (self.max_damage > 0).then(|| self.max_damage.saturating_sub(self.damage))
    }

    /// Whether the stack holds nothing.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Copy decorations (name, lore, enchantments, metadata) from another stack.
    ///
    /// With `overwrite` unset, decorations already present on `self` are kept.
    pub fn merge_decorations_from(&mut self, other: &ItemStack, overwrite: bool) {
        if overwrite || self.custom_name.is_none() {
            if let Some(name) = &other.custom_name {
                self.custom_name = Some(name.clone());
            }
        }
        if (overwrite || self.lore.is_empty()) && !other.lore.is_empty() {
            self.lore = other.lore.clone();
        }
        for (id, level) in &other.enchantments {
            if overwrite || !self.enchantments.contains_key(id) {
                self.enchantments.insert(id.clone(), *level);
            }
        }
        self.metadata.merge_from(&other.metadata, overwrite);
    }
}
