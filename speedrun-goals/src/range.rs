//! Integer ranges used by count, durability and enchantment-level constraints.

use serde::{Deserialize, Serialize};

use crate::types::{GoalError, Text};

/// An inclusive range with optional bounds. No bounds means "anything".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct IntRange {
    /// Lower bound
    pub min: Option<i64>,
    /// Upper bound
    pub max: Option<i64>,
}

/// JSON shape: a bare number or `{min, max}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRange {
    Exact(i64),
    Bounds {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
}

impl TryFrom<RawRange> for IntRange {
    type Error = GoalError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        match raw {
            RawRange::Exact(n) => Ok(Self::exactly(n)),
            RawRange::Bounds { min, max } => {
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(GoalError::InvalidRange(format!("{lo} > {hi}")));
                    }
                }
                Ok(Self { min, max })
            }
        }
    }
}

impl From<IntRange> for RawRange {
    fn from(range: IntRange) -> Self {
        match range.exact() {
            Some(n) => RawRange::Exact(n),
            None => RawRange::Bounds {
                min: range.min,
                max: range.max,
            },
        }
    }
}

impl IntRange {
    /// Unbounded range.
    pub const ANY: IntRange = IntRange { min: None, max: None };

    /// A single value.
    pub fn exactly(n: i64) -> Self {
        Self {
            min: Some(n),
            max: Some(n),
        }
    }

    /// `n` or more.
    pub fn at_least(n: i64) -> Self {
        Self {
            min: Some(n),
            max: None,
        }
    }

    /// `n` or less.
    pub fn at_most(n: i64) -> Self {
        Self {
            min: None,
            max: Some(n),
        }
    }

    /// Between two bounds, inclusive.
    pub fn between(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Whether the range places no constraint at all.
    pub fn is_dummy(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// The single admitted value, if the range is exact.
    pub fn exact(&self) -> Option<i64> {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }

    /// Whether `value` lies within the range.
    pub fn contains(&self, value: i64) -> bool {
        self.min.map_or(true, |lo| value >= lo) && self.max.map_or(true, |hi| value <= hi)
    }

    /// Lore text describing the range, or `None` when unconstrained.
    ///
    /// With `as_level` set, an exact value renders as an enchantment level.
    pub fn describe(&self, as_level: bool) -> Option<Text> {
        let lit = |n: i64| Text::literal(n.to_string());
        match (self.min, self.max) {
            (None, None) => None,
            (Some(lo), Some(hi)) if lo == hi => Some(if as_level {
                Text::translatable(format!("enchantment.level.{lo}"))
            } else {
                Text::translatable_with("speedabc.range.exactly", vec![lit(lo)])
            }),
            (Some(lo), None) => Some(Text::translatable_with("speedabc.range.at_least", vec![lit(lo)])),
            (None, Some(hi)) => Some(Text::translatable_with("speedabc.range.at_most", vec![lit(hi)])),
            (Some(lo), Some(hi)) => Some(Text::translatable_with(
                "speedabc.range.between",
                vec![lit(lo), lit(hi)],
            )),
        }
    }
}
