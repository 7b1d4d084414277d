//! Identifiers, time units and errors for speedrun records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a player.
pub type PlayerId = Uuid;

/// Durable identity of a record.
pub type RecordId = Uuid;

/// Game time in ticks.
pub type Tick = i64;

/// Game ticks per real second.
pub const TICKS_PER_SECOND: Tick = 20;

/// Persisted "not set" marker for optional times.
pub const UNSET: Tick = -1;

/// Mate entry meaning "always trusted, whatever they are running".
pub const WILDCARD_MATE: RecordId = Uuid::nil();

/// How a record is being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayType {
    /// Independent record, optionally linked to mates
    #[default]
    Pvp,
    /// One record shared by a party
    Coop,
}

impl PlayType {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayType::Pvp => "pvp",
            PlayType::Coop => "coop",
        }
    }
}

/// First four hex digits of a UUID, uppercased, with a leading `#`.
pub fn short_id(id: &Uuid) -> String {
    let simple = id.simple().to_string();
    format!("#{}", simple[..4].to_uppercase())
}

/// Whether `raw` looks like a short id (`#` followed by four hex digits).
pub fn is_short_id(raw: &str) -> bool {
    raw.len() == 5
        && raw.starts_with('#')
        && raw[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Error types for record operations.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Predicate with an unrecognised type tag
    #[error("Unknown predicate type: {0}")]
    UnknownPredicateType(String),

    /// Record JSON is structurally invalid
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Archive file name is not `<uuid>.json`
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Record is not in the archive
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Finished records cannot be resumed
    #[error("Record already finished: {0}")]
    RecordFinished(RecordId),

    /// Configuration is out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Goal error
    #[error("Goal error: {0}")]
    Goal(#[from] speedrun_goals::GoalError),
}

pub type Result<T> = std::result::Result<T, RecordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let id = Uuid::parse_str("abcd1234-0000-0000-0000-000000000000").unwrap();
        assert_eq!(short_id(&id), "#ABCD");
        assert!(is_short_id("#ABCD"));
        assert!(is_short_id("#09af"));
        assert!(!is_short_id("#ABCDE"));
        assert!(!is_short_id("ABCD1"));
        assert!(!is_short_id("#XYZ1"));
    }

    #[test]
    fn test_play_type_json() {
        assert_eq!(serde_json::to_string(&PlayType::Coop).unwrap(), "\"coop\"");
        assert_eq!(PlayType::Pvp.as_str(), "pvp");
    }
}
