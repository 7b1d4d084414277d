//! Speedrun records.
//!
//! A [`SpeedrunRecord`] is one party's attempt at a compiled goal: which
//! predicates have been collected and when, plus the timer. Records run
//! solo (optionally linked to PvP mates) or wrapped in a [`CoopRecord`]
//! shared by a party.
//!
//! ```text
//!                 ┌──────────── PlayerRecords ────────────┐
//!  Evidence ──►   │ current: Solo(record) | Coop(id) ─────┼──► CoopRecordManager
//!                 │ history: record                       │
//!                 └───────────────┬───────────────────────┘
//!                                 │ codec (JSON / gzip)
//!                                 ▼
//!                           RecordArchive
//! ```
//!
//! # Key Components
//!
//! - [`SpeedrunRecord`]: collection stamps and timer state machine
//! - [`CoopRecordManager`]: shared coop records
//! - [`DifficultyRegistry`]: start-of-run item policies
//! - [`codec`]: persisted JSON, legacy upgrade, save-data blobs
//! - [`RecordArchive`]: archived records on disk or in memory

pub mod codec;
pub mod config;
pub mod coop;
pub mod difficulty;
pub mod record;
pub mod slot;
pub mod snapshot;
pub mod stamp;
pub mod storage;
pub mod trust;
pub mod types;

// Re-export main types
pub use codec::CoopReference;
pub use config::{DifficultyRule, PermissionLevels, SpeedrunConfig};
pub use coop::{CoopRecord, CoopRecordManager, ShortLookup};
pub use difficulty::{
    empty_difficulty_id, BuiltinDifficulty, Difficulty, DifficultyRegistry, GrantContext, GrantLevel,
};
pub use record::{CollectOutcome, RecordState, SpeedrunRecord};
pub use slot::{ActiveRecord, PlayerRecords, SaveData};
pub use snapshot::{format_ticks, RecordSnapshot};
pub use storage::{FileArchive, MemoryArchive, RecordArchive};
pub use trust::{link_mates, MateLinks};
pub use types::*;
