//! Record summaries for listings and messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use speedrun_goals::ResourceId;

use crate::codec::RecordDocument;
use crate::difficulty::empty_difficulty_id;
use crate::record::SpeedrunRecord;
use crate::types::{short_id, PlayType, RecordId, Result, Tick, TICKS_PER_SECOND};

/// Point-in-time summary of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// Elapsed ticks, negative if unknown
    pub duration: Tick,
    /// Collected predicates
    pub collected: usize,
    /// Total predicates
    pub required: usize,
    /// Goal identifier
    pub goal_id: ResourceId,
    /// Difficulty identifier
    pub difficulty: ResourceId,
    /// Record identifier
    pub record_id: RecordId,
    /// How the record is played
    pub play_type: PlayType,
    /// Whether the record is finished
    pub finished: bool,
}

impl RecordSnapshot {
    /// Summarise a live record.
    pub fn of(record: &SpeedrunRecord, now: Tick, play_type: PlayType) -> Self {
        Self {
            duration: record.elapsed(now),
            collected: record.collected_count(),
            required: record.required(),
            goal_id: record.goal_id().clone(),
            difficulty: record.difficulty().clone(),
            record_id: record.record_id(),
            play_type,
            finished: record.is_finished(),
        }
    }

    /// Summarise archived JSON without decoding its predicates.
    ///
    /// A coop wrapper is unwrapped. A record archived while running has
    /// no meaningful duration and reports `-1`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let (inner, play_type) = match value.get("record") {
            Some(inner) => (inner, PlayType::Coop),
            None => (value, PlayType::Pvp),
        };
        let document = RecordDocument::parse(inner)?;
        let required = document.required();
        let finished = document.finish_time >= 0;
        let collected = if finished {
            required
        } else {
            document.collected.iter().take(required).filter(|t| **t >= 0).count()
        };
        let frozen_at = if finished {
            document.finish_time
        } else {
            document.last_quit_time
        };
        let duration = if frozen_at >= 0 {
            frozen_at - document.start_time - document.vacant_time.max(0)
        } else {
            -1
        };
        let difficulty = document
            .difficulty
            .as_deref()
            .and_then(|raw| ResourceId::parse(raw).ok())
            .unwrap_or_else(empty_difficulty_id);

        Ok(Self {
            duration,
            collected,
            required,
            goal_id: document.goal_id,
            difficulty,
            record_id: document.record_id,
            play_type,
            finished,
        })
    }

    /// `#ABCD` short form of the record id.
    pub fn short_id(&self) -> String {
        short_id(&self.record_id)
    }
}

impl fmt::Display for RecordSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}/{}] {} ({}, {})",
            self.goal_id,
            self.short_id(),
            self.collected,
            self.required,
            format_ticks(self.duration),
            self.difficulty,
            self.play_type.as_str()
        )
    }
}

/// Render ticks as `s`, `m:ss` or `h:mm:ss`; negative values are unknown.
pub fn format_ticks(ticks: Tick) -> String {
    if ticks < 0 {
        return "--:--".to_string();
    }
    let total = ticks / TICKS_PER_SECOND;
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else if m > 0 {
        format!("{m}:{s:02}")
    } else {
        format!("{s}")
    }
}
