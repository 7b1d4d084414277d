//! Per-player record slot: the live record and one history record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::{self, CoopReference};
use crate::coop::CoopRecordManager;
use crate::difficulty::DifficultyRegistry;
use crate::record::SpeedrunRecord;
use crate::types::{PlayType, RecordId, Result};

/// What a player is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveRecord {
    /// A record owned by the player
    Solo(SpeedrunRecord),
    /// A coop record held by the coop manager
    Coop(RecordId),
}

impl ActiveRecord {
    /// Identity of the live record.
    pub fn record_id(&self) -> RecordId {
        match self {
            ActiveRecord::Solo(record) => record.record_id(),
            ActiveRecord::Coop(id) => *id,
        }
    }

    /// How the record is played.
    pub fn play_type(&self) -> PlayType {
        match self {
            ActiveRecord::Solo(_) => PlayType::Pvp,
            ActiveRecord::Coop(_) => PlayType::Coop,
        }
    }

    /// The record, if it is solo.
    pub fn as_solo(&self) -> Option<&SpeedrunRecord> {
        match self {
            ActiveRecord::Solo(record) => Some(record),
            ActiveRecord::Coop(_) => None,
        }
    }

    /// The record, if it is solo.
    pub fn as_solo_mut(&mut self) -> Option<&mut SpeedrunRecord> {
        match self {
            ActiveRecord::Solo(record) => Some(record),
            ActiveRecord::Coop(_) => None,
        }
    }
}

/// One player's records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerRecords {
    current: Option<ActiveRecord>,
    history: Option<SpeedrunRecord>,
}

impl PlayerRecords {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live record.
    pub fn current(&self) -> Option<&ActiveRecord> {
        self.current.as_ref()
    }

    /// Live record, mutably.
    pub fn current_mut(&mut self) -> Option<&mut ActiveRecord> {
        self.current.as_mut()
    }

    /// Identity of the live record.
    pub fn live_record_id(&self) -> Option<RecordId> {
        self.current.as_ref().map(ActiveRecord::record_id)
    }

    /// Whether the player is running anything.
    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Install a live record, returning the one it replaces.
    pub fn set_current(&mut self, active: ActiveRecord) -> Option<ActiveRecord> {
        self.current.replace(active)
    }

    /// Remove the live record.
    pub fn take_current(&mut self) -> Option<ActiveRecord> {
        self.current.take()
    }

    /// History record.
    pub fn history(&self) -> Option<&SpeedrunRecord> {
        self.history.as_ref()
    }

    /// Overwrite the history record.
    pub fn set_history(&mut self, record: SpeedrunRecord) -> Option<SpeedrunRecord> {
        if let Some(old) = &self.history {
            debug!(dropped = %old.record_id(), kept = %record.record_id(), "History overwritten");
        }
        self.history.replace(record)
    }

    /// Remove the history record.
    pub fn take_history(&mut self) -> Option<SpeedrunRecord> {
        self.history.take()
    }

    /// Clear history only if it still holds `record`.
    pub fn clear_history_if(&mut self, record: RecordId) -> bool {
        if self.history.as_ref().map(SpeedrunRecord::record_id) == Some(record) {
            self.history = None;
            true
        } else {
            false
        }
    }

    /// Put the live record away.
    ///
    /// A solo record moves to history; a coop reference is just dropped.
    /// Returns the id of the record that was live.
    pub fn retire_current(&mut self) -> Option<RecordId> {
        match self.current.take()? {
            ActiveRecord::Solo(record) => {
                let id = record.record_id();
                self.set_history(record);
                Some(id)
            }
            ActiveRecord::Coop(id) => Some(id),
        }
    }

    /// Encode both slots as gzip blobs.
    pub fn export(&self) -> Result<SaveData> {
        let current = match &self.current {
            None => None,
            Some(ActiveRecord::Solo(record)) => Some(codec::encode_blob(&codec::record_to_json(record)?)?),
            Some(ActiveRecord::Coop(id)) => {
                Some(codec::encode_blob(&serde_json::to_value(CoopReference::new(*id))?)?)
            }
        };
        let history = self
            .history
            .as_ref()
            .map(|record| codec::encode_blob(&codec::record_to_json(record)?))
            .transpose()?;
        Ok(SaveData { current, history })
    }

    /// Decode both slots.
    ///
    /// A coop reference to a record the manager does not hold is dropped.
    pub fn import(
        save: &SaveData,
        coops: &CoopRecordManager,
        difficulties: &DifficultyRegistry,
    ) -> Result<Self> {
        let current = match &save.current {
            None => None,
            Some(bytes) => {
                let value: Value = codec::decode_blob(bytes)?;
                match CoopReference::from_json(&value) {
                    Some(reference) if coops.contains(&reference.coop_uuid) => {
                        Some(ActiveRecord::Coop(reference.coop_uuid))
                    }
                    Some(reference) => {
                        warn!(coop_uuid = %reference.coop_uuid, "Dropping reference to unknown coop record");
                        None
                    }
                    None => Some(ActiveRecord::Solo(codec::record_from_json(&value, false, difficulties)?)),
                }
            }
        };
        let history = save
            .history
            .as_deref()
            .map(|bytes| codec::record_from_json(&codec::decode_blob(bytes)?, false, difficulties))
            .transpose()?;
        Ok(Self { current, history })
    }
}

/// Per-player save data as gzip-compressed JSON blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveData {
    /// Live record, or a coop reference
    pub current: Option<Vec<u8>>,
    /// History record
    pub history: Option<Vec<u8>>,
}
