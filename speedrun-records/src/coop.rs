//! Coop records: one speedrun record shared by a party.
//!
//! Progress and timing live only in the wrapped [`SpeedrunRecord`]; the coop
//! layer adds the operator and player rosters. Coop records are owned by the
//! [`CoopRecordManager`] and players refer to them by id.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

use speedrun_goals::{Evidence, ResourceId};

use crate::codec;
use crate::difficulty::DifficultyRegistry;
use crate::record::{CollectOutcome, SpeedrunRecord};
use crate::storage::parse_record_file_name;
use crate::types::{is_short_id, short_id, PlayerId, RecordId, Result, Tick};

/// A record shared by a party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoopRecord {
    record: SpeedrunRecord,
    operators: BTreeSet<PlayerId>,
    players: BTreeSet<PlayerId>,
}

impl CoopRecord {
    /// Wrap a record with an initial operator roster and no players.
    pub fn new(record: SpeedrunRecord, operators: impl IntoIterator<Item = PlayerId>) -> Self {
        Self {
            record,
            operators: operators.into_iter().collect(),
            players: BTreeSet::new(),
        }
    }

    pub(crate) fn from_parts(
        record: SpeedrunRecord,
        operators: BTreeSet<PlayerId>,
        players: BTreeSet<PlayerId>,
    ) -> Self {
        Self {
            record,
            operators,
            players,
        }
    }

    /// The wrapped record.
    pub fn record(&self) -> &SpeedrunRecord {
        &self.record
    }

    /// Unwrap the record.
    pub fn into_record(self) -> SpeedrunRecord {
        self.record
    }

    /// Record identity.
    pub fn record_id(&self) -> RecordId {
        self.record.record_id()
    }

    /// Goal identity.
    pub fn goal_id(&self) -> &ResourceId {
        self.record.goal_id()
    }

    /// Operators.
    pub fn operators(&self) -> &BTreeSet<PlayerId> {
        &self.operators
    }

    /// Joined players.
    pub fn players(&self) -> &BTreeSet<PlayerId> {
        &self.players
    }

    /// Whether the player administers this record.
    pub fn is_operator(&self, player: &PlayerId) -> bool {
        self.operators.contains(player)
    }

    /// Grant operator rights.
    pub fn add_operator(&mut self, player: PlayerId) {
        self.operators.insert(player);
    }

    /// Add a player, running the record's start hook.
    pub fn join(&mut self, player: PlayerId, now: Tick) -> bool {
        self.record.on_start(now);
        let joined = self.players.insert(player);
        debug!(record_id = %self.record_id(), player = %player, joined, "Coop join");
        joined
    }

    /// Remove a player.
    pub fn leave(&mut self, player: &PlayerId) -> bool {
        self.players.remove(player)
    }

    /// Remove every player.
    pub fn clear_players(&mut self) {
        self.players.clear();
    }

    /// Players other than `player`.
    pub fn mates_of(&self, player: &PlayerId) -> Vec<PlayerId> {
        self.players.iter().filter(|p| *p != player).copied().collect()
    }

    /// Whether `player` may stop the run for everyone.
    pub fn may_stop(&self, player: &PlayerId, privileged: bool) -> bool {
        privileged || self.is_operator(player)
    }

    /// Whether `viewer` may view the record.
    pub fn trusts(&self, viewer: Option<PlayerId>) -> bool {
        viewer.is_some_and(|v| self.players.contains(&v) || self.operators.contains(&v))
    }

    /// Delegates to [`SpeedrunRecord::on_event`].
    pub fn on_event(&mut self, evidence: &Evidence, now: Tick) -> CollectOutcome {
        self.record.on_event(evidence, now)
    }

    /// Delegates to [`SpeedrunRecord::mark_vacant`].
    pub fn mark_vacant(&mut self, now: Tick) -> bool {
        self.record.mark_vacant(now)
    }

    /// Delegates to [`SpeedrunRecord::resume`].
    pub fn resume(&mut self, now: Tick) -> bool {
        self.record.resume(now)
    }

    /// Delegates to [`SpeedrunRecord::elapsed`].
    pub fn elapsed(&self, now: Tick) -> Tick {
        self.record.elapsed(now)
    }

    /// Delegates to [`SpeedrunRecord::is_finished`].
    pub fn is_finished(&self) -> bool {
        self.record.is_finished()
    }
}

/// Outcome of a short-id lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortLookup {
    /// Exactly one record matched
    Found(RecordId),
    /// No record matched
    Absent,
    /// More than one record matched
    Ambiguous,
    /// Not a short id
    Invalid,
}

/// In-memory home of every coop record.
#[derive(Debug, Default)]
pub struct CoopRecordManager {
    records: DashMap<RecordId, CoopRecord>,
}

impl CoopRecordManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a coop record.
    pub fn insert(&self, coop: CoopRecord) {
        info!(record_id = %coop.record_id(), goal = %coop.goal_id(), "Coop record registered");
        self.records.insert(coop.record_id(), coop);
    }

    /// Copy of a coop record.
    pub fn get(&self, id: &RecordId) -> Option<CoopRecord> {
        self.records.get(id).map(|c| c.value().clone())
    }

    /// Run `f` on a coop record in place.
    pub fn with_mut<R>(&self, id: &RecordId, f: impl FnOnce(&mut CoopRecord) -> R) -> Option<R> {
        self.records.get_mut(id).map(|mut c| f(c.value_mut()))
    }

    /// Drop a coop record.
    pub fn remove(&self, id: &RecordId) -> Option<CoopRecord> {
        self.records.remove(id).map(|(_, c)| c)
    }

    /// Whether a coop record exists.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// Identities of every coop record.
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|c| *c.key()).collect()
    }

    /// Number of coop records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no coop records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolve a `#ABCD` short id.
    pub fn find_short(&self, raw: &str) -> ShortLookup {
        if !is_short_id(raw) {
            return ShortLookup::Invalid;
        }
        let wanted = raw.to_uppercase();
        let mut matches = self
            .records
            .iter()
            .map(|c| *c.key())
            .filter(|id| short_id(id) == wanted);
        match (matches.next(), matches.next()) {
            (None, _) => ShortLookup::Absent,
            (Some(id), None) => ShortLookup::Found(id),
            (Some(_), Some(_)) => ShortLookup::Ambiguous,
        }
    }

    /// Load every `<uuid>.json` in `dir`. Rosters are cleared on load.
    ///
    /// A file with any other name is an error.
    pub async fn load_dir(&self, dir: &Path, difficulties: &DifficultyRegistry) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = parse_record_file_name(&name)?;
            let text = tokio::fs::read_to_string(entry.path()).await?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let mut coop = codec::coop_from_json(&value, false, difficulties)?;
            if coop.record_id() != id {
                warn!(file = %name, record_id = %coop.record_id(), "Coop file name differs from record id");
            }
            coop.clear_players();
            self.records.insert(coop.record_id(), coop);
            loaded += 1;
        }
        info!(dir = %dir.display(), loaded, "Coop records loaded");
        Ok(loaded)
    }

    /// Write every coop record to `dir`, then forget them.
    pub async fn save_dir(&self, dir: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(dir).await?;

        let snapshot: Vec<CoopRecord> = self.records.iter().map(|c| c.value().clone()).collect();
        for coop in &snapshot {
            let value = codec::coop_to_json(coop)?;
            let path = dir.join(format!("{}.json", coop.record_id()));
            tokio::fs::write(&path, serde_json::to_vec_pretty(&value)?).await?;
        }
        self.records.clear();
        info!(dir = %dir.display(), saved = snapshot.len(), "Coop records saved");
        Ok(snapshot.len())
    }
}
