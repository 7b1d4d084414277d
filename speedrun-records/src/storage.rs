//! Record archive.
//!
//! Archived records are JSON files laid out as
//! `<root>/speedrun-records/item/<player-uuid>/<record-uuid>.json`.
//! The [`RecordArchive`] trait keeps callers independent of where the
//! files actually live.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec;
use crate::difficulty::DifficultyRegistry;
use crate::record::SpeedrunRecord;
use crate::snapshot::RecordSnapshot;
use crate::types::{PlayerId, RecordError, RecordId, Result};

/// Top-level directory under the world root.
pub const RECORDS_DIR: &str = "speedrun-records";

/// Directory of per-player item records.
pub const ITEM_DIR: &str = "item";

/// Directory of coop records.
pub const COOP_DIR: &str = "coop";

/// Parse `<uuid>.json` into a record id.
pub fn parse_record_file_name(name: &str) -> Result<RecordId> {
    name.strip_suffix(".json")
        .filter(|stem| stem.len() == 36)
        .and_then(|stem| Uuid::try_parse(stem).ok())
        .ok_or_else(|| RecordError::InvalidFileName(name.to_string()))
}

/// Storage for archived records.
#[async_trait]
pub trait RecordArchive: Send + Sync {
    /// Store a record document.
    async fn write(&self, player: PlayerId, record: RecordId, document: &Value) -> Result<()>;

    /// Read a record document.
    async fn read(&self, player: PlayerId, record: RecordId) -> Result<Value>;

    /// Remove a record document.
    async fn delete(&self, player: PlayerId, record: RecordId) -> Result<()>;

    /// Every record document of a player.
    async fn list(&self, player: PlayerId) -> Result<Vec<(RecordId, Value)>>;

    /// Archive a record.
    async fn archive_record(&self, player: PlayerId, record: &SpeedrunRecord) -> Result<()> {
        let document = codec::record_to_json(record)?;
        self.write(player, record.record_id(), &document).await
    }

    /// Read a record back with a fresh identity.
    async fn restore_record(
        &self,
        player: PlayerId,
        record: RecordId,
        difficulties: &DifficultyRegistry,
    ) -> Result<SpeedrunRecord> {
        let document = self.read(player, record).await?;
        codec::record_from_json(&document, true, difficulties)
    }

    /// Summaries of every archived record of a player, sorted by record id.
    async fn snapshots(&self, player: PlayerId) -> Result<Vec<RecordSnapshot>> {
        let mut snapshots: Vec<RecordSnapshot> = self
            .list(player)
            .await?
            .into_iter()
            .filter_map(|(id, document)| match RecordSnapshot::from_json(&document) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(player = %player, record_id = %id, error = %e, "Skipping unreadable record");
                    None
                }
            })
            .collect();
        snapshots.sort_by_key(|s| s.record_id);
        Ok(snapshots)
    }
}

/// Filesystem archive.
#[derive(Debug, Clone)]
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    /// Archive rooted at a world directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding a player's records.
    pub fn player_dir(&self, player: PlayerId) -> PathBuf {
        self.root
            .join(RECORDS_DIR)
            .join(ITEM_DIR)
            .join(player.to_string())
    }

    /// Path of one record.
    pub fn record_path(&self, player: PlayerId, record: RecordId) -> PathBuf {
        self.player_dir(player).join(format!("{record}.json"))
    }

    /// Directory holding coop records.
    pub fn coop_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR).join(COOP_DIR)
    }

    async fn read_path(path: &Path) -> Result<Value> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn not_found(e: std::io::Error, record: RecordId) -> RecordError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RecordError::NotFound(record.to_string())
    } else {
        RecordError::Io(e)
    }
}

#[async_trait]
impl RecordArchive for FileArchive {
    async fn write(&self, player: PlayerId, record: RecordId, document: &Value) -> Result<()> {
        let dir = self.player_dir(player);
        let path = self.record_path(player, record);
        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, serde_json::to_vec_pretty(document)?).await?;
            Ok::<(), RecordError>(())
        }
        .await;
        match &result {
            Ok(()) => info!(player = %player, record_id = %record, path = %path.display(), "Record archived"),
            Err(e) => error!(player = %player, record_id = %record, error = %e, "Failed to archive record"),
        }
        result
    }

    async fn read(&self, player: PlayerId, record: RecordId) -> Result<Value> {
        let path = self.record_path(player, record);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) => Err(not_found(e, record)),
        }
    }

    async fn delete(&self, player: PlayerId, record: RecordId) -> Result<()> {
        let path = self.record_path(player, record);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found(e, record))?;
        info!(player = %player, record_id = %record, "Archived record deleted");
        Ok(())
    }

    async fn list(&self, player: PlayerId) -> Result<Vec<(RecordId, Value)>> {
        let dir = self.player_dir(player);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_record_file_name(&name) {
                Ok(id) => candidates.push((id, entry.path())),
                Err(_) => debug!(file = %name, "Ignoring non-record file"),
            }
        }

        let reads = candidates.iter().map(|(_, path)| Self::read_path(path));
        let results = futures::future::join_all(reads).await;

        Ok(candidates
            .into_iter()
            .zip(results)
            .filter_map(|((id, path), result)| match result {
                Ok(document) => Some((id, document)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable archive file");
                    None
                }
            })
            .collect())
    }
}

/// In-memory archive.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    documents: DashMap<(PlayerId, RecordId), Value>,
}

impl MemoryArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl RecordArchive for MemoryArchive {
    async fn write(&self, player: PlayerId, record: RecordId, document: &Value) -> Result<()> {
        self.documents.insert((player, record), document.clone());
        Ok(())
    }

    async fn read(&self, player: PlayerId, record: RecordId) -> Result<Value> {
        self.documents
            .get(&(player, record))
            .map(|d| d.value().clone())
            .ok_or_else(|| RecordError::NotFound(record.to_string()))
    }

    async fn delete(&self, player: PlayerId, record: RecordId) -> Result<()> {
        self.documents
            .remove(&(player, record))
            .map(|_| ())
            .ok_or_else(|| RecordError::NotFound(record.to_string()))
    }

    async fn list(&self, player: PlayerId) -> Result<Vec<(RecordId, Value)>> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == player)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect())
    }
}
