//! Persistence codec: record JSON, the legacy schema, coop wrappers and
//! gzip save-data blobs.
//!
//! Current schema:
//!
//! ```text
//! { goal_id, record_id, collected: [tick | -1], start_time, finish_time,
//!   predicates: [ {predicate_type, ...} ], last_quit_time, vacant_time,
//!   difficulty, pvp_mates_v2: { player: record } }
//! ```
//!
//! Records written before predicates existed carry `displayed_stacks` and
//! `requirements` instead; they are upgraded on read and never written back.

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Write;
use tracing::warn;

use speedrun_goals::{ItemMatcher, ItemStack, Predicate, ResourceId};

use crate::coop::CoopRecord;
use crate::difficulty::{empty_difficulty_id, DifficultyRegistry};
use crate::record::SpeedrunRecord;
use crate::trust::MateLinks;
use crate::types::{PlayerId, RecordError, RecordId, Result, Tick, UNSET};

/// Metadata key holding a legacy string-encoded nbt compound.
///
/// Legacy `nbt` constraints and `nbt_c` icon tags are kept verbatim under
/// this key, so an upgraded constraint only accepts stacks carrying the
/// same string.
pub const LEGACY_NBT: &str = "speedabc:legacy_nbt";

fn unset() -> Tick {
    UNSET
}

/// On-disk shape of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RecordDocument {
    pub goal_id: ResourceId,
    pub record_id: RecordId,
    #[serde(default)]
    pub collected: Vec<Tick>,
    pub start_time: Tick,
    #[serde(default = "unset")]
    pub finish_time: Tick,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicates: Option<Vec<Value>>,
    #[serde(default = "unset")]
    pub last_quit_time: Tick,
    #[serde(default)]
    pub vacant_time: Tick,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub pvp_mates_v2: MateLinks,
    #[serde(default, skip_serializing)]
    pub displayed_stacks: Option<Vec<Value>>,
    #[serde(default, skip_serializing)]
    pub requirements: Option<Vec<Value>>,
}

impl RecordDocument {
    /// Parse the document shape without decoding predicates.
    pub fn parse(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Predicate count, for either schema.
    pub fn required(&self) -> usize {
        match (&self.predicates, &self.displayed_stacks, &self.requirements) {
            (Some(list), _, _) => list.len(),
            (None, Some(stacks), Some(reqs)) => stacks.len().min(reqs.len()),
            _ => 0,
        }
    }
}

/// Compact reference to a coop record, embedded where the full record
/// lives elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoopReference {
    /// Always `true`
    pub is_coop: bool,
    /// Coop record identity
    pub coop_uuid: RecordId,
}

impl CoopReference {
    /// Reference to a coop record.
    pub fn new(coop_uuid: RecordId) -> Self {
        Self {
            is_coop: true,
            coop_uuid,
        }
    }

    /// Read a reference, if `value` is one.
    pub fn from_json(value: &Value) -> Option<Self> {
        if value.get("is_coop").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        Self::deserialize(value).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CoopDocument {
    #[serde(default)]
    operators: BTreeSet<PlayerId>,
    #[serde(default, alias = "players")]
    player: BTreeSet<PlayerId>,
    record: Value,
}

// ============================================================================
// Records
// ============================================================================

/// Encode a record as JSON.
pub fn record_to_json(record: &SpeedrunRecord) -> Result<Value> {
    let predicates = record
        .predicates()
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let document = RecordDocument {
        goal_id: record.goal_id.clone(),
        record_id: record.record_id,
        collected: record.collected.iter().map(|t| t.unwrap_or(UNSET)).collect(),
        start_time: record.start_time,
        finish_time: record.finish_time.unwrap_or(UNSET),
        predicates: Some(predicates),
        last_quit_time: record.last_quit_time.unwrap_or(UNSET),
        vacant_time: record.vacant_time,
        difficulty: Some(record.difficulty.to_string()),
        pvp_mates_v2: record.mates.clone(),
        displayed_stacks: None,
        requirements: None,
    };
    Ok(serde_json::to_value(document)?)
}

/// Decode a record from JSON, upgrading the legacy schema if needed.
///
/// With `reset_uuid` set, the record gets a fresh identity.
pub fn record_from_json(
    value: &Value,
    reset_uuid: bool,
    difficulties: &DifficultyRegistry,
) -> Result<SpeedrunRecord> {
    let document = RecordDocument::parse(value)?;

    let predicates = match (&document.predicates, &document.displayed_stacks, &document.requirements) {
        (Some(list), _, _) => list.iter().map(decode_predicate).collect::<Result<Vec<_>>>()?,
        (None, Some(stacks), Some(reqs)) => {
            warn!(record_id = %document.record_id, "Upgrading legacy record schema");
            stacks
                .iter()
                .zip(reqs.iter())
                .map(|(stack, req)| decode_legacy_predicate(stack, req))
                .collect::<Result<Vec<_>>>()?
        }
        _ => {
            return Err(RecordError::InvalidRecord(format!(
                "record {} has no predicates",
                document.record_id
            )))
        }
    };

    let mut collected: Vec<Option<Tick>> = document
        .collected
        .iter()
        .map(|t| (*t >= 0).then_some(*t))
        .collect();
    if collected.len() != predicates.len() {
        warn!(
            record_id = %document.record_id,
            collected = collected.len(),
            predicates = predicates.len(),
            "Collected list length mismatch; padding or truncating"
        );
        collected.resize(predicates.len(), None);
    }

    let mut finish_time = (document.finish_time >= 0).then_some(document.finish_time);
    if finish_time.is_some() && collected.iter().any(Option::is_none) {
        warn!(record_id = %document.record_id, "Finished record has uncollected entries; clearing finish time");
        finish_time = None;
    }

    let difficulty = document
        .difficulty
        .as_deref()
        .and_then(|raw| ResourceId::parse(raw).ok())
        .map(|id| difficulties.resolve_id(&id))
        .unwrap_or_else(empty_difficulty_id);

    let mut record = SpeedrunRecord {
        goal_id: document.goal_id,
        record_id: document.record_id,
        predicates: predicates.into(),
        collected,
        start_time: document.start_time,
        finish_time,
        last_quit_time: (document.last_quit_time >= 0).then_some(document.last_quit_time),
        vacant_time: document.vacant_time.max(0),
        difficulty,
        mates: document.pvp_mates_v2,
    };
    if reset_uuid {
        record.renew_id();
    }
    Ok(record)
}

fn decode_predicate(value: &Value) -> Result<Predicate> {
    match value.get("predicate_type").and_then(Value::as_str) {
        Some("item") | Some("advancement") => Ok(Predicate::deserialize(value)?),
        Some(other) => Err(RecordError::UnknownPredicateType(other.to_string())),
        None => Err(RecordError::UnknownPredicateType("<missing>".to_string())),
    }
}

fn decode_legacy_predicate(stack: &Value, requirement: &Value) -> Result<Predicate> {
    let mut icon = ItemStack::deserialize(stack)?;
    if let Some(snbt) = stack.get("nbt_c").and_then(Value::as_str).filter(|s| !is_empty_snbt(s)) {
        icon.metadata.set_string(LEGACY_NBT, snbt);
    }

    let mut requirement = requirement.clone();
    if let Some(obj) = requirement.as_object_mut() {
        if let Some(single) = obj.remove("item") {
            let items = obj
                .entry("items")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(items) = items.as_array_mut() {
                items.push(single);
            }
        }
        if let Some(snbt) = obj.get("nbt").and_then(Value::as_str).map(str::to_owned) {
            if is_empty_snbt(&snbt) {
                obj.remove("nbt");
            } else {
                let nbt = [(LEGACY_NBT.to_string(), Value::String(snbt))].into_iter().collect();
                obj.insert("nbt".to_string(), Value::Object(nbt));
            }
        }
    }
    let matcher = ItemMatcher::deserialize(&requirement)?;
    Ok(Predicate::item(matcher, icon))
}

fn is_empty_snbt(raw: &str) -> bool {
    matches!(raw.trim(), "" | "{}")
}

// ============================================================================
// Coop records
// ============================================================================

/// Encode a coop record as `{operators, player, record}`.
pub fn coop_to_json(coop: &CoopRecord) -> Result<Value> {
    let document = CoopDocument {
        operators: coop.operators().clone(),
        player: coop.players().clone(),
        record: record_to_json(coop.record())?,
    };
    Ok(serde_json::to_value(document)?)
}

/// Decode a coop record. `players` is accepted in place of `player`.
pub fn coop_from_json(
    value: &Value,
    reset_uuid: bool,
    difficulties: &DifficultyRegistry,
) -> Result<CoopRecord> {
    let document = CoopDocument::deserialize(value)?;
    let record = record_from_json(&document.record, reset_uuid, difficulties)?;
    Ok(CoopRecord::from_parts(record, document.operators, document.player))
}

// ============================================================================
// Blobs
// ============================================================================

/// Gzip a JSON value.
pub fn encode_blob(value: &Value) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serde_json::to_vec(value)?)?;
    Ok(encoder.finish()?)
}

/// Gunzip a JSON value.
pub fn decode_blob(bytes: &[u8]) -> Result<Value> {
    let decoder = GzDecoder::new(bytes);
    Ok(serde_json::from_reader(decoder)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{goal, pickup};
    use serde_json::json;
    use speedrun_goals::Evidence;
    use uuid::Uuid;

    fn registry() -> DifficultyRegistry {
        DifficultyRegistry::new()
    }

    fn sample_record() -> SpeedrunRecord {
        let mut record = SpeedrunRecord::new(
            &goal(&["stone", "dirt", "sand"]),
            ResourceId::new("speedabc", "elytra"),
            40,
        );
        record.on_event(&pickup("dirt"), 120);
        record.mark_vacant(200);
        record.resume(260);
        record.add_trust(Uuid::new_v4());
        record.mates_mut().link(Uuid::new_v4(), Uuid::new_v4());
        record
    }

    #[test]
    fn test_round_trip_preserves_record() {
        let record = sample_record();
        let json = record_to_json(&record).unwrap();
        assert_eq!(json["collected"], json!([-1, 120, -1]));
        assert_eq!(json["finish_time"], json!(-1));
        assert_eq!(json["difficulty"], json!("speedabc:elytra"));

        let back = record_from_json(&json, false, &registry()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_reset_uuid() {
        let record = sample_record();
        let json = record_to_json(&record).unwrap();
        let back = record_from_json(&json, true, &registry()).unwrap();
        assert_ne!(back.record_id(), record.record_id());
        assert_eq!(back.predicates(), record.predicates());
    }

    #[test]
    fn test_unknown_difficulty_falls_back() {
        let mut json = record_to_json(&sample_record()).unwrap();
        json["difficulty"] = json!("somemod:hardcore");
        let back = record_from_json(&json, false, &registry()).unwrap();
        assert_eq!(back.difficulty(), &empty_difficulty_id());

        json.as_object_mut().unwrap().remove("difficulty");
        let back = record_from_json(&json, false, &registry()).unwrap();
        assert_eq!(back.difficulty(), &empty_difficulty_id());
    }

    #[test]
    fn test_unknown_predicate_type() {
        let mut json = record_to_json(&sample_record()).unwrap();
        json["predicates"][0]["predicate_type"] = json!("biome");
        let err = record_from_json(&json, false, &registry()).unwrap_err();
        assert!(matches!(err, RecordError::UnknownPredicateType(ref t) if t == "biome"));
    }

    #[test]
    fn test_legacy_schema_matches_modern() {
        let record_id = Uuid::new_v4();
        let modern = json!({
            "goal_id": "speedabc:test",
            "record_id": record_id,
            "collected": [100, -1],
            "start_time": 0,
            "predicates": [
                {"predicate_type": "item", "item_predicate": {"items": ["minecraft:stone"]}, "icon": {"item": "minecraft:stone", "Count": 1}},
                {"predicate_type": "item", "item_predicate": {"items": ["minecraft:dirt"], "nbt": {"speedabc:legacy_nbt": "{Damage:0}"}}, "icon": {"item": "minecraft:dirt", "Count": 1}}
            ],
            "difficulty": "speedabc:empty"
        });
        let legacy = json!({
            "goal_id": "speedabc:test",
            "record_id": record_id,
            "collected": [100],
            "start_time": 0,
            "displayed_stacks": [
                {"item": "minecraft:stone", "Count": 1, "nbt_c": "{}"},
                {"item": "minecraft:dirt", "Count": 1},
                {"item": "minecraft:sand", "Count": 1}
            ],
            "requirements": [
                {"items": ["minecraft:stone"]},
                {"item": "minecraft:dirt", "nbt": "{Damage:0}"}
            ]
        });

        let a = record_from_json(&modern, false, &registry()).unwrap();
        let b = record_from_json(&legacy, false, &registry()).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.collected_times().collect::<Vec<_>>(), vec![Some(100), None]);
        assert_eq!(b.finish_time(), None);
        assert_eq!(b.vacant_time(), 0);
    }

    #[test]
    fn test_legacy_collected_truncated() {
        let legacy = json!({
            "goal_id": "speedabc:test",
            "record_id": Uuid::new_v4(),
            "collected": [1, 2, 3, 4],
            "start_time": 0,
            "displayed_stacks": [{"item": "minecraft:stone"}],
            "requirements": [{"items": ["minecraft:stone"]}]
        });
        let record = record_from_json(&legacy, false, &registry()).unwrap();
        assert_eq!(record.collected_times().collect::<Vec<_>>(), vec![Some(1)]);
    }

    #[test]
    fn test_legacy_nbt_is_matched_verbatim() {
        let legacy = json!({
            "goal_id": "speedabc:test",
            "record_id": Uuid::new_v4(),
            "collected": [-1],
            "start_time": 0,
            "displayed_stacks": [{"item": "minecraft:potion", "nbt_c": "{Potion:\"minecraft:healing\"}"}],
            "requirements": [{"item": "minecraft:potion", "nbt": "{Potion:\"minecraft:healing\"}"}]
        });
        let mut record = record_from_json(&legacy, false, &registry()).unwrap();
        let predicate = &record.predicates()[0];
        assert_eq!(predicate.icon().metadata.string(LEGACY_NBT), Some("{Potion:\"minecraft:healing\"}"));

        assert!(record.on_event(&pickup("potion"), 10).is_empty());

        let mut stack = ItemStack::of(ResourceId::minecraft("potion"));
        stack.metadata.set_string(LEGACY_NBT, "{Potion:\"minecraft:healing\"}");
        let outcome = record.on_event(&Evidence::Item { stack, tags: Vec::new() }, 20);
        assert!(outcome.finished);

        let json = record_to_json(&record).unwrap();
        let back = record_from_json(&json, false, &registry()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_legacy_empty_nbt_is_no_constraint() {
        let legacy = json!({
            "goal_id": "speedabc:test",
            "record_id": Uuid::new_v4(),
            "collected": [-1],
            "start_time": 0,
            "displayed_stacks": [{"item": "minecraft:stone", "nbt_c": "{}"}],
            "requirements": [{"item": "minecraft:stone", "nbt": "{}"}]
        });
        let mut record = record_from_json(&legacy, false, &registry()).unwrap();
        assert!(record.predicates()[0].icon().metadata.is_empty());
        assert!(record.on_event(&pickup("stone"), 10).finished);
    }

    #[test]
    fn test_padded_legacy_record_is_not_finished() {
        let legacy = json!({
            "goal_id": "speedabc:test",
            "record_id": Uuid::new_v4(),
            "collected": [100],
            "start_time": 0,
            "finish_time": 300,
            "displayed_stacks": [{"item": "minecraft:stone"}, {"item": "minecraft:dirt"}],
            "requirements": [{"items": ["minecraft:stone"]}, {"items": ["minecraft:dirt"]}]
        });
        let mut record = record_from_json(&legacy, false, &registry()).unwrap();
        assert_eq!(record.finish_time(), None);
        assert!(!record.is_finished());
        assert!(record.on_event(&pickup("dirt"), 400).finished);
        assert_eq!(record.finish_time(), Some(400));
    }

    #[test]
    fn test_truncated_legacy_record_stays_finished() {
        let legacy = json!({
            "goal_id": "speedabc:test",
            "record_id": Uuid::new_v4(),
            "collected": [10, 20, 30],
            "start_time": 0,
            "finish_time": 30,
            "displayed_stacks": [{"item": "minecraft:stone"}],
            "requirements": [{"items": ["minecraft:stone"]}]
        });
        let record = record_from_json(&legacy, false, &registry()).unwrap();
        assert_eq!(record.finish_time(), Some(30));
        assert!(record.is_finished());
    }

    #[test]
    fn test_finished_with_uncollected_entry_is_reopened() {
        let mut json = record_to_json(&sample_record()).unwrap();
        json["finish_time"] = json!(500);
        let record = record_from_json(&json, false, &registry()).unwrap();
        assert_eq!(record.finish_time(), None);
        assert!(!record.is_finished());
        assert_eq!(record.collected_count(), 1);
    }

    #[test]
    fn test_missing_predicates_is_invalid() {
        let json = json!({"goal_id": "speedabc:test", "record_id": Uuid::new_v4(), "start_time": 0});
        assert!(matches!(
            record_from_json(&json, false, &registry()).unwrap_err(),
            RecordError::InvalidRecord(_)
        ));
    }

    #[test]
    fn test_coop_reads_players_alias() {
        let record = sample_record();
        let op = Uuid::new_v4();
        let member = Uuid::new_v4();
        let json = json!({
            "operators": [op],
            "players": [member],
            "record": record_to_json(&record).unwrap()
        });
        let coop = coop_from_json(&json, false, &registry()).unwrap();
        assert!(coop.is_operator(&op));
        assert!(coop.players().contains(&member));

        let written = coop_to_json(&coop).unwrap();
        assert!(written.get("player").is_some());
        assert!(written.get("players").is_none());
    }

    #[test]
    fn test_coop_reference() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(CoopReference::new(id)).unwrap();
        assert_eq!(json, json!({"is_coop": true, "coop_uuid": id}));
        assert_eq!(CoopReference::from_json(&json), Some(CoopReference::new(id)));
        assert_eq!(CoopReference::from_json(&json!({"goal_id": "x"})), None);
    }

    #[test]
    fn test_blob_round_trip() {
        let json = record_to_json(&sample_record()).unwrap();
        let blob = encode_blob(&json).unwrap();
        assert_eq!(&blob[..2], &[0x1f, 0x8b]);
        assert_eq!(decode_blob(&blob).unwrap(), json);
        assert!(decode_blob(b"not gzip").is_err());
    }
}
