//! Mate links between independently running records.
//!
//! A record's mate map says which viewers may look at it: a viewer mapped
//! to the wildcard is always trusted, a viewer mapped to a record id is
//! trusted only while that is the record they are currently running.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::record::SpeedrunRecord;
use crate::types::{PlayerId, RecordId, WILDCARD_MATE};

/// Viewer to viewer's-record map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MateLinks(BTreeMap<PlayerId, RecordId>);

impl MateLinks {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust a viewer unconditionally.
    pub fn add_wildcard(&mut self, viewer: PlayerId) {
        self.0.insert(viewer, WILDCARD_MATE);
    }

    /// Trust a viewer while they run `record`.
    pub fn link(&mut self, viewer: PlayerId, record: RecordId) {
        self.0.insert(viewer, record);
    }

    /// Remove a viewer.
    pub fn unlink(&mut self, viewer: &PlayerId) -> Option<RecordId> {
        self.0.remove(viewer)
    }

    /// Check trust against the viewer's live record.
    pub fn trusts(&self, viewer: Option<PlayerId>, viewer_record: Option<RecordId>) -> bool {
        let Some(viewer) = viewer else {
            return false;
        };
        let trusted = match self.0.get(&viewer) {
            None => false,
            Some(mapped) if *mapped == WILDCARD_MATE => true,
            Some(mapped) => viewer_record == Some(*mapped),
        };
        debug!(viewer = %viewer, trusted, "Mate trust check");
        trusted
    }

    /// Viewers currently listed.
    pub fn players(&self) -> impl Iterator<Item = &PlayerId> {
        self.0.keys()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Link two records so each owner trusts the other while both keep them.
pub fn link_mates(
    a_owner: PlayerId,
    a: &mut SpeedrunRecord,
    b_owner: PlayerId,
    b: &mut SpeedrunRecord,
) {
    a.mates_mut().link(b_owner, b.record_id());
    b.mates_mut().link(a_owner, a.record_id());
}
