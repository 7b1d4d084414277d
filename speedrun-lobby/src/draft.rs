//! Drafts: proposals for a group run, negotiated before anything starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use speedrun_goals::ResourceId;
use speedrun_records::difficulty::DIFFICULTY_NAMESPACE;
use speedrun_records::{PlayType, PlayerId};

/// Difficulty a new draft starts with: both axes unlimited.
pub fn default_difficulty() -> ResourceId {
    ResourceId::new(DIFFICULTY_NAMESPACE, "inf_elytra_inf_firework")
}

/// An unsaved proposal for a run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    session_id: Uuid,
    host: PlayerId,
    play_type: PlayType,
    goal: Option<ResourceId>,
    difficulty: ResourceId,
    players: Vec<PlayerId>,
    operators: Vec<PlayerId>,
    created_at: DateTime<Utc>,
}

impl Draft {
    /// Empty PvP draft with a fresh session.
    pub fn new(host: PlayerId) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            host,
            play_type: PlayType::Pvp,
            goal: None,
            difficulty: default_difficulty(),
            players: Vec::new(),
            operators: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn host(&self) -> PlayerId {
        self.host
    }

    pub fn play_type(&self) -> PlayType {
        self.play_type
    }

    pub fn goal(&self) -> Option<&ResourceId> {
        self.goal.as_ref()
    }

    pub fn difficulty(&self) -> &ResourceId {
        &self.difficulty
    }

    /// Players who accepted, in acceptance order.
    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn operators(&self) -> &[PlayerId] {
        &self.operators
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether `session` is this draft's session.
    pub fn same_session(&self, session: Uuid) -> bool {
        self.session_id == session
    }

    /// Add an accepted player. Returns `false` if already present.
    pub fn add_player(&mut self, player: PlayerId) -> bool {
        if self.players.contains(&player) {
            return false;
        }
        self.players.push(player);
        true
    }

    /// Apply an edit.
    pub fn apply(&mut self, edit: DraftEdit) {
        if let Some(play_type) = edit.play_type {
            self.play_type = play_type;
        }
        if let Some(goal) = edit.goal {
            self.goal = Some(goal);
        }
        if let Some(difficulty) = edit.difficulty {
            self.difficulty = difficulty;
        }
        for op in edit.operators {
            if !self.operators.contains(&op) {
                self.operators.push(op);
            }
        }
    }

    /// One-line description used in invitations.
    pub fn describe(&self) -> String {
        let goal = self
            .goal
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<no goal>".to_string());
        format!("{goal} ({}, {})", self.difficulty, self.play_type.as_str())
    }
}

/// Changes to a draft. Unset fields are left alone; operators are added.
#[derive(Debug, Clone, Default)]
pub struct DraftEdit {
    pub play_type: Option<PlayType>,
    pub goal: Option<ResourceId>,
    pub difficulty: Option<ResourceId>,
    pub operators: Vec<PlayerId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_draft_defaults() {
        let host = Uuid::new_v4();
        let draft = Draft::new(host);
        assert_eq!(draft.host(), host);
        assert_eq!(draft.play_type(), PlayType::Pvp);
        assert!(draft.goal().is_none());
        assert_eq!(draft.difficulty().as_str(), "speedabc:inf_elytra_inf_firework");
        assert!(draft.same_session(draft.session_id()));
        assert!(!draft.same_session(Uuid::new_v4()));
    }

    #[test]
    fn test_apply_edit() {
        let mut draft = Draft::new(Uuid::new_v4());
        let op = Uuid::new_v4();
        draft.apply(DraftEdit {
            play_type: Some(PlayType::Coop),
            goal: Some(ResourceId::new("speedabc", "overworld")),
            operators: vec![op, op],
            ..Default::default()
        });
        assert_eq!(draft.play_type(), PlayType::Coop);
        assert_eq!(draft.operators(), &[op]);
        assert!(draft.describe().starts_with("speedabc:overworld"));

        let player = Uuid::new_v4();
        assert!(draft.add_player(player));
        assert!(!draft.add_player(player));
    }
}
