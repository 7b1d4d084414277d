//! Invitations and their expiry.
//!
//! An invitation batch is keyed by the draft session or live record it
//! points at. Each invited player holds one [`InvitationCache`] counting
//! down once per server tick; an entry is dropped silently when it hits
//! zero.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use speedrun_records::{PlayerId, Tick};

/// What an invitation asks the player to join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationKind {
    /// Join a draft before it starts
    Draft,
    /// Join a running coop record
    Coop,
    /// Race a running solo record
    Pvp,
}

impl InvitationKind {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationKind::Draft => "draft",
            InvitationKind::Coop => "coop",
            InvitationKind::Pvp => "pvp",
        }
    }
}

/// An invitation as shown to the invited player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Inviting player
    pub host: PlayerId,
    /// Draft session or record id the invitation belongs to
    pub session: Uuid,
    /// What is being joined
    pub kind: InvitationKind,
    /// Summary of the draft or record
    pub info: String,
}

/// Answer to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteResponse {
    Accept,
    Deny,
}

/// Countdown for one invited player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationCache {
    invited: PlayerId,
    remaining: Tick,
}

impl InvitationCache {
    /// Start a countdown of `timeout` ticks.
    pub fn new(invited: PlayerId, timeout: Tick) -> Self {
        Self {
            invited,
            remaining: timeout,
        }
    }

    pub fn invited(&self) -> PlayerId {
        self.invited
    }

    pub fn remaining(&self) -> Tick {
        self.remaining
    }

    /// Count down one tick. Returns `true` once expired.
    pub fn tick(&mut self) -> bool {
        self.remaining -= 1;
        self.remaining <= 0
    }
}

/// Pending invitations, grouped by session.
#[derive(Debug, Default)]
pub struct InvitationBook {
    batches: DashMap<Uuid, HashMap<PlayerId, InvitationCache>>,
}

impl InvitationBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Invite players to a session, restarting any countdown already running.
    pub fn add(&self, session: Uuid, players: &[PlayerId], timeout: Tick) {
        let mut batch = self.batches.entry(session).or_default();
        for player in players {
            batch.insert(*player, InvitationCache::new(*player, timeout));
        }
        debug!(session = %session, invited = players.len(), timeout, "Invitations added");
    }

    /// Whether a player still has an open invitation to a session.
    pub fn contains(&self, session: &Uuid, player: &PlayerId) -> bool {
        self.batches
            .get(session)
            .is_some_and(|batch| batch.contains_key(player))
    }

    /// Consume a player's invitation.
    pub fn take(&self, session: &Uuid, player: &PlayerId) -> Option<InvitationCache> {
        let mut batch = self.batches.get_mut(session)?;
        batch.remove(player)
    }

    /// Open invitations for a session.
    pub fn pending(&self, session: &Uuid) -> usize {
        self.batches.get(session).map_or(0, |batch| batch.len())
    }

    /// Drop every invitation for a session.
    pub fn remove_session(&self, session: &Uuid) -> usize {
        self.batches.remove(session).map_or(0, |(_, batch)| batch.len())
    }

    /// Count every invitation down one tick and drop the expired ones.
    pub fn tick(&self) -> usize {
        let mut expired = 0;
        for mut batch in self.batches.iter_mut() {
            let before = batch.len();
            batch.retain(|_, cache| !cache.tick());
            expired += before - batch.len();
        }
        self.batches.retain(|_, batch| !batch.is_empty());
        if expired > 0 {
            debug!(expired, "Invitations expired");
        }
        expired
    }
}
