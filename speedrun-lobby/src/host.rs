//! The game host as seen by the lobby.

use serde::Serialize;

use speedrun_goals::ItemStack;
use speedrun_records::{PlayerId, RecordId, RecordSnapshot, Tick};

use crate::invitation::Invitation;

/// Host game services the lobby relies on.
pub trait GameHost: Send + Sync {
    /// Current game time.
    fn now(&self) -> Tick;

    /// Whether a player is connected.
    fn is_online(&self, player: PlayerId) -> bool;

    /// Permission level of a player, `0..=4`.
    fn permission_level(&self, player: PlayerId) -> u8;

    /// Inventory contents of a player.
    fn inventory(&self, player: PlayerId) -> Vec<ItemStack>;

    /// Give a stack, dropping it at the player's feet if the inventory is full.
    fn give_or_drop(&self, player: PlayerId, stack: ItemStack);

    /// Message one player.
    fn send(&self, player: PlayerId, notice: Notice);

    /// Message every connected player.
    fn broadcast(&self, notice: Notice);
}

/// Something worth telling players about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    Started { snapshot: RecordSnapshot },
    Resumed { snapshot: RecordSnapshot },
    Stopped { snapshot: RecordSnapshot },
    CoopStopped { snapshot: RecordSnapshot },
    Collected {
        player: PlayerId,
        record_id: RecordId,
        indices: Vec<usize>,
        collected: usize,
        required: usize,
    },
    Finished { player: PlayerId, snapshot: RecordSnapshot },
    Invited { invitation: Invitation },
    InviteAccepted { player: PlayerId },
    InviteDenied { player: PlayerId },
    Archived { record_id: RecordId },
}

impl Notice {
    /// Translation key for the message.
    pub fn key(&self) -> &'static str {
        match self {
            Notice::Started { .. } => "command.speedrun.alphabet.start",
            Notice::Resumed { .. } => "command.speedrun.alphabet.resume",
            Notice::Stopped { .. } => "command.speedrun.alphabet.stop",
            Notice::CoopStopped { .. } => "command.speedrun.alphabet.stop.coop",
            Notice::Collected { .. } => "speedrun.alphabet.collected",
            Notice::Finished { .. } => "speedrun.alphabet.finished",
            Notice::Invited { .. } => "command.speedrun.alphabet.invite",
            Notice::InviteAccepted { .. } => "command.speedrun.alphabet.invite.accepted",
            Notice::InviteDenied { .. } => "command.speedrun.alphabet.invite.denied",
            Notice::Archived { .. } => "command.speedrun.alphabet.archive",
        }
    }
}
