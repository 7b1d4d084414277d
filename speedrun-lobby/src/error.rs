//! Error types for lobby operations.

use speedrun_goals::ResourceId;
use speedrun_records::{PlayerId, RecordError};

/// Error types for lobby operations.
///
/// Every variant except [`LobbyError::Record`] is reported before any
/// state changes.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// Player has no live record
    #[error("No active record for {0}")]
    NoActiveRecord(PlayerId),

    /// Player already has a live record
    #[error("Player {0} is already running a record")]
    AlreadyRunning(PlayerId),

    /// Host already has a draft
    #[error("Player {0} already has a draft")]
    DraftExists(PlayerId),

    /// Host has no draft
    #[error("No draft for {0}")]
    NoDraft(PlayerId),

    /// Player is offline or unknown
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// Host invited themselves
    #[error("Cannot invite yourself")]
    SelfInvitation,

    /// Nobody to invite
    #[error("No players given")]
    EmptyInvitation,

    /// Permission level too low
    #[error("Permission denied: {action}")]
    PermissionDenied { action: &'static str },

    /// Invitation belongs to a draft or record that is gone
    #[error("Invitation no longer exists")]
    InvitationAbsent,

    /// Invitation expired or was already answered
    #[error("Invitation timed out")]
    InvitationTimedOut,

    /// Draft still has open invitations
    #[error("Waiting for {0} invitation(s)")]
    PendingInvitations(usize),

    /// Goal is not loaded
    #[error("Goal not found: {0}")]
    GoalNotFound(ResourceId),

    /// Draft has no goal set
    #[error("Draft has no goal")]
    GoalMissing,

    /// Caller is not an operator of the coop record
    #[error("Not an operator of this coop record")]
    NotCoopOperator,

    /// Not a `#ABCD` short id
    #[error("Invalid short id: {0}")]
    InvalidShortId(String),

    /// No coop record has this short id
    #[error("No coop record matches {0}")]
    CoopNotFound(String),

    /// Several coop records share this short id
    #[error("Short id {0} matches more than one coop record")]
    AmbiguousShortId(String),

    /// No history record to resume or archive
    #[error("No history record for {0}")]
    HistoryEmpty(PlayerId),

    /// Record error
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

pub type Result<T> = std::result::Result<T, LobbyError>;
