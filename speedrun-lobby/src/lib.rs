//! Speedrun lobby.
//!
//! Turns player actions into record transitions: drafts negotiated before
//! a run, invitations into drafts and live records, and the
//! [`SpeedrunServer`] that starts, stops, resumes and archives records and
//! feeds them game events.
//!
//! ```text
//!   player action ──► SpeedrunServer ──► PlayerRecords (per player lock)
//!                        │    │                 │
//!                        │    └─► DraftManager  └─► CoopRecordManager
//!                        │          └─ InvitationBook
//!                        ├─► RecordArchive
//!                        └─► GameHost (time, inventory, notices)
//! ```

pub mod draft;
pub mod drafts;
pub mod error;
pub mod host;
pub mod invitation;
pub mod server;

// Re-export main types
pub use draft::{default_difficulty, Draft, DraftEdit};
pub use drafts::DraftManager;
pub use error::{LobbyError, Result};
pub use host::{GameHost, Notice};
pub use invitation::{Invitation, InvitationBook, InvitationCache, InvitationKind, InviteResponse};
pub use server::{RecordView, SpeedrunServer};
