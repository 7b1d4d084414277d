//! Draft manager: at most one draft per host, plus the draft invitations.
//!
//! One manager is shared by the whole server, keyed by host.

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use speedrun_records::{PlayerId, Tick};

use crate::draft::{Draft, DraftEdit};
use crate::error::{LobbyError, Result};
use crate::invitation::{Invitation, InvitationBook, InvitationKind, InviteResponse};

/// Shared home of every draft.
#[derive(Debug, Default)]
pub struct DraftManager {
    drafts: DashMap<PlayerId, Draft>,
    invitations: InvitationBook,
}

impl DraftManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a draft for `host`.
    ///
    /// Fails if the host is running a record or already has a draft.
    pub fn create(&self, host: PlayerId, running: bool) -> Result<Uuid> {
        if running {
            return Err(LobbyError::AlreadyRunning(host));
        }
        match self.drafts.entry(host) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(LobbyError::DraftExists(host)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let draft = Draft::new(host);
                let session = draft.session_id();
                slot.insert(draft);
                info!(host = %host, session = %session, "Draft created");
                Ok(session)
            }
        }
    }

    /// Copy of the host's draft.
    pub fn get(&self, host: &PlayerId) -> Option<Draft> {
        self.drafts.get(host).map(|d| d.value().clone())
    }

    /// Whether the host has a draft.
    pub fn contains(&self, host: &PlayerId) -> bool {
        self.drafts.contains_key(host)
    }

    /// Apply an edit and return the updated draft.
    pub fn edit(&self, host: PlayerId, edit: DraftEdit) -> Result<Draft> {
        let mut draft = self.drafts.get_mut(&host).ok_or(LobbyError::NoDraft(host))?;
        draft.apply(edit);
        debug!(host = %host, draft = %draft.describe(), "Draft edited");
        Ok(draft.clone())
    }

    /// Invite players to the host's draft. `None` if there is no draft.
    pub fn invite(&self, host: PlayerId, players: &[PlayerId], timeout: Tick) -> Option<Invitation> {
        let draft = self.get(&host)?;
        self.invitations.add(draft.session_id(), players, timeout);
        info!(host = %host, session = %draft.session_id(), invited = players.len(), "Draft invitations sent");
        Some(Invitation {
            host,
            session: draft.session_id(),
            kind: InvitationKind::Draft,
            info: draft.describe(),
        })
    }

    /// Answer a draft invitation.
    ///
    /// A session that is not the host's current draft is absent; a missing
    /// entry for the player is a timeout. Accepting adds the player.
    pub fn respond(
        &self,
        host: PlayerId,
        session: Uuid,
        invited: PlayerId,
        response: InviteResponse,
    ) -> Result<()> {
        let mut draft = self.drafts.get_mut(&host).ok_or(LobbyError::InvitationAbsent)?;
        if !draft.same_session(session) {
            debug!(host = %host, current = %draft.session_id(), session = %session, "Stale draft session");
            return Err(LobbyError::InvitationAbsent);
        }
        self.invitations
            .take(&session, &invited)
            .ok_or(LobbyError::InvitationTimedOut)?;
        if response == InviteResponse::Accept {
            draft.add_player(invited);
        }
        info!(host = %host, player = %invited, accepted = (response == InviteResponse::Accept), "Draft invitation answered");
        Ok(())
    }

    /// Open invitations on the host's draft.
    pub fn pending(&self, host: &PlayerId) -> usize {
        self.drafts
            .get(host)
            .map_or(0, |d| self.invitations.pending(&d.session_id()))
    }

    /// The draft to start, if no invitation is still open.
    ///
    /// The draft stays in place; call [`DraftManager::complete`] once the
    /// run has started.
    pub fn prepare_submit(&self, host: PlayerId) -> Result<Draft> {
        let draft = self.get(&host).ok_or(LobbyError::NoDraft(host))?;
        let pending = self.invitations.pending(&draft.session_id());
        if pending > 0 {
            return Err(LobbyError::PendingInvitations(pending));
        }
        Ok(draft)
    }

    /// Remove a submitted draft if it is still the same session.
    pub fn complete(&self, host: PlayerId, session: Uuid) -> bool {
        let removed = self
            .drafts
            .remove_if(&host, |_, d| d.same_session(session))
            .is_some();
        if removed {
            self.invitations.remove_session(&session);
            info!(host = %host, session = %session, "Draft submitted");
        }
        removed
    }

    /// Throw the host's draft away.
    pub fn discard(&self, host: &PlayerId) -> Option<Draft> {
        let (_, draft) = self.drafts.remove(host)?;
        self.invitations.remove_session(&draft.session_id());
        info!(host = %host, session = %draft.session_id(), "Draft discarded");
        Some(draft)
    }

    /// Number of drafts.
    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    /// Whether there are no drafts.
    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// Count draft invitations down one tick.
    pub fn tick(&self) -> usize {
        self.invitations.tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rules() {
        let manager = DraftManager::new();
        let host = Uuid::new_v4();
        assert!(matches!(manager.create(host, true), Err(LobbyError::AlreadyRunning(_))));
        manager.create(host, false).unwrap();
        assert!(matches!(manager.create(host, false), Err(LobbyError::DraftExists(_))));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_absent_vs_timeout() {
        let manager = DraftManager::new();
        let host = Uuid::new_v4();
        let invited = Uuid::new_v4();
        let session = manager.create(host, false).unwrap();
        manager.invite(host, &[invited], 2).unwrap();

        let err = manager
            .respond(host, Uuid::new_v4(), invited, InviteResponse::Accept)
            .unwrap_err();
        assert!(matches!(err, LobbyError::InvitationAbsent));

        manager.tick();
        manager.tick();
        let err = manager
            .respond(host, session, invited, InviteResponse::Accept)
            .unwrap_err();
        assert!(matches!(err, LobbyError::InvitationTimedOut));

        manager.discard(&host);
        let err = manager
            .respond(host, session, invited, InviteResponse::Accept)
            .unwrap_err();
        assert!(matches!(err, LobbyError::InvitationAbsent));
    }

    #[test]
    fn test_accept_then_submit() {
        let manager = DraftManager::new();
        let host = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let session = manager.create(host, false).unwrap();
        manager.invite(host, &[a, b], 100).unwrap();

        manager.respond(host, session, a, InviteResponse::Accept).unwrap();
        assert!(matches!(manager.prepare_submit(host), Err(LobbyError::PendingInvitations(1))));

        manager.respond(host, session, b, InviteResponse::Deny).unwrap();
        let draft = manager.prepare_submit(host).unwrap();
        assert_eq!(draft.players(), &[a]);

        assert!(manager.complete(host, session));
        assert!(!manager.contains(&host));
        assert!(matches!(manager.prepare_submit(host), Err(LobbyError::NoDraft(_))));
    }

    #[test]
    fn test_invite_without_draft() {
        let manager = DraftManager::new();
        assert!(manager.invite(Uuid::new_v4(), &[Uuid::new_v4()], 10).is_none());
    }
}
