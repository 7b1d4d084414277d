//! Speedrun server: every operation a player can trigger.
//!
//! Each player's records sit behind their own async mutex. Operations
//! touching several players lock them in id order. Archive I/O runs
//! before the lock is taken and its result is applied under the lock.
//! No map guard is ever held across an `.await`.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use speedrun_goals::{Evidence, GoalLibrary, ItemRegistry, ItemStack, ResourceId};
use speedrun_records::stamp;
use speedrun_records::{
    link_mates, ActiveRecord, CollectOutcome, CoopRecord, CoopRecordManager, Difficulty, DifficultyRegistry,
    GrantContext, PlayType, PlayerId, PlayerRecords, RecordArchive, RecordError, RecordId,
    RecordSnapshot, SaveData, ShortLookup, SpeedrunConfig, SpeedrunRecord, Tick,
};

use crate::draft::{default_difficulty, Draft, DraftEdit};
use crate::drafts::DraftManager;
use crate::error::{LobbyError, Result};
use crate::host::{GameHost, Notice};
use crate::invitation::{Invitation, InvitationBook, InvitationKind, InviteResponse};

type Slot = Arc<Mutex<PlayerRecords>>;
type Locked = (PlayerId, OwnedMutexGuard<PlayerRecords>);

/// A coop record that finished while its players were still attached.
struct CoopRelease {
    record: RecordId,
}

/// Icons and progress of a live record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordView {
    pub record_id: RecordId,
    pub goal_id: ResourceId,
    pub icons: Vec<ItemStack>,
    pub collected: Vec<bool>,
}

impl RecordView {
    fn of(record: &SpeedrunRecord) -> Self {
        Self {
            record_id: record.record_id(),
            goal_id: record.goal_id().clone(),
            icons: record.predicates().iter().map(|p| p.icon().clone()).collect(),
            collected: (0..record.required()).map(|i| record.is_collected(i)).collect(),
        }
    }
}

/// The speedrun server.
pub struct SpeedrunServer {
    config: SpeedrunConfig,
    difficulties: Arc<DifficultyRegistry>,
    goals: Arc<GoalLibrary>,
    items: Arc<dyn ItemRegistry>,
    archive: Arc<dyn RecordArchive>,
    host: Arc<dyn GameHost>,
    coops: CoopRecordManager,
    drafts: DraftManager,
    record_invitations: InvitationBook,
    players: DashMap<PlayerId, Slot>,
}

impl SpeedrunServer {
    /// Create a server over its collaborators.
    pub fn new(
        config: SpeedrunConfig,
        difficulties: Arc<DifficultyRegistry>,
        goals: Arc<GoalLibrary>,
        items: Arc<dyn ItemRegistry>,
        archive: Arc<dyn RecordArchive>,
        host: Arc<dyn GameHost>,
    ) -> Self {
        Self {
            config,
            difficulties,
            goals,
            items,
            archive,
            host,
            coops: CoopRecordManager::new(),
            drafts: DraftManager::new(),
            record_invitations: InvitationBook::new(),
            players: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SpeedrunConfig {
        &self.config
    }

    pub fn coops(&self) -> &CoopRecordManager {
        &self.coops
    }

    pub fn drafts(&self) -> &DraftManager {
        &self.drafts
    }

    /// Copy of a player's records.
    pub async fn records(&self, player: PlayerId) -> PlayerRecords {
        self.slot(player).lock().await.clone()
    }

    // ========================================================================
    // Starting
    // ========================================================================

    /// Start a solo record. Without a difficulty, both axes are unlimited.
    pub async fn start_solo(
        &self,
        player: PlayerId,
        goal_id: &ResourceId,
        difficulty: Option<ResourceId>,
    ) -> Result<RecordId> {
        let difficulty = self
            .difficulties
            .resolve_id(&difficulty.unwrap_or_else(default_difficulty));
        self.require(player, self.config.start_level(&difficulty), "start")?;
        let goal = self
            .goals
            .get(goal_id)
            .await
            .ok_or_else(|| LobbyError::GoalNotFound(goal_id.clone()))?;

        let mut slot = self.slot(player).lock_owned().await;
        if slot.is_running() {
            return Err(LobbyError::AlreadyRunning(player));
        }

        let now = self.host.now();
        let record = SpeedrunRecord::new(&goal, difficulty, now);
        let record_id = record.record_id();
        slot.set_current(ActiveRecord::Solo(record));
        self.notify_live(player, &slot, now, |snapshot| Notice::Started { snapshot });
        let release = self.begin(player, &mut slot, now);
        drop(slot);
        self.settle(release).await;

        info!(player = %player, record_id = %record_id, goal = %goal_id, "Solo record started");
        Ok(record_id)
    }

    /// Open a draft.
    pub async fn create_draft(&self, host: PlayerId) -> Result<uuid::Uuid> {
        self.require(host, self.config.permissions.draft, "draft")?;
        let running = self.slot(host).lock().await.is_running();
        self.drafts.create(host, running)
    }

    /// Change a draft. The goal must be loaded; unknown difficulties fall back.
    pub async fn edit_draft(&self, host: PlayerId, mut edit: DraftEdit) -> Result<Draft> {
        self.require(host, self.config.permissions.draft, "draft")?;
        if let Some(goal) = &edit.goal {
            if self.goals.get(goal).await.is_none() {
                return Err(LobbyError::GoalNotFound(goal.clone()));
            }
        }
        edit.difficulty = edit.difficulty.map(|d| self.difficulties.resolve_id(&d));
        self.drafts.edit(host, edit)
    }

    /// Throw a draft away.
    pub fn discard_draft(&self, host: PlayerId) -> Result<Draft> {
        self.drafts.discard(&host).ok_or(LobbyError::NoDraft(host))
    }

    /// Start the run a draft describes.
    ///
    /// Invited players who are offline are left out. If anyone taking part
    /// is already running, nothing starts.
    pub async fn submit_draft(&self, host: PlayerId) -> Result<RecordId> {
        let draft = self.drafts.prepare_submit(host)?;
        let goal_id = draft.goal().cloned().ok_or(LobbyError::GoalMissing)?;
        let difficulty = self.difficulties.resolve_id(draft.difficulty());
        self.require(host, self.config.start_level(&difficulty), "start")?;
        let goal = self
            .goals
            .get(&goal_id)
            .await
            .ok_or_else(|| LobbyError::GoalNotFound(goal_id.clone()))?;

        let invited: Vec<PlayerId> = draft
            .players()
            .iter()
            .copied()
            .filter(|p| *p != host && self.host.is_online(*p))
            .collect();
        let mut everyone = invited.clone();
        everyone.push(host);

        let mut guards = self.lock_all(&everyone).await;
        if let Some((player, _)) = guards.iter().find(|(_, slot)| slot.is_running()) {
            return Err(LobbyError::AlreadyRunning(*player));
        }

        let now = self.host.now();
        let mut host_record = SpeedrunRecord::new(&goal, difficulty, now);
        let record_id = host_record.record_id();
        let mut releases = Vec::new();

        match draft.play_type() {
            PlayType::Pvp => {
                let mut records = Vec::with_capacity(everyone.len());
                for player in &invited {
                    let mut companion = host_record.companion(now);
                    link_mates(host, &mut host_record, *player, &mut companion);
                    records.push((*player, companion));
                }
                records.push((host, host_record));

                for (player, record) in records {
                    let Some(slot) = Self::slot_in(&mut guards, player) else {
                        continue;
                    };
                    slot.set_current(ActiveRecord::Solo(record));
                    self.notify_live(player, slot, now, |snapshot| Notice::Started { snapshot });
                    releases.extend(self.begin(player, slot, now));
                }
            }
            PlayType::Coop => {
                let mut operators: BTreeSet<PlayerId> = draft.operators().iter().copied().collect();
                operators.insert(host);
                self.coops.insert(CoopRecord::new(host_record, operators));

                for (player, slot) in guards.iter_mut() {
                    slot.set_current(ActiveRecord::Coop(record_id));
                    self.notify_live(*player, slot, now, |snapshot| Notice::Started { snapshot });
                    releases.extend(self.begin(*player, slot, now));
                }
            }
        }

        self.drafts.complete(host, draft.session_id());
        drop(guards);
        for release in releases {
            self.release_coop(release).await;
        }

        info!(
            host = %host,
            record_id = %record_id,
            goal = %goal_id,
            play_type = draft.play_type().as_str(),
            players = everyone.len(),
            "Draft started"
        );
        Ok(record_id)
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    /// Invite players to the host's draft, or else to the host's live record.
    pub async fn invite(&self, host: PlayerId, players: &[PlayerId]) -> Result<Invitation> {
        self.require(host, self.config.permissions.invite, "invite")?;
        if players.is_empty() {
            return Err(LobbyError::EmptyInvitation);
        }
        if players.contains(&host) {
            return Err(LobbyError::SelfInvitation);
        }
        if let Some(offline) = players.iter().find(|p| !self.host.is_online(**p)) {
            return Err(LobbyError::PlayerNotFound(*offline));
        }

        let timeout = self.config.invitation_timeout_ticks();
        let invitation = match self.drafts.invite(host, players, timeout) {
            Some(invitation) => invitation,
            None => {
                let now = self.host.now();
                let slot = self.slot(host).lock_owned().await;
                let active = slot.current().ok_or(LobbyError::NoActiveRecord(host))?;
                let kind = match active {
                    ActiveRecord::Coop(id) => {
                        if !self.coops.get(id).is_some_and(|c| c.is_operator(&host)) {
                            return Err(LobbyError::NotCoopOperator);
                        }
                        InvitationKind::Coop
                    }
                    ActiveRecord::Solo(_) => InvitationKind::Pvp,
                };
                let session = active.record_id();
                let info = self
                    .snapshot_of(active, now)
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                self.record_invitations.add(session, players, timeout);
                Invitation {
                    host,
                    session,
                    kind,
                    info,
                }
            }
        };

        for player in players {
            self.host.send(
                *player,
                Notice::Invited {
                    invitation: invitation.clone(),
                },
            );
        }
        info!(
            host = %host,
            session = %invitation.session,
            kind = invitation.kind.as_str(),
            invited = players.len(),
            "Invitations sent"
        );
        Ok(invitation)
    }

    /// Answer an invitation.
    ///
    /// An invitation whose draft or record is no longer the host's current
    /// one is absent. One that expired or was already answered is timed out.
    pub async fn respond(
        &self,
        invited: PlayerId,
        host: PlayerId,
        kind: InvitationKind,
        session: uuid::Uuid,
        response: InviteResponse,
    ) -> Result<()> {
        if response == InviteResponse::Accept {
            self.require(invited, self.config.permissions.join, "join")?;
        }
        match kind {
            InvitationKind::Draft => self.drafts.respond(host, session, invited, response)?,
            InvitationKind::Pvp => {
                self.respond_to_record(invited, host, PlayType::Pvp, session, response)
                    .await?
            }
            InvitationKind::Coop => {
                self.respond_to_record(invited, host, PlayType::Coop, session, response)
                    .await?
            }
        }

        let notice = match response {
            InviteResponse::Accept => Notice::InviteAccepted { player: invited },
            InviteResponse::Deny => Notice::InviteDenied { player: invited },
        };
        self.host.send(host, notice);
        Ok(())
    }

    async fn respond_to_record(
        &self,
        invited: PlayerId,
        host: PlayerId,
        play_type: PlayType,
        session: RecordId,
        response: InviteResponse,
    ) -> Result<()> {
        let mut guards = self.lock_all(&[host, invited]).await;

        let live = Self::slot_in(&mut guards, host)
            .and_then(|slot| slot.current().map(|a| (a.record_id(), a.play_type())));
        if live != Some((session, play_type))
            || (play_type == PlayType::Coop && !self.coops.contains(&session))
        {
            debug!(host = %host, session = %session, "Stale record invitation");
            return Err(LobbyError::InvitationAbsent);
        }
        if !self.record_invitations.contains(&session, &invited) {
            return Err(LobbyError::InvitationTimedOut);
        }
        if response == InviteResponse::Accept
            && Self::slot_in(&mut guards, invited).is_some_and(|slot| slot.is_running())
        {
            return Err(LobbyError::AlreadyRunning(invited));
        }

        self.record_invitations.take(&session, &invited);
        if response == InviteResponse::Deny {
            info!(host = %host, player = %invited, session = %session, "Record invitation denied");
            return Ok(());
        }

        let now = self.host.now();
        let active = match play_type {
            PlayType::Pvp => {
                let host_record = Self::slot_in(&mut guards, host)
                    .and_then(|slot| slot.current_mut())
                    .and_then(ActiveRecord::as_solo_mut)
                    .ok_or(LobbyError::InvitationAbsent)?;
                let mut companion = host_record.companion(now);
                link_mates(host, host_record, invited, &mut companion);
                ActiveRecord::Solo(companion)
            }
            PlayType::Coop => ActiveRecord::Coop(session),
        };

        let slot = Self::slot_in(&mut guards, invited).ok_or(LobbyError::PlayerNotFound(invited))?;
        slot.set_current(active);
        self.notify_live(invited, slot, now, |snapshot| Notice::Started { snapshot });
        let release = self.begin(invited, slot, now);
        drop(guards);
        self.settle(release).await;

        info!(
            host = %host,
            player = %invited,
            session = %session,
            play_type = play_type.as_str(),
            "Record invitation accepted"
        );
        Ok(())
    }

    // ========================================================================
    // Stopping and resuming
    // ========================================================================

    /// Stop the player's own run: a solo record goes to history, a coop
    /// record is left.
    pub async fn quit(&self, player: PlayerId) -> Result<()> {
        let mut slot = self.slot(player).lock_owned().await;
        match slot.current() {
            None => return Err(LobbyError::NoActiveRecord(player)),
            Some(ActiveRecord::Solo(_)) => self.require(player, self.config.permissions.stop, "stop")?,
            Some(ActiveRecord::Coop(_)) => {}
        }
        let now = self.host.now();
        self.quit_locked(player, &mut slot, now);
        Ok(())
    }

    /// Stop a coop record for every player in it.
    ///
    /// Allowed for operators and for players with the `stop_others` level.
    /// The coop timer keeps running. A solo record is simply quit.
    pub async fn stop_coop(&self, player: PlayerId) -> Result<()> {
        let now = self.host.now();
        let mut slot = self.slot(player).lock_owned().await;
        let coop_id = match slot.current() {
            None => return Err(LobbyError::NoActiveRecord(player)),
            Some(ActiveRecord::Coop(id)) => Some(*id),
            Some(ActiveRecord::Solo(_)) => None,
        };
        let Some(record_id) = coop_id else {
            self.require(player, self.config.permissions.stop, "stop")?;
            self.quit_locked(player, &mut slot, now);
            return Ok(());
        };

        let privileged = self.host.permission_level(player) >= self.config.permissions.stop_others;
        let coop = self
            .coops
            .get(&record_id)
            .ok_or(LobbyError::NoActiveRecord(player))?;
        if !coop.may_stop(&player, privileged) {
            return Err(LobbyError::NotCoopOperator);
        }

        let (snapshot, mut members) = self
            .coops
            .with_mut(&record_id, |coop| {
                let members = coop.players().clone();
                coop.clear_players();
                (coop.record().snapshot(now, PlayType::Coop), members)
            })
            .ok_or(LobbyError::NoActiveRecord(player))?;
        slot.take_current();
        drop(slot);

        members.remove(&player);
        self.clear_coop_slots(record_id, members.iter().copied()).await;
        members.insert(player);
        for member in &members {
            self.host.send(
                *member,
                Notice::CoopStopped {
                    snapshot: snapshot.clone(),
                },
            );
        }
        info!(player = %player, record_id = %record_id, players = members.len(), "Coop record stopped");
        Ok(())
    }

    /// Resolve a `#ABCD` short id to a coop record.
    pub fn find_coop(&self, short: &str) -> Result<RecordId> {
        match self.coops.find_short(short) {
            ShortLookup::Found(id) => Ok(id),
            ShortLookup::Absent => Err(LobbyError::CoopNotFound(short.to_string())),
            ShortLookup::Ambiguous => Err(LobbyError::AmbiguousShortId(short.to_string())),
            ShortLookup::Invalid => Err(LobbyError::InvalidShortId(short.to_string())),
        }
    }

    /// Rejoin a stopped coop record by its short id.
    ///
    /// Operators of the coop may always rejoin; anyone else needs the
    /// `resume_others` level.
    pub async fn resume_coop(&self, player: PlayerId, short: &str) -> Result<RecordId> {
        let record_id = self.find_coop(short)?;
        let coop = self
            .coops
            .get(&record_id)
            .ok_or_else(|| LobbyError::CoopNotFound(short.to_string()))?;
        if !coop.is_operator(&player) {
            self.require(player, self.config.permissions.resume_others, "resume")?;
        }
        if coop.is_finished() {
            return Err(RecordError::RecordFinished(record_id).into());
        }

        let mut slot = self.slot(player).lock_owned().await;
        if slot.is_running() {
            return Err(LobbyError::AlreadyRunning(player));
        }
        let now = self.host.now();
        slot.set_current(ActiveRecord::Coop(record_id));
        let release = self.begin(player, &mut slot, now);
        self.notify_live(player, &slot, now, |snapshot| Notice::Resumed { snapshot });
        drop(slot);
        self.settle(release).await;

        info!(player = %player, record_id = %record_id, "Coop record resumed");
        Ok(record_id)
    }

    /// Move the history record back to current and restart it.
    pub async fn resume_local(&self, actor: PlayerId, owner: PlayerId) -> Result<RecordId> {
        self.require_scoped(
            actor,
            owner,
            self.config.permissions.resume,
            self.config.permissions.resume_others,
            "resume",
        )?;

        let mut slot = self.slot(owner).lock_owned().await;
        if slot.is_running() {
            return Err(LobbyError::AlreadyRunning(owner));
        }
        match slot.history() {
            None => return Err(LobbyError::HistoryEmpty(owner)),
            Some(record) if record.is_finished() => {
                return Err(RecordError::RecordFinished(record.record_id()).into())
            }
            Some(_) => {}
        }
        let record = slot.take_history().ok_or(LobbyError::HistoryEmpty(owner))?;
        let record_id = record.record_id();

        let now = self.host.now();
        slot.set_current(ActiveRecord::Solo(record));
        self.notify_live(owner, &slot, now, |snapshot| Notice::Resumed { snapshot });
        let release = self.begin(owner, &mut slot, now);
        drop(slot);
        self.settle(release).await;

        info!(player = %owner, record_id = %record_id, "Record resumed from history");
        Ok(record_id)
    }

    /// Resume an archived record under a fresh identity.
    ///
    /// Whatever the player was running is put away first.
    pub async fn resume_archived(
        &self,
        actor: PlayerId,
        owner: PlayerId,
        archived: RecordId,
    ) -> Result<RecordId> {
        self.require_scoped(
            actor,
            owner,
            self.config.permissions.resume,
            self.config.permissions.resume_others,
            "resume",
        )?;

        let record = self
            .archive
            .restore_record(owner, archived, &self.difficulties)
            .await?;
        if record.is_finished() {
            return Err(RecordError::RecordFinished(archived).into());
        }
        let record_id = record.record_id();

        let now = self.host.now();
        let mut slot = self.slot(owner).lock_owned().await;
        match slot.take_current() {
            Some(ActiveRecord::Coop(id)) => {
                self.coops.with_mut(&id, |coop| coop.leave(&owner));
            }
            Some(ActiveRecord::Solo(mut displaced)) => {
                if self.config.timer_pauses_when_vacant {
                    displaced.mark_vacant(now);
                }
                slot.set_history(displaced);
            }
            None => {}
        }
        slot.set_current(ActiveRecord::Solo(record));
        self.notify_live(owner, &slot, now, |snapshot| Notice::Resumed { snapshot });
        let release = self.begin(owner, &mut slot, now);
        drop(slot);
        self.settle(release).await;

        info!(player = %owner, archived = %archived, record_id = %record_id, "Record resumed from archive");
        Ok(record_id)
    }

    // ========================================================================
    // Archive
    // ========================================================================

    /// Write the history record to the archive, then clear history.
    ///
    /// History is only cleared if it still holds the archived record. On
    /// failure history is untouched.
    pub async fn archive(&self, actor: PlayerId, owner: PlayerId) -> Result<RecordId> {
        self.require_scoped(
            actor,
            owner,
            self.config.permissions.archive,
            self.config.permissions.archive_others,
            "archive",
        )?;

        let record = self
            .slot(owner)
            .lock()
            .await
            .history()
            .cloned()
            .ok_or(LobbyError::HistoryEmpty(owner))?;
        let record_id = record.record_id();

        self.archive.archive_record(owner, &record).await?;

        if !self.slot(owner).lock().await.clear_history_if(record_id) {
            debug!(player = %owner, record_id = %record_id, "History replaced during archive; keeping it");
        }
        self.host.send(actor, Notice::Archived { record_id });
        Ok(record_id)
    }

    /// Delete an archived record.
    pub async fn delete_archived(&self, actor: PlayerId, owner: PlayerId, record: RecordId) -> Result<()> {
        self.require_scoped(
            actor,
            owner,
            self.config.permissions.delete,
            self.config.permissions.delete_others,
            "delete",
        )?;
        self.archive.delete(owner, record).await?;
        Ok(())
    }

    /// Summaries of a player's archived records.
    pub async fn list_archived(&self, actor: PlayerId, owner: PlayerId) -> Result<Vec<RecordSnapshot>> {
        self.require_scoped(
            actor,
            owner,
            self.config.permissions.list,
            self.config.permissions.list_others,
            "list",
        )?;
        Ok(self.archive.snapshots(owner).await?)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// A player picked up a stack. Granted items are ignored.
    pub async fn on_item_pickup(&self, player: PlayerId, stack: ItemStack) -> CollectOutcome {
        if stack.is_empty() || stamp::bypasses_item_check(&stack) {
            return CollectOutcome::default();
        }
        let evidence = Evidence::item(stack, self.items.as_ref());
        self.on_evidence(player, &[evidence]).await
    }

    /// A player was granted an advancement.
    pub async fn on_advancement(&self, player: PlayerId, advancement: ResourceId) -> CollectOutcome {
        self.on_evidence(player, &[Evidence::advancement(advancement)]).await
    }

    /// Test the player's whole inventory.
    pub async fn rescan_inventory(&self, player: PlayerId) -> CollectOutcome {
        let now = self.host.now();
        let mut slot = self.slot(player).lock_owned().await;
        let (outcome, release) = self.rescan_locked(player, &mut slot, now);
        drop(slot);
        self.settle(release).await;
        outcome
    }

    async fn on_evidence(&self, player: PlayerId, evidence: &[Evidence]) -> CollectOutcome {
        let now = self.host.now();
        let mut slot = self.slot(player).lock_owned().await;
        let (outcome, release) = self.feed(player, &mut slot, evidence, now);
        drop(slot);
        self.settle(release).await;
        outcome
    }

    // ========================================================================
    // Viewing
    // ========================================================================

    /// Whether `viewer` may see `owner`'s live record as a mate.
    pub async fn trusts(&self, owner: PlayerId, viewer: Option<PlayerId>) -> bool {
        let viewer_record = match viewer {
            Some(v) => self.slot(v).lock().await.live_record_id(),
            None => None,
        };
        let slot = self.slot(owner).lock_owned().await;
        let trusted = match slot.current() {
            Some(ActiveRecord::Solo(record)) => record.trusts(viewer, viewer_record),
            Some(ActiveRecord::Coop(id)) => self.coops.get(id).is_some_and(|c| c.trusts(viewer)),
            None => false,
        };
        debug!(owner = %owner, viewer = ?viewer, trusted, "Trust check");
        trusted
    }

    /// Icons and progress of `owner`'s live record, as seen by `viewer`.
    pub async fn view(&self, viewer: PlayerId, owner: PlayerId) -> Result<RecordView> {
        let permissions = &self.config.permissions;
        let level = self.host.permission_level(viewer);
        let allowed = if viewer == owner {
            level >= permissions.view
        } else {
            level >= permissions.view_others
                || (level >= permissions.view_pvp_mates && self.trusts(owner, Some(viewer)).await)
        };
        if !allowed {
            return Err(LobbyError::PermissionDenied {
                action: if viewer == owner { "view" } else { "view_others" },
            });
        }

        let slot = self.slot(owner).lock_owned().await;
        let view = match slot.current() {
            Some(ActiveRecord::Solo(record)) => (!record.is_finished()).then(|| RecordView::of(record)),
            Some(ActiveRecord::Coop(id)) => self
                .coops
                .get(id)
                .filter(|c| !c.is_finished())
                .map(|c| RecordView::of(c.record())),
            None => None,
        };
        view.ok_or(LobbyError::NoActiveRecord(owner))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// A player disconnected.
    pub async fn player_left(&self, player: PlayerId) {
        self.drafts.discard(&player);
        if !self.config.stop_on_quit {
            return;
        }
        let now = self.host.now();
        let mut slot = self.slot(player).lock_owned().await;
        if self.quit_locked(player, &mut slot, now) {
            info!(player = %player, "Record stopped on quit");
        }
    }

    /// One server tick.
    pub fn tick(&self) {
        self.drafts.tick();
        self.record_invitations.tick();
    }

    /// Save data for a player.
    pub async fn export_player(&self, player: PlayerId) -> Result<SaveData> {
        Ok(self.slot(player).lock().await.export()?)
    }

    /// Restore a player from save data.
    ///
    /// A player returning to a coop record rejoins it.
    pub async fn import_player(&self, player: PlayerId, save: &SaveData) -> Result<()> {
        let records = PlayerRecords::import(save, &self.coops, &self.difficulties)?;
        if let Some(ActiveRecord::Coop(id)) = records.current() {
            let now = self.host.now();
            self.coops.with_mut(id, |coop| coop.join(player, now));
        }
        *self.slot(player).lock().await = records;
        Ok(())
    }

    /// Load coop records from `dir`.
    pub async fn load_coops(&self, dir: &Path) -> Result<usize> {
        Ok(self.coops.load_dir(dir, &self.difficulties).await?)
    }

    /// Save coop records to `dir` and forget them.
    pub async fn save_coops(&self, dir: &Path) -> Result<usize> {
        Ok(self.coops.save_dir(dir).await?)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn slot(&self, player: PlayerId) -> Slot {
        self.players.entry(player).or_default().value().clone()
    }

    async fn lock_all(&self, players: &[PlayerId]) -> Vec<Locked> {
        let ordered: BTreeSet<PlayerId> = players.iter().copied().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for player in ordered {
            guards.push((player, self.slot(player).lock_owned().await));
        }
        guards
    }

    fn slot_in(guards: &mut [Locked], player: PlayerId) -> Option<&mut PlayerRecords> {
        guards
            .iter_mut()
            .find(|(p, _)| *p == player)
            .map(|(_, guard)| &mut **guard)
    }

    fn require(&self, player: PlayerId, level: u8, action: &'static str) -> Result<()> {
        if self.host.permission_level(player) >= level {
            Ok(())
        } else {
            debug!(player = %player, action, required = level, "Permission denied");
            Err(LobbyError::PermissionDenied { action })
        }
    }

    fn require_scoped(
        &self,
        actor: PlayerId,
        owner: PlayerId,
        own: u8,
        others: u8,
        action: &'static str,
    ) -> Result<()> {
        self.require(actor, if actor == owner { own } else { others }, action)
    }

    fn snapshot_of(&self, active: &ActiveRecord, now: Tick) -> Option<RecordSnapshot> {
        match active {
            ActiveRecord::Solo(record) => Some(record.snapshot(now, PlayType::Pvp)),
            ActiveRecord::Coop(id) => self
                .coops
                .get(id)
                .map(|c| c.record().snapshot(now, PlayType::Coop)),
        }
    }

    fn notify_live(
        &self,
        player: PlayerId,
        slot: &PlayerRecords,
        now: Tick,
        notice: impl FnOnce(RecordSnapshot) -> Notice,
    ) {
        if let Some(snapshot) = slot.current().and_then(|a| self.snapshot_of(a, now)) {
            self.host.send(player, notice(snapshot));
        }
    }

    /// Start hook: fold any pause, join the coop, grant difficulty items
    /// and rescan the inventory.
    fn begin(&self, player: PlayerId, slot: &mut PlayerRecords, now: Tick) -> Option<CoopRelease> {
        let target = match slot.current_mut()? {
            ActiveRecord::Solo(record) => {
                record.on_start(now);
                Some((record.record_id(), record.difficulty().clone()))
            }
            ActiveRecord::Coop(id) => {
                let id = *id;
                self.coops.with_mut(&id, |coop| {
                    coop.join(player, now);
                    (id, coop.record().difficulty().clone())
                })
            }
        };
        let Some((record_id, difficulty)) = target else {
            warn!(player = %player, "Coop record missing at start; clearing slot");
            slot.take_current();
            return None;
        };

        self.grant(player, record_id, &difficulty);
        self.rescan_locked(player, slot, now).1
    }

    fn grant(&self, player: PlayerId, record: RecordId, difficulty: &ResourceId) {
        let difficulty = self.difficulties.get(difficulty);
        let ctx = GrantContext {
            record: Some(record),
            items_only_available_when_running: self.config.items_only_available_when_running,
        };
        let stacks = difficulty.grants(&self.host.inventory(player), &ctx);
        if !stacks.is_empty() {
            debug!(player = %player, difficulty = %difficulty.id(), granted = stacks.len(), "Difficulty items granted");
        }
        for stack in stacks {
            self.host.give_or_drop(player, stack);
        }
    }

    fn rescan_locked(
        &self,
        player: PlayerId,
        slot: &mut PlayerRecords,
        now: Tick,
    ) -> (CollectOutcome, Option<CoopRelease>) {
        let evidence: Vec<Evidence> = self
            .host
            .inventory(player)
            .into_iter()
            .filter(|stack| !stack.is_empty() && !stamp::bypasses_item_check(stack))
            .map(|stack| Evidence::item(stack, self.items.as_ref()))
            .collect();
        self.feed(player, slot, &evidence, now)
    }

    /// Feed evidence to the player's live record.
    ///
    /// A finished solo record moves to history. A finished coop record is
    /// cleared from this slot; the other players are released by the caller
    /// once this lock is gone.
    fn feed(
        &self,
        player: PlayerId,
        slot: &mut PlayerRecords,
        evidence: &[Evidence],
        now: Tick,
    ) -> (CollectOutcome, Option<CoopRelease>) {
        let mut total = CollectOutcome::default();
        for item in evidence {
            let Some(active) = slot.current_mut() else {
                break;
            };
            match active {
                ActiveRecord::Solo(record) => {
                    let outcome = record.on_event(item, now);
                    if outcome.is_empty() {
                        continue;
                    }
                    self.announce_collected(player, record.record_id(), &outcome, record.collected_count(), record.required());
                    total.collected.extend(outcome.collected.iter().copied());
                    if outcome.finished {
                        total.finished = true;
                        let snapshot = record.snapshot(now, PlayType::Pvp);
                        info!(player = %player, record_id = %snapshot.record_id, duration = snapshot.duration, "Solo record finished");
                        self.host.broadcast(Notice::Finished { player, snapshot });
                        slot.retire_current();
                        break;
                    }
                }
                ActiveRecord::Coop(id) => {
                    let id = *id;
                    let Some(outcome) = self.coops.with_mut(&id, |coop| coop.on_event(item, now)) else {
                        warn!(player = %player, record_id = %id, "Coop record missing; clearing slot");
                        slot.take_current();
                        break;
                    };
                    if outcome.is_empty() {
                        continue;
                    }
                    let Some(coop) = self.coops.get(&id) else {
                        break;
                    };
                    self.announce_collected(player, id, &outcome, coop.record().collected_count(), coop.record().required());
                    total.collected.extend(outcome.collected.iter().copied());
                    if outcome.finished {
                        total.finished = true;
                        let snapshot = coop.record().snapshot(now, PlayType::Coop);
                        info!(player = %player, record_id = %id, duration = snapshot.duration, "Coop record finished");
                        self.host.broadcast(Notice::Finished { player, snapshot });
                        slot.take_current();
                        return (total, Some(CoopRelease { record: id }));
                    }
                }
            }
        }
        (total, None)
    }

    fn announce_collected(
        &self,
        player: PlayerId,
        record_id: RecordId,
        outcome: &CollectOutcome,
        collected: usize,
        required: usize,
    ) {
        debug!(player = %player, record_id = %record_id, indices = ?outcome.collected, collected, required, "Collected");
        self.host.broadcast(Notice::Collected {
            player,
            record_id,
            indices: outcome.collected.clone(),
            collected,
            required,
        });
    }

    /// Stop the live record under an already-held lock.
    fn quit_locked(&self, player: PlayerId, slot: &mut PlayerRecords, now: Tick) -> bool {
        match slot.current_mut() {
            None => return false,
            Some(ActiveRecord::Solo(record)) => {
                if self.config.timer_pauses_when_vacant {
                    record.mark_vacant(now);
                }
            }
            Some(ActiveRecord::Coop(id)) => {
                let id = *id;
                self.coops.with_mut(&id, |coop| coop.leave(&player));
            }
        }
        let snapshot = slot.current().and_then(|a| self.snapshot_of(a, now));
        let retired = slot.retire_current();
        info!(player = %player, record_id = ?retired, "Record stopped");
        if let Some(snapshot) = snapshot {
            self.host.send(player, Notice::Stopped { snapshot });
        }
        true
    }

    async fn settle(&self, release: Option<CoopRelease>) {
        if let Some(release) = release {
            self.release_coop(release).await;
        }
    }

    async fn release_coop(&self, release: CoopRelease) {
        let members = self
            .coops
            .with_mut(&release.record, |coop| {
                let members = coop.players().clone();
                coop.clear_players();
                members
            })
            .unwrap_or_default();
        self.clear_coop_slots(release.record, members).await;
    }

    async fn clear_coop_slots(&self, record: RecordId, players: impl IntoIterator<Item = PlayerId>) {
        for player in players {
            let mut slot = self.slot(player).lock_owned().await;
            if matches!(slot.current(), Some(ActiveRecord::Coop(id)) if *id == record) {
                slot.take_current();
                debug!(player = %player, record_id = %record, "Coop slot cleared");
            }
        }
    }
}
