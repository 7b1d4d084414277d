//! Configuration for speedrun records.

use serde::{Deserialize, Serialize};

use speedrun_goals::ResourceId;

use crate::types::{RecordError, Result, Tick, TICKS_PER_SECOND};

/// Highest permission level the host understands.
pub const MAX_PERMISSION_LEVEL: u8 = 4;

/// Upper bound (exclusive) of the invitation cooldown, in seconds.
pub const MAX_INVITATION_COOLDOWN_SECS: u32 = 1800;

/// Speedrun configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedrunConfig {
    /// Granted items only work for the record they were granted for
    pub items_only_available_when_running: bool,
    /// Leaving the server stops the player's record
    pub stop_on_quit: bool,
    /// Stopped records pause their timer until resumed
    pub timer_pauses_when_vacant: bool,
    /// How long invitations stay open (seconds)
    pub default_invitation_cooldown: u32,
    /// Accept the pre-draft command forms
    pub enable_legacy_commands: bool,
    /// Which difficulties count as "difficult" for permissions
    pub difficulties_with_op: DifficultyRule,
    /// Permission levels per action
    pub permissions: PermissionLevels,
}

impl Default for SpeedrunConfig {
    fn default() -> Self {
        Self {
            items_only_available_when_running: false,
            stop_on_quit: false,
            timer_pauses_when_vacant: true,
            default_invitation_cooldown: 30, // 30 seconds
            enable_legacy_commands: false,
            difficulties_with_op: DifficultyRule::default(),
            permissions: PermissionLevels::default(),
        }
    }
}

impl SpeedrunConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.default_invitation_cooldown == 0
            || self.default_invitation_cooldown >= MAX_INVITATION_COOLDOWN_SECS
        {
            return Err(RecordError::Config(format!(
                "default_invitation_cooldown must be in 1..{MAX_INVITATION_COOLDOWN_SECS}, got {}",
                self.default_invitation_cooldown
            )));
        }
        self.permissions.validate()
    }

    /// Invitation lifetime in ticks.
    pub fn invitation_timeout_ticks(&self) -> Tick {
        Tick::from(self.default_invitation_cooldown) * TICKS_PER_SECOND
    }

    /// Permission level required to start a run at `difficulty`.
    pub fn start_level(&self, difficulty: &ResourceId) -> u8 {
        if self.difficulties_with_op.is_difficult(difficulty) {
            self.permissions.difficult_start
        } else {
            self.permissions.normal_start
        }
    }
}

/// Selects difficulties by id, optionally inverted.
///
/// `ALL` and `NONE` are accepted as ids. The default selects every
/// difficulty except `speedabc:empty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyRule {
    /// Listed identifiers
    pub ids: Vec<String>,
    /// Select everything not listed
    #[serde(default)]
    pub inverted: bool,
}

impl Default for DifficultyRule {
    fn default() -> Self {
        Self {
            ids: vec!["speedabc:empty".to_string()],
            inverted: true,
        }
    }
}

impl DifficultyRule {
    /// Whether the difficulty is selected.
    pub fn is_difficult(&self, difficulty: &ResourceId) -> bool {
        let listed = if self.ids.iter().any(|s| s == "NONE") {
            false
        } else {
            self.ids
                .iter()
                .any(|s| s == "ALL" || s == difficulty.as_str())
        };
        listed != self.inverted
    }
}

/// Permission level required for each action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionLevels {
    pub normal_start: u8,
    pub difficult_start: u8,
    pub draft: u8,
    pub stop: u8,
    pub stop_others: u8,
    pub resume: u8,
    pub resume_others: u8,
    pub archive: u8,
    pub archive_others: u8,
    pub view: u8,
    pub view_others: u8,
    pub view_pvp_mates: u8,
    pub join: u8,
    pub invite: u8,
    pub delete: u8,
    pub delete_others: u8,
    pub list: u8,
    pub list_others: u8,
}

impl Default for PermissionLevels {
    fn default() -> Self {
        Self {
            normal_start: 0,
            difficult_start: 0,
            draft: 0,
            stop: 0,
            stop_others: 3,
            resume: 0,
            resume_others: 3,
            archive: 0,
            archive_others: 3,
            view: 0,
            view_others: 2,
            view_pvp_mates: 0,
            join: 0,
            invite: 0,
            delete: 0,
            delete_others: 3,
            list: 0,
            list_others: 2,
        }
    }
}

impl PermissionLevels {
    fn levels(&self) -> [(&'static str, u8); 18] {
        [
            ("normal_start", self.normal_start),
            ("difficult_start", self.difficult_start),
            ("draft", self.draft),
            ("stop", self.stop),
            ("stop_others", self.stop_others),
            ("resume", self.resume),
            ("resume_others", self.resume_others),
            ("archive", self.archive),
            ("archive_others", self.archive_others),
            ("view", self.view),
            ("view_others", self.view_others),
            ("view_pvp_mates", self.view_pvp_mates),
            ("join", self.join),
            ("invite", self.invite),
            ("delete", self.delete),
            ("delete_others", self.delete_others),
            ("list", self.list),
            ("list_others", self.list_others),
        ]
    }

    /// Check every level is in `0..=4`.
    pub fn validate(&self) -> Result<()> {
        for (name, level) in self.levels() {
            if level > MAX_PERMISSION_LEVEL {
                return Err(RecordError::Config(format!(
                    "permission {name} must be at most {MAX_PERMISSION_LEVEL}, got {level}"
                )));
            }
        }
        Ok(())
    }
}
