//! Per-room game rules.

use serde::{Deserialize, Serialize};

/// Game rules for one room. Mutable only while the room is in the lobby.
///
/// Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub discussion_time: u32,
    pub voting_time: u32,
    pub night_time: u32,
    pub role_reveal_time: u32,
    pub min_players: usize,
    pub max_players: usize,
    /// Explicit vampire count. `None` means one vampire per three players.
    pub vampire_count: Option<usize>,
    pub extra_time_allowed: bool,
    pub extra_time_amount: u32,
    pub max_extra_time_uses: u32,
    pub show_votes_after_game: bool,
    pub reveal_role_on_elimination: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            discussion_time: 120,
            voting_time: 60,
            night_time: 30,
            role_reveal_time: 10,
            min_players: 4,
            max_players: 10,
            vampire_count: None,
            extra_time_allowed: true,
            extra_time_amount: 30,
            max_extra_time_uses: 2,
            show_votes_after_game: true,
            reveal_role_on_elimination: true,
        }
    }
}

/// Settings validation failure. The message names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidSettings(pub String);

impl Settings {
    /// Smallest room a game can be played in.
    pub const MIN_PLAYERS_FLOOR: usize = 3;
    /// Largest room the server hosts.
    pub const MAX_PLAYERS_CEILING: usize = 20;
    /// Longest any single duration may be, in seconds.
    pub const MAX_DURATION_SECS: u32 = 3600;

    /// Returns a copy with every field present in `patch` overwritten.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        next.apply(patch);
        next
    }

    /// Overwrites every field present in `patch`.
    ///
    /// A `vampire_count` of `0` clears the override.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = patch.$field { self.$field = v; })*
            };
        }
        take!(
            discussion_time,
            voting_time,
            night_time,
            role_reveal_time,
            min_players,
            max_players,
            extra_time_allowed,
            extra_time_amount,
            max_extra_time_uses,
            show_votes_after_game,
            reveal_role_on_elimination,
        );
        if let Some(count) = patch.vampire_count {
            self.vampire_count = (count > 0).then_some(count);
        }
    }

    /// Checks the cross-field rules.
    ///
    /// # Errors
    /// Returns [`InvalidSettings`] describing the first rule broken.
    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.min_players < Self::MIN_PLAYERS_FLOOR {
            return Err(InvalidSettings(format!(
                "min_players must be at least {}",
                Self::MIN_PLAYERS_FLOOR
            )));
        }
        if self.max_players < self.min_players {
            return Err(InvalidSettings(
                "max_players must not be below min_players".into(),
            ));
        }
        if self.max_players > Self::MAX_PLAYERS_CEILING {
            return Err(InvalidSettings(format!(
                "max_players must be at most {}",
                Self::MAX_PLAYERS_CEILING
            )));
        }
        for (name, secs) in [
            ("discussion_time", self.discussion_time),
            ("voting_time", self.voting_time),
            ("night_time", self.night_time),
            ("role_reveal_time", self.role_reveal_time),
            ("extra_time_amount", self.extra_time_amount),
        ] {
            if secs == 0 {
                return Err(InvalidSettings(format!("{name} must be at least 1 second")));
            }
            if secs > Self::MAX_DURATION_SECS {
                return Err(InvalidSettings(format!(
                    "{name} must be at most {} seconds",
                    Self::MAX_DURATION_SECS
                )));
            }
        }
        if self.vampire_count == Some(0) {
            return Err(InvalidSettings("vampire_count must be at least 1".into()));
        }
        Ok(())
    }
}

/// A partial [`Settings`]: every field optional. Used by `create_room`,
/// `update_settings` and the `[rooms.defaults]` config table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsPatch {
    pub discussion_time: Option<u32>,
    pub voting_time: Option<u32>,
    pub night_time: Option<u32>,
    pub role_reveal_time: Option<u32>,
    pub min_players: Option<usize>,
    pub max_players: Option<usize>,
    pub vampire_count: Option<usize>,
    pub extra_time_allowed: Option<bool>,
    pub extra_time_amount: Option<u32>,
    pub max_extra_time_uses: Option<u32>,
    pub show_votes_after_game: Option<bool>,
    pub reveal_role_on_elimination: Option<bool>,
}
