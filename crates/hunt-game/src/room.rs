//! Per-room state.
//!
//! A [`Room`] is plain data plus the invariants that do not depend on the
//! game rules: host bookkeeping, membership, the connection each
//! participant is reachable on. Phase transitions live in the engine.

use std::collections::HashSet;

use hunt_protocol::{
    ConnectionId, GameResult, ParticipantId, ParticipantView, Phase, PlayerReveal, Role, RoomCode,
    RoomSnapshot, Settings, SettingsPatch, Status, VotePhase, VotingRound,
};
use hunt_tick::Countdown;
use tokio::time::Instant;

use crate::GameError;

/// Longest display name accepted, in characters.
pub const MAX_NAME_LEN: usize = 24;

/// Trims a display name and checks it is usable.
///
/// # Errors
/// [`GameError::InvalidName`] if the trimmed name is empty or longer than
/// [`MAX_NAME_LEN`] characters.
pub fn normalize_name(raw: &str) -> Result<String, GameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GameError::InvalidName("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(GameError::InvalidName(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_owned())
}

/// What happens when a room's countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Role reveal is over, or a day vote resolved without a winner.
    EnterNight,
    /// Discussion is over.
    OpenVoting,
    /// Tally the current night or day vote.
    ResolveVotes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    /// `None` once the participant's connection has gone away mid-game.
    pub connection: Option<ConnectionId>,
    pub name: String,
    /// Unassigned until the game starts.
    pub role: Option<Role>,
    pub status: Status,
    pub is_host: bool,
}

impl Participant {
    pub fn is_alive(&self) -> bool {
        self.status == Status::Alive
    }

    pub fn is_vampire(&self) -> bool {
        self.role == Some(Role::Vampire)
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            is_host: self.is_host,
        }
    }

    /// Role disclosure for the end of the game. `None` before roles exist.
    pub fn reveal(&self) -> Option<PlayerReveal> {
        Some(PlayerReveal {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role?,
            status: self.status,
        })
    }
}

/// One game room.
pub struct Room {
    pub(crate) code: RoomCode,
    pub(crate) phase: Phase,
    pub(crate) settings: Settings,
    /// In join order. The host is promoted from the front.
    pub(crate) participants: Vec<Participant>,
    pub(crate) round: u32,
    /// `(voter, target)` in the order votes were first cast. A changed
    /// vote keeps its original position.
    pub(crate) votes: Vec<(ParticipantId, ParticipantId)>,
    pub(crate) submitted: HashSet<ParticipantId>,
    pub(crate) history: Vec<VotingRound>,
    pub(crate) night_victim: Option<ParticipantId>,
    pub(crate) created_at: Instant,
    pub(crate) started_at: Option<Instant>,
    pub(crate) timer: Countdown<TimerAction>,
    /// Length of the current phase as told to clients, extensions included.
    pub(crate) timer_duration: u32,
    pub(crate) extra_time_used: u32,
    /// Set between "voting complete" and the resolution it schedules.
    pub(crate) resolution_pending: bool,
    pub(crate) last_resolved: Option<(u32, VotePhase)>,
    pub(crate) result: Option<GameResult>,
}

impl Room {
    /// Creates a lobby with the host as its only participant.
    ///
    /// # Errors
    /// [`GameError::InvalidSettings`] or [`GameError::InvalidName`].
    pub fn new(
        code: RoomCode,
        host_id: ParticipantId,
        host_connection: ConnectionId,
        host_name: &str,
        settings: Settings,
    ) -> Result<Self, GameError> {
        settings.validate()?;
        let name = normalize_name(host_name)?;
        Ok(Self {
            code,
            phase: Phase::Lobby,
            settings,
            participants: vec![Participant {
                id: host_id,
                connection: Some(host_connection),
                name,
                role: None,
                status: Status::Alive,
                is_host: true,
            }],
            round: 0,
            votes: Vec::new(),
            submitted: HashSet::new(),
            history: Vec::new(),
            night_victim: None,
            created_at: Instant::now(),
            started_at: None,
            timer: Countdown::new(),
            timer_duration: 0,
            extra_time_used: 0,
            resolution_pending: false,
            last_resolved: None,
            result: None,
        })
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub(crate) fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.id == id)
    }

    pub fn participant_by_connection(&self, conn: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection == Some(conn))
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host)
    }

    pub fn is_host(&self, id: &ParticipantId) -> bool {
        self.participant(id).is_some_and(|p| p.is_host)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Live connections of this room's participants.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants.iter().filter_map(|p| p.connection)
    }

    pub fn votes(&self) -> &[(ParticipantId, ParticipantId)] {
        &self.votes
    }

    pub fn has_voted(&self, id: &ParticipantId) -> bool {
        self.submitted.contains(id)
    }

    pub fn history(&self) -> &[VotingRound] {
        &self.history
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn timer_remaining(&self) -> Option<u32> {
        self.timer.remaining()
    }

    pub fn timer_action(&self) -> Option<TimerAction> {
        self.timer.action().copied()
    }

    /// When the room's countdown next needs attention.
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn timer_duration(&self) -> u32 {
        self.timer_duration
    }

    pub fn extra_time_used(&self) -> u32 {
        self.extra_time_used
    }

    /// How the game ended. `None` until it has.
    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    /// Adds a non-host participant to the lobby.
    ///
    /// # Errors
    /// `InvalidName`, `RoomFull` or `GameInProgress`, checked in that order.
    pub fn admit(
        &mut self,
        id: ParticipantId,
        connection: ConnectionId,
        name: &str,
    ) -> Result<(), GameError> {
        let name = normalize_name(name)?;
        if self.participants.len() >= self.settings.max_players {
            return Err(GameError::RoomFull(self.code.clone()));
        }
        if self.phase != Phase::Lobby {
            return Err(GameError::GameInProgress(self.code.clone()));
        }
        self.participants.push(Participant {
            id,
            connection: Some(connection),
            name,
            role: None,
            status: Status::Alive,
            is_host: false,
        });
        Ok(())
    }

    /// Removes a participant outright. If they were host, the first
    /// remaining participant becomes host.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        let idx = self.participants.iter().position(|p| &p.id == id)?;
        let gone = self.participants.remove(idx);
        if gone.is_host {
            if let Some(next) = self.participants.first_mut() {
                next.is_host = true;
            }
        }
        self.votes.retain(|(voter, _)| voter != id);
        self.submitted.remove(id);
        Some(gone)
    }

    /// Drops a participant's connection but keeps them in the game.
    /// Alive participants become `DISCONNECTED`; eliminated ones stay so.
    pub fn mark_disconnected(&mut self, id: &ParticipantId) -> bool {
        let Some(p) = self.participant_mut(id) else {
            return false;
        };
        p.connection = None;
        if p.status == Status::Alive {
            p.status = Status::Disconnected;
        }
        true
    }

    /// Binds a dropped participant to a new connection.
    ///
    /// Only works mid-game and only for a participant with no live
    /// connection. Returns `false` otherwise.
    pub fn rebind(&mut self, id: &ParticipantId, connection: ConnectionId) -> bool {
        if !self.phase.is_in_game() {
            return false;
        }
        let Some(p) = self.participant_mut(id) else {
            return false;
        };
        if p.connection.is_some() {
            return false;
        }
        p.connection = Some(connection);
        if p.status == Status::Disconnected {
            p.status = Status::Alive;
        }
        true
    }

    /// Merges a partial settings update. Lobby only.
    ///
    /// # Errors
    /// `InvalidPhase` outside the lobby, `InvalidSettings` if the merged
    /// settings break a rule or cannot hold the players already present.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<(), GameError> {
        if self.phase != Phase::Lobby {
            return Err(GameError::InvalidPhase(self.phase));
        }
        let next = self.settings.merged(patch);
        next.validate()?;
        if next.max_players < self.participants.len() {
            return Err(GameError::InvalidSettings(hunt_protocol::InvalidSettings(
                format!(
                    "max_players must be at least the {} players already here",
                    self.participants.len()
                ),
            )));
        }
        self.settings = next;
        Ok(())
    }

    /// The sanitized view sent to clients. Never includes roles.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            host_id: self
                .host()
                .map(|h| h.id.clone())
                .unwrap_or_else(|| ParticipantId::new("")),
            phase: self.phase,
            settings: self.settings.clone(),
            round: self.round,
            participants: self.participants.iter().map(Participant::view).collect(),
        }
    }

    pub(crate) fn clear_votes(&mut self) {
        self.votes.clear();
        self.submitted.clear();
    }
}
