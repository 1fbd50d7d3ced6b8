//! Inbound commands and outbound events.
//!
//! Both enums are internally tagged: every frame is a JSON object whose
//! `type` field names the variant, e.g.
//!
//! ```json
//! { "type": "cast_vote", "code": "K7QX2M", "target_id": "9f1c…" }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    Faction, ParticipantId, Phase, PlayerReveal, Role, RoomCode, RoomSnapshot, RoomStats,
    SettingsPatch, VotePhase, VotingRound,
};

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    CreateRoom {
        name: String,
        #[serde(default)]
        settings: Option<SettingsPatch>,
    },
    JoinRoom {
        code: RoomCode,
        name: String,
    },
    /// Host only.
    StartGame {
        code: RoomCode,
    },
    CastVote {
        code: RoomCode,
        target_id: ParticipantId,
    },
    /// Host only, lobby only.
    UpdateSettings {
        code: RoomCode,
        settings: SettingsPatch,
    },
    /// Host only, during day discussion.
    ExtendTime {
        code: RoomCode,
    },
    LeaveRoom,
    /// Rebinds a dropped participant to this connection.
    Reconnect {
        code: RoomCode,
        participant_id: ParticipantId,
    },
    /// Health query.
    Status,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomCreated {
        code: RoomCode,
        participant_id: ParticipantId,
        room: RoomSnapshot,
    },
    RoomJoined {
        participant_id: ParticipantId,
        room: RoomSnapshot,
    },
    RoomUpdate {
        room: RoomSnapshot,
    },
    PhaseChange {
        from: Phase,
        to: Phase,
        duration: u32,
        message: String,
    },
    /// Only ever unicast.
    RoleAssigned {
        role: Role,
    },
    TimerUpdate {
        seconds_left: u32,
    },
    VoteProgress {
        voted: usize,
        total: usize,
        percentage: u32,
        /// Names of eligible voters who have not voted yet.
        waiting_for: Vec<String>,
    },
    /// Personal acknowledgement sent to the voter.
    VoteCast {
        target_id: ParticipantId,
        target_name: String,
    },
    VotingComplete {
        phase: VotePhase,
    },
    PlayerEliminated {
        id: ParticipantId,
        name: String,
        phase: VotePhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },
    TimeExtended {
        added_seconds: u32,
        total: u32,
        /// Extensions left this discussion.
        remaining: u32,
    },
    GameOver {
        winner: Faction,
        players: Vec<PlayerReveal>,
        rounds: u32,
        duration: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<Vec<VotingRound>>,
    },
    Status(RoomStats),
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    /// Builds an `error` event.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// `true` for events that disclose a role.
    pub fn reveals_role(&self) -> bool {
        match self {
            ServerEvent::RoleAssigned { .. } | ServerEvent::GameOver { .. } => true,
            ServerEvent::PlayerEliminated { role, .. } => role.is_some(),
            _ => false,
        }
    }
}
