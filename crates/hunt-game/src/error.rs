//! Error taxonomy for room and game operations.

use hunt_protocol::{InvalidSettings, ParticipantId, Phase, RoomCode};

/// Why a request against a room was rejected.
///
/// Every variant is request-scoped: the room is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    #[error("room {0} already has a game in progress")]
    GameInProgress(RoomCode),

    #[error("not allowed during {0}")]
    InvalidPhase(Phase),

    #[error("need at least {needed} players to start, have {present}")]
    NotEnoughPlayers { needed: usize, present: usize },

    #[error("unknown participant {0}")]
    InvalidParticipant(ParticipantId),

    #[error("eliminated players cannot vote")]
    VoterNotAlive,

    #[error("cannot vote for an eliminated player")]
    TargetNotAlive,

    #[error("you cannot vote during {0}")]
    WrongPhaseForVoter(Phase),

    #[error("no timer is running")]
    NoActiveTimer,

    #[error("time can only be extended during discussion, not {0}")]
    WrongPhase(Phase),

    #[error("extra time is disabled in this room")]
    ExtraTimeDisabled,

    #[error("extra time already used {0} times")]
    ExtraTimeExhausted(u32),

    #[error("only the host can do that")]
    PermissionDenied,

    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] InvalidSettings),

    #[error("invalid name: {0}")]
    InvalidName(String),
}

impl GameError {
    /// Stable machine-readable code sent in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::RoomFull(_) => "ROOM_FULL",
            Self::GameInProgress(_) => "GAME_IN_PROGRESS",
            Self::InvalidPhase(_) => "INVALID_PHASE",
            Self::NotEnoughPlayers { .. } => "NOT_ENOUGH_PLAYERS",
            Self::InvalidParticipant(_) => "INVALID_PARTICIPANT",
            Self::VoterNotAlive => "VOTER_NOT_ALIVE",
            Self::TargetNotAlive => "TARGET_NOT_ALIVE",
            Self::WrongPhaseForVoter(_) => "WRONG_PHASE_FOR_VOTER",
            Self::NoActiveTimer => "NO_ACTIVE_TIMER",
            Self::WrongPhase(_) => "WRONG_PHASE",
            Self::ExtraTimeDisabled => "EXTRA_TIME_DISABLED",
            Self::ExtraTimeExhausted(_) => "EXTRA_TIME_EXHAUSTED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidSettings(_) => "INVALID_SETTINGS",
            Self::InvalidName(_) => "INVALID_NAME",
        }
    }
}
