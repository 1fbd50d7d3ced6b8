//! Error types for the room layer.

use hunt_game::GameError;
use hunt_protocol::{ConnectionId, RoomCode};

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room or the game rejected the request.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The connection already belongs to a room.
    #[error("{0} is already in room {1}")]
    AlreadyInRoom(ConnectionId, RoomCode),

    /// The connection is not a participant of the room it addressed.
    #[error("{0} is not in a room")]
    NotInRoom(ConnectionId),

    /// The room's actor is gone or not answering.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// Stable machine-readable code sent in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Game(e) => e.code(),
            Self::AlreadyInRoom(..) => "ALREADY_IN_ROOM",
            Self::NotInRoom(_) => "NOT_IN_ROOM",
            Self::Unavailable(_) => "ROOM_UNAVAILABLE",
        }
    }
}
