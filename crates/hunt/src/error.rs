//! Unified error type for the server.

use hunt_game::GameError;
use hunt_protocol::ProtocolError;
use hunt_room::RoomError;
use hunt_transport::TransportError;

/// Top-level error that wraps every crate's error.
///
/// The `#[from]` attributes let `?` lift sub-crate errors straight into
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum HuntError {
    /// Connection, send or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode or decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The registry or a room rejected a request.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The game rules rejected a request.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The config file exists but could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
