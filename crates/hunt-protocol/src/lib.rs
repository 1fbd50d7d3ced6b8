//! Wire protocol and shared data model for the Vampire Hunt server.
//!
//! - **Types** ([`Phase`], [`Role`], [`RoomSnapshot`], [`VotingRound`]):
//!   the vocabulary shared by the room registry, the game engine and clients.
//! - **Settings** ([`Settings`], [`SettingsPatch`]): per-room game rules
//!   and their validation.
//! - **Messages** ([`ClientCommand`], [`ServerEvent`]): one tagged variant
//!   per command and event name.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientCommand / ServerEvent) → Room registry
//! ```

mod codec;
mod error;
mod message;
mod settings;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use hunt_transport::ConnectionId;
pub use message::{ClientCommand, ServerEvent};
pub use settings::{InvalidSettings, Settings, SettingsPatch};
pub use types::{
    Elimination, Faction, GameResult, ParticipantId, ParticipantView, Phase, PlayerReveal,
    Recipient, Role, RoomCode, RoomSnapshot, RoomStats, Status, VotePhase, VoteRecord,
    VotingRound,
};
