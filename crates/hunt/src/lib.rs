//! # Vampire Hunt
//!
//! Server for a real-time social deduction party game. Clients connect
//! over WebSocket and speak JSON; each room runs as its own actor that
//! owns the game state and its phase countdown.
//!
//! ```text
//! WebSocket (hunt-transport) → JSON commands (hunt-protocol)
//!   → RoomRegistry (hunt-room) → room actor → GameEngine (hunt-game)
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hunt::prelude::*;
//!
//! # async fn run() -> Result<(), HuntError> {
//! let config = ServerConfig::from_env()?;
//! init_logging(&config.logging);
//! HuntServerBuilder::from_config(&config)?.build().await?.run().await
//! # }
//! ```

pub mod config;
mod error;
mod handler;
pub mod logging;
mod server;

pub use config::ServerConfig;
pub use error::HuntError;
pub use handler::{BAD_REQUEST, RECONNECT_FAILED};
pub use logging::init_logging;
pub use server::{HuntServer, HuntServerBuilder};

/// The types most programs need.
pub mod prelude {
    pub use crate::config::{LogFormat, ServerConfig};
    pub use crate::{HuntError, HuntServer, HuntServerBuilder, init_logging};
    pub use hunt_protocol::{
        ClientCommand, Phase, RoomCode, ServerEvent, Settings, SettingsPatch,
    };
    pub use hunt_room::RegistryConfig;
}
