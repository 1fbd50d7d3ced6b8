//! Room lifecycle for the Vampire Hunt server.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! [`Room`](hunt_game::Room) state, its game engine and its phase timer.
//! The registry only keeps a handle per room plus the index from
//! connection to room.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates and destroys rooms, routes connections
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RegistryConfig`]: defaults applied to every new room

mod code;
mod error;
mod registry;
mod room;

pub use code::generate_room_code;
pub use error::RoomError;
pub use registry::{Created, Joined, RegistryConfig, RoomRegistry, collect_stats, expired_rooms};
pub use room::{EventSender, LeaveOutcome, RoomHandle, RoomInfo};
