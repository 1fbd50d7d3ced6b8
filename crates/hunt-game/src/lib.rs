//! Room state and the game state machine for Vampire Hunt.
//!
//! # Key types
//!
//! - [`Room`]: one room's participants, phase, votes, history and timer
//! - [`GameEngine`]: drives a [`Room`] from lobby to game over and returns
//!   the events each step produces as an [`Outbox`]
//! - [`GameError`]: every way a request can be rejected
//!
//! The engine never owns a room. Callers lend it `&mut Room` for one
//! operation; the room actor in `hunt-room` is the only caller at runtime.

mod engine;
mod error;
mod room;

pub use engine::{GameEngine, Outbox, VOTE_RESOLUTION_DELAY_SECS, evaluate_winner, tally};
pub use error::GameError;
pub use room::{MAX_NAME_LEN, Participant, Room, TimerAction, normalize_name};
