//! The shared vocabulary: identities, phases, roles, and the read-only
//! views of a room that travel to clients.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Settings;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque participant identity.
///
/// Minted by the room registry as a random token and handed to the client
/// in `room_created` / `room_joined`. The client presents it again to
/// reconnect after a dropped connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A short, human-shareable room code such as `K7QX2M`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of characters in a generated code.
    pub const LEN: usize = 6;

    /// Characters a generated code is drawn from.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code in canonical form: surrounding whitespace removed,
    /// letters upper-cased. Players type codes by hand.
    pub fn normalized(&self) -> Self {
        Self(self.0.trim().to_ascii_uppercase())
    }

    /// `true` if the code has the generated length and alphabet.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::LEN && self.0.bytes().all(|b| Self::ALPHABET.contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Phase, roles, status
// ---------------------------------------------------------------------------

/// Where a room is in the game.
///
/// ```text
/// LOBBY → ROLE_REVEAL → NIGHT_PHASE → DAY_DISCUSSION → DAY_VOTING ─┐
///                           ▲                                      │
///                           └──────────────────────────────────────┤
///                                                      GAME_OVER ◄─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Lobby,
    RoleReveal,
    NightPhase,
    DayDiscussion,
    DayVoting,
    GameOver,
}

impl Phase {
    /// `GAME_OVER` is the only terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::GameOver)
    }

    /// `true` between `startGame` and `endGame`.
    pub fn is_in_game(self) -> bool {
        !matches!(self, Phase::Lobby | Phase::GameOver)
    }

    /// The voting sub-phase this phase collects votes for, if any.
    pub fn vote_phase(self) -> Option<VotePhase> {
        match self {
            Phase::NightPhase => Some(VotePhase::Night),
            Phase::DayVoting => Some(VotePhase::Day),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Phase::Lobby => "LOBBY",
            Phase::RoleReveal => "ROLE_REVEAL",
            Phase::NightPhase => "NIGHT_PHASE",
            Phase::DayDiscussion => "DAY_DISCUSSION",
            Phase::DayVoting => "DAY_VOTING",
            Phase::GameOver => "GAME_OVER",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tag a [`VotingRound`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VotePhase {
    Night,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Vampire,
    Villager,
}

impl Role {
    pub fn faction(self) -> Faction {
        match self {
            Role::Vampire => Faction::Vampires,
            Role::Villager => Faction::Villagers,
        }
    }
}

/// A winning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Faction {
    Vampires,
    Villagers,
}

/// Life status of a participant.
///
/// `ELIMINATED` is permanent. `DISCONNECTED` only replaces `ALIVE` and
/// flips back when the participant reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Alive,
    Eliminated,
    Disconnected,
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who an outbound event is for.
///
/// The game engine returns `Vec<(Recipient, ServerEvent)>`; the room actor
/// resolves each recipient to outbound channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every participant in the room that still has a connection.
    All,
    /// One participant only.
    Participant(ParticipantId),
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// What other players may know about a participant. Never carries a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub name: String,
    pub status: Status,
    pub is_host: bool,
}

/// The sanitized room view carried by `room_created`, `room_joined` and
/// `room_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub host_id: ParticipantId,
    pub phase: Phase,
    pub settings: Settings,
    pub round: u32,
    pub participants: Vec<ParticipantView>,
}

impl RoomSnapshot {
    pub fn participant(&self, id: &ParticipantId) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| &p.id == id)
    }
}

/// A participant with their role disclosed, sent once the game is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerReveal {
    pub id: ParticipantId,
    pub name: String,
    pub role: Role,
    pub status: Status,
}

// ---------------------------------------------------------------------------
// History and results
// ---------------------------------------------------------------------------

/// One vote in a concluded round, with names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_id: ParticipantId,
    pub voter_name: String,
    pub target_id: ParticipantId,
    pub target_name: String,
}

/// Who a round eliminated. Roles are never part of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elimination {
    pub id: ParticipantId,
    pub name: String,
}

/// History entry for one concluded night or day vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingRound {
    pub round: u32,
    pub phase: VotePhase,
    pub votes: Vec<VoteRecord>,
    pub eliminated: Option<Elimination>,
    /// Unix milliseconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Faction,
    pub survivors: Vec<PlayerReveal>,
    pub eliminated: Vec<PlayerReveal>,
    pub rounds: u32,
    /// Whole seconds from game start to game end.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_history: Option<Vec<VotingRound>>,
}

/// Counts reported by the `status` health query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomStats {
    pub rooms: usize,
    pub participants: usize,
    pub active_games: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_normalizes_case_and_whitespace() {
        let code = RoomCode::new("  ab12cd ").normalized();
        assert_eq!(code.as_str(), "AB12CD");
        assert!(code.is_well_formed());
    }

    #[test]
    fn test_room_code_rejects_wrong_length_and_alphabet() {
        assert!(!RoomCode::new("ABC").is_well_formed());
        assert!(!RoomCode::new("AB-12C").is_well_formed());
        assert!(!RoomCode::new("ab12cd").is_well_formed());
    }

    #[test]
    fn test_phase_classification() {
        assert!(Phase::GameOver.is_terminal());
        assert!(!Phase::Lobby.is_in_game());
        assert!(Phase::DayDiscussion.is_in_game());
        assert_eq!(Phase::NightPhase.vote_phase(), Some(VotePhase::Night));
        assert_eq!(Phase::DayVoting.vote_phase(), Some(VotePhase::Day));
        assert_eq!(Phase::DayDiscussion.vote_phase(), None);
    }

    #[test]
    fn test_phase_display_matches_wire_name() {
        for phase in [
            Phase::Lobby,
            Phase::RoleReveal,
            Phase::NightPhase,
            Phase::DayDiscussion,
            Phase::DayVoting,
            Phase::GameOver,
        ] {
            let wire = serde_json::to_string(&phase).unwrap();
            assert_eq!(wire, format!("\"{phase}\""));
        }
    }

    #[test]
    fn test_role_faction() {
        assert_eq!(Role::Vampire.faction(), Faction::Vampires);
        assert_eq!(Role::Villager.faction(), Faction::Villagers);
    }

    #[test]
    fn test_game_result_omits_absent_history() {
        let result = GameResult {
            winner: Faction::Villagers,
            survivors: vec![],
            eliminated: vec![],
            rounds: 2,
            duration: 95,
            voting_history: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("voting_history").is_none());
        assert_eq!(json["winner"], "VILLAGERS");
    }
}
