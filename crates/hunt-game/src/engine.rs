//! The phase and voting state machine.
//!
//! ```text
//! LOBBY → ROLE_REVEAL → NIGHT_PHASE → DAY_DISCUSSION → DAY_VOTING
//!                          ▲                              │
//!                          └──────── no winner ───────────┤
//!                                                         ▼
//!                                                     GAME_OVER
//! ```
//!
//! Every operation takes `&mut Room`, mutates it, and returns the events
//! to deliver. Nothing here sleeps: the room's [`Countdown`] says when the
//! next step is due and the caller feeds it back through
//! [`GameEngine::tick`].
//!
//! [`Countdown`]: hunt_tick::Countdown

use std::time::{SystemTime, UNIX_EPOCH};

use hunt_protocol::{
    Elimination, Faction, GameResult, ParticipantId, Phase, Recipient, Role,
    ServerEvent, Status, VotePhase, VoteRecord, VotingRound,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{GameError, Participant, Room, TimerAction};

/// Events produced by one engine step, in delivery order.
pub type Outbox = Vec<(Recipient, ServerEvent)>;

/// Pause between "voting complete" and the tally, so clients can show it.
pub const VOTE_RESOLUTION_DELAY_SECS: u32 = 2;

const ROLE_REVEAL_MESSAGE: &str = "Check your role. Keep it secret!";
const NIGHT_MESSAGE: &str = "Night falls. Vampires, choose your victim.";
const DISCUSSION_MESSAGE: &str = "The village wakes up. Discuss who the vampires might be.";
const VOTING_MESSAGE: &str = "Cast your vote to eliminate a suspect.";

/// Drives rooms through a game.
///
/// Holds only the random source for role shuffles; all game state lives
/// in the [`Room`].
pub struct GameEngine {
    rng: StdRng,
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEngine {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic role assignment, for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of vampires for `players` participants.
    ///
    /// With an override `k`: `min(k, players / 2)`. Without: one per three
    /// players, at least one.
    pub fn vampire_count(players: usize, explicit: Option<usize>) -> usize {
        match explicit {
            Some(k) => k.min(players / 2),
            None => (players / 3).max(1),
        }
    }

    /// Assigns roles, tells each participant theirs, and opens role reveal.
    ///
    /// # Errors
    /// `InvalidPhase` outside the lobby, `NotEnoughPlayers` below the
    /// configured minimum.
    pub fn start_game(&mut self, room: &mut Room) -> Result<Outbox, GameError> {
        if room.phase != Phase::Lobby {
            return Err(GameError::InvalidPhase(room.phase));
        }
        let present = room.participants.len();
        if present < room.settings.min_players {
            return Err(GameError::NotEnoughPlayers {
                needed: room.settings.min_players,
                present,
            });
        }

        let vampires = Self::vampire_count(present, room.settings.vampire_count);
        let mut order: Vec<usize> = (0..present).collect();
        order.shuffle(&mut self.rng);
        for (rank, &idx) in order.iter().enumerate() {
            room.participants[idx].role = Some(if rank < vampires {
                Role::Vampire
            } else {
                Role::Villager
            });
        }

        room.round = 0;
        room.history.clear();
        room.night_victim = None;
        room.last_resolved = None;
        room.resolution_pending = false;
        room.clear_votes();
        room.started_at = Some(Instant::now());
        room.phase = Phase::RoleReveal;
        info!(room = %room.code, players = present, vampires, "game started");

        let mut out: Outbox = room
            .participants
            .iter()
            .filter_map(|p| {
                let role = p.role?;
                Some((
                    Recipient::Participant(p.id.clone()),
                    ServerEvent::RoleAssigned { role },
                ))
            })
            .collect();
        let secs = room.settings.role_reveal_time;
        out.push(phase_change(Phase::Lobby, Phase::RoleReveal, secs, ROLE_REVEAL_MESSAGE));
        start_timer(room, secs, TimerAction::EnterNight, &mut out);
        Ok(out)
    }

    /// Records a vote and, once every eligible voter has voted, announces
    /// completion and schedules the tally.
    ///
    /// # Errors
    /// `InvalidParticipant`, `VoterNotAlive`, `TargetNotAlive`,
    /// `WrongPhaseForVoter`, checked in that order.
    pub fn cast_vote(
        &mut self,
        room: &mut Room,
        voter_id: &ParticipantId,
        target_id: &ParticipantId,
    ) -> Result<Outbox, GameError> {
        let voter = room
            .participant(voter_id)
            .ok_or_else(|| GameError::InvalidParticipant(voter_id.clone()))?;
        let target = room
            .participant(target_id)
            .ok_or_else(|| GameError::InvalidParticipant(target_id.clone()))?;
        if !voter.is_alive() {
            return Err(GameError::VoterNotAlive);
        }
        if !target.is_alive() {
            return Err(GameError::TargetNotAlive);
        }
        match room.phase {
            Phase::NightPhase if !voter.is_vampire() => {
                return Err(GameError::WrongPhaseForVoter(room.phase));
            }
            Phase::NightPhase | Phase::DayVoting => {}
            other => return Err(GameError::WrongPhaseForVoter(other)),
        }
        let target_name = target.name.clone();

        match room.votes.iter_mut().find(|(voter, _)| voter == voter_id) {
            Some(vote) => vote.1 = target_id.clone(),
            None => room.votes.push((voter_id.clone(), target_id.clone())),
        }
        room.submitted.insert(voter_id.clone());
        debug!(room = %room.code, voter = %voter_id, target = %target_id, "vote recorded");

        let mut out = vote_progress(room);
        out.push((
            Recipient::Participant(voter_id.clone()),
            ServerEvent::VoteCast {
                target_id: target_id.clone(),
                target_name,
            },
        ));
        out.extend(self.check_voting_complete(room));
        Ok(out)
    }

    /// Called after a participant in `room` lost their connection.
    ///
    /// They no longer count as an eligible voter, which may complete the
    /// vote that is in progress.
    pub fn on_participant_disconnected(&mut self, room: &mut Room) -> Outbox {
        self.check_voting_complete(room)
    }

    /// Advances the room's countdown by one step and runs its action if it
    /// expired. The room actor calls this whenever the countdown's
    /// deadline passes.
    pub fn tick(&mut self, room: &mut Room) -> Outbox {
        let Some(step) = room.timer.advance() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if step.announce {
            out.push((
                Recipient::All,
                ServerEvent::TimerUpdate {
                    seconds_left: step.remaining,
                },
            ));
        }
        match step.expired {
            Some(TimerAction::EnterNight) => out.extend(self.enter_night(room)),
            Some(TimerAction::OpenVoting) => out.extend(self.enter_voting(room)),
            Some(TimerAction::ResolveVotes) => out.extend(self.resolve_votes(room)),
            None => {}
        }
        out
    }

    /// Tallies the current night or day vote and moves on.
    ///
    /// Runs at most once per `(round, phase)`; any later call for the same
    /// vote is a no-op returning no events.
    pub fn resolve_votes(&mut self, room: &mut Room) -> Outbox {
        let Some(vote_phase) = room.phase.vote_phase() else {
            return Vec::new();
        };
        let key = (room.round, vote_phase);
        if room.last_resolved == Some(key) {
            return Vec::new();
        }
        room.last_resolved = Some(key);
        room.resolution_pending = false;
        room.timer.cancel();

        let selected = tally(&room.votes);
        let record = VotingRound {
            round: room.round,
            phase: vote_phase,
            votes: room
                .votes
                .iter()
                .map(|(voter, target)| VoteRecord {
                    voter_id: voter.clone(),
                    voter_name: name_of(room, voter),
                    target_id: target.clone(),
                    target_name: name_of(room, target),
                })
                .collect(),
            eliminated: selected.as_ref().map(|id| Elimination {
                id: id.clone(),
                name: name_of(room, id),
            }),
            timestamp: unix_millis(),
        };
        room.history.push(record);
        room.clear_votes();
        debug!(room = %room.code, round = room.round, phase = ?vote_phase, selected = ?selected, "votes resolved");

        match vote_phase {
            VotePhase::Night => {
                room.night_victim = selected;
                self.enter_discussion(room)
            }
            VotePhase::Day => {
                let mut out = Vec::new();
                if let Some(id) = selected {
                    let reveal = room.settings.reveal_role_on_elimination;
                    out.extend(eliminate(room, &id, VotePhase::Day, reveal));
                }
                match evaluate_winner(&room.participants) {
                    Some(winner) => out.extend(self.end_game(room, winner)),
                    None => out.extend(self.enter_night(room)),
                }
                out
            }
        }
    }

    /// Ends the game: every role is disclosed along with the result.
    pub fn end_game(&mut self, room: &mut Room, winner: Faction) -> Outbox {
        room.phase = Phase::GameOver;
        room.timer.cancel();
        room.resolution_pending = false;

        let result = game_result(room, winner);
        info!(
            room = %room.code,
            winner = ?result.winner,
            rounds = result.rounds,
            duration_secs = result.duration,
            "game over"
        );
        let event = ServerEvent::GameOver {
            winner,
            players: room.participants.iter().filter_map(Participant::reveal).collect(),
            rounds: result.rounds,
            duration: result.duration,
            history: result.voting_history.clone(),
        };
        room.result = Some(result);
        vec![(Recipient::All, event)]
    }

    /// Grants extra discussion time.
    ///
    /// Only the announced length grows; the running countdown keeps its
    /// original expiry.
    ///
    /// # Errors
    /// `NoActiveTimer`, `WrongPhase`, `ExtraTimeDisabled`,
    /// `ExtraTimeExhausted`, checked in that order.
    pub fn extend_time(&mut self, room: &mut Room, seconds: u32) -> Result<Outbox, GameError> {
        if !room.timer.is_active() {
            return Err(GameError::NoActiveTimer);
        }
        if room.phase != Phase::DayDiscussion {
            return Err(GameError::WrongPhase(room.phase));
        }
        if !room.settings.extra_time_allowed {
            return Err(GameError::ExtraTimeDisabled);
        }
        let max = room.settings.max_extra_time_uses;
        if room.extra_time_used >= max {
            return Err(GameError::ExtraTimeExhausted(max));
        }
        room.extra_time_used += 1;
        room.timer_duration = room.timer_duration.saturating_add(seconds);
        debug!(room = %room.code, seconds, used = room.extra_time_used, "time extended");
        Ok(vec![(
            Recipient::All,
            ServerEvent::TimeExtended {
                added_seconds: seconds,
                total: room.timer_duration,
                remaining: max - room.extra_time_used,
            },
        )])
    }

    fn enter_night(&mut self, room: &mut Room) -> Outbox {
        let from = room.phase;
        room.phase = Phase::NightPhase;
        room.clear_votes();
        room.round += 1;
        info!(room = %room.code, round = room.round, "night phase");

        let secs = room.settings.night_time;
        let mut out = vec![phase_change(from, Phase::NightPhase, secs, NIGHT_MESSAGE)];
        start_timer(room, secs, TimerAction::ResolveVotes, &mut out);
        out
    }

    fn enter_discussion(&mut self, room: &mut Room) -> Outbox {
        let from = room.phase;
        room.phase = Phase::DayDiscussion;
        room.extra_time_used = 0;

        let mut out = Vec::new();
        if let Some(victim) = room.night_victim.take() {
            out.extend(eliminate(room, &victim, VotePhase::Night, false));
        }
        if let Some(winner) = evaluate_winner(&room.participants) {
            out.extend(self.end_game(room, winner));
            return out;
        }
        info!(room = %room.code, round = room.round, "day discussion");

        let secs = room.settings.discussion_time;
        out.push(phase_change(from, Phase::DayDiscussion, secs, DISCUSSION_MESSAGE));
        start_timer(room, secs, TimerAction::OpenVoting, &mut out);
        out
    }

    fn enter_voting(&mut self, room: &mut Room) -> Outbox {
        let from = room.phase;
        room.phase = Phase::DayVoting;
        room.clear_votes();
        info!(room = %room.code, round = room.round, "day voting");

        let secs = room.settings.voting_time;
        let mut out = vec![phase_change(from, Phase::DayVoting, secs, VOTING_MESSAGE)];
        start_timer(room, secs, TimerAction::ResolveVotes, &mut out);
        out
    }

    /// If everyone eligible has voted and no tally is scheduled yet,
    /// replaces the phase timer with the short resolution delay.
    fn check_voting_complete(&mut self, room: &mut Room) -> Outbox {
        let Some(vote_phase) = room.phase.vote_phase() else {
            return Vec::new();
        };
        if room.resolution_pending || room.last_resolved == Some((room.round, vote_phase)) {
            return Vec::new();
        }
        let all_in = eligible_voters(room).all(|p| room.submitted.contains(&p.id));
        if !all_in {
            return Vec::new();
        }
        room.resolution_pending = true;
        room.timer
            .arm_quiet(VOTE_RESOLUTION_DELAY_SECS, TimerAction::ResolveVotes);
        debug!(room = %room.code, phase = ?vote_phase, "all eligible votes in");
        vec![(
            Recipient::All,
            ServerEvent::VotingComplete { phase: vote_phase },
        )]
    }
}

/// Picks the target with the strictly greatest number of votes.
///
/// Ties go to the target whose first vote was recorded earliest. No votes
/// select no one.
pub fn tally(votes: &[(ParticipantId, ParticipantId)]) -> Option<ParticipantId> {
    let mut counts: Vec<(&ParticipantId, usize)> = Vec::new();
    for (_, target) in votes {
        match counts.iter_mut().find(|(t, _)| *t == target) {
            Some((_, n)) => *n += 1,
            None => counts.push((target, 1)),
        }
    }
    let mut best: Option<(&ParticipantId, usize)> = None;
    for (target, n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((target, n));
        }
    }
    best.map(|(target, _)| target.clone())
}

/// Decides the game from the alive participants.
///
/// No vampires alive: villagers win. Vampires at least as many as
/// villagers: vampires win. Otherwise the game goes on.
pub fn evaluate_winner(participants: &[Participant]) -> Option<Faction> {
    let (vampires, villagers) = participants
        .iter()
        .filter(|p| p.is_alive())
        .fold((0usize, 0usize), |(v, h), p| match p.role {
            Some(Role::Vampire) => (v + 1, h),
            Some(Role::Villager) => (v, h + 1),
            None => (v, h),
        });
    if vampires == 0 {
        Some(Faction::Villagers)
    } else if vampires >= villagers {
        Some(Faction::Vampires)
    } else {
        None
    }
}

/// Builds the result of a finished game.
///
/// Survivors are the alive members of the winning side.
fn game_result(room: &Room, winner: Faction) -> GameResult {
    let survivors = room
        .participants
        .iter()
        .filter(|p| p.is_alive() && p.role.map(Role::faction) == Some(winner))
        .filter_map(Participant::reveal)
        .collect();
    let eliminated = room
        .participants
        .iter()
        .filter(|p| p.status == Status::Eliminated)
        .filter_map(Participant::reveal)
        .collect();
    GameResult {
        winner,
        survivors,
        eliminated,
        rounds: room.round,
        duration: room
            .started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or_default(),
        voting_history: room
            .settings
            .show_votes_after_game
            .then(|| room.history.clone()),
    }
}

/// Alive participants who may vote in the current phase.
fn eligible_voters(room: &Room) -> impl Iterator<Item = &Participant> {
    let night = room.phase == Phase::NightPhase;
    room.participants
        .iter()
        .filter(move |p| p.is_alive() && (!night || p.is_vampire()))
}

/// Progress of the current vote. Kept among the vampires at night, since
/// the list of pending names would give them away.
fn vote_progress(room: &Room) -> Outbox {
    let (voted, waiting_for) = eligible_voters(room).fold(
        (0usize, Vec::new()),
        |(voted, mut waiting), p| {
            if room.submitted.contains(&p.id) {
                (voted + 1, waiting)
            } else {
                waiting.push(p.name.clone());
                (voted, waiting)
            }
        },
    );
    let total = voted + waiting_for.len();
    let percentage = if total == 0 {
        100
    } else {
        (voted * 100 / total) as u32
    };
    let event = ServerEvent::VoteProgress {
        voted,
        total,
        percentage,
        waiting_for,
    };

    if room.phase == Phase::NightPhase {
        eligible_voters(room)
            .map(|p| (Recipient::Participant(p.id.clone()), event.clone()))
            .collect()
    } else {
        vec![(Recipient::All, event)]
    }
}

fn eliminate(room: &mut Room, id: &ParticipantId, phase: VotePhase, reveal_role: bool) -> Outbox {
    let Some(p) = room.participant_mut(id) else {
        return Vec::new();
    };
    p.status = Status::Eliminated;
    let event = ServerEvent::PlayerEliminated {
        id: p.id.clone(),
        name: p.name.clone(),
        phase,
        role: if reveal_role { p.role } else { None },
    };
    info!(room = %room.code, participant = %id, ?phase, "participant eliminated");
    vec![(Recipient::All, event)]
}

fn start_timer(room: &mut Room, secs: u32, action: TimerAction, out: &mut Outbox) {
    room.timer.arm(secs, action);
    room.timer_duration = secs;
    out.push((Recipient::All, ServerEvent::TimerUpdate { seconds_left: secs }));
}

fn phase_change(from: Phase, to: Phase, duration: u32, message: &str) -> (Recipient, ServerEvent) {
    (
        Recipient::All,
        ServerEvent::PhaseChange {
            from,
            to,
            duration,
            message: message.to_owned(),
        },
    )
}

fn name_of(room: &Room, id: &ParticipantId) -> String {
    room.participant(id)
        .map(|p| p.name.clone())
        .unwrap_or_default()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
