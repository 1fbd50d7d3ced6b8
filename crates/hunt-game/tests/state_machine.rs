//! Drives whole games through the engine with Tokio's clock paused, so
//! every phase timer elapses instantly and deterministically.

use std::time::Duration;

use hunt_game::{GameEngine, GameError, Outbox, Room, TimerAction, VOTE_RESOLUTION_DELAY_SECS};
use hunt_protocol::{
    ConnectionId, Faction, ParticipantId, Phase, Recipient, Role, RoomCode, ServerEvent,
    Settings, Status, VotePhase,
};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn pid(i: usize) -> ParticipantId {
    ParticipantId::new(format!("p{i}"))
}

fn quick_settings() -> Settings {
    Settings {
        min_players: 4,
        night_time: 5,
        discussion_time: 5,
        voting_time: 5,
        role_reveal_time: 3,
        ..Settings::default()
    }
}

/// A lobby with `n` participants `p0..p{n-1}`; `p0` is host.
fn lobby(n: usize, settings: Settings) -> Room {
    let mut room = Room::new(
        RoomCode::new("HUNT01"),
        pid(0),
        ConnectionId::new(100),
        "P0",
        settings,
    )
    .expect("valid room");
    for i in 1..n {
        room.admit(pid(i), ConnectionId::new(100 + i as u64), &format!("P{i}"))
            .expect("admit");
    }
    room
}

fn with_role(room: &Room, role: Role) -> Vec<ParticipantId> {
    room.participants()
        .iter()
        .filter(|p| p.role == Some(role))
        .map(|p| p.id.clone())
        .collect()
}

/// Waits for the room's next countdown step and applies it.
async fn step(engine: &mut GameEngine, room: &mut Room) -> Outbox {
    hunt_tick::sleep_until(room.timer_deadline()).await;
    engine.tick(room)
}

/// Steps the countdown until the room is in `phase`, collecting events.
async fn run_until(engine: &mut GameEngine, room: &mut Room, phase: Phase) -> Outbox {
    let mut out = Vec::new();
    while room.phase() != phase {
        assert!(
            room.timer_deadline().is_some(),
            "stalled in {} waiting for {phase}",
            room.phase()
        );
        out.extend(step(engine, room).await);
    }
    out
}

fn count<F: Fn(&ServerEvent) -> bool>(out: &Outbox, f: F) -> usize {
    out.iter().filter(|(_, e)| f(e)).count()
}

fn eliminations(out: &Outbox) -> Vec<&ServerEvent> {
    out.iter()
        .map(|(_, e)| e)
        .filter(|e| matches!(e, ServerEvent::PlayerEliminated { .. }))
        .collect()
}

/// Starts a 4-player game and plays through role reveal into the night.
async fn started(engine: &mut GameEngine, settings: Settings) -> Room {
    let mut room = lobby(4, settings);
    engine.start_game(&mut room).expect("start");
    run_until(engine, &mut room, Phase::NightPhase).await;
    room
}

// =========================================================================
// Start and role assignment
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_default_vampire_count_for_every_room_size() {
    for n in 4..=10 {
        let mut engine = GameEngine::with_seed(n as u64);
        let mut room = lobby(n, Settings::default());
        engine.start_game(&mut room).unwrap();
        assert_eq!(with_role(&room, Role::Vampire).len(), (n / 3).max(1), "n = {n}");
        assert_eq!(
            with_role(&room, Role::Villager).len(),
            n - (n / 3).max(1),
            "n = {n}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_vampire_override_is_capped_at_half() {
    let mut engine = GameEngine::with_seed(7);
    let settings = Settings {
        vampire_count: Some(4),
        ..Settings::default()
    };
    let mut room = lobby(6, settings);
    engine.start_game(&mut room).unwrap();
    assert_eq!(with_role(&room, Role::Vampire).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_roles_are_unicast_once_each_and_never_broadcast() {
    let mut engine = GameEngine::with_seed(1);
    let mut room = lobby(5, Settings::default());
    let out = engine.start_game(&mut room).unwrap();

    for p in room.participants() {
        let mine: Vec<_> = out
            .iter()
            .filter(|(to, e)| {
                *to == Recipient::Participant(p.id.clone())
                    && matches!(e, ServerEvent::RoleAssigned { .. })
            })
            .collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(
            mine[0].1,
            ServerEvent::RoleAssigned {
                role: p.role.unwrap()
            }
        );
    }
    assert!(
        !out.iter()
            .any(|(to, e)| *to == Recipient::All && e.reveals_role()),
        "no broadcast may carry a role"
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_minimum_players() {
    let mut engine = GameEngine::with_seed(1);
    let mut room = lobby(3, quick_settings());
    assert_eq!(
        engine.start_game(&mut room).unwrap_err(),
        GameError::NotEnoughPlayers {
            needed: 4,
            present: 3
        }
    );
    assert_eq!(room.phase(), Phase::Lobby);
    assert!(room.participants().iter().all(|p| p.role.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_invalid_phase() {
    let mut engine = GameEngine::with_seed(1);
    let mut room = lobby(4, quick_settings());
    engine.start_game(&mut room).unwrap();
    assert_eq!(
        engine.start_game(&mut room).unwrap_err(),
        GameError::InvalidPhase(Phase::RoleReveal)
    );
}

#[tokio::test(start_paused = true)]
async fn test_four_player_scenario_reaches_night_after_reveal() {
    let mut engine = GameEngine::with_seed(3);
    let mut room = lobby(4, quick_settings());

    let out = engine.start_game(&mut room).unwrap();
    assert_eq!(
        count(&out, |e| matches!(e, ServerEvent::RoleAssigned { .. })),
        4
    );
    assert_eq!(room.phase(), Phase::RoleReveal);
    assert_eq!(room.timer_action(), Some(TimerAction::EnterNight));

    let start = Instant::now();
    let out = run_until(&mut engine, &mut room, Phase::NightPhase).await;
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(room.round(), 1);

    let timer: Vec<u32> = out
        .iter()
        .filter_map(|(_, e)| match e {
            ServerEvent::TimerUpdate { seconds_left } => Some(*seconds_left),
            _ => None,
        })
        .collect();
    // Reveal counts 2, 1, 0; the night then announces its full length.
    assert_eq!(timer, vec![2, 1, 0, 5]);
    assert!(out.iter().any(|(_, e)| matches!(
        e,
        ServerEvent::PhaseChange {
            from: Phase::RoleReveal,
            to: Phase::NightPhase,
            duration: 5,
            ..
        }
    )));
}

// =========================================================================
// Voting rules
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_villager_cannot_vote_at_night() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;
    let villagers = with_role(&room, Role::Villager);

    let err = engine
        .cast_vote(&mut room, &villagers[0], &villagers[1])
        .unwrap_err();
    assert_eq!(err, GameError::WrongPhaseForVoter(Phase::NightPhase));
    assert!(room.votes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_participants_are_rejected() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;
    let vampire = with_role(&room, Role::Vampire)[0].clone();
    let ghost = ParticipantId::new("ghost");

    assert_eq!(
        engine.cast_vote(&mut room, &ghost, &vampire).unwrap_err(),
        GameError::InvalidParticipant(ghost.clone())
    );
    assert_eq!(
        engine.cast_vote(&mut room, &vampire, &ghost).unwrap_err(),
        GameError::InvalidParticipant(ghost)
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_votes_outside_voting_phases() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = lobby(4, quick_settings());
    assert_eq!(
        engine.cast_vote(&mut room, &pid(0), &pid(1)).unwrap_err(),
        GameError::WrongPhaseForVoter(Phase::Lobby)
    );
    engine.start_game(&mut room).unwrap();
    assert_eq!(
        engine.cast_vote(&mut room, &pid(0), &pid(1)).unwrap_err(),
        GameError::WrongPhaseForVoter(Phase::RoleReveal)
    );
}

#[tokio::test(start_paused = true)]
async fn test_night_progress_goes_to_vampires_only() {
    let mut engine = GameEngine::with_seed(11);
    let settings = Settings {
        vampire_count: Some(2),
        ..quick_settings()
    };
    let mut room = started(&mut engine, settings).await;
    let vampires = with_role(&room, Role::Vampire);
    let villagers = with_role(&room, Role::Villager);

    let out = engine
        .cast_vote(&mut room, &vampires[0], &villagers[0])
        .unwrap();

    let progress: Vec<_> = out
        .iter()
        .filter(|(_, e)| matches!(e, ServerEvent::VoteProgress { .. }))
        .collect();
    assert_eq!(progress.len(), 2);
    for (to, event) in progress {
        let Recipient::Participant(id) = to else {
            panic!("night progress must not be broadcast");
        };
        assert!(vampires.contains(id));
        let ServerEvent::VoteProgress {
            voted,
            total,
            percentage,
            waiting_for,
        } = event
        else {
            unreachable!()
        };
        assert_eq!((*voted, *total, *percentage), (1, 2, 50));
        assert_eq!(waiting_for.len(), 1);
    }
    assert!(out.contains(&(
        Recipient::Participant(vampires[0].clone()),
        ServerEvent::VoteCast {
            target_id: villagers[0].clone(),
            target_name: room.participant(&villagers[0]).unwrap().name.clone(),
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_changed_vote_overwrites_previous() {
    let mut engine = GameEngine::with_seed(11);
    let settings = Settings {
        vampire_count: Some(2),
        ..quick_settings()
    };
    let mut room = started(&mut engine, settings).await;
    let vampires = with_role(&room, Role::Vampire);
    let villagers = with_role(&room, Role::Villager);

    engine
        .cast_vote(&mut room, &vampires[0], &villagers[0])
        .unwrap();
    engine
        .cast_vote(&mut room, &vampires[0], &villagers[1])
        .unwrap();

    assert_eq!(
        room.votes(),
        &[(vampires[0].clone(), villagers[1].clone())]
    );
}

// =========================================================================
// Resolution
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_last_vote_resolves_exactly_once_after_delay() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;
    let vampire = with_role(&room, Role::Vampire)[0].clone();
    let victim = with_role(&room, Role::Villager)[0].clone();

    let out = engine.cast_vote(&mut room, &vampire, &victim).unwrap();
    assert!(out.contains(&(
        Recipient::All,
        ServerEvent::VotingComplete {
            phase: VotePhase::Night
        }
    )));
    assert_eq!(room.timer_remaining(), Some(VOTE_RESOLUTION_DELAY_SECS));
    assert_eq!(room.timer_action(), Some(TimerAction::ResolveVotes));

    // A second vote during the delay changes nothing about scheduling.
    let again = engine.cast_vote(&mut room, &vampire, &victim).unwrap();
    assert_eq!(
        count(&again, |e| matches!(e, ServerEvent::VotingComplete { .. })),
        0
    );

    let start = Instant::now();
    let out = run_until(&mut engine, &mut room, Phase::DayDiscussion).await;
    assert_eq!(
        start.elapsed(),
        Duration::from_secs(u64::from(VOTE_RESOLUTION_DELAY_SECS))
    );
    assert_eq!(count(&out, |e| matches!(e, ServerEvent::TimerUpdate { seconds_left: 1 })), 0);

    let gone = eliminations(&out);
    assert_eq!(gone.len(), 1);
    assert_eq!(
        gone[0],
        &ServerEvent::PlayerEliminated {
            id: victim.clone(),
            name: room.participant(&victim).unwrap().name.clone(),
            phase: VotePhase::Night,
            role: None,
        }
    );
    assert_eq!(room.participant(&victim).unwrap().status, Status::Eliminated);

    // The racing path: a stale resolution for the same night is a no-op.
    assert!(engine.resolve_votes(&mut room).is_empty());
    assert_eq!(room.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_expiry_with_no_votes_kills_no_one() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;

    let out = run_until(&mut engine, &mut room, Phase::DayDiscussion).await;

    assert!(eliminations(&out).is_empty());
    assert!(room.participants().iter().all(|p| p.is_alive()));
    let night = &room.history()[0];
    assert_eq!(night.phase, VotePhase::Night);
    assert_eq!(night.round, 1);
    assert!(night.votes.is_empty());
    assert_eq!(night.eliminated, None);
}

#[tokio::test(start_paused = true)]
async fn test_day_elimination_reveals_role_when_enabled() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;
    let vampire = with_role(&room, Role::Vampire)[0].clone();
    let villagers = with_role(&room, Role::Villager);

    run_until(&mut engine, &mut room, Phase::DayVoting).await;
    // Two villagers accuse the third; the vampire piles on.
    engine.cast_vote(&mut room, &villagers[0], &villagers[2]).unwrap();
    engine.cast_vote(&mut room, &villagers[1], &villagers[2]).unwrap();
    engine.cast_vote(&mut room, &vampire, &villagers[2]).unwrap();
    let out = engine.cast_vote(&mut room, &villagers[2], &vampire).unwrap();
    assert_eq!(
        count(&out, |e| matches!(e, ServerEvent::VotingComplete { phase: VotePhase::Day })),
        1
    );

    let out = run_until(&mut engine, &mut room, Phase::NightPhase).await;
    let gone = eliminations(&out);
    assert_eq!(gone.len(), 1);
    assert!(matches!(
        gone[0],
        ServerEvent::PlayerEliminated {
            phase: VotePhase::Day,
            role: Some(Role::Villager),
            ..
        }
    ));
    assert_eq!(room.round(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_day_elimination_hides_role_when_disabled() {
    let mut engine = GameEngine::with_seed(5);
    let settings = Settings {
        reveal_role_on_elimination: false,
        ..quick_settings()
    };
    let mut room = started(&mut engine, settings).await;
    let vampire = with_role(&room, Role::Vampire)[0].clone();
    let villagers = with_role(&room, Role::Villager);

    run_until(&mut engine, &mut room, Phase::DayVoting).await;
    engine.cast_vote(&mut room, &vampire, &villagers[0]).unwrap();
    let out = run_until(&mut engine, &mut room, Phase::NightPhase).await;

    assert!(matches!(
        eliminations(&out).as_slice(),
        [ServerEvent::PlayerEliminated { role: None, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_completes_night_vote() {
    let mut engine = GameEngine::with_seed(11);
    let settings = Settings {
        vampire_count: Some(2),
        ..quick_settings()
    };
    let mut room = started(&mut engine, settings).await;
    let vampires = with_role(&room, Role::Vampire);
    let villagers = with_role(&room, Role::Villager);

    engine
        .cast_vote(&mut room, &vampires[0], &villagers[0])
        .unwrap();
    assert_eq!(room.timer_action(), Some(TimerAction::ResolveVotes));
    assert_ne!(room.timer_remaining(), Some(VOTE_RESOLUTION_DELAY_SECS));

    room.mark_disconnected(&vampires[1]);
    let out = engine.on_participant_disconnected(&mut room);
    assert_eq!(
        out,
        vec![(
            Recipient::All,
            ServerEvent::VotingComplete {
                phase: VotePhase::Night
            }
        )]
    );
    assert_eq!(room.timer_remaining(), Some(VOTE_RESOLUTION_DELAY_SECS));
}

// =========================================================================
// Game over
// =========================================================================

/// Night kills a villager, then the village votes out the vampire.
async fn play_villager_win(engine: &mut GameEngine, settings: Settings) -> (Room, Outbox) {
    let mut room = started(engine, settings).await;
    let vampire = with_role(&room, Role::Vampire)[0].clone();
    let villagers = with_role(&room, Role::Villager);

    engine.cast_vote(&mut room, &vampire, &villagers[0]).unwrap();
    run_until(engine, &mut room, Phase::DayVoting).await;
    for voter in &villagers[1..] {
        engine.cast_vote(&mut room, voter, &vampire).unwrap();
    }
    engine.cast_vote(&mut room, &vampire, &villagers[1]).unwrap();
    let out = run_until(engine, &mut room, Phase::GameOver).await;
    (room, out)
}

#[tokio::test(start_paused = true)]
async fn test_villagers_win_and_all_roles_are_revealed() {
    let mut engine = GameEngine::with_seed(5);
    let (room, out) = play_villager_win(&mut engine, quick_settings()).await;

    let Some((Recipient::All, ServerEvent::GameOver {
        winner,
        players,
        rounds,
        history,
        ..
    })) = out.last()
    else {
        panic!("game must end with a broadcast game_over");
    };
    assert_eq!(*winner, Faction::Villagers);
    assert_eq!(players.len(), 4);
    assert_eq!(*rounds, 1);
    let history = history.as_ref().expect("history shown by default");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].phase, VotePhase::Night);
    assert_eq!(history[1].phase, VotePhase::Day);

    let result = room.result().expect("result recorded");
    assert_eq!(result.winner, Faction::Villagers);
    assert_eq!(result.survivors.len(), 2);
    assert_eq!(result.eliminated.len(), 2);
    assert_eq!(
        result.voting_history.as_ref().map(Vec::len),
        Some(room.history().len())
    );
    assert_eq!(room.timer_deadline(), None, "game over cancels the timer");
}

#[tokio::test(start_paused = true)]
async fn test_hidden_history_is_never_sent() {
    let mut engine = GameEngine::with_seed(5);
    let settings = Settings {
        show_votes_after_game: false,
        ..quick_settings()
    };
    let (room, out) = play_villager_win(&mut engine, settings).await;

    assert!(matches!(
        out.last(),
        Some((_, ServerEvent::GameOver { history: None, .. }))
    ));
    assert_eq!(room.result().unwrap().voting_history, None);
}

#[tokio::test(start_paused = true)]
async fn test_night_kill_at_parity_ends_game_for_vampires() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;
    let vampire = with_role(&room, Role::Vampire)[0].clone();
    let villagers = with_role(&room, Role::Villager);

    // Night 1 kills a villager; day 1 passes without a vote.
    engine.cast_vote(&mut room, &vampire, &villagers[0]).unwrap();
    run_until(&mut engine, &mut room, Phase::DayVoting).await;
    run_until(&mut engine, &mut room, Phase::NightPhase).await;
    assert_eq!(room.round(), 2);

    // Night 2 leaves one vampire against one villager.
    engine.cast_vote(&mut room, &vampire, &villagers[1]).unwrap();
    let out = run_until(&mut engine, &mut room, Phase::GameOver).await;

    assert_eq!(
        count(&out, |e| matches!(e, ServerEvent::PhaseChange { .. })),
        0,
        "no discussion once the game is decided"
    );
    assert!(matches!(
        eliminations(&out).as_slice(),
        [ServerEvent::PlayerEliminated { phase: VotePhase::Night, .. }]
    ));
    assert_eq!(room.result().unwrap().winner, Faction::Vampires);
    assert_eq!(room.result().unwrap().survivors.len(), 1);
}

// =========================================================================
// Extra time
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_extend_time_rules() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = lobby(4, quick_settings());
    assert_eq!(
        engine.extend_time(&mut room, 30).unwrap_err(),
        GameError::NoActiveTimer
    );

    engine.start_game(&mut room).unwrap();
    assert_eq!(
        engine.extend_time(&mut room, 30).unwrap_err(),
        GameError::WrongPhase(Phase::RoleReveal)
    );

    run_until(&mut engine, &mut room, Phase::DayDiscussion).await;
    let out = engine.extend_time(&mut room, 30).unwrap();
    assert_eq!(
        out,
        vec![(
            Recipient::All,
            ServerEvent::TimeExtended {
                added_seconds: 30,
                total: 35,
                remaining: 1
            }
        )]
    );
    engine.extend_time(&mut room, 30).unwrap();
    assert_eq!(
        engine.extend_time(&mut room, 30).unwrap_err(),
        GameError::ExtraTimeExhausted(2)
    );
    assert_eq!(room.extra_time_used(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_extend_time_does_not_move_expiry() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;
    run_until(&mut engine, &mut room, Phase::DayDiscussion).await;

    let before = room.timer_remaining();
    engine.extend_time(&mut room, 30).unwrap();
    assert_eq!(room.timer_remaining(), before);

    let start = Instant::now();
    run_until(&mut engine, &mut room, Phase::DayVoting).await;
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_extend_time_disabled() {
    let mut engine = GameEngine::with_seed(5);
    let settings = Settings {
        extra_time_allowed: false,
        ..quick_settings()
    };
    let mut room = started(&mut engine, settings).await;
    run_until(&mut engine, &mut room, Phase::DayDiscussion).await;
    assert_eq!(
        engine.extend_time(&mut room, 30).unwrap_err(),
        GameError::ExtraTimeDisabled
    );
}

#[tokio::test(start_paused = true)]
async fn test_extra_time_uses_reset_each_discussion() {
    let mut engine = GameEngine::with_seed(5);
    let settings = Settings {
        max_extra_time_uses: 1,
        ..quick_settings()
    };
    let mut room = started(&mut engine, settings).await;
    run_until(&mut engine, &mut room, Phase::DayDiscussion).await;
    engine.extend_time(&mut room, 10).unwrap();

    run_until(&mut engine, &mut room, Phase::NightPhase).await;
    run_until(&mut engine, &mut room, Phase::DayDiscussion).await;
    assert_eq!(room.extra_time_used(), 0);
    engine.extend_time(&mut room, 10).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_extend_time_total_saturates() {
    let mut engine = GameEngine::with_seed(5);
    let mut room = started(&mut engine, quick_settings()).await;
    run_until(&mut engine, &mut room, Phase::DayDiscussion).await;

    engine.extend_time(&mut room, u32::MAX).unwrap();
    let out = engine.extend_time(&mut room, u32::MAX).unwrap();
    assert_eq!(
        out,
        vec![(
            Recipient::All,
            ServerEvent::TimeExtended {
                added_seconds: u32::MAX,
                total: u32::MAX,
                remaining: 0
            }
        )]
    );

    // The room keeps running afterwards.
    run_until(&mut engine, &mut room, Phase::DayVoting).await;
}
