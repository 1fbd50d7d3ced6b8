//! Room actor: an isolated Tokio task that owns one room.
//!
//! Commands from connections and the room's own countdown are handled on
//! the same task, one at a time. That is what makes "the last vote came
//! in" and "the voting timer ran out" unable to resolve a round twice.

use std::collections::HashMap;

use hunt_game::{GameEngine, Outbox, Room};
use hunt_protocol::{
    ConnectionId, ParticipantId, Phase, Recipient, RoomCode, RoomSnapshot, ServerEvent,
    SettingsPatch,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::RoomError;

/// Channel sender delivering events to one connection's writer task.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        id: ParticipantId,
        connection: ConnectionId,
        name: String,
        sender: EventSender,
        reply: oneshot::Sender<Result<RoomSnapshot, RoomError>>,
    },
    Leave {
        connection: ConnectionId,
        reply: oneshot::Sender<Option<LeaveOutcome>>,
    },
    Reconnect {
        id: ParticipantId,
        connection: ConnectionId,
        sender: EventSender,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
    UpdateSettings {
        requester: ConnectionId,
        patch: SettingsPatch,
        reply: oneshot::Sender<Result<RoomSnapshot, RoomError>>,
    },
    StartGame {
        requester: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    CastVote {
        requester: ConnectionId,
        target: ParticipantId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    ExtendTime {
        requester: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
    Shutdown,
}

/// A point-in-time view of a room, for the registry and health checks.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub code: RoomCode,
    pub phase: Phase,
    pub created_at: Instant,
    /// Connections currently bound to a participant.
    pub connections: Vec<ConnectionId>,
    pub snapshot: RoomSnapshot,
}

impl RoomInfo {
    pub fn participant_count(&self) -> usize {
        self.snapshot.participants.len()
    }
}

/// What a leave did to the room.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub participant_id: ParticipantId,
    /// The room after the leave, or `None` if it is now empty.
    pub room: Option<RoomSnapshot>,
}

/// Handle to a running room actor.
///
/// Cheap to clone: it is an `mpsc::Sender` and the room code. Callers
/// clone it out of the registry and await replies without holding the
/// registry.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Sends a command built around a fresh reply channel and waits for
    /// the answer.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    pub async fn join(
        &self,
        id: ParticipantId,
        connection: ConnectionId,
        name: String,
        sender: EventSender,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Join {
            id,
            connection,
            name,
            sender,
            reply,
        })
        .await?
    }

    /// Removes the connection's participant, or marks them disconnected
    /// if a game is running. `None` if the connection was not in the room.
    pub async fn leave(&self, connection: ConnectionId) -> Result<Option<LeaveOutcome>, RoomError> {
        self.request(|reply| RoomCommand::Leave { connection, reply })
            .await
    }

    pub async fn reconnect(
        &self,
        id: ParticipantId,
        connection: ConnectionId,
        sender: EventSender,
    ) -> Result<Option<RoomSnapshot>, RoomError> {
        self.request(|reply| RoomCommand::Reconnect {
            id,
            connection,
            sender,
            reply,
        })
        .await
    }

    pub async fn update_settings(
        &self,
        requester: ConnectionId,
        patch: SettingsPatch,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::UpdateSettings {
            requester,
            patch,
            reply,
        })
        .await?
    }

    pub async fn start_game(&self, requester: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartGame { requester, reply })
            .await?
    }

    pub async fn cast_vote(
        &self,
        requester: ConnectionId,
        target: ParticipantId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::CastVote {
            requester,
            target,
            reply,
        })
        .await?
    }

    pub async fn extend_time(&self, requester: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::ExtendTime { requester, reply })
            .await?
    }

    /// `true` if both handles drive the same actor.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Tells the room to stop. Its timer goes with it.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room: Room,
    engine: GameEngine,
    /// Outbound channels of connected participants.
    senders: HashMap<ParticipantId, EventSender>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room = %self.room.code(), "room actor started");

        loop {
            let deadline = self.room.timer_deadline();
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                () = hunt_tick::sleep_until(deadline) => {
                    let out = self.engine.tick(&mut self.room);
                    self.dispatch(out);
                }
            }
        }

        tracing::info!(room = %self.room.code(), "room actor stopped");
    }

    /// Handles one command. Returns `false` when the actor should stop.
    fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                id,
                connection,
                name,
                sender,
                reply,
            } => {
                let _ = reply.send(self.handle_join(id, connection, &name, sender));
            }
            RoomCommand::Leave { connection, reply } => {
                let _ = reply.send(self.handle_leave(connection));
            }
            RoomCommand::Reconnect {
                id,
                connection,
                sender,
                reply,
            } => {
                let _ = reply.send(self.handle_reconnect(id, connection, sender));
            }
            RoomCommand::UpdateSettings {
                requester,
                patch,
                reply,
            } => {
                let _ = reply.send(self.handle_update_settings(requester, &patch));
            }
            RoomCommand::StartGame { requester, reply } => {
                let _ = reply.send(self.handle_start(requester));
            }
            RoomCommand::CastVote {
                requester,
                target,
                reply,
            } => {
                let _ = reply.send(self.handle_vote(requester, &target));
            }
            RoomCommand::ExtendTime { requester, reply } => {
                let _ = reply.send(self.handle_extend(requester));
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {
                tracing::info!(room = %self.room.code(), "room shutting down");
                return false;
            }
        }
        true
    }

    /// The joiner hears `room_joined` before the `room_update` everyone
    /// else gets.
    fn handle_join(
        &mut self,
        id: ParticipantId,
        connection: ConnectionId,
        name: &str,
        sender: EventSender,
    ) -> Result<RoomSnapshot, RoomError> {
        self.room.admit(id.clone(), connection, name)?;
        self.senders.insert(id.clone(), sender);
        tracing::info!(
            room = %self.room.code(),
            participant = %id,
            players = self.room.len(),
            "participant joined"
        );
        let room = self.room.snapshot();
        self.dispatch(vec![(
            Recipient::Participant(id.clone()),
            ServerEvent::RoomJoined {
                participant_id: id,
                room: room.clone(),
            },
        )]);
        self.broadcast_update();
        Ok(room)
    }

    fn handle_leave(&mut self, connection: ConnectionId) -> Option<LeaveOutcome> {
        let id = self.room.participant_by_connection(connection)?.id.clone();
        self.senders.remove(&id);

        if self.room.phase().is_in_game() {
            self.room.mark_disconnected(&id);
            tracing::info!(room = %self.room.code(), participant = %id, "participant disconnected mid-game");
            let out = self.engine.on_participant_disconnected(&mut self.room);
            self.dispatch(out);
        } else {
            self.room.remove(&id);
            tracing::info!(
                room = %self.room.code(),
                participant = %id,
                players = self.room.len(),
                "participant left"
            );
        }

        let room = if self.room.is_empty() {
            None
        } else {
            self.broadcast_update();
            Some(self.room.snapshot())
        };
        Some(LeaveOutcome {
            participant_id: id,
            room,
        })
    }

    fn handle_reconnect(
        &mut self,
        id: ParticipantId,
        connection: ConnectionId,
        sender: EventSender,
    ) -> Option<RoomSnapshot> {
        if !self.room.rebind(&id, connection) {
            tracing::debug!(room = %self.room.code(), participant = %id, "reconnect refused");
            return None;
        }
        self.senders.insert(id.clone(), sender);
        tracing::info!(room = %self.room.code(), participant = %id, "participant reconnected");

        let mut out = vec![(
            Recipient::Participant(id.clone()),
            ServerEvent::RoomJoined {
                participant_id: id.clone(),
                room: self.room.snapshot(),
            },
        )];
        if let Some(role) = self.room.participant(&id).and_then(|p| p.role) {
            out.push((
                Recipient::Participant(id.clone()),
                ServerEvent::RoleAssigned { role },
            ));
        }
        if let Some(seconds_left) = self.room.timer_remaining() {
            out.push((
                Recipient::Participant(id),
                ServerEvent::TimerUpdate { seconds_left },
            ));
        }
        self.dispatch(out);
        self.broadcast_update();
        Some(self.room.snapshot())
    }

    /// Resolves the requesting connection to a participant id.
    fn requester(&self, connection: ConnectionId) -> Result<ParticipantId, RoomError> {
        self.room
            .participant_by_connection(connection)
            .map(|p| p.id.clone())
            .ok_or(RoomError::NotInRoom(connection))
    }

    fn require_host(&self, connection: ConnectionId) -> Result<(), RoomError> {
        let id = self.requester(connection)?;
        if !self.room.is_host(&id) {
            return Err(hunt_game::GameError::PermissionDenied.into());
        }
        Ok(())
    }

    fn handle_update_settings(
        &mut self,
        requester: ConnectionId,
        patch: &SettingsPatch,
    ) -> Result<RoomSnapshot, RoomError> {
        self.require_host(requester)?;
        self.room.update_settings(patch)?;
        tracing::debug!(room = %self.room.code(), "settings updated");
        self.broadcast_update();
        Ok(self.room.snapshot())
    }

    fn handle_start(&mut self, requester: ConnectionId) -> Result<(), RoomError> {
        self.require_host(requester)?;
        let out = self.engine.start_game(&mut self.room)?;
        self.dispatch(out);
        self.broadcast_update();
        Ok(())
    }

    fn handle_vote(
        &mut self,
        requester: ConnectionId,
        target: &ParticipantId,
    ) -> Result<(), RoomError> {
        let voter = self.requester(requester)?;
        let out = self.engine.cast_vote(&mut self.room, &voter, target)?;
        self.dispatch(out);
        Ok(())
    }

    fn handle_extend(&mut self, requester: ConnectionId) -> Result<(), RoomError> {
        self.require_host(requester)?;
        let seconds = self.room.settings().extra_time_amount;
        let out = self.engine.extend_time(&mut self.room, seconds)?;
        self.dispatch(out);
        Ok(())
    }

    fn broadcast_update(&self) {
        self.dispatch(vec![(
            Recipient::All,
            ServerEvent::RoomUpdate {
                room: self.room.snapshot(),
            },
        )]);
    }

    /// Delivers events to their recipients. A participant whose
    /// connection is gone is skipped; that never stops delivery to others.
    fn dispatch(&self, out: Outbox) {
        for (recipient, event) in out {
            match recipient {
                Recipient::All => {
                    for sender in self.senders.values() {
                        let _ = sender.send(event.clone());
                    }
                }
                Recipient::Participant(id) => {
                    if let Some(sender) = self.senders.get(&id) {
                        let _ = sender.send(event);
                    }
                }
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            code: self.room.code().clone(),
            phase: self.room.phase(),
            created_at: self.room.created_at(),
            connections: self.room.connections().collect(),
            snapshot: self.room.snapshot(),
        }
    }
}

/// Spawns a room actor around an already-built room whose only
/// participant is the host, and returns a handle to it.
pub(crate) fn spawn_room(
    room: Room,
    engine: GameEngine,
    host_sender: EventSender,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let code = room.code().clone();

    let mut senders = HashMap::new();
    if let Some(host) = room.host() {
        senders.insert(host.id.clone(), host_sender);
    }

    let actor = RoomActor {
        room,
        engine,
        senders,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
