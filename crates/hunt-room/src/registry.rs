//! Room registry: creates, tracks, and routes connections to rooms.

use std::collections::HashMap;
use std::time::Duration;

use hunt_game::{GameEngine, GameError, Room};
use hunt_protocol::{
    ConnectionId, ParticipantId, RoomCode, RoomSnapshot, RoomStats, Settings, SettingsPatch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::room::spawn_room;
use crate::{EventSender, RoomError, RoomHandle, generate_room_code};

/// Settings for the registry itself.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base settings every new room starts from, before the host's
    /// overrides.
    pub default_settings: Settings,
    /// Rooms older than this are swept by [`RoomRegistry::cleanup_old_rooms`].
    pub retention: Duration,
    /// Capacity of each room actor's command channel.
    pub channel_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_settings: Settings::default(),
            retention: Duration::from_secs(6 * 60 * 60),
            channel_size: 64,
        }
    }
}

/// Result of [`RoomRegistry::create_room`].
#[derive(Debug, Clone)]
pub struct Created {
    pub code: RoomCode,
    pub participant_id: ParticipantId,
    pub room: RoomSnapshot,
}

/// Result of [`RoomRegistry::join_room`].
#[derive(Debug, Clone)]
pub struct Joined {
    pub participant_id: ParticipantId,
    pub room: RoomSnapshot,
}

/// Owns every live room and the index from connection to room.
///
/// Two structures, kept in step by every mutating method:
///
/// - `rooms`: one [`RoomHandle`] per live room code
/// - `connections`: the room each bound connection belongs to; a
///   connection is in at most one room
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, RoomHandle>,
    connections: HashMap<ConnectionId, RoomCode>,
    config: RegistryConfig,
    rng: StdRng,
}

impl RoomRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic codes, participant ids and role shuffles.
    pub fn with_seed(config: RegistryConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RegistryConfig, rng: StdRng) -> Self {
        Self {
            rooms: HashMap::new(),
            connections: HashMap::new(),
            config,
            rng,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn new_participant_id(&mut self) -> ParticipantId {
        ParticipantId::new(format!("{:032x}", self.rng.random::<u128>()))
    }

    fn unique_code(&mut self) -> RoomCode {
        loop {
            let code = generate_room_code(&mut self.rng);
            if !self.rooms.contains_key(&code) {
                return code;
            }
            tracing::debug!(%code, "room code collision, drawing again");
        }
    }

    fn ensure_unbound(&self, connection: ConnectionId) -> Result<(), RoomError> {
        match self.connections.get(&connection) {
            Some(code) => Err(RoomError::AlreadyInRoom(connection, code.clone())),
            None => Ok(()),
        }
    }

    /// Creates a room with `connection` as host and sole participant.
    ///
    /// The room starts from the registry's default settings with
    /// `overrides` merged on top.
    ///
    /// # Errors
    /// `AlreadyInRoom`, `InvalidSettings` or `InvalidName`.
    pub fn create_room(
        &mut self,
        connection: ConnectionId,
        name: &str,
        overrides: Option<&SettingsPatch>,
        sender: EventSender,
    ) -> Result<Created, RoomError> {
        self.ensure_unbound(connection)?;
        let settings = match overrides {
            Some(patch) => self.config.default_settings.merged(patch),
            None => self.config.default_settings.clone(),
        };
        let code = self.unique_code();
        let participant_id = self.new_participant_id();
        let room = Room::new(code.clone(), participant_id.clone(), connection, name, settings)?;
        let snapshot = room.snapshot();

        let engine = GameEngine::with_seed(self.rng.random());
        let handle = spawn_room(room, engine, sender, self.config.channel_size);
        self.rooms.insert(code.clone(), handle);
        self.connections.insert(connection, code.clone());
        tracing::info!(%code, host = %participant_id, %connection, "room created");

        Ok(Created {
            code,
            participant_id,
            room: snapshot,
        })
    }

    /// Adds `connection` to an existing lobby. The code is matched
    /// case-insensitively.
    ///
    /// # Errors
    /// `AlreadyInRoom`, `RoomNotFound`, then whatever the room rejects
    /// (`InvalidName`, `RoomFull`, `GameInProgress`).
    pub async fn join_room(
        &mut self,
        code: &RoomCode,
        connection: ConnectionId,
        name: &str,
        sender: EventSender,
    ) -> Result<Joined, RoomError> {
        self.ensure_unbound(connection)?;
        let code = code.normalized();
        let handle = self.handle(&code)?;
        let participant_id = self.new_participant_id();

        let room = handle
            .join(participant_id.clone(), connection, name.to_owned(), sender)
            .await?;
        self.connections.insert(connection, code);
        Ok(Joined {
            participant_id,
            room,
        })
    }

    /// Takes `connection` out of its room.
    ///
    /// In the lobby or after the game the participant is removed (and a
    /// departing host replaced); mid-game they are only marked
    /// disconnected. A room left with nobody in it is destroyed.
    ///
    /// Returns the room as it is after the leave (`None` if it is gone)
    /// and the participant that left, both `None` if the connection was
    /// not in a room.
    pub async fn leave_room(
        &mut self,
        connection: ConnectionId,
    ) -> (Option<RoomSnapshot>, Option<ParticipantId>) {
        let Some(code) = self.connections.remove(&connection) else {
            return (None, None);
        };
        let Some(handle) = self.rooms.get(&code).cloned() else {
            return (None, None);
        };

        let outcome = match handle.leave(connection).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return (None, None),
            Err(e) => {
                tracing::warn!(%code, %connection, error = %e, "leave failed, dropping room");
                self.destroy(&code).await;
                return (None, None);
            }
        };
        tracing::debug!(%code, %connection, participant = %outcome.participant_id, "left room");

        if outcome.room.is_none() {
            self.destroy(&code).await;
        }
        (outcome.room, Some(outcome.participant_id))
    }

    /// Binds a dropped participant to `connection`.
    ///
    /// Returns `None` if the room or participant is unknown, the
    /// participant is still connected, the room is not mid-game, or the
    /// connection already belongs to a room.
    pub async fn reconnect_player(
        &mut self,
        code: &RoomCode,
        participant_id: &ParticipantId,
        connection: ConnectionId,
        sender: EventSender,
    ) -> Option<RoomSnapshot> {
        if self.connections.contains_key(&connection) {
            return None;
        }
        let code = code.normalized();
        let handle = self.rooms.get(&code)?.clone();
        let room = handle
            .reconnect(participant_id.clone(), connection, sender)
            .await
            .ok()
            .flatten()?;
        self.connections.insert(connection, code);
        Some(room)
    }

    /// Merges `patch` into a lobby's settings on behalf of its host.
    ///
    /// # Errors
    /// `RoomNotFound`, `PermissionDenied`, `InvalidPhase`,
    /// `InvalidSettings`, in that order.
    pub async fn update_settings(
        &self,
        code: &RoomCode,
        requester: ConnectionId,
        patch: SettingsPatch,
    ) -> Result<RoomSnapshot, RoomError> {
        let handle = self.handle(code)?;
        handle.update_settings(requester, patch).await
    }

    /// A handle to a live room, for commands that should not hold the
    /// registry while they wait.
    ///
    /// # Errors
    /// `RoomNotFound`.
    pub fn handle(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(&code.normalized())
            .cloned()
            .ok_or_else(|| GameError::RoomNotFound(code.clone()).into())
    }

    /// The room a connection belongs to, if any.
    pub fn connection_room(&self, connection: ConnectionId) -> Option<&RoomCode> {
        self.connections.get(&connection)
    }

    /// Connections the registry has bound to `code`.
    pub fn connections_in(&self, code: &RoomCode) -> Vec<ConnectionId> {
        let mut conns: Vec<_> = self
            .connections
            .iter()
            .filter(|(_, c)| *c == code)
            .map(|(conn, _)| *conn)
            .collect();
        conns.sort();
        conns
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_codes(&self) -> Vec<RoomCode> {
        self.rooms.keys().cloned().collect()
    }

    /// Handles to every live room. Query them after releasing the
    /// registry so no caller waits on a busy room while holding it.
    pub fn room_handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().cloned().collect()
    }

    /// Destroys every room whose game is over or which is older than the
    /// retention window. Returns how many were removed.
    ///
    /// Holds `&mut self` across every room's reply; a shared registry
    /// should use [`expired_rooms`] and [`remove_rooms`](Self::remove_rooms)
    /// instead.
    pub async fn cleanup_old_rooms(&mut self) -> usize {
        let doomed = expired_rooms(&self.room_handles(), self.config.retention).await;
        self.remove_rooms(&doomed).await
    }

    /// Destroys the rooms behind `doomed`. A handle whose code now belongs
    /// to a different room, or to none, is skipped.
    pub async fn remove_rooms(&mut self, doomed: &[RoomHandle]) -> usize {
        let mut removed = 0;
        for handle in doomed {
            let current = self.rooms.get(handle.code());
            if current.is_some_and(|live| live.same_room(handle)) {
                self.destroy(handle.code()).await;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, remaining = self.rooms.len(), "swept old rooms");
        }
        removed
    }

    /// Counts for the health surface. Rooms that fail to answer are
    /// skipped.
    pub async fn stats(&self) -> RoomStats {
        collect_stats(&self.room_handles()).await
    }

    /// Shuts a room down and forgets every connection bound to it.
    async fn destroy(&mut self, code: &RoomCode) {
        if let Some(handle) = self.rooms.remove(code) {
            let _ = handle.shutdown().await;
        }
        self.connections.retain(|_, c| c != code);
        tracing::info!(%code, "room destroyed");
    }
}

/// The rooms among `handles` whose game is over, which are older than
/// `retention`, or whose actor no longer answers.
pub async fn expired_rooms(handles: &[RoomHandle], retention: Duration) -> Vec<RoomHandle> {
    let mut doomed = Vec::new();
    for handle in handles {
        let expired = match handle.info().await {
            Ok(info) => info.phase.is_terminal() || info.created_at.elapsed() > retention,
            Err(_) => true,
        };
        if expired {
            doomed.push(handle.clone());
        }
    }
    doomed
}

/// Room, participant and game counts over `handles`.
pub async fn collect_stats(handles: &[RoomHandle]) -> RoomStats {
    let mut stats = RoomStats::default();
    for handle in handles {
        if let Ok(info) = handle.info().await {
            stats.rooms += 1;
            stats.participants += info.participant_count();
            if info.phase.is_in_game() {
                stats.active_games += 1;
            }
        }
    }
    stats
}
