//! Per-connection handler: decode commands, route them, stream events back.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`], which owns the socket's reading half, plus a
//! writer task that owns the writing half and drains the connection's
//! event channel. Rooms push events into that channel directly.

use std::sync::Arc;

use hunt_protocol::{ClientCommand, Codec, ConnectionId, ServerEvent};
use hunt_room::{EventSender, RoomError};
use hunt_transport::{Connection, Inbound, Outbound, WsConnection, WsOutbound};
use tokio::sync::{mpsc, oneshot};

use crate::HuntError;
use crate::server::ServerState;

/// Error code for frames that do not decode to a command.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
/// Error code for a `reconnect` that could not be honoured.
pub const RECONNECT_FAILED: &str = "RECONNECT_FAILED";

/// Takes the connection out of its room when the handler exits, however
/// it exits. `Drop` is synchronous, so the leave runs on a spawned task.
struct ConnectionGuard<C: Codec> {
    connection: ConnectionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        let connection = self.connection;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let (_, left) = state.rooms.lock().await.leave_room(connection).await;
            if let Some(participant) = left {
                tracing::debug!(%connection, %participant, "left room on disconnect");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WsConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), HuntError> {
    let connection = conn.id();
    tracing::debug!(%connection, peer = %conn.peer_addr(), "handling new connection");
    let (mut inbound, outbound) = conn.split();

    let (events, outbox) = mpsc::unbounded_channel();
    // Dropping `_hangup` on any exit path tells the writer to close.
    let (_hangup, hung_up) = oneshot::channel::<()>();
    tokio::spawn(write_events(
        connection,
        outbound,
        Arc::clone(&state),
        outbox,
        hung_up,
    ));
    let _guard = ConnectionGuard {
        connection,
        state: Arc::clone(&state),
    };

    loop {
        let data = match tokio::time::timeout(state.idle_timeout, inbound.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%connection, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%connection, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%connection, "connection idle, closing");
                break;
            }
        };

        let command: ClientCommand = match state.codec.decode(&data) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(%connection, error = %e, "undecodable frame");
                let _ = events.send(ServerEvent::error(BAD_REQUEST, e.to_string()));
                continue;
            }
        };

        if let Err(e) = handle_command(&state, connection, &events, command).await {
            tracing::debug!(%connection, code = e.code(), error = %e, "command rejected");
            let _ = events.send(ServerEvent::error(e.code(), e.to_string()));
        }
    }

    // _guard drops here and the leave fires.
    Ok(())
}

/// Runs one command. Successful replies go out through `events`; the
/// caller turns an `Err` into an `error` event.
///
/// Game commands and `status` clone room handles out of the registry and
/// release the lock before waiting on any room.
async fn handle_command<C: Codec>(
    state: &ServerState<C>,
    connection: ConnectionId,
    events: &EventSender,
    command: ClientCommand,
) -> Result<(), RoomError> {
    match command {
        ClientCommand::CreateRoom { name, settings } => {
            let mut rooms = state.rooms.lock().await;
            let created = rooms.create_room(connection, &name, settings.as_ref(), events.clone())?;
            // Sent before the lock is released, so no join can beat it.
            let _ = events.send(ServerEvent::RoomCreated {
                code: created.code,
                participant_id: created.participant_id,
                room: created.room,
            });
        }

        ClientCommand::JoinRoom { code, name } => {
            // The room itself sends `room_joined` ahead of its broadcast.
            state
                .rooms
                .lock()
                .await
                .join_room(&code, connection, &name, events.clone())
                .await?;
        }

        ClientCommand::StartGame { code } => {
            let handle = state.rooms.lock().await.handle(&code)?;
            handle.start_game(connection).await?;
        }

        ClientCommand::CastVote { code, target_id } => {
            let handle = state.rooms.lock().await.handle(&code)?;
            handle.cast_vote(connection, target_id).await?;
        }

        ClientCommand::UpdateSettings { code, settings } => {
            let handle = state.rooms.lock().await.handle(&code)?;
            handle.update_settings(connection, settings).await?;
        }

        ClientCommand::ExtendTime { code } => {
            let handle = state.rooms.lock().await.handle(&code)?;
            handle.extend_time(connection).await?;
        }

        ClientCommand::LeaveRoom => {
            let (_, left) = state.rooms.lock().await.leave_room(connection).await;
            if let Some(participant) = left {
                tracing::debug!(%connection, %participant, "left room");
            }
        }

        ClientCommand::Reconnect {
            code,
            participant_id,
        } => {
            let room = state
                .rooms
                .lock()
                .await
                .reconnect_player(&code, &participant_id, connection, events.clone())
                .await;
            if room.is_none() {
                let _ = events.send(ServerEvent::error(
                    RECONNECT_FAILED,
                    format!("cannot reconnect to room {code}"),
                ));
            }
        }

        ClientCommand::Status => {
            let handles = state.rooms.lock().await.room_handles();
            let stats = hunt_room::collect_stats(&handles).await;
            let _ = events.send(ServerEvent::Status(stats));
        }
    }
    Ok(())
}

/// Encodes and writes events until the reader hangs up or the socket
/// fails. Events already queued are flushed before the close frame.
async fn write_events<C: Codec>(
    connection: ConnectionId,
    mut outbound: WsOutbound,
    state: Arc<ServerState<C>>,
    mut outbox: mpsc::UnboundedReceiver<ServerEvent>,
    mut hung_up: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            biased;
            event = outbox.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = &mut hung_up => {
                while let Ok(event) = outbox.try_recv() {
                    if send_event(connection, &mut outbound, &state.codec, &event).await.is_err() {
                        return;
                    }
                }
                break;
            }
        };
        if send_event(connection, &mut outbound, &state.codec, &event).await.is_err() {
            return;
        }
    }
    let _ = outbound.close().await;
}

async fn send_event(
    connection: ConnectionId,
    outbound: &mut WsOutbound,
    codec: &impl Codec,
    event: &ServerEvent,
) -> Result<(), ()> {
    let bytes = match codec.encode(event) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(%connection, error = %e, "failed to encode event");
            return Ok(());
        }
    };
    outbound.send(&bytes).await.map_err(|e| {
        tracing::debug!(%connection, error = %e, "send failed, writer stopping");
    })
}
