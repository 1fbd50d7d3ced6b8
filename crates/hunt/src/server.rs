//! `HuntServer` builder and accept loop.
//!
//! Ties the layers together: WebSocket transport, JSON codec, room
//! registry. The registry is built here and handed to every connection
//! task; nothing in the core is a global.

use std::sync::Arc;
use std::time::Duration;

use hunt_protocol::{Codec, JsonCodec};
use hunt_room::{RegistryConfig, RoomRegistry, expired_rooms};
use hunt_transport::{Listener, WsListener};
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::HuntError;

/// State shared by every connection task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for a [`HuntServer`].
///
/// ```rust,no_run
/// # async fn run() -> Result<(), hunt::HuntError> {
/// use hunt::prelude::*;
///
/// let server = HuntServer::builder()
///     .bind("0.0.0.0:3000")
///     .registry_config(RegistryConfig::default())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct HuntServerBuilder {
    bind_addr: String,
    registry: RegistryConfig,
    idle_timeout: Duration,
    cleanup_interval: Duration,
    seed: Option<u64>,
}

impl HuntServerBuilder {
    pub fn new() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind_addr: defaults.server.bind_addr.clone(),
            registry: RegistryConfig::default(),
            idle_timeout: defaults.idle_timeout(),
            cleanup_interval: defaults.cleanup_interval(),
            seed: None,
        }
    }

    /// Starts from a loaded [`ServerConfig`].
    ///
    /// # Errors
    /// `InvalidSettings` if `[rooms.defaults]` is not a valid room setup.
    pub fn from_config(config: &ServerConfig) -> Result<Self, HuntError> {
        Ok(Self::new()
            .bind(&config.server.bind_addr)
            .registry_config(config.registry_config()?)
            .idle_timeout(config.idle_timeout())
            .cleanup_interval(config.cleanup_interval()))
    }

    /// Address to listen on. Port `0` picks a free port.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Seeds room codes, participant ids and role shuffles.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Binds the listener and assembles the server with the JSON codec.
    pub async fn build(self) -> Result<HuntServer<JsonCodec>, HuntError> {
        let listener = WsListener::bind(&self.bind_addr).await?;
        let registry = match self.seed {
            Some(seed) => RoomRegistry::with_seed(self.registry, seed),
            None => RoomRegistry::new(self.registry),
        };

        let state = Arc::new(ServerState {
            rooms: Mutex::new(registry),
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        });

        Ok(HuntServer {
            listener,
            state,
            cleanup_interval: self.cleanup_interval,
        })
    }
}

impl Default for HuntServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound game server. Call [`run()`](Self::run) to start serving.
pub struct HuntServer<C: Codec> {
    listener: WsListener,
    state: Arc<ServerState<C>>,
    cleanup_interval: Duration,
}

impl HuntServer<JsonCodec> {
    pub fn builder() -> HuntServerBuilder {
        HuntServerBuilder::new()
    }
}

impl<C: Codec> HuntServer<C> {
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the process ends, spawning a handler
    /// task per connection and a sweeper for old rooms.
    pub async fn run(mut self) -> Result<(), HuntError> {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "hunt server running");
        tokio::spawn(sweep_rooms(Arc::clone(&self.state), self.cleanup_interval));

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodically destroys finished rooms and rooms past retention.
async fn sweep_rooms<C: Codec>(state: Arc<ServerState<C>>, every: Duration) {
    if every.is_zero() {
        tracing::warn!("cleanup_interval_secs is 0, room sweeping disabled");
        return;
    }
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let (handles, retention) = {
            let rooms = state.rooms.lock().await;
            (rooms.room_handles(), rooms.config().retention)
        };
        // Rooms are queried unlocked; the registry is only retaken to remove.
        let doomed = expired_rooms(&handles, retention).await;
        let removed = if doomed.is_empty() {
            0
        } else {
            state.rooms.lock().await.remove_rooms(&doomed).await
        };
        tracing::debug!(removed, "room sweep finished");
    }
}
