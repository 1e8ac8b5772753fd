//! Server network layer: TCP accept loop, per-connection reader and writer
//! tasks, and the main loop that owns the world and runs the broadcast tick

use crate::client_manager::{Client, ClientManager, Outbound, OUTBOUND_QUEUE_DEPTH};
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::codec::{encode_frame, FrameReader, FrameWriter};
use shared::{ClientMessage, InputDelta, PlayerUpdate, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long shutdown waits for writers to flush the terminal record
const SHUTDOWN_FLUSH: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        client: Client,
    },
    UpdateReceived {
        id: String,
        delta: InputDelta,
    },
    Disconnected {
        id: String,
        reason: String,
    },
    WriteFailed {
        id: String,
        error: String,
    },
    Shutdown,
}

/// Handle that stops a running [`Server`] from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerEvent::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Authoritative server: single owner of the world and the connection registry
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: ClientManager,
    game_state: GameState,
    broadcast_interval: Duration,

    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn new(addr: &str, broadcast_interval: Duration) -> Result<Self, ServerError> {
        Self::with_game_state(addr, broadcast_interval, GameState::new()).await
    }

    pub async fn with_game_state(
        addr: &str,
        broadcast_interval: Duration,
        game_state: GameState,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(),
            game_state,
            broadcast_interval,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns the task accepting connections and starting their I/O tasks
    fn spawn_acceptor(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        let listener = self.listener.take()?;
        let server_tx = self.server_tx.clone();

        Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if !register_connection(stream, addr, &server_tx) {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }))
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { client } => {
                let id = client.id.clone();
                self.clients.add_client(client);

                if self.game_state.add_player(&id).is_none() {
                    warn!("Grid is full, refusing {}", id);
                    self.clients.remove_client(&id);
                }
            }
            ServerEvent::UpdateReceived { id, delta } => {
                debug!("New update from {} -> {:?}", id, delta);
                let update = PlayerUpdate::from_delta(&delta);
                self.game_state.apply_update(&id, &update);
            }
            ServerEvent::Disconnected { id, reason } => {
                info!("Connection with {} closed: {}", id, reason);
                self.drop_connection(&id);
            }
            ServerEvent::WriteFailed { id, error } => {
                warn!("Write to {} failed: {}", id, error);
                self.drop_connection(&id);
            }
            ServerEvent::Shutdown => {}
        }
    }

    fn drop_connection(&mut self, id: &str) {
        self.clients.remove_client(id);
        self.game_state.remove_player(id);
    }

    /// Sends the full world to every connection if anything changed since the
    /// last tick. Connections whose writer is gone or backed up are dropped,
    /// which marks the world dirty again for the next tick.
    fn broadcast_if_dirty(&mut self) {
        if !self.game_state.take_dirty() || self.clients.is_empty() {
            return;
        }

        let message = ServerMessage::snapshot(self.game_state.players().clone());
        let frame = match encode_frame(&message) {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                error!("Failed to encode snapshot: {}", e);
                return;
            }
        };

        debug!(
            "Broadcasting {} bytes to {} clients",
            frame.len(),
            self.clients.len()
        );

        for id in self.clients.broadcast(frame) {
            warn!("Dropping {}: writer closed or not keeping up", id);
            self.drop_connection(&id);
        }
    }

    /// Main server loop. Runs until a shutdown is requested, then sends the
    /// terminal record to every participant.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let acceptor = self.spawn_acceptor();

        let mut broadcast_tick = interval(self.broadcast_interval);
        broadcast_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.server_rx.recv() => {
                    match event {
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(event) => self.handle_event(event),
                    }
                },

                _ = broadcast_tick.tick() => {
                    self.broadcast_if_dirty();
                },
            }
        }

        if let Some(acceptor) = acceptor {
            acceptor.abort();
        }

        let writers = self.clients.close_all();
        let flush = async {
            for writer in writers {
                let _ = writer.await;
            }
        };
        if timeout(SHUTDOWN_FLUSH, flush).await.is_err() {
            warn!("Timed out flushing terminal records");
        }

        Ok(())
    }
}

/// Starts reader and writer tasks for a fresh connection and hands it to the
/// main loop. Returns false once the main loop has stopped.
fn register_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: &mpsc::UnboundedSender<ServerEvent>,
) -> bool {
    info!("New connection from {}", addr);
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
    }

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let client = Client::new(addr, outbound_tx);
    let id = client.id.clone();

    let writer = tokio::spawn(run_writer(
        id.clone(),
        FrameWriter::new(write_half),
        outbound_rx,
        server_tx.clone(),
    ));

    // The reader holds off until Connected is queued, so the main loop always
    // sees the player created before any update or disconnect from it.
    let (registered_tx, registered_rx) = oneshot::channel();
    let reader = tokio::spawn(run_reader(
        id.clone(),
        FrameReader::new(read_half),
        server_tx.clone(),
        registered_rx,
    ));
    let client = client.with_tasks(reader.abort_handle(), writer);

    if server_tx
        .send(ServerEvent::Connected { client })
        .is_err()
    {
        error!("Main loop gone, dropping {}", id);
        return false;
    }
    let _ = registered_tx.send(());
    true
}

/// Ingestion handler: decodes records until the stream fails or closes.
/// Nothing is read before `registered` fires.
async fn run_reader(
    id: String,
    mut reader: FrameReader<OwnedReadHalf>,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
    registered: oneshot::Receiver<()>,
) {
    if registered.await.is_err() {
        return;
    }

    let reason = loop {
        match reader.read_frame::<ClientMessage>().await {
            Ok(Some(ClientMessage { update: Some(delta) })) => {
                let event = ServerEvent::UpdateReceived {
                    id: id.clone(),
                    delta,
                };
                if server_tx.send(event).is_err() {
                    return;
                }
            }
            Ok(Some(ClientMessage { update: None })) => {}
            Ok(None) => break "closed by peer".to_string(),
            Err(e) => {
                warn!("{} error: {}", id, e);
                break e.to_string();
            }
        }
    };

    let _ = server_tx.send(ServerEvent::Disconnected { id, reason });
}

/// Drains the connection's outbound queue onto the socket
async fn run_writer(
    id: String,
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    while let Some(message) = outbound_rx.recv().await {
        let result = match message {
            Outbound::Frame(frame) => writer.write_encoded(&frame).await,
            Outbound::Close => {
                if let Err(e) = writer.write_frame(&ServerMessage::terminal()).await {
                    debug!("Terminal record to {} not delivered: {}", id, e);
                }
                let _ = writer.shutdown().await;
                return;
            }
        };

        if let Err(e) = result {
            let _ = server_tx.send(ServerEvent::WriteFailed {
                id,
                error: e.to_string(),
            });
            return;
        }
    }

    let _ = writer.shutdown().await;
}
