//! Client sync agent: sends batched input records and keeps a last-write-wins
//! cache of the server's world

use crate::input::InputManager;
use log::{debug, info};
use shared::codec::{FrameError, FrameReader, FrameWriter};
use shared::{ClientMessage, InputDelta, ServerMessage, WorldState, NAME_KEY};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Frame(#[from] FrameError),
    #[error("receive task failed: {0}")]
    Task(#[from] JoinError),
}

/// Why the receive side stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server sent a null or empty state
    ServerClosed,
    /// The stream ended cleanly between records
    StreamClosed,
}

/// Handle on the receive task
pub struct Session {
    handle: JoinHandle<Result<SessionEnd, ClientError>>,
}

impl Session {
    /// Resolves when the receive side stops. Must not be awaited again after it
    /// has resolved.
    pub async fn finished(&mut self) -> Result<SessionEnd, ClientError> {
        (&mut self.handle).await?
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Send side of the agent plus access to the cached world
pub struct Client {
    writer: FrameWriter<OwnedWriteHalf>,
    input_manager: InputManager,
    state_rx: watch::Receiver<WorldState>,
    local_id: String,
}

impl Client {
    /// Connects, starts the receive task and sends the handshake record
    /// carrying the display name.
    pub async fn connect(server_addr: &str, name: &str) -> Result<(Client, Session), ClientError> {
        info!("Connecting to remote server {}...", server_addr);
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let local_id = stream.local_addr()?.to_string();
        info!("Connected as {}", local_id);

        let (read_half, write_half) = stream.into_split();
        let (state_tx, state_rx) = watch::channel(WorldState::new());
        let handle = tokio::spawn(receive_loop(FrameReader::new(read_half), state_tx));

        let mut client = Client {
            writer: FrameWriter::new(write_half),
            input_manager: InputManager::new(),
            state_rx,
            local_id,
        };

        let handshake = InputDelta::from([(NAME_KEY.to_string(), name.to_string())]);
        if let Err(e) = client.send_update(handshake).await {
            handle.abort();
            return Err(e);
        }

        Ok((client, Session { handle }))
    }

    /// Identity the server files our player under
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Receiver for the cached world; changes whenever a snapshot lands
    pub fn subscribe(&self) -> watch::Receiver<WorldState> {
        self.state_rx.clone()
    }

    pub fn state(&self) -> WorldState {
        self.state_rx.borrow().clone()
    }

    pub fn input_mut(&mut self) -> &mut InputManager {
        &mut self.input_manager
    }

    pub async fn send_update(&mut self, delta: InputDelta) -> Result<(), ClientError> {
        debug!("Sent update: {:?}", delta);
        self.writer.write_frame(&ClientMessage::update(delta)).await?;
        Ok(())
    }

    /// Tick boundary: sends the batched record if there is one.
    /// Returns whether anything was sent.
    pub async fn flush_input(&mut self) -> Result<bool, ClientError> {
        match self.input_manager.take_update() {
            Some(delta) => {
                self.send_update(delta).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes our write half; the server sees a clean end of stream
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Receive side: replaces the cached world with every non-empty snapshot and
/// stops on the terminal record or end of stream.
pub async fn receive_loop<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    state_tx: watch::Sender<WorldState>,
) -> Result<SessionEnd, ClientError> {
    loop {
        let message = match reader.read_frame::<ServerMessage>().await? {
            Some(message) => message,
            None => {
                info!("Server closed the stream");
                return Ok(SessionEnd::StreamClosed);
            }
        };

        if message.is_terminal() {
            info!("Got terminal state from server");
            return Ok(SessionEnd::ServerClosed);
        }

        if let Some(state) = message.state {
            debug!("Got update with {} players", state.len());
            state_tx.send_replace(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::codec::encode_frame;
    use shared::{Coords, Player, Rgba};
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn world(names: &[&str]) -> WorldState {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut player = Player::new(Coords::new(i as i32, 0), Rgba::opaque(1, 2, 3));
                player.name = name.to_string();
                (format!("10.0.0.{}:1", i), player)
            })
            .collect()
    }

    fn frame(message: &ServerMessage) -> Vec<u8> {
        encode_frame(message).unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_replaces_cache() {
        let first = frame(&ServerMessage::snapshot(world(&["Alice", "Bob"])));
        let second = frame(&ServerMessage::snapshot(world(&["Carol"])));
        let mock = Builder::new().read(&first).read(&second).build();

        let (state_tx, state_rx) = watch::channel(WorldState::new());
        let end = receive_loop(FrameReader::new(mock), state_tx).await.unwrap();

        assert_eq!(end, SessionEnd::StreamClosed);
        let cached = state_rx.borrow().clone();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached["10.0.0.0:1"].name, "Carol");
    }

    #[tokio::test]
    async fn test_terminal_record_ends_session() {
        let snapshot = frame(&ServerMessage::snapshot(world(&["Alice"])));
        let terminal = frame(&ServerMessage::terminal());
        let mock = Builder::new().read(&snapshot).read(&terminal).build();

        let (state_tx, state_rx) = watch::channel(WorldState::new());
        let end = receive_loop(FrameReader::new(mock), state_tx).await.unwrap();

        assert_eq!(end, SessionEnd::ServerClosed);
        assert_eq!(state_rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_state_ends_session() {
        let mock = Builder::new().read(b"{\"State\":{}}\n").build();

        let (state_tx, _state_rx) = watch::channel(WorldState::new());
        let end = receive_loop(FrameReader::new(mock), state_tx).await.unwrap();
        assert_eq!(end, SessionEnd::ServerClosed);
    }

    #[tokio::test]
    async fn test_malformed_record_is_fatal() {
        let mock = Builder::new().read(b"{\"State\": [1, 2]}").build();

        let (state_tx, _state_rx) = watch::channel(WorldState::new());
        let result = receive_loop(FrameReader::new(mock), state_tx).await;
        assert!(matches!(result, Err(ClientError::Frame(FrameError::Json(_)))));
    }

    #[tokio::test]
    async fn test_connect_sends_name_first() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let mut reader = FrameReader::new(stream);
            let first: ClientMessage = reader.read_frame().await.unwrap().unwrap();
            let second: ClientMessage = reader.read_frame().await.unwrap().unwrap();
            let end: Option<ClientMessage> = reader.read_frame().await.unwrap();
            (peer.to_string(), first, second, end)
        });

        let (mut client, session) = Client::connect(&addr, "Alice").await.unwrap();
        client.input_mut().press(shared::Direction::Right);
        assert!(client.flush_input().await.unwrap());
        assert!(!client.flush_input().await.unwrap());
        let local_id = client.local_id().to_string();
        client.close().await.unwrap();

        let (peer, first, second, end) = server.await.unwrap();
        assert_eq!(peer, local_id);
        assert_eq!(first.update.unwrap()["name"], "Alice");
        assert_eq!(second.update.unwrap()["movement"], "right");
        assert!(end.is_none());

        session.abort();
    }
}
