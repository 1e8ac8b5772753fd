//! Connection registry for the authoritative server
//!
//! Tracks, per connection identity, the queue feeding that connection's writer
//! task and a handle to its reader task. The main loop is the only owner, so
//! registering, fanning out a snapshot and dropping a connection never race
//! with each other.
//!
//! Outbound queues are bounded. A connection whose queue is full is not
//! keeping up with the broadcast rate and gets reported like a dead one.

use log::{info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{AbortHandle, JoinHandle};

/// Records a connection may have waiting before it counts as stalled
pub const OUTBOUND_QUEUE_DEPTH: usize = 8;

/// Work item for a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Pre-encoded snapshot record, shared across every connection
    Frame(Arc<Vec<u8>>),
    /// Send the terminal record, then close the write half
    Close,
}

/// One accepted participant
#[derive(Debug)]
pub struct Client {
    /// Identity key, also the key of this participant's player
    pub id: String,
    pub addr: SocketAddr,
    outbound: mpsc::Sender<Outbound>,
    reader: Option<AbortHandle>,
    writer: Option<JoinHandle<()>>,
}

impl Client {
    pub fn new(addr: SocketAddr, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: addr.to_string(),
            addr,
            outbound,
            reader: None,
            writer: None,
        }
    }

    pub fn with_tasks(mut self, reader: AbortHandle, writer: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self.writer = Some(writer);
        self
    }

    /// Queues a record without waiting. `false` means the writer task is gone
    /// or its queue is full.
    pub fn send(&self, message: Outbound) -> bool {
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue for {} is full", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Asks the writer to finish with the terminal record and stops reading.
    /// Returns the writer handle so callers can wait for the flush. A writer
    /// that cannot take the terminal record is stuck and gets aborted instead.
    fn close(mut self) -> Option<JoinHandle<()>> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        let writer = self.writer.take();
        if self.outbound.try_send(Outbound::Close).is_ok() {
            return writer;
        }
        if let Some(writer) = writer {
            writer.abort();
        }
        None
    }
}

#[derive(Default)]
pub struct ClientManager {
    clients: HashMap<String, Client>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn add_client(&mut self, client: Client) {
        info!("Client {} connected", client.id);
        self.clients.insert(client.id.clone(), client);
    }

    /// Drops a connection: terminal record queued, reader stopped.
    /// Returns false if the identity was already gone.
    pub fn remove_client(&mut self, id: &str) -> bool {
        match self.clients.remove(id) {
            Some(client) => {
                client.close();
                info!("Client {} disconnected", id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Queues `frame` to every connection and returns the identities whose
    /// writer has gone away or stopped draining its queue.
    pub fn broadcast(&self, frame: Arc<Vec<u8>>) -> Vec<String> {
        self.clients
            .values()
            .filter(|client| !client.send(Outbound::Frame(Arc::clone(&frame))))
            .map(|client| client.id.clone())
            .collect()
    }

    /// Closes every connection and hands back the writer tasks to await
    pub fn close_all(&mut self) -> Vec<JoinHandle<()>> {
        self.clients
            .drain()
            .filter_map(|(_, client)| client.close())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
