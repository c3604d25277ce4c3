//! Registry of live TCP connections.
//!
//! Each accepted socket gets a [`ConnectionId`] that is never reused for the
//! lifetime of the server. A registered connection owns:
//! - the bounded outbound queue feeding its writer task
//! - the handles of its reader and writer tasks
//!
//! Removing a connection aborts both tasks, which drops the socket halves and
//! closes the socket even when the peer has stopped reading.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Frames that may wait for a connection's writer before the connection is
/// considered stalled. Roughly two seconds of updates at the default rate.
pub const OUTBOUND_QUEUE_FRAMES: usize = 64;

/// Identity of one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connected client socket
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    outbound: mpsc::Sender<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Creates a connection whose writer task drains `outbound`.
    ///
    /// The queue should be created with [`OUTBOUND_QUEUE_FRAMES`] capacity.
    pub fn new(id: ConnectionId, addr: SocketAddr, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbound,
            reader: None,
            writer: None,
        }
    }

    /// Attaches the task reading from this socket so it can be stopped on removal.
    pub fn with_reader(mut self, reader: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Attaches the task writing to this socket so it can be stopped on removal.
    pub fn with_writer(mut self, writer: JoinHandle<()>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Queues one frame for the writer task without waiting.
    ///
    /// Returns false once the writer is gone or when the queue is full, which
    /// means the peer is not reading its updates.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        match self.outbound.try_send(bytes) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Connection {} has {} frames queued, peer is not reading",
                    self.id, OUTBOUND_QUEUE_FRAMES
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

/// The set of active connections, in ascending id order.
pub struct ConnectionManager {
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: u64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Hands out the next connection id. Ids are never reused.
    pub fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Adds a connection to the active set.
    ///
    /// From here on its commands are processed and it receives broadcasts.
    pub fn register(&mut self, connection: Connection) {
        debug!("Connection {} registered from {}", connection.id, connection.addr);
        self.connections.insert(connection.id, connection);
    }

    /// Removes a connection from the active set.
    ///
    /// Dropping the returned value stops the connection's tasks and closes the
    /// socket. Returns `None` if the connection was not active.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        debug!(
            "Connection {} from {} closed after {:.1}s",
            id,
            connection.addr,
            connection.uptime().as_secs_f32()
        );
        Some(connection)
    }

    /// Whether `id` is still in the active set. Messages from inactive
    /// connections are ignored.
    pub fn is_active(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Queues a frame on an active connection. Returns false if the connection
    /// is unknown, its writer has stopped or its queue is full.
    pub fn send(&self, id: ConnectionId, bytes: Vec<u8>) -> bool {
        self.connections
            .get(&id)
            .map(|connection| connection.send(bytes))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
