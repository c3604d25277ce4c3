//! Server network layer: TCP connection multiplexing and the broadcast cadence

use crate::client_manager::{Connection, ConnectionId, ConnectionManager, OUTBOUND_QUEUE_FRAMES};
use crate::config::ServerConfig;
use crate::game::Session;
use log::{debug, error, info, warn};
use shared::{Command, RECORD_SIZE};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Capacity of the channel carrying records from connection tasks to the
/// main loop. Readers wait when it is full.
const INBOUND_QUEUE_SIZE: usize = 1000;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug, PartialEq)]
pub enum ServerMessage {
    CommandReceived {
        connection: ConnectionId,
        record: [u8; RECORD_SIZE],
    },
    ConnectionClosed {
        connection: ConnectionId,
    },
}

/// Reads whole command records until the peer goes away.
///
/// A record split across several reads is reassembled. End of stream, even in
/// the middle of a record, or any I/O error closes the connection.
pub async fn read_commands<R>(
    connection: ConnectionId,
    mut reader: R,
    server_tx: mpsc::Sender<ServerMessage>,
) where
    R: AsyncRead + Unpin,
{
    let mut record = [0u8; RECORD_SIZE];

    loop {
        match reader.read_exact(&mut record).await {
            Ok(_) => {
                if server_tx
                    .send(ServerMessage::CommandReceived { connection, record })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("Connection {} reached end of stream", connection);
                break;
            }
            Err(e) => {
                warn!("Read error on connection {}: {}", connection, e);
                break;
            }
        }
    }

    let _ = server_tx
        .send(ServerMessage::ConnectionClosed { connection })
        .await;
}

/// Drains a connection's outbound queue into its socket.
pub async fn write_updates<W>(
    connection: ConnectionId,
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = outbound.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            warn!("Write error on connection {}: {}", connection, e);
            return;
        }
    }

    let _ = writer.shutdown().await;
}

/// Main server: owns the session and every connection.
///
/// Connection tasks only move bytes; every session mutation happens on the
/// task running [`Server::run`].
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    session: Session,
    connections: ConnectionManager,

    server_tx: mpsc::Sender<ServerMessage>,
    server_rx: mpsc::Receiver<ServerMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);

        Ok(Server {
            listener,
            session: Session::new(config.max_players),
            config,
            connections: ConnectionManager::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Admits a freshly accepted socket.
    ///
    /// When the player cap is reached the socket is dropped straight away and
    /// no player is created. Otherwise the session gets a new player and
    /// fighter, and the socket is split between a reader task feeding the main
    /// loop and a writer task draining a bounded outbound queue.
    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let id = self.connections.allocate_id();

        let Some(player) = self.session.join(id) else {
            warn!(
                "Player cap of {} reached, refusing connection from {}",
                self.config.max_players, addr
            );
            drop(stream);
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on {}: {}", addr, e);
        }

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_FRAMES);

        let writer = tokio::spawn(write_updates(id, write_half, outbound_rx));
        let reader = tokio::spawn(read_commands(id, read_half, self.server_tx.clone()));

        self.connections.register(
            Connection::new(id, addr, outbound_tx)
                .with_reader(reader)
                .with_writer(writer),
        );
        info!(
            "Player {} admitted from {} ({} online)",
            player.index(),
            addr,
            self.session.player_count()
        );
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::CommandReceived { connection, record } => {
                if !self.connections.is_active(connection) {
                    return;
                }
                match Command::decode(&record) {
                    Ok(command) => {
                        self.session.apply_command(connection, &command);
                    }
                    Err(e) => {
                        debug!("Ignoring record from connection {}: {}", connection, e);
                    }
                }
            }
            ServerMessage::ConnectionClosed { connection } => {
                self.close_connection(connection);
            }
        }
    }

    /// Tears a connection down: its players and their fighters leave the
    /// session, then the socket is closed. Safe to call more than once.
    fn close_connection(&mut self, connection: ConnectionId) {
        let removed = self.session.disconnect(connection);
        if let Some(closed) = self.connections.remove(connection) {
            info!(
                "Connection {} from {} closed after {:.1}s, {} player(s) removed",
                connection,
                closed.addr,
                closed.uptime().as_secs_f32(),
                removed.len()
            );
        }
    }

    /// Applies everything the connection tasks have queued so far.
    fn drain_messages(&mut self) {
        while let Ok(message) = self.server_rx.try_recv() {
            self.handle_message(message);
        }
    }

    /// Sends this tick's state to every active player.
    ///
    /// A connection whose frame cannot be queued, because its writer is gone
    /// or the peer stopped reading, is torn down.
    fn broadcast_state(&mut self) {
        let connections = &self.connections;
        let outboxes = self.session.broadcast(|id| connections.is_active(id));

        for outbox in outboxes {
            let mut bytes = Vec::with_capacity(outbox.updates.len() * RECORD_SIZE);
            let encoded = outbox
                .updates
                .iter()
                .try_for_each(|update| update.encode_into(&mut bytes));

            if let Err(e) = encoded {
                error!("Failed to encode updates for {}: {}", outbox.connection, e);
                continue;
            }

            if !self.connections.send(outbox.connection, bytes) {
                debug!("Connection {} is no longer writable", outbox.connection);
                self.close_connection(outbox.connection);
            }
        }
    }

    /// Main server loop: accepts sockets, applies commands and runs the cadence.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        tick_interval.tick().await;
        let mut last_tick = Instant::now();

        info!(
            "Server running at {} Hz, admitting up to {} players",
            self.config.tick_rate, self.config.max_players
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_accept(stream, addr),
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                },

                message = self.server_rx.recv() => {
                    if let Some(message) = message {
                        self.handle_message(message);
                    }
                },

                _ = tick_interval.tick() => {
                    self.drain_messages();
                    self.broadcast_state();

                    let now = Instant::now();
                    self.session.advance(now.duration_since(last_tick));
                    last_tick = now;

                    if self.session.tick % u64::from(self.config.tick_rate) == 0
                        && !self.connections.is_empty()
                    {
                        debug!(
                            "Tick {}: {} connections, {} fighters",
                            self.session.tick,
                            self.connections.len(),
                            self.session.world().fighter_count()
                        );
                    }
                },
            }
        }
    }
}
