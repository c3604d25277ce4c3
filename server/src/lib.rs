//! # Arena Server Library
//!
//! Authoritative server for a small real-time arena. Clients connect over TCP,
//! each connection is given a player and a fighter, and the server steers the
//! fighters from the commands it receives while broadcasting their positions
//! back on a fixed cadence.
//!
//! ## Core Responsibilities
//!
//! ### Connection Multiplexing
//! One listening socket admits clients up to a player cap. Every admitted
//! socket gets a reader task that cuts the byte stream into 16-byte command
//! records and a writer task that flushes queued update records. A socket that
//! reaches end of stream or fails is torn down together with its player.
//!
//! ### Command Authorization
//! A command names the player it is meant for. It is only applied when that
//! player exists and arrived on the very connection the command came in on, so
//! a client cannot steer somebody else's fighter. Anything else is dropped
//! silently.
//!
//! ### Cadence
//! Thirty times per second the server sends every player the position of every
//! fighter plus a reminder of its own player id, then advances the simulation
//! by the time that actually elapsed since the previous tick.
//!
//! ## Architecture Design
//!
//! ### Single Owner
//! Connection tasks only move bytes. The [`game::Session`] is owned by the task
//! running [`network::Server::run`], which is the only place state changes, so
//! no locking is needed.
//!
//! ## Module Organization
//!
//! - `client_manager`: active connection registry and per-connection queues
//! - `config`: listener address, tick rate and player cap
//! - `game`: the session object, command gate and broadcast builder
//! - `network`: listener, connection tasks and the main loop
//! - `physics`: the per-tick fighter movement step
//! - `store`: generational entity storage for fighters and players
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::new(8080)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod physics;
pub mod store;
